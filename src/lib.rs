//! Pageshot
//!
//! Captures screenshots of live pages over a remote inspection channel:
//! full-page (tiled and stitched when the page is taller than a single
//! capture allows), visible-viewport, or a user-selected area. It can also
//! flip every checkbox on a page.
//!
//! # Features
//!
//! - **Backend-agnostic**: capture logic talks to an [`Inspector`]; the
//!   `cdp` feature provides one backed by headless Chrome, and
//!   [`scripted::ScriptedInspector`] renders synthetic pages in memory
//! - **Exclusive channels**: one controller per target, enforced by an
//!   explicit [`lease::LeaseRegistry`]
//! - **Uniform results**: callers get a [`CaptureResult`], never a raised error
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pageshot::{CaptureConfig, Orchestrator, TargetId};
//! use pageshot::artifact::MemoryStore;
//! use pageshot::scripted::{ScriptedInspector, ScriptedPage};
//!
//! # async fn run() {
//! let page = ScriptedPage::new("tab-1", 800, 20_000);
//! let orchestrator = Orchestrator::new(
//!     Arc::new(ScriptedInspector::new(page)),
//!     Arc::new(MemoryStore::new()),
//!     CaptureConfig::default(),
//! );
//! let result = orchestrator.capture_full_page(&TargetId::from("tab-1")).await;
//! assert!(result.is_success());
//! # }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod area;
pub mod artifact;
pub mod checkbox;
pub mod compositor;
pub mod dispatch;
pub mod inspector;
pub mod lease;
pub mod orchestrator;
pub mod planner;
pub mod scripted;
pub mod selection;
pub mod settle;

#[cfg(feature = "cdp")]
pub mod cdp;

pub use artifact::{ArtifactId, ArtifactStore};
pub use inspector::{Inspector, InspectorChannel};
pub use orchestrator::Orchestrator;
pub use planner::{CapturePlan, TileRegion};
pub use settle::SettleStrategy;

/// Largest page height (CSS px) captured in a single emulated-viewport shot.
pub const MAX_SINGLE_SHOT_HEIGHT: u32 = 16384;

/// Height (CSS px) of each strip when a page has to be tiled.
pub const TILE_HEIGHT: u32 = 8000;

/// Configuration for capture operations
///
/// The defaults match the limits most capture backends impose on a single
/// image dimension.
///
/// # Examples
///
/// ```
/// let cfg = pageshot::CaptureConfig::default();
/// assert_eq!(cfg.max_single_shot_height, 16384);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Pages at most this tall are captured in one shot
    pub max_single_shot_height: u32,
    /// Strip height used once a page exceeds `max_single_shot_height`
    pub tile_height: u32,
    /// How to wait for layout after overriding the viewport
    pub settle: SettleStrategy,
    /// Ask the storage collaborator to prompt before saving
    pub prompt_user: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_single_shot_height: MAX_SINGLE_SHOT_HEIGHT,
            tile_height: TILE_HEIGHT,
            settle: SettleStrategy::default(),
            prompt_user: false,
        }
    }
}

impl CaptureConfig {
    /// Check that the limits describe a plan that can terminate.
    pub fn validate(&self) -> Result<()> {
        if self.max_single_shot_height == 0 {
            return Err(Error::Config("max_single_shot_height must be positive".into()));
        }
        if self.tile_height == 0 {
            return Err(Error::Config("tile_height must be positive".into()));
        }
        if self.tile_height > self.max_single_shot_height {
            return Err(Error::Config(format!(
                "tile_height {} exceeds max_single_shot_height {}",
                self.tile_height, self.max_single_shot_height
            )));
        }
        Ok(())
    }
}

/// Identifier of one page target (a browser tab, or a scripted page)
///
/// Deserializes from either a JSON string or a JSON integer, since tab ids
/// usually travel as numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawTargetId", into = "String")]
pub struct TargetId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTargetId {
    Number(u64),
    Text(String),
}

impl From<RawTargetId> for TargetId {
    fn from(raw: RawTargetId) -> Self {
        match raw {
            RawTargetId::Number(n) => TargetId(n.to_string()),
            RawTargetId::Text(s) => TargetId(s),
        }
    }
}

impl From<TargetId> for String {
    fn from(id: TargetId) -> Self {
        id.0
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        TargetId(s.to_string())
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        TargetId(s)
    }
}

impl TargetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full scrollable content size of a page, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMetrics {
    pub width: u32,
    pub height: u32,
}

/// A caller-selected rectangle in CSS pixels, relative to the visible viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionArea {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SelectionArea {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Reject empty, negative or non-finite rectangles.
    pub fn validate(&self) -> Result<()> {
        let all_finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(Error::InvalidSelection("coordinates must be finite".into()));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(Error::InvalidSelection(format!(
                "width and height must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Terminal outcome of a capture request
///
/// A success always carries an artifact and a failure always carries an
/// error message; there is no partially populated state.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureResult {
    Success { artifact: ArtifactId },
    Failure { error: String, kind: &'static str },
}

impl CaptureResult {
    pub fn succeeded(artifact: ArtifactId) -> Self {
        CaptureResult::Success { artifact }
    }

    pub fn failed(err: &Error) -> Self {
        CaptureResult::Failure {
            error: err.to_string(),
            kind: err.kind(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CaptureResult::Success { .. })
    }

    pub fn artifact(&self) -> Option<ArtifactId> {
        match self {
            CaptureResult::Success { artifact } => Some(*artifact),
            CaptureResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            CaptureResult::Success { .. } => None,
            CaptureResult::Failure { error, .. } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();
        assert_eq!(config.max_single_shot_height, 16384);
        assert_eq!(config.tile_height, 8000);
        assert!(!config.prompt_user);
    }

    #[test]
    fn config_rejects_zero_tile_height() {
        let config = CaptureConfig {
            tile_height: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn config_rejects_tiles_taller_than_single_shot() {
        let config = CaptureConfig {
            tile_height: 20_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn target_id_accepts_numbers_and_strings() {
        let a: TargetId = serde_json::from_str("42").unwrap();
        let b: TargetId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"42\"");
    }

    #[test]
    fn selection_validation() {
        assert!(SelectionArea::new(0.0, 0.0, 100.0, 50.0).validate().is_ok());
        assert!(matches!(
            SelectionArea::new(0.0, 0.0, 0.0, 50.0).validate(),
            Err(Error::InvalidSelection(_))
        ));
        assert!(SelectionArea::new(f64::NAN, 0.0, 10.0, 10.0).validate().is_err());
    }

    #[test]
    fn capture_result_is_never_partial() {
        let ok = CaptureResult::succeeded(ArtifactId(7));
        assert_eq!(ok.artifact(), Some(ArtifactId(7)));
        assert!(ok.error().is_none());

        let failed = CaptureResult::failed(&Error::EmptyCapture);
        assert!(!failed.is_success());
        assert!(failed.artifact().is_none());
        assert_eq!(failed.error(), Some("Capture produced no tiles"));
    }
}
