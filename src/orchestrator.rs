//! Capture orchestration
//!
//! Every operation follows the same shape: take the target's lease, attach,
//! run the capture steps, detach unconditionally, then persist. Errors from
//! any step are logged and folded into a [`CaptureResult`]; a detach failure
//! during cleanup is logged but never replaces the primary outcome.

use std::sync::Arc;

use log::{error, info, warn};

use crate::area::capture_area_png;
use crate::artifact::{png_data_url, timestamped_filename, ArtifactId, ArtifactKind, ArtifactStore, PersistOptions};
use crate::checkbox;
use crate::compositor::{composite, encode_png, CapturedTile};
use crate::inspector::{Clip, Inspector, InspectorSession};
use crate::lease::LeaseRegistry;
use crate::planner::{plan, CapturePlan, TileRegion};
use crate::settle::wait_for_layout;
use crate::{CaptureConfig, CaptureResult, PageMetrics, Result, SelectionArea, TargetId};

pub struct Orchestrator {
    inspector: Arc<dyn Inspector>,
    store: Arc<dyn ArtifactStore>,
    leases: LeaseRegistry,
    config: CaptureConfig,
}

impl Orchestrator {
    pub fn new(inspector: Arc<dyn Inspector>, store: Arc<dyn ArtifactStore>, config: CaptureConfig) -> Self {
        Self {
            inspector,
            store,
            leases: LeaseRegistry::new(),
            config,
        }
    }

    /// Share a lease registry with other controllers of the same targets.
    pub fn with_leases(mut self, leases: LeaseRegistry) -> Self {
        self.leases = leases;
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn leases(&self) -> &LeaseRegistry {
        &self.leases
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Capture the whole scrollable page and store it as
    /// `screenshot_<timestamp>.png`.
    pub async fn capture_full_page(&self, target: &TargetId) -> CaptureResult {
        let outcome = match self.full_page_png(target).await {
            Ok(png) => self.persist(&png, ArtifactKind::Page).await,
            Err(e) => Err(e),
        };
        self.conclude(target, "full-page capture", outcome)
    }

    /// Capture just the visible viewport.
    pub async fn capture_visible(&self, target: &TargetId) -> CaptureResult {
        let outcome = match self.visible_png(target).await {
            Ok(png) => self.persist(&png, ArtifactKind::Page).await,
            Err(e) => Err(e),
        };
        self.conclude(target, "viewport capture", outcome)
    }

    /// Crop `selection` out of the visible viewport and store it as
    /// `area-screenshot-<timestamp>.png`.
    pub async fn capture_area(&self, target: &TargetId, selection: &SelectionArea) -> CaptureResult {
        let outcome = match self.area_png(target, selection).await {
            Ok(png) => self.persist(&png, ArtifactKind::Area).await,
            Err(e) => Err(e),
        };
        self.conclude(target, "area capture", outcome)
    }

    /// Full-page PNG without persisting it.
    pub async fn full_page_png(&self, target: &TargetId) -> Result<Vec<u8>> {
        let mut session = self.open(target).await?;
        let outcome = self.run_full_page(&mut session).await;
        finish(session, outcome).await
    }

    pub async fn visible_png(&self, target: &TargetId) -> Result<Vec<u8>> {
        let mut session = self.open(target).await?;
        let outcome = session.capture(None).await;
        finish(session, outcome).await
    }

    pub async fn area_png(&self, target: &TargetId, selection: &SelectionArea) -> Result<Vec<u8>> {
        selection.validate()?;
        let mut session = self.open(target).await?;
        let outcome = capture_area_png(&mut session, selection).await;
        finish(session, outcome).await
    }

    /// Check or uncheck every enabled checkbox; returns how many changed.
    pub async fn set_all_checkboxes(&self, target: &TargetId, checked: bool) -> Result<u32> {
        let mut session = self.open(target).await?;
        let outcome = checkbox::set_all(&mut session, checked).await;
        finish(session, outcome).await
    }

    async fn open(&self, target: &TargetId) -> Result<InspectorSession> {
        let lease = self.leases.acquire(target)?;
        let channel = self.inspector.attach(target).await?;
        Ok(InspectorSession::new(target.clone(), channel, lease))
    }

    async fn run_full_page(&self, session: &mut InspectorSession) -> Result<Vec<u8>> {
        session.enable_page().await?;
        let metrics = session.layout_metrics().await?;
        let capture_plan = plan(
            metrics.width,
            metrics.height,
            self.config.max_single_shot_height,
            self.config.tile_height,
        );
        match capture_plan {
            CapturePlan::OneShot { width, height } => self.one_shot(session, width, height).await,
            CapturePlan::Tiled { regions } => self.tiled(session, metrics, &regions).await,
        }
    }

    async fn one_shot(&self, session: &mut InspectorSession, width: u32, height: u32) -> Result<Vec<u8>> {
        info!("[{}] capturing {}x{} in one shot", session.target(), width, height);
        session.override_viewport(width, height, 1.0).await?;
        let shot = match wait_for_layout(session, &self.config.settle).await {
            Ok(()) => session.capture(None).await,
            Err(e) => Err(e),
        };

        // The override is global to the target; it must not outlive us.
        let cleared = session.clear_viewport_override().await;
        match (shot, cleared) {
            (Ok(png), Ok(())) => Ok(png),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Err(clear_err)) => {
                warn!("[{}] clearing viewport override failed: {}", session.target(), clear_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }

    async fn tiled(&self, session: &mut InspectorSession, metrics: PageMetrics, regions: &[TileRegion]) -> Result<Vec<u8>> {
        info!(
            "[{}] capturing {}x{} in {} tiles",
            session.target(),
            metrics.width,
            metrics.height,
            regions.len()
        );
        let mut tiles = Vec::with_capacity(regions.len());
        for region in regions {
            let clip = Clip {
                x: 0.0,
                y: region.origin_y as f64,
                width: metrics.width as f64,
                height: region.height as f64,
                scale: 1.0,
            };
            let png = session.capture(Some(clip)).await?;
            tiles.push(CapturedTile::decode(*region, &png)?);
        }

        let dpr = session.device_pixel_ratio().await?;
        let image = composite(&tiles, metrics.width, metrics.height, dpr)?;
        encode_png(&image)
    }

    async fn persist(&self, png: &[u8], kind: ArtifactKind) -> Result<ArtifactId> {
        let filename = timestamped_filename(kind);
        let options = PersistOptions {
            prompt_user: self.config.prompt_user,
        };
        self.store.persist(&png_data_url(png), &filename, options).await
    }

    fn conclude(&self, target: &TargetId, what: &str, outcome: Result<ArtifactId>) -> CaptureResult {
        match outcome {
            Ok(id) => {
                info!("[{}] {} stored as artifact {}", target, what, id.0);
                CaptureResult::succeeded(id)
            }
            Err(e) => {
                error!("[{}] {} failed: {}", target, what, e);
                CaptureResult::failed(&e)
            }
        }
    }
}

// Detach regardless of how the steps went. A detach failure only surfaces
// when there is no earlier error to report, and even then the captured
// result wins.
async fn finish<T>(session: InspectorSession, outcome: Result<T>) -> Result<T> {
    let target = session.target().clone();
    if let Err(e) = session.detach().await {
        match &outcome {
            Ok(_) => warn!("[{}] detach failed after successful capture: {}", target, e),
            Err(primary) => warn!("[{}] detach failed while handling '{}': {}", target, primary, e),
        }
    }
    outcome
}
