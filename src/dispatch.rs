//! Routing inbound action messages
//!
//! Requests arrive as JSON objects tagged by `action`, e.g.
//! `{"action": "takeScreenshot", "tabId": 12}`, and are answered with
//! `{"success": true, "downloadId": 3}` or
//! `{"success": false, "error": "...", "errorKind": "protocol"}`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactId, PersistOptions};
use crate::orchestrator::Orchestrator;
use crate::selection::{SelectionRegistry, SelectionSession};
use crate::{CaptureResult, Error, Result, SelectionArea, TargetId};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    TakeScreenshot { tab_id: TargetId },
    TakeVisibleScreenshot {
        #[serde(default)]
        tab_id: Option<TargetId>,
    },
    StartAreaSelection { tab_id: TargetId },
    CaptureAreaScreenshot {
        area: SelectionArea,
        #[serde(default)]
        tab_id: Option<TargetId>,
    },
    DownloadScreenshot { data_url: String, filename: String },
    SetAllCheckboxes { tab_id: TargetId, checked: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_id: Option<ArtifactId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(err: &Error) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            ..Default::default()
        }
    }

    fn from_result<T>(result: Result<T>, fill: impl FnOnce(&mut Response, T)) -> Self {
        match result {
            Ok(value) => {
                let mut response = Response::ok();
                fill(&mut response, value);
                response
            }
            Err(e) => Response::failure(&e),
        }
    }
}

impl From<CaptureResult> for Response {
    fn from(result: CaptureResult) -> Self {
        match result {
            CaptureResult::Success { artifact } => Response {
                success: true,
                download_id: Some(artifact),
                ..Default::default()
            },
            CaptureResult::Failure { error, kind } => Response {
                success: false,
                error: Some(error),
                error_kind: Some(kind.to_string()),
                ..Default::default()
            },
        }
    }
}

/// Collaborator that shows the selection overlay on a page and drives the
/// session from pointer events.
#[async_trait]
pub trait OverlayLauncher: Send + Sync {
    async fn launch(&self, session: SelectionSession) -> Result<()>;
}

pub struct Dispatcher {
    orchestrator: Orchestrator,
    selections: SelectionRegistry,
    overlay: Option<Arc<dyn OverlayLauncher>>,
    active_target: Mutex<Option<TargetId>>,
}

impl Dispatcher {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            selections: SelectionRegistry::new(),
            overlay: None,
            active_target: Mutex::new(None),
        }
    }

    pub fn with_overlay(mut self, overlay: Arc<dyn OverlayLauncher>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn selections(&self) -> &SelectionRegistry {
        &self.selections
    }

    /// Target used by requests that do not name one.
    pub fn set_active_target(&self, target: Option<TargetId>) {
        if let Ok(mut active) = self.active_target.lock() {
            *active = target;
        }
    }

    fn resolve(&self, tab_id: Option<TargetId>) -> Result<TargetId> {
        tab_id
            .or_else(|| self.active_target.lock().ok().and_then(|a| a.clone()))
            .ok_or_else(|| Error::Config("no tabId given and no active target set".into()))
    }

    pub async fn handle(&self, request: Request) -> Response {
        debug!("handling {:?}", request);
        match request {
            Request::TakeScreenshot { tab_id } => self.orchestrator.capture_full_page(&tab_id).await.into(),
            Request::TakeVisibleScreenshot { tab_id } => match self.resolve(tab_id) {
                Ok(target) => self.orchestrator.capture_visible(&target).await.into(),
                Err(e) => Response::failure(&e),
            },
            Request::CaptureAreaScreenshot { area, tab_id } => match self.resolve(tab_id) {
                Ok(target) => self.orchestrator.capture_area(&target, &area).await.into(),
                Err(e) => Response::failure(&e),
            },
            Request::StartAreaSelection { tab_id } => {
                Response::from_result(self.start_selection(&tab_id).await, |_, ()| {})
            }
            Request::DownloadScreenshot { data_url, filename } => {
                let options = PersistOptions {
                    prompt_user: self.orchestrator.config().prompt_user,
                };
                let stored = self.orchestrator.store().persist(&data_url, &filename, options).await;
                Response::from_result(stored, |r, id| r.download_id = Some(id))
            }
            Request::SetAllCheckboxes { tab_id, checked } => {
                let changed = self.orchestrator.set_all_checkboxes(&tab_id, checked).await;
                Response::from_result(changed, |r, n| r.count = Some(n))
            }
        }
    }

    /// Parse one JSON request, handle it, and serialize the response.
    pub async fn handle_json(&self, line: &str) -> String {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!("rejecting malformed request: {}", e);
                Response::failure(&Error::Other(format!("malformed request: {}", e)))
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(r#"{{"success":false,"error":"serialization failed: {}"}}"#, e)
        })
    }

    async fn start_selection(&self, target: &TargetId) -> Result<()> {
        let overlay = self
            .overlay
            .as_ref()
            .ok_or_else(|| Error::Config("no selection overlay configured".into()))?;
        let session = self.selections.begin(target)?;
        self.set_active_target(Some(target.clone()));
        overlay.launch(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_parse_from_wire_form() {
        let r: Request = serde_json::from_str(r#"{"action":"takeScreenshot","tabId":12}"#).unwrap();
        assert_eq!(r, Request::TakeScreenshot { tab_id: TargetId::from("12") });

        let r: Request = serde_json::from_str(r#"{"action":"takeVisibleScreenshot"}"#).unwrap();
        assert_eq!(r, Request::TakeVisibleScreenshot { tab_id: None });

        let r: Request = serde_json::from_str(
            r#"{"action":"captureAreaScreenshot","area":{"x":1,"y":2,"width":30,"height":40}}"#,
        )
        .unwrap();
        assert_eq!(
            r,
            Request::CaptureAreaScreenshot {
                area: SelectionArea::new(1.0, 2.0, 30.0, 40.0),
                tab_id: None
            }
        );

        let r: Request = serde_json::from_str(
            r#"{"action":"downloadScreenshot","dataUrl":"data:image/png;base64,AA==","filename":"a.png"}"#,
        )
        .unwrap();
        assert!(matches!(r, Request::DownloadScreenshot { .. }));
    }

    #[test]
    fn unknown_actions_are_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"action":"reboot"}"#).is_err());
    }

    #[test]
    fn responses_omit_empty_fields() {
        let ok: Response = CaptureResult::succeeded(ArtifactId(4)).into();
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"success": true, "downloadId": 4})
        );

        let failed = Response::failure(&Error::EmptyCapture);
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({
                "success": false,
                "error": "Capture produced no tiles",
                "errorKind": "empty_capture"
            })
        );
    }
}
