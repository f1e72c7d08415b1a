//! Remote page inspection channel
//!
//! An [`Inspector`] opens an exclusive control channel to one page target.
//! The channel carries [`Command`]s and answers each with a JSON reply shaped
//! like the DevTools protocol's:
//!
//! | Command                    | Reply                                           |
//! |----------------------------|-------------------------------------------------|
//! | `GetLayoutMetrics`         | `{"cssContentSize": {w,h}, "contentSize": {w,h}}` |
//! | `CaptureScreenshot`        | `{"data": "<base64 png>"}`                       |
//! | `Evaluate`                 | `{"result": {"value": ...}}`                     |
//! | everything else            | `{}`                                            |
//!
//! [`InspectorSession`] wraps an attached channel with typed helpers and the
//! lease that makes it exclusive.

use async_trait::async_trait;
use base64::Engine as Base64Engine;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::lease::Lease;
use crate::{Error, PageMetrics, Result, TargetId};

/// Rectangle (CSS px) to capture, possibly outside the scrolled viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clip {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

/// Control commands understood by every backend
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    EnablePage,
    GetLayoutMetrics,
    CaptureScreenshot {
        clip: Option<Clip>,
        capture_beyond_viewport: bool,
    },
    SetDeviceMetricsOverride {
        width: u32,
        height: u32,
        device_scale_factor: f64,
    },
    ClearDeviceMetricsOverride,
    /// Read-only expression evaluated in the page context
    Evaluate { expression: String },
}

impl Command {
    /// Protocol method name, used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Command::EnablePage => "Page.enable",
            Command::GetLayoutMetrics => "Page.getLayoutMetrics",
            Command::CaptureScreenshot { .. } => "Page.captureScreenshot",
            Command::SetDeviceMetricsOverride { .. } => "Emulation.setDeviceMetricsOverride",
            Command::ClearDeviceMetricsOverride => "Emulation.clearDeviceMetricsOverride",
            Command::Evaluate { .. } => "Runtime.evaluate",
        }
    }
}

/// Opens control channels to page targets
#[async_trait]
pub trait Inspector: Send + Sync {
    /// Attach to `target`.
    ///
    /// Fails with `Error::ChannelBusy` when another controller holds the
    /// target and `Error::Attach` when the target is gone or access is denied.
    async fn attach(&self, target: &TargetId) -> Result<Box<dyn InspectorChannel>>;
}

/// An attached control channel
#[async_trait]
pub trait InspectorChannel: Send {
    /// Issue one command and wait for its reply. Failures surface as
    /// `Error::Protocol`.
    async fn send(&mut self, command: Command) -> Result<Value>;

    /// Release the channel. Calling this when already detached is a no-op.
    async fn detach(&mut self) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct Size {
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutMetricsReply {
    css_content_size: Option<Size>,
    content_size: Option<Size>,
}

#[derive(Debug, Deserialize)]
struct ScreenshotReply {
    data: String,
}

/// An attached channel plus the lease that makes it exclusive
pub struct InspectorSession {
    target: TargetId,
    channel: Box<dyn InspectorChannel>,
    _lease: Lease,
}

impl InspectorSession {
    pub(crate) fn new(target: TargetId, channel: Box<dyn InspectorChannel>, lease: Lease) -> Self {
        Self {
            target,
            channel,
            _lease: lease,
        }
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub async fn send(&mut self, command: Command) -> Result<Value> {
        debug!("[{}] -> {}", self.target, command.name());
        self.channel.send(command).await
    }

    pub async fn enable_page(&mut self) -> Result<()> {
        self.send(Command::EnablePage).await.map(|_| ())
    }

    /// Full scrollable content size, preferring the padding-exclusive CSS
    /// size over the padding-inclusive one.
    pub async fn layout_metrics(&mut self) -> Result<PageMetrics> {
        let command = Command::GetLayoutMetrics;
        let name = command.name();
        let reply: LayoutMetricsReply = parse(name, self.send(command).await?)?;
        let size = reply
            .css_content_size
            .or(reply.content_size)
            .ok_or_else(|| Error::protocol(name, "reply carries no content size"))?;

        Ok(PageMetrics {
            width: css_to_px(size.width),
            height: css_to_px(size.height),
        })
    }

    /// Capture the viewport (`clip == None`) or an explicit rectangle beyond
    /// it; returns the encoded PNG.
    pub async fn capture(&mut self, clip: Option<Clip>) -> Result<Vec<u8>> {
        let command = Command::CaptureScreenshot {
            clip,
            capture_beyond_viewport: clip.is_some(),
        };
        let name = command.name();
        let reply: ScreenshotReply = parse(name, self.send(command).await?)?;
        base64::engine::general_purpose::STANDARD
            .decode(reply.data.as_bytes())
            .map_err(|e| Error::protocol(name, format!("base64 decode failed: {}", e)))
    }

    pub async fn override_viewport(&mut self, width: u32, height: u32, device_scale_factor: f64) -> Result<()> {
        self.send(Command::SetDeviceMetricsOverride {
            width,
            height,
            device_scale_factor,
        })
        .await
        .map(|_| ())
    }

    pub async fn clear_viewport_override(&mut self) -> Result<()> {
        self.send(Command::ClearDeviceMetricsOverride).await.map(|_| ())
    }

    /// Evaluate `expression` in the page and return its value by value.
    pub async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let command = Command::Evaluate {
            expression: expression.to_string(),
        };
        let name = command.name();
        let reply = self.send(command).await?;
        if let Some(exc) = reply.get("exceptionDetails") {
            return Err(Error::protocol(name, format!("expression threw: {}", exc)));
        }
        Ok(reply
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// The page's effective device pixel ratio.
    pub async fn device_pixel_ratio(&mut self) -> Result<f64> {
        let value = self.evaluate("window.devicePixelRatio").await?;
        match value.as_f64() {
            Some(dpr) if dpr.is_finite() && dpr > 0.0 => Ok(dpr),
            _ => Err(Error::protocol(
                "Runtime.evaluate",
                format!("unusable devicePixelRatio: {}", value),
            )),
        }
    }

    /// Release the channel, then the lease.
    pub async fn detach(mut self) -> Result<()> {
        debug!("[{}] detaching", self.target);
        self.channel.detach().await
    }
}

fn parse<T: for<'de> Deserialize<'de>>(command: &str, reply: Value) -> Result<T> {
    serde_json::from_value(reply).map_err(|e| Error::protocol(command, format!("malformed reply: {}", e)))
}

fn css_to_px(v: f64) -> u32 {
    if v.is_finite() && v > 0.0 {
        v.ceil() as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_follow_protocol_domains() {
        assert_eq!(Command::EnablePage.name(), "Page.enable");
        assert_eq!(
            Command::Evaluate { expression: "1".into() }.name(),
            "Runtime.evaluate"
        );
    }

    #[test]
    fn layout_reply_falls_back_to_padding_inclusive_size() {
        let reply: LayoutMetricsReply =
            serde_json::from_value(serde_json::json!({"contentSize": {"width": 10.5, "height": 20.0}})).unwrap();
        assert!(reply.css_content_size.is_none());
        let size = reply.content_size.unwrap();
        assert_eq!(css_to_px(size.width), 11);
        assert_eq!(css_to_px(size.height), 20);
    }

    #[test]
    fn negative_sizes_clamp_to_zero() {
        assert_eq!(css_to_px(-3.0), 0);
        assert_eq!(css_to_px(f64::NAN), 0);
    }
}
