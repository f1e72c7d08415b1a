//! In-memory inspector backend
//!
//! [`ScriptedInspector`] serves one synthetic page made of solid colour
//! bands and rectangles. It renders captures at the page's device pixel
//! ratio, honours viewport overrides, and records every attach, detach and
//! command so callers can assert on the conversation. Failures (busy target,
//! failing commands, failing detach, a page that shrinks mid-capture) can be
//! scripted up front.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use base64::Engine as Base64Engine;
use image::{Rgba, RgbaImage};
use serde_json::{json, Value};

use crate::compositor::encode_png;
use crate::inspector::{Clip, Command, Inspector, InspectorChannel};
use crate::{Error, Result, TargetId};

const BACKGROUND: [u8; 4] = [255, 255, 255, 255];

#[derive(Debug, Clone)]
struct Rect {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    rgba: [u8; 4],
}

/// Description of a synthetic page
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    target: TargetId,
    width: u32,
    height: u32,
    viewport: (u32, u32),
    dpr: f64,
    reported_dpr: Option<f64>,
    bands: Vec<(u32, [u8; 4])>,
    rects: Vec<Rect>,
    shrink: Option<(usize, u32)>,
    failing: HashSet<&'static str>,
    fail_detach: bool,
    held_elsewhere: bool,
    padding_inclusive_only: bool,
    eval_responses: Vec<(String, Value)>,
}

impl ScriptedPage {
    /// A white page of `width` x `height` CSS pixels at dpr 1, seen through
    /// a viewport `width` wide and at most 720 tall.
    pub fn new(target: impl Into<TargetId>, width: u32, height: u32) -> Self {
        Self {
            target: target.into(),
            width,
            height,
            viewport: (width, height.min(720)),
            dpr: 1.0,
            reported_dpr: None,
            bands: Vec::new(),
            rects: Vec::new(),
            shrink: None,
            failing: HashSet::new(),
            fail_detach: false,
            held_elsewhere: false,
            padding_inclusive_only: false,
            eval_responses: Vec::new(),
        }
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width, height);
        self
    }

    pub fn with_dpr(mut self, dpr: f64) -> Self {
        self.dpr = dpr;
        self
    }

    /// Paint everything from `from_y` downwards (until the next band).
    pub fn with_band(mut self, from_y: u32, rgba: [u8; 4]) -> Self {
        self.bands.push((from_y, rgba));
        self.bands.sort_by_key(|(y, _)| *y);
        self
    }

    /// Paint a rectangle on top of the bands.
    pub fn with_rect(mut self, x: f64, y: f64, width: f64, height: f64, rgba: [u8; 4]) -> Self {
        self.rects.push(Rect {
            x0: x,
            y0: y,
            x1: x + width,
            y1: y + height,
            rgba,
        });
        self
    }

    /// Report this ratio to in-page reads while rendering at the real one.
    pub fn reporting_dpr(mut self, dpr: f64) -> Self {
        self.reported_dpr = Some(dpr);
        self
    }

    /// After `captures` screenshots the page content is `new_height` tall.
    pub fn shrinking_after(mut self, captures: usize, new_height: u32) -> Self {
        self.shrink = Some((captures, new_height));
        self
    }

    /// Every `command` (by protocol name) fails.
    pub fn failing(mut self, command: &'static str) -> Self {
        self.failing.insert(command);
        self
    }

    pub fn failing_detach(mut self) -> Self {
        self.fail_detach = true;
        self
    }

    /// Another controller already holds the page.
    pub fn held_elsewhere(mut self) -> Self {
        self.held_elsewhere = true;
        self
    }

    /// Layout metrics only carry the padding-inclusive size.
    pub fn padding_inclusive_only(mut self) -> Self {
        self.padding_inclusive_only = true;
        self
    }

    /// Answer expressions containing `pattern` with `value`.
    pub fn respond_to(mut self, pattern: impl Into<String>, value: Value) -> Self {
        self.eval_responses.push((pattern.into(), value));
        self
    }

    fn color_at(&self, x: f64, y: f64) -> [u8; 4] {
        if let Some(r) = self
            .rects
            .iter()
            .rev()
            .find(|r| x >= r.x0 && x < r.x1 && y >= r.y0 && y < r.y1)
        {
            return r.rgba;
        }
        self.bands
            .iter()
            .rev()
            .find(|(from, _)| y >= *from as f64)
            .map(|(_, rgba)| *rgba)
            .unwrap_or(BACKGROUND)
    }
}

/// Counters of everything the inspector was asked to do
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptedStats {
    pub attaches: usize,
    pub detaches: usize,
    pub captures: usize,
    pub commands: Vec<&'static str>,
}

impl ScriptedStats {
    pub fn count(&self, command: &str) -> usize {
        self.commands.iter().filter(|c| **c == command).count()
    }
}

struct State {
    page: ScriptedPage,
    viewport_override: Option<(u32, u32, f64)>,
    stats: ScriptedStats,
}

impl State {
    fn current_height(&self) -> u32 {
        match self.page.shrink {
            Some((after, height)) if self.stats.captures > after => height,
            _ => self.page.height,
        }
    }

    fn layout_metrics(&self) -> Value {
        let size = json!({
            "x": 0,
            "y": 0,
            "width": self.page.width,
            "height": self.current_height(),
        });
        if self.page.padding_inclusive_only {
            json!({ "contentSize": size })
        } else {
            json!({ "cssContentSize": size, "contentSize": size })
        }
    }

    fn effective_viewport(&self) -> (u32, u32, f64) {
        self.viewport_override
            .unwrap_or((self.page.viewport.0, self.page.viewport.1, self.page.dpr))
    }

    fn render(&self, clip: Option<Clip>) -> Result<Vec<u8>> {
        let (vw, vh, dpr) = self.effective_viewport();
        let (x, y, width, height, scale) = match clip {
            None => (0.0, 0.0, vw as f64, vh as f64, 1.0),
            Some(c) => {
                let available = (self.current_height() as f64 - c.y).max(0.0);
                (c.x, c.y, c.width, c.height.min(available), c.scale)
            }
        };
        let factor = dpr * scale;
        let out_w = (width * factor).round() as u32;
        let out_h = (height * factor).round() as u32;
        let img = RgbaImage::from_fn(out_w, out_h, |px, py| {
            let lx = x + (px as f64 + 0.5) / factor;
            let ly = y + (py as f64 + 0.5) / factor;
            Rgba(self.page.color_at(lx, ly))
        });
        encode_png(&img)
    }

    fn evaluate(&self, expression: &str) -> Value {
        if let Some((_, value)) = self
            .page
            .eval_responses
            .iter()
            .find(|(pattern, _)| expression.contains(pattern.as_str()))
        {
            return json!({ "result": { "value": value } });
        }
        if expression.contains("devicePixelRatio") {
            let dpr = self.page.reported_dpr.unwrap_or(self.effective_viewport().2);
            return json!({ "result": { "value": dpr } });
        }
        json!({
            "exceptionDetails": { "text": format!("ReferenceError: cannot evaluate {}", expression) }
        })
    }
}

/// Inspector serving a single [`ScriptedPage`]; clones share state
#[derive(Clone)]
pub struct ScriptedInspector {
    state: Arc<Mutex<State>>,
}

impl ScriptedInspector {
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                page,
                viewport_override: None,
                stats: ScriptedStats::default(),
            })),
        }
    }

    pub fn stats(&self) -> ScriptedStats {
        lock(&self.state).stats.clone()
    }

    /// Whether a viewport override is currently applied to the page.
    pub fn viewport_overridden(&self) -> bool {
        lock(&self.state).viewport_override.is_some()
    }
}

#[async_trait]
impl Inspector for ScriptedInspector {
    async fn attach(&self, target: &TargetId) -> Result<Box<dyn InspectorChannel>> {
        let mut state = lock(&self.state);
        if &state.page.target != target {
            return Err(Error::Attach(format!("no such target: {}", target)));
        }
        if state.page.held_elsewhere {
            return Err(Error::ChannelBusy(target.to_string()));
        }
        state.stats.attaches += 1;
        Ok(Box::new(ScriptedChannel {
            state: Arc::clone(&self.state),
            attached: true,
        }))
    }
}

struct ScriptedChannel {
    state: Arc<Mutex<State>>,
    attached: bool,
}

#[async_trait]
impl InspectorChannel for ScriptedChannel {
    async fn send(&mut self, command: Command) -> Result<Value> {
        let name = command.name();
        if !self.attached {
            return Err(Error::protocol(name, "channel is detached"));
        }

        let mut state = lock(&self.state);
        state.stats.commands.push(name);
        if state.page.failing.contains(name) {
            return Err(Error::protocol(name, "scripted failure"));
        }

        match command {
            Command::EnablePage => Ok(json!({})),
            Command::GetLayoutMetrics => Ok(state.layout_metrics()),
            Command::CaptureScreenshot { clip, .. } => {
                let png = state.render(clip)?;
                state.stats.captures += 1;
                Ok(json!({ "data": base64::engine::general_purpose::STANDARD.encode(png) }))
            }
            Command::SetDeviceMetricsOverride {
                width,
                height,
                device_scale_factor,
            } => {
                state.viewport_override = Some((width, height, device_scale_factor));
                Ok(json!({}))
            }
            Command::ClearDeviceMetricsOverride => {
                state.viewport_override = None;
                Ok(json!({}))
            }
            Command::Evaluate { expression } => Ok(state.evaluate(&expression)),
        }
    }

    async fn detach(&mut self) -> Result<()> {
        if !self.attached {
            return Ok(());
        }
        self.attached = false;
        let mut state = lock(&self.state);
        state.stats.detaches += 1;
        if state.page.fail_detach {
            return Err(Error::protocol("Target.detachFromTarget", "scripted failure"));
        }
        Ok(())
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attach_to_unknown_target_fails() {
        let inspector = ScriptedInspector::new(ScriptedPage::new("tab-1", 10, 10));
        let err = inspector.attach(&TargetId::from("tab-2")).await.err();
        assert!(matches!(err, Some(Error::Attach(_))));
        assert_eq!(inspector.stats().attaches, 0);
    }

    #[tokio::test]
    async fn detach_is_idempotent() {
        let inspector = ScriptedInspector::new(ScriptedPage::new("tab-1", 10, 10));
        let mut channel = inspector.attach(&TargetId::from("tab-1")).await.unwrap();
        channel.detach().await.unwrap();
        channel.detach().await.unwrap();
        assert_eq!(inspector.stats().detaches, 1);
        assert!(channel.send(Command::EnablePage).await.is_err());
    }

    #[tokio::test]
    async fn clipped_capture_renders_at_device_scale() {
        let page = ScriptedPage::new("t", 4, 100)
            .with_dpr(2.0)
            .with_band(50, [255, 0, 0, 255]);
        let inspector = ScriptedInspector::new(page);
        let mut channel = inspector.attach(&TargetId::from("t")).await.unwrap();
        let reply = channel
            .send(Command::CaptureScreenshot {
                clip: Some(Clip { x: 0.0, y: 40.0, width: 4.0, height: 20.0, scale: 1.0 }),
                capture_beyond_viewport: true,
            })
            .await
            .unwrap();
        let data = reply["data"].as_str().unwrap();
        let png = base64::engine::general_purpose::STANDARD.decode(data).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (8, 40));
        assert_eq!(img.get_pixel(0, 0), &Rgba(BACKGROUND));
        assert_eq!(img.get_pixel(0, 39), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn rects_paint_over_bands() {
        let page = ScriptedPage::new("t", 100, 100)
            .with_band(0, [0, 0, 255, 255])
            .with_rect(10.0, 10.0, 5.0, 5.0, [0, 255, 0, 255]);
        assert_eq!(page.color_at(12.0, 12.0), [0, 255, 0, 255]);
        assert_eq!(page.color_at(20.0, 12.0), [0, 0, 255, 255]);
    }
}
