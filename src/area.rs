//! Cropping a selected rectangle out of a viewport capture
//!
//! The selection is given in CSS pixels; the capture is in device pixels.
//! The output is always sized in CSS pixels, so on high-density screens the
//! cropped region is scaled down by the device pixel ratio.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::debug;

use crate::compositor::{canvas_size, encode_png, MAX_CANVAS_PIXELS};
use crate::inspector::InspectorSession;
use crate::{Error, Result, SelectionArea};

/// Crop `selection` out of a viewport image captured at `dpr`.
///
/// Parts of the selection outside the captured image stay transparent.
pub fn extract_area(viewport: &RgbaImage, selection: &SelectionArea, dpr: f64) -> Result<RgbaImage> {
    selection.validate()?;
    if !dpr.is_finite() || dpr <= 0.0 {
        return Err(Error::Config(format!("device pixel ratio must be positive, got {}", dpr)));
    }

    let (out_w, out_h) = canvas_size(selection.width, selection.height).ok_or_else(|| {
        Error::InvalidSelection(format!(
            "{}x{} exceeds the {} pixel image limit",
            selection.width, selection.height, MAX_CANVAS_PIXELS
        ))
    })?;
    let (out_w, out_h) = (out_w.max(1), out_h.max(1));
    let mut out = RgbaImage::new(out_w, out_h);

    // Selection in device pixels, intersected with the capture
    let sx0 = selection.x * dpr;
    let sy0 = selection.y * dpr;
    let x0 = sx0.max(0.0).floor();
    let y0 = sy0.max(0.0).floor();
    let x1 = ((selection.x + selection.width) * dpr).min(viewport.width() as f64).ceil();
    let y1 = ((selection.y + selection.height) * dpr).min(viewport.height() as f64).ceil();
    if x1 <= x0 || y1 <= y0 {
        debug!("selection lies outside the captured viewport");
        return Ok(out);
    }

    let (cx, cy) = (x0 as u32, y0 as u32);
    let (cw, ch) = ((x1 - x0) as u32, (y1 - y0) as u32);
    let source = imageops::crop_imm(viewport, cx, cy, cw, ch).to_image();

    // Where the visible part lands in the CSS-pixel output
    let dx = ((x0 - sx0) / dpr).round() as i64;
    let dy = ((y0 - sy0) / dpr).round() as i64;
    let dw = ((cw as f64 / dpr).round().min(out_w as f64) as u32).max(1);
    let dh = ((ch as f64 / dpr).round().min(out_h as f64) as u32).max(1);

    let scaled = if (dw, dh) == source.dimensions() {
        source
    } else {
        imageops::resize(&source, dw, dh, FilterType::Triangle)
    };
    imageops::replace(&mut out, &scaled, dx, dy);
    Ok(out)
}

/// Capture the visible viewport, read the page's dpr and crop `selection`;
/// returns the encoded PNG.
pub(crate) async fn capture_area_png(session: &mut InspectorSession, selection: &SelectionArea) -> Result<Vec<u8>> {
    let shot = session.capture(None).await?;
    let viewport = image::load_from_memory(&shot)?.to_rgba8();
    let dpr = session.device_pixel_ratio().await?;
    debug!(
        "[{}] cropping {}x{}@({}, {}) from {}x{} viewport at dpr {}",
        session.target(),
        selection.width,
        selection.height,
        selection.x,
        selection.y,
        viewport.width(),
        viewport.height(),
        dpr
    );
    let cropped = extract_area(&viewport, selection, dpr)?;
    encode_png(&cropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    // Left half red, right half blue, in CSS pixels, rendered at `dpr`.
    fn halves(css_w: u32, css_h: u32, dpr: u32) -> RgbaImage {
        RgbaImage::from_fn(css_w * dpr, css_h * dpr, |x, _| if x < css_w * dpr / 2 { RED } else { BLUE })
    }

    #[test]
    fn output_is_in_css_pixels_at_any_dpr() {
        let selection = SelectionArea::new(0.0, 0.0, 100.0, 50.0);
        for dpr in [1u32, 2] {
            let out = extract_area(&halves(400, 200, dpr), &selection, dpr as f64).unwrap();
            assert_eq!(out.dimensions(), (100, 50));
            assert_eq!(out.get_pixel(50, 25), &RED);
        }
    }

    #[test]
    fn offset_selection_picks_the_right_pixels() {
        let selection = SelectionArea::new(250.0, 10.0, 40.0, 40.0);
        let out = extract_area(&halves(400, 200, 2), &selection, 2.0).unwrap();
        assert_eq!(out.dimensions(), (40, 40));
        assert_eq!(out.get_pixel(0, 0), &BLUE);
        assert_eq!(out.get_pixel(39, 39), &BLUE);
    }

    #[test]
    fn empty_selection_is_invalid() {
        let selection = SelectionArea::new(0.0, 0.0, 10.0, -1.0);
        assert!(matches!(
            extract_area(&halves(10, 10, 1), &selection, 1.0),
            Err(Error::InvalidSelection(_))
        ));
    }

    #[test]
    fn selection_past_the_edge_is_transparent_there() {
        let selection = SelectionArea::new(380.0, 0.0, 40.0, 10.0);
        let out = extract_area(&halves(400, 200, 1), &selection, 1.0).unwrap();
        assert_eq!(out.dimensions(), (40, 10));
        assert_eq!(out.get_pixel(0, 0), &BLUE);
        assert_eq!(out.get_pixel(39, 0)[3], 0);
    }

    #[test]
    fn huge_selection_is_rejected() {
        let selection = SelectionArea::new(0.0, 0.0, 1e12, 1e12);
        assert!(matches!(
            extract_area(&RgbaImage::new(10, 10), &selection, 1.0),
            Err(Error::InvalidSelection(_))
        ));
    }

    #[test]
    fn tiny_dpr_does_not_blow_up_the_visible_part() {
        let selection = SelectionArea::new(0.0, 0.0, 20.0, 10.0);
        let out = extract_area(&halves(400, 200, 1), &selection, 1e-9).unwrap();
        assert_eq!(out.dimensions(), (20, 10));
    }
}
