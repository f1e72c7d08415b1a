//! Stitches captured strips into one image
//!
//! The output canvas is sized in device pixels (`page × dpr`). Tiles are
//! placed 1:1 at a running offset kept in CSS pixels, so each tile advances
//! the offset by its own pixel height divided by `dpr`. If the tiles come up
//! short of the planned height (the page shrank mid-capture) the canvas is
//! cropped to what was actually drawn.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};
use log::debug;

use crate::planner::TileRegion;
use crate::{Error, Result};

/// Largest surface, in pixels, the compositor or the area extractor will
/// allocate (2 GiB of RGBA).
pub const MAX_CANVAS_PIXELS: u64 = 1 << 29;

/// One decoded strip together with the region it was requested for
#[derive(Debug, Clone)]
pub struct CapturedTile {
    pub region: TileRegion,
    pub image: RgbaImage,
}

impl CapturedTile {
    /// Decode an encoded raster (PNG from the capture backend) into a tile.
    pub fn decode(region: TileRegion, bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self { region, image })
    }
}

/// Composite `tiles` in order onto a canvas of `page_width` x `page_height`
/// CSS pixels at device pixel ratio `dpr`.
pub fn composite(tiles: &[CapturedTile], page_width: u32, page_height: u32, dpr: f64) -> Result<RgbaImage> {
    if tiles.is_empty() {
        return Err(Error::EmptyCapture);
    }
    if !dpr.is_finite() || dpr <= 0.0 {
        return Err(Error::Config(format!("device pixel ratio must be positive, got {}", dpr)));
    }

    let (canvas_width, canvas_height) = canvas_size(page_width as f64 * dpr, page_height as f64 * dpr)
        .ok_or_else(|| {
            Error::Image(format!(
                "{}x{} page at dpr {} exceeds {} pixels",
                page_width, page_height, dpr, MAX_CANVAS_PIXELS
            ))
        })?;
    check_scale(tiles, canvas_width)?;

    let mut canvas = RgbaImage::new(canvas_width, canvas_height);
    let mut offset = 0.0f64;
    for tile in tiles {
        if tile.image.height() == 0 {
            debug!("skipping empty tile at y={}", tile.region.origin_y);
            continue;
        }
        let y = (offset * dpr).round() as i64;
        image::imageops::replace(&mut canvas, &tile.image, 0, y);
        offset += tile.image.height() as f64 / dpr;
    }

    let drawn_height = to_device(offset, dpr).min(canvas_height);
    if drawn_height < canvas_height {
        debug!(
            "trimming canvas from {}px to drawn height {}px",
            canvas_height, drawn_height
        );
        canvas = image::imageops::crop_imm(&canvas, 0, 0, canvas_width, drawn_height).to_image();
    }

    Ok(canvas)
}

/// Encode a surface as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

fn to_device(logical: f64, dpr: f64) -> u32 {
    (logical * dpr).round() as u32
}

/// Round a surface size to whole pixels, or `None` if it is not finite or
/// would exceed [`MAX_CANVAS_PIXELS`].
pub(crate) fn canvas_size(width: f64, height: f64) -> Option<(u32, u32)> {
    if !width.is_finite() || !height.is_finite() || width < 0.0 || height < 0.0 {
        return None;
    }
    let (w, h) = (width.round(), height.round());
    if w > u32::MAX as f64 || h > u32::MAX as f64 {
        return None;
    }
    let (w, h) = (w as u32, h as u32);
    if w as u64 * h as u64 > MAX_CANVAS_PIXELS {
        return None;
    }
    Some((w, h))
}

// All drawable tiles must share one width, and it has to match the canvas
// within a pixel of rounding.
fn check_scale(tiles: &[CapturedTile], canvas_width: u32) -> Result<()> {
    let mut widths = tiles
        .iter()
        .filter(|t| t.image.height() > 0)
        .map(|t| t.image.width());

    let Some(first) = widths.next() else {
        return Ok(());
    };
    if first.abs_diff(canvas_width) > 1 {
        return Err(Error::InconsistentScale {
            expected: canvas_width,
            found: first,
        });
    }
    match widths.find(|w| *w != first) {
        Some(found) => Err(Error::InconsistentScale { expected: first, found }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, rgba: [u8; 4], origin_y: u32, logical_height: u32) -> CapturedTile {
        CapturedTile {
            region: TileRegion { origin_y, height: logical_height },
            image: RgbaImage::from_pixel(width, height, Rgba(rgba)),
        }
    }

    #[test]
    fn empty_capture_is_an_error() {
        assert!(matches!(composite(&[], 10, 10, 1.0), Err(Error::EmptyCapture)));
    }

    #[test]
    fn zero_height_tile_does_not_advance_offset() {
        let tiles = vec![
            solid(4, 5, [255, 0, 0, 255], 0, 5),
            solid(4, 0, [0, 0, 0, 255], 5, 5),
            solid(4, 5, [0, 0, 255, 255], 5, 5),
        ];
        let out = composite(&tiles, 4, 10, 1.0).unwrap();
        assert_eq!(out.dimensions(), (4, 10));
        assert_eq!(out.get_pixel(0, 5), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn mixed_tile_widths_are_rejected() {
        let tiles = vec![solid(8, 4, [1, 1, 1, 255], 0, 2), solid(4, 2, [1, 1, 1, 255], 2, 2)];
        assert!(matches!(
            composite(&tiles, 4, 4, 2.0),
            Err(Error::InconsistentScale { expected: 8, found: 4 })
        ));
    }

    #[test]
    fn tile_width_must_match_device_scale() {
        let tiles = vec![solid(4, 4, [1, 1, 1, 255], 0, 4)];
        assert!(matches!(
            composite(&tiles, 4, 4, 2.0),
            Err(Error::InconsistentScale { expected: 8, found: 4 })
        ));
    }

    #[test]
    fn bands_land_at_scaled_offsets() {
        let tiles = vec![
            solid(6, 8, [255, 0, 0, 255], 0, 4),
            solid(6, 8, [0, 255, 0, 255], 4, 4),
            solid(6, 4, [0, 0, 255, 255], 8, 2),
        ];
        let out = composite(&tiles, 3, 10, 2.0).unwrap();
        assert_eq!(out.dimensions(), (6, 20));
        assert_eq!(out.get_pixel(0, 7), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(5, 8), &Rgba([0, 255, 0, 255]));
        assert_eq!(out.get_pixel(3, 19), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn png_encoding_round_trips_dimensions() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([9, 9, 9, 255]));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[0..8], b"\x89PNG\r\n\x1a\n");
        let tile = CapturedTile::decode(TileRegion { origin_y: 0, height: 2 }, &png).unwrap();
        assert_eq!(tile.image.dimensions(), (3, 2));
    }

    #[test]
    fn oversized_page_is_an_error_not_a_panic() {
        let tiles = vec![solid(4, 4, [1, 1, 1, 255], 0, 4)];
        assert!(matches!(composite(&tiles, u32::MAX, u32::MAX, 1.0), Err(Error::Image(_))));
        assert!(matches!(composite(&tiles, 100_000, 100_000, 1.0), Err(Error::Image(_))));
    }

    #[test]
    fn canvas_size_rejects_unrepresentable_surfaces() {
        assert_eq!(canvas_size(10.4, 19.6), Some((10, 20)));
        assert_eq!(canvas_size(1e12, 1.0), None);
        assert_eq!(canvas_size(f64::INFINITY, 1.0), None);
        assert_eq!(canvas_size(65_536.0, 65_536.0), None);
    }
}
