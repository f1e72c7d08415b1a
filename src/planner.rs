//! Decides between a one-shot capture and a sequence of horizontal strips

/// A horizontal strip of the page, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRegion {
    pub origin_y: u32,
    pub height: u32,
}

impl TileRegion {
    pub fn end(&self) -> u32 {
        self.origin_y + self.height
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturePlan {
    /// The whole page fits in one emulated-viewport shot
    OneShot { width: u32, height: u32 },
    /// Contiguous strips covering `[0, page_height)` in order
    Tiled { regions: Vec<TileRegion> },
}

/// Plan a capture for a page of `page_width` x `page_height` CSS pixels.
///
/// Strips are taken from the top in steps of `tile_height`; the last one may
/// be shorter. A zero `tile_height` is treated as 1 so planning always ends.
pub fn plan(page_width: u32, page_height: u32, max_single_shot_height: u32, tile_height: u32) -> CapturePlan {
    if page_height <= max_single_shot_height {
        return CapturePlan::OneShot {
            width: page_width,
            height: page_height,
        };
    }

    let step = tile_height.max(1);
    let mut regions = Vec::with_capacity(page_height.div_ceil(step) as usize);
    let mut y = 0u32;
    while y < page_height {
        let height = step.min(page_height - y);
        regions.push(TileRegion { origin_y: y, height });
        y += height;
    }

    CapturePlan::Tiled { regions }
}
