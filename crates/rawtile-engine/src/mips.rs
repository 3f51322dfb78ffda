//! Cached 2x2-average mip pyramid of the RAW frame.

use std::sync::Arc;

use rayon::prelude::*;

use rawtile_core::RawImage;

/// Mip pyramid keyed by the base image's dimensions.
///
/// Level 0 is a copy of the original; level k+1 halves level k with an
/// unweighted integer average, floor-dimensioned, never below 1x1. The
/// pyramid rebuilds whenever the base dimensions change and is cleared when
/// no LOD above 0 is needed, so stale levels never outlive the frame that
/// produced them.
#[derive(Debug, Default)]
pub struct MipPyramid {
    base_width: u32,
    base_height: u32,
    levels: Vec<Arc<RawImage>>,
}

impl MipPyramid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure the pyramid covers `lod` for `base`.
    ///
    /// `lod <= 0` clears the pyramid. Otherwise levels are appended until
    /// the pyramid has `lod + 1` entries or the last level has saturated at
    /// one pixel in either dimension.
    pub fn ensure(&mut self, base: &RawImage, lod: i32) {
        if lod <= 0 {
            self.clear();
            return;
        }
        if self.levels.is_empty()
            || self.base_width != base.width
            || self.base_height != base.height
        {
            self.levels.clear();
            self.base_width = base.width;
            self.base_height = base.height;
            self.levels.push(Arc::new(base.clone()));
        }
        while self.levels.len() <= lod as usize {
            let last = &self.levels[self.levels.len() - 1];
            if last.width <= 1 || last.height <= 1 {
                break;
            }
            let next = downsample_2x(last);
            self.levels.push(Arc::new(next));
        }
    }

    /// The level for `lod`, if built.
    pub fn level(&self, lod: i32) -> Option<Arc<RawImage>> {
        if lod < 0 {
            return None;
        }
        self.levels.get(lod as usize).cloned()
    }

    /// Number of built levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Drops every level.
    pub fn clear(&mut self) {
        self.levels.clear();
        self.base_width = 0;
        self.base_height = 0;
    }
}

/// Halves an image with an unweighted integer average.
///
/// Output dimensions are `max(1, w / 2) x max(1, h / 2)`. Each output
/// pixel averages the source pixels of its 2x2 block that fall inside the
/// image, which handles odd dimensions. Deterministic and independent of
/// traversal order.
pub fn downsample_2x(src: &RawImage) -> RawImage {
    let dw = (src.width / 2).max(1);
    let dh = (src.height / 2).max(1);
    let sw = src.width as usize;
    let sh = src.height as usize;

    let mut out = RawImage::new(dw, dh);
    out.data
        .par_chunks_mut(dw as usize)
        .enumerate()
        .for_each(|(oy, row)| {
            let sy = oy * 2;
            for (ox, px) in row.iter_mut().enumerate() {
                let sx = ox * 2;
                let mut sum = 0u32;
                let mut count = 0u32;
                for y in sy..(sy + 2).min(sh) {
                    for x in sx..(sx + 2).min(sw) {
                        sum += src.data[y * sw + x] as u32;
                        count += 1;
                    }
                }
                *px = (sum / count) as u16;
            }
        });
    out
}
