//! Heat-map frames for displaying the array under sort
//!
//! A [`Frame`] is everything a renderer needs: the committed values, the
//! grid layout, the hovered cell, and the cell it will be compared with on
//! the next stage.  The partner is computed from the next stage with
//! [`swap_partner`](crate::stage::swap_partner), never from the values.
use crate::config::Layout;

/// Color of the hovered cell
pub const HOVERED_COLOR: [u8; 4] = [255, 64, 64, 255];

/// Color of the hovered cell's swap partner
pub const SWAPPED_COLOR: [u8; 4] = [64, 255, 64, 255];

/// A single displayable state of the array
#[derive(Copy, Clone, Debug)]
pub struct Frame<'a> {
    /// Values, in index order
    pub elements: &'a [u32],

    /// Index under the cursor, if any
    pub hovered: Option<usize>,

    /// Index that `hovered` will be compared with on the next stage
    pub swapped: Option<usize>,

    /// Grid layout
    pub layout: Layout,
}

impl Frame<'_> {
    /// Returns the largest value in the frame, or 0 if it's empty
    pub fn max_value(&self) -> u32 {
        self.elements.iter().copied().max().unwrap_or(0)
    }

    /// Returns the brightness of a cell, or `None` if `i` is out of range
    ///
    /// Brightness is linear in the cell's value, from 0 for a value of 0 to
    /// 255 for the largest value in the frame.
    pub fn brightness(&self, i: usize) -> Option<u8> {
        let v = *self.elements.get(i)?;
        Some(scale(v, self.max_value()))
    }

    /// Returns the RGBA color of a cell, or `None` if `i` is out of range
    pub fn color(&self, i: usize) -> Option<[u8; 4]> {
        let v = *self.elements.get(i)?;
        Some(self.color_with(i, v, self.max_value()))
    }

    fn color_with(&self, i: usize, v: u32, max: u32) -> [u8; 4] {
        if self.hovered == Some(i) {
            HOVERED_COLOR
        } else if self.swapped == Some(i) {
            SWAPPED_COLOR
        } else {
            let b = scale(v, max);
            [b, b, b, 255]
        }
    }

    /// Returns the image size (in pixels) for a given cell scale
    pub fn image_size(&self, scale: usize) -> (usize, usize) {
        (self.layout.width * scale, self.layout.height * scale)
    }

    /// Renders the frame as a row-major RGBA8 image
    ///
    /// Each cell becomes a `scale x scale` block of pixels.
    pub fn heatmap(&self, scale: usize) -> Vec<u8> {
        let (width, height) = self.image_size(scale);
        let max = self.max_value();
        let colors: Vec<[u8; 4]> = self
            .elements
            .iter()
            .enumerate()
            .map(|(i, v)| self.color_with(i, *v, max))
            .collect();
        let mut out = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            for x in 0..width {
                let c = self
                    .layout
                    .cell_at(x / scale, y / scale)
                    .and_then(|i| colors.get(i));
                match c {
                    Some(c) => out.extend(c),
                    None => out.extend([0, 0, 0, 255]),
                }
            }
        }
        out
    }
}

/// Maps `v` linearly onto `0..=255`, with `max` as full brightness
fn scale(v: u32, max: u32) -> u8 {
    if max == 0 {
        0
    } else {
        (v.min(max) as u64 * 255 / max as u64) as u8
    }
}
