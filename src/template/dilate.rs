//! Edge padding for painted islands.
//!
//! Texture filtering samples a little outside every UV island, so painted
//! regions are grown into the surrounding transparency to avoid visible seams
//! once the template is applied back to the model.

use super::canvas::{Canvas, CompositeMode};

const NEIGHBOURS: [(i32, i32); 8] = [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)];

/// `max(4, round(size × 0.004))`.
pub fn dilation_iterations(size: u32) -> u32 {
    ((size as f64 * 0.004).round() as u32).max(4)
}

/// Grow painted pixels by one pixel per iteration (8-connected).
///
/// Each pass composites the canvas shifted towards its eight neighbours into
/// `scratch`, then paints that underneath the canvas, so only fully
/// transparent pixels gain color and existing pixels are never overwritten.
pub fn dilate<C, F>(canvas: &mut C, iterations: u32, mut scratch: F)
where
    C: Canvas,
    F: FnMut(u32) -> C,
{
    for _ in 0..iterations {
        let mut grown = scratch(canvas.size());
        for (dx, dy) in NEIGHBOURS {
            grown.draw_canvas(canvas, dx, dy, CompositeMode::SourceOver);
        }
        canvas.draw_canvas(&grown, 0, 0, CompositeMode::DestinationOver);
    }
}
