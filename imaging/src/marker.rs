use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::space::{OutputSpace, Point2D};

pub const MARKER_ARM: f32 = 10.0;
pub const MARKER_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Draws a 20px cross centered on `point`. Pixels outside the cross are untouched.
///
/// A non-finite point has no footprint and draws nothing.
pub fn draw_marker(img: &mut RgbaImage, point: Point2D<OutputSpace>, color: Rgba<u8>) {
    if !point.x.is_finite() || !point.y.is_finite() {
        return;
    }
    let (x, y) = (point.x as f32, point.y as f32);
    draw_line_segment_mut(img, (x - MARKER_ARM, y), (x + MARKER_ARM, y), color);
    draw_line_segment_mut(img, (x, y - MARKER_ARM), (x, y + MARKER_ARM), color);
}
