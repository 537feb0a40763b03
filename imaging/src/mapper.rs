use crate::space::{OutputSpace, Point2D, RenderSpace, Resolution};

/// Moves points between render space and output space.
///
/// The render resolution is fixed for the mapper's lifetime; the output
/// size is passed per call because the composited image may come out
/// smaller than the configured target when aspect ratios differ.
#[derive(Clone, Copy, Debug)]
pub struct CoordinateMapper {
    base: Resolution,
}

impl CoordinateMapper {
    pub fn new(base: Resolution) -> Self {
        Self { base }
    }

    /// `x' = x * out.w / base.w`, `y' = y * out.h / base.h`.
    pub fn scale_to_output(
        &self,
        point: Point2D<RenderSpace>,
        output: Resolution,
    ) -> Point2D<OutputSpace> {
        Point2D::new(
            point.x * f64::from(output.width) / f64::from(self.base.width),
            point.y * f64::from(output.height) / f64::from(self.base.height),
        )
    }

    /// Inverse of [`Self::scale_to_output`].
    pub fn scale_to_render(
        &self,
        point: Point2D<OutputSpace>,
        output: Resolution,
    ) -> Point2D<RenderSpace> {
        Point2D::new(
            point.x * f64::from(self.base.width) / f64::from(output.width),
            point.y * f64::from(self.base.height) / f64::from(output.height),
        )
    }

    /// Inclusive on all four edges: `(0, 0)` and `(w, h)` both count.
    pub fn is_visible(&self, point: Point2D<OutputSpace>, output: Resolution) -> bool {
        (0.0..=f64::from(output.width)).contains(&point.x)
            && (0.0..=f64::from(output.height)).contains(&point.y)
    }
}
