use std::{fmt, marker::PhantomData, str::FromStr};

use crate::error::CompositeError;

/// Pixel space of the composited frame before the final resize.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderSpace {}

/// Pixel space of the persisted image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputSpace {}

/// Image dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of<I: image::GenericImageView>(img: &I) -> Self {
        let (width, height) = img.dimensions();
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when `self` fits inside `bounds` on both axes.
    pub fn fits_within(&self, bounds: Resolution) -> bool {
        self.width <= bounds.width && self.height <= bounds.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = CompositeError;

    /// Parses `WxH`, e.g. `640x480`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| CompositeError::resolution(s))?;
        let width = w.trim().parse().map_err(|_| CompositeError::resolution(s))?;
        let height = h.trim().parse().map_err(|_| CompositeError::resolution(s))?;
        let res = Resolution { width, height };
        if res.is_empty() {
            return Err(CompositeError::resolution(s));
        }
        Ok(res)
    }
}

/// A pixel coordinate tagged with the space it lives in.
///
/// The tag makes it impossible to feed an output-space point back into
/// [`crate::mapper::CoordinateMapper::scale_to_output`].
pub struct Point2D<S> {
    pub x: f64,
    pub y: f64,
    space: PhantomData<S>,
}

impl<S> Point2D<S> {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            space: PhantomData,
        }
    }
}

// Manual impls: derives would put bounds on the uninhabited tag types.
impl<S> Clone for Point2D<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Point2D<S> {}

impl<S> PartialEq for Point2D<S> {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl<S> fmt::Debug for Point2D<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}
