//! Compositing and coordinate-space helpers for synthetic dataset images.

pub mod compositor;
pub mod error;
pub mod mapper;
pub mod marker;
pub mod space;

pub use compositor::{Compositor, Resampling};
pub use error::CompositeError;
pub use mapper::CoordinateMapper;
pub use marker::{MARKER_COLOR, draw_marker};
pub use space::{OutputSpace, Point2D, RenderSpace, Resolution};
