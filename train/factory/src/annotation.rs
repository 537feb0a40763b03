use image::RgbaImage;
use imaging::{OutputSpace, Point2D};
use nalgebra::UnitQuaternion;

/// Ground truth for one generated image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyntheticAnnotations {
    pub center: Point2D<OutputSpace>,
    pub rotation: UnitQuaternion<f64>,
    pub visible: bool,
}

/// Unit of output. Fields are read-only once built; the sink takes ownership.
#[derive(Clone, Debug)]
pub struct AnnotatedImage {
    image: RgbaImage,
    index: usize,
    annotations: SyntheticAnnotations,
}

impl AnnotatedImage {
    pub fn new(image: RgbaImage, index: usize, annotations: SyntheticAnnotations) -> Self {
        Self {
            image,
            index,
            annotations,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn annotations(&self) -> &SyntheticAnnotations {
        &self.annotations
    }
}
