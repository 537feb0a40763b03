use image::{DynamicImage, RgbaImage, imageops::FilterType};

use crate::{error::CompositeError, space::Resolution};

/// Resampling filter used by both resize stages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Resampling {
    /// Lanczos3, the antialiasing default.
    #[default]
    Antialias,
    Bilinear,
}

impl Resampling {
    fn filter(self) -> FilterType {
        match self {
            Resampling::Antialias => FilterType::Lanczos3,
            Resampling::Bilinear => FilterType::Triangle,
        }
    }
}

/// Blends a projection over a background and shrinks the result twice:
/// first the projection to render resolution, then the blend to output
/// resolution. Neither stage ever upscales.
#[derive(Clone, Copy, Debug)]
pub struct Compositor {
    render: Resolution,
    output: Resolution,
    resampling: Resampling,
}

impl Compositor {
    pub fn new(render: Resolution, output: Resolution) -> Result<Self, CompositeError> {
        if render.is_empty() {
            return Err(CompositeError::resolution(render.to_string()));
        }
        if output.is_empty() {
            return Err(CompositeError::resolution(output.to_string()));
        }
        Ok(Self {
            render,
            output,
            resampling: Resampling::default(),
        })
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn combine(
        &self,
        projection: RgbaImage,
        background: &DynamicImage,
    ) -> Result<RgbaImage, CompositeError> {
        if Resolution::of(&projection).is_empty() {
            return Err(CompositeError::empty("projection"));
        }
        let mut canvas = background.to_rgba8();
        if Resolution::of(&canvas).is_empty() {
            return Err(CompositeError::empty("background"));
        }

        let projection = fit_within(projection, self.render, self.resampling);
        let (p, b) = (Resolution::of(&projection), Resolution::of(&canvas));
        if p != b {
            return Err(CompositeError::DimensionMismatch {
                projection: p,
                background: b,
            });
        }

        for (dst, src) in canvas.pixels_mut().zip(projection.pixels()) {
            dst.0 = over(dst.0, src.0);
        }

        Ok(fit_within(canvas, self.output, self.resampling))
    }
}

/// Largest size with `size`'s aspect ratio that fits in `bounds`.
/// Returns `size` unchanged when it already fits.
pub fn thumbnail_size(size: Resolution, bounds: Resolution) -> Resolution {
    if size.fits_within(bounds) || size.is_empty() {
        return size;
    }
    let ratio = (f64::from(bounds.width) / f64::from(size.width))
        .min(f64::from(bounds.height) / f64::from(size.height));
    let scale = |v: u32, max: u32| ((f64::from(v) * ratio).round() as u32).clamp(1, max.max(1));
    Resolution::new(scale(size.width, bounds.width), scale(size.height, bounds.height))
}

pub fn fit_within(img: RgbaImage, bounds: Resolution, resampling: Resampling) -> RgbaImage {
    let size = Resolution::of(&img);
    let target = thumbnail_size(size, bounds);
    if target == size {
        return img;
    }
    image::imageops::resize(&img, target.width, target.height, resampling.filter())
}

/// Straight-alpha source-over.
pub fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    match src[3] {
        0 => return dst,
        255 => return src,
        _ => {}
    }
    let sa = f32::from(src[3]) / 255.0;
    let da = f32::from(dst[3]) / 255.0 * (1.0 - sa);
    let oa = sa + da;

    let mut out = [0u8; 4];
    for i in 0..3 {
        let c = (f32::from(src[i]) * sa + f32::from(dst[i]) * da) / oa;
        out[i] = c.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}
