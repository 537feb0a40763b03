use std::path::{Path, PathBuf};

use image::DynamicImage;
use imaging::Resolution;
use rand::seq::{IndexedRandom, SliceRandom};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{FactoryError, FactoryResult};

const REQUIRED_COLUMNS: [&str; 5] = ["image", "height", "roll", "pitch", "yaw"];

/// Camera pose the background was shot from. Height in meters, angles in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoseAnnotations {
    pub height: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

#[derive(Clone, Debug)]
pub struct BackgroundSample {
    pub image: DynamicImage,
    pub annotations: PoseAnnotations,
}

/// Shared pool of backgrounds. Draws are independent: two callers may get
/// the same sample.
pub trait BackgroundSource: Send + Sync {
    fn get(&self) -> FactoryResult<BackgroundSample>;

    /// Common size of every background, `None` until something is loaded.
    fn image_size(&self) -> Option<Resolution>;
}

pub struct BackgroundDataset {
    root: PathBuf,
    samples: Vec<BackgroundSample>,
}

impl BackgroundDataset {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            samples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Loads up to `count` randomly chosen backgrounds listed in `annotations`.
    pub fn load(&mut self, count: usize, annotations: &Path) -> FactoryResult<()> {
        let text = std::fs::read_to_string(annotations).map_err(|e| {
            FactoryError::dataset_load(format!("read '{}': {e}", annotations.display()))
        })?;
        let mut rows = parse_annotations(&text)?;
        if rows.is_empty() {
            return Err(FactoryError::dataset_load(format!(
                "'{}' lists no images",
                annotations.display()
            )));
        }
        rows.shuffle(&mut rand::rng());
        rows.truncate(count.max(1));

        let samples = rows
            .into_par_iter()
            .map(|(rel, annotations)| -> FactoryResult<BackgroundSample> {
                let path = self.root.join(&rel);
                let image = image::open(&path).map_err(|e| {
                    FactoryError::dataset_load(format!("decode '{}': {e}", path.display()))
                })?;
                debug!(path = %path.display(), "loaded background");
                Ok(BackgroundSample { image, annotations })
            })
            .collect::<FactoryResult<Vec<_>>>()?;

        let size = Resolution::of(&samples[0].image);
        if size.is_empty() {
            return Err(FactoryError::dataset_load("backgrounds have zero size"));
        }
        if let Some(odd) = samples.iter().find(|s| Resolution::of(&s.image) != size) {
            return Err(FactoryError::dataset_load(format!(
                "backgrounds must share one size: found {} and {size}",
                Resolution::of(&odd.image)
            )));
        }

        info!(count = samples.len(), %size, root = %self.root.display(), "background dataset loaded");
        self.samples = samples;
        Ok(())
    }
}

impl BackgroundSource for BackgroundDataset {
    fn get(&self) -> FactoryResult<BackgroundSample> {
        self.samples
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| FactoryError::background("background dataset is empty"))
    }

    fn image_size(&self) -> Option<Resolution> {
        self.samples.first().map(|s| Resolution::of(&s.image))
    }
}

/// Parses the CSV index: a header row naming at least
/// `image,height,roll,pitch,yaw` (any order), then one row per image.
pub fn parse_annotations(text: &str) -> FactoryResult<Vec<(String, PoseAnnotations)>> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines
        .next()
        .ok_or_else(|| FactoryError::dataset_load("annotations file is empty"))?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();

    let mut idx = [0usize; REQUIRED_COLUMNS.len()];
    for (slot, name) in idx.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| FactoryError::dataset_load(format!("missing column '{name}'")))?;
    }
    let [image, height, roll, pitch, yaw] = idx;

    lines
        .map(|(n, line)| -> FactoryResult<(String, PoseAnnotations)> {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let field = |i: usize| {
                fields.get(i).copied().filter(|f| !f.is_empty()).ok_or_else(|| {
                    FactoryError::dataset_load(format!("line {}: missing '{}'", n + 1, columns[i]))
                })
            };
            let number = |i: usize| -> FactoryResult<f64> {
                let raw = field(i)?;
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| {
                        FactoryError::dataset_load(format!(
                            "line {}: bad {} '{raw}'",
                            n + 1,
                            columns[i]
                        ))
                    })
            };
            let pose = PoseAnnotations {
                height: number(height)?,
                roll: number(roll)?,
                pitch: number(pitch)?,
                yaw: number(yaw)?,
            };
            Ok((field(image)?.to_string(), pose))
        })
        .collect()
}
