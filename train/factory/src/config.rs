use std::path::{Path, PathBuf};

use imaging::Resolution;
use nalgebra::Point3;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::SplitMix64;
use serde::Deserialize;

use crate::error::{FactoryError, FactoryResult};

/// Pinhole intrinsics, in render-resolution pixels.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct CameraParams {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraParams {
    pub fn from_yaml_file(path: &Path) -> FactoryResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FactoryError::config(format!("read camera parameters '{}': {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
            .map_err(|e| FactoryError::config(format!("'{}': {e}", path.display())))
    }

    pub fn from_yaml_str(text: &str) -> FactoryResult<Self> {
        let params: CameraParams = serde_yaml::from_str(text)
            .map_err(|e| FactoryError::config(format!("parse camera parameters: {e}")))?;
        let finite = [params.fx, params.fy, params.cx, params.cy]
            .iter()
            .all(|v| v.is_finite());
        if !finite || params.fx <= 0.0 || params.fy <= 0.0 {
            return Err(FactoryError::config(
                "focal lengths must be positive and all intrinsics finite",
            ));
        }
        Ok(params)
    }
}

/// Half-extent, in meters, of the box the object is dropped into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldBoundaries {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for WorldBoundaries {
    fn default() -> Self {
        Self {
            x: 8.0,
            y: 8.0,
            z: 0.0,
        }
    }
}

/// Run-wide settings. Built once at startup and only ever read afterwards.
#[derive(Clone, Debug)]
pub struct FactoryConfig {
    pub mesh_path: PathBuf,
    pub base: Resolution,
    pub target: Resolution,
    pub world_boundaries: WorldBoundaries,
    pub anchor: Point3<f64>, // object center in mesh coordinates
    pub camera: CameraParams,
    pub seed: u64,
    pub save_threads: usize,
    pub draw_center: bool,
    pub blur_amount: f32, // accepted, not applied yet
}

impl FactoryConfig {
    pub fn new(
        mesh_path: impl Into<PathBuf>,
        base: Resolution,
        target: Resolution,
        camera: CameraParams,
    ) -> Self {
        Self {
            mesh_path: mesh_path.into(),
            base,
            target,
            world_boundaries: WorldBoundaries::default(),
            anchor: Point3::new(0.0, 0.0, 2.1),
            camera,
            seed: 0,
            save_threads: 4,
            draw_center: false,
            blur_amount: 0.3,
        }
    }

    /// Seed for one task. Depends only on the base seed and the index.
    pub fn task_seed(&self, index: usize) -> u64 {
        let mut sm = SplitMix64::seed_from_u64(self.seed.wrapping_add(index as u64));
        sm.next_u64()
    }
}
