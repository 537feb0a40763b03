use std::{
    collections::HashMap,
    f64::consts::TAU,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use image::{Rgba, RgbaImage};
use imageproc::{drawing::draw_polygon_mut, point::Point};
use imaging::Resolution;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use tracing::debug;

use crate::{
    background::PoseAnnotations,
    config::{CameraParams, WorldBoundaries},
    error::{FactoryError, FactoryResult},
    mesh::Mesh,
};

const NEAR: f64 = 0.05;
const COORD_LIMIT: f64 = 1.0e6;

/// Everything needed to place and draw the object for one task.
#[derive(Clone, Copy, Debug)]
pub struct SceneParams<'a> {
    pub mesh_path: &'a Path,
    pub base: Resolution,
    pub world_boundaries: WorldBoundaries,
    pub anchor: Point3<f64>,
    pub camera: &'a CameraParams,
    pub pose: &'a PoseAnnotations,
    pub seed: u64,
}

pub struct ProjectionResult {
    /// Object on a transparent canvas of `base` size.
    pub projection: RgbaImage,
    /// `(u, v)` in render-space pixels, `z` is depth along the optical axis.
    pub object_center: Point3<f64>,
    /// Object orientation relative to the camera body frame.
    pub rotation: UnitQuaternion<f64>,
}

pub trait Projector: Send + Sync {
    fn generate(&self, params: &SceneParams<'_>) -> FactoryResult<ProjectionResult>;
}

/// Pinhole camera placed from a background's pose annotations.
///
/// World frame is Z-up. The camera body frame is x forward, y left, z up,
/// rotated by roll/pitch/yaw; positive pitch tilts the view down. Pixels
/// follow the optical convention: z forward, x right, y down.
struct PinholeView {
    position: Point3<f64>,
    orientation: UnitQuaternion<f64>,
    intrinsics: CameraParams,
}

impl PinholeView {
    fn new(pose: &PoseAnnotations, intrinsics: CameraParams) -> Self {
        Self {
            position: Point3::new(0.0, 0.0, pose.height),
            orientation: UnitQuaternion::from_euler_angles(
                pose.roll.to_radians(),
                pose.pitch.to_radians(),
                pose.yaw.to_radians(),
            ),
            intrinsics,
        }
    }

    fn to_optical(&self, world: &Point3<f64>) -> Vector3<f64> {
        let body = self.orientation.inverse_transform_vector(&(*world - self.position));
        Vector3::new(-body.y, -body.z, body.x)
    }

    fn project(&self, optical: &Vector3<f64>) -> (f64, f64) {
        let k = &self.intrinsics;
        (
            k.fx * optical.x / optical.z + k.cx,
            k.fy * optical.y / optical.z + k.cy,
        )
    }
}

/// Flat-shaded software rasterizer over OBJ meshes.
pub struct MeshProjector {
    meshes: Mutex<HashMap<PathBuf, Arc<Mesh>>>,
    color: [u8; 3],
}

impl Default for MeshProjector {
    fn default() -> Self {
        Self {
            meshes: Mutex::new(HashMap::new()),
            color: [230, 120, 30],
        }
    }
}

impl MeshProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached mesh, reading it on first use.
    pub fn preload(&self, path: &Path) -> FactoryResult<Arc<Mesh>> {
        let mut meshes = self.meshes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mesh) = meshes.get(path) {
            return Ok(Arc::clone(mesh));
        }
        let mesh = Arc::new(Mesh::load_obj(path)?);
        debug!(
            path = %path.display(),
            vertices = mesh.vertices.len(),
            triangles = mesh.triangles.len(),
            "mesh loaded"
        );
        meshes.insert(path.to_path_buf(), Arc::clone(&mesh));
        Ok(mesh)
    }

    fn rasterize(&self, canvas: &mut RgbaImage, view: &PinholeView, world: &[Point3<f64>], mesh: &Mesh) {
        let optical: Vec<Vector3<f64>> = world.iter().map(|p| view.to_optical(p)).collect();

        let mut faces: Vec<(f64, [Point<i32>; 3], u8)> = mesh
            .triangles
            .iter()
            .filter_map(|&[a, b, c]| {
                let (pa, pb, pc) = (optical[a], optical[b], optical[c]);
                if pa.z <= NEAR || pb.z <= NEAR || pc.z <= NEAR {
                    return None;
                }
                let normal = (pb - pa).cross(&(pc - pa)).try_normalize(f64::EPSILON)?;
                let centroid = (pa + pb + pc) / 3.0;
                let facing = normal.dot(&centroid.normalize()).abs();
                let shade = (255.0 * (0.3 + 0.7 * facing)).round() as u8;

                let pixel = |p: &Vector3<f64>| {
                    let (u, v) = view.project(p);
                    Point::new(
                        u.round().clamp(-COORD_LIMIT, COORD_LIMIT) as i32,
                        v.round().clamp(-COORD_LIMIT, COORD_LIMIT) as i32,
                    )
                };
                let poly = [pixel(&pa), pixel(&pb), pixel(&pc)];
                if poly[0] == poly[1] || poly[1] == poly[2] || poly[0] == poly[2] {
                    return None;
                }
                Some((centroid.z, poly, shade))
            })
            .collect();

        // Painter's order: far to near.
        faces.sort_by(|a, b| b.0.total_cmp(&a.0));
        for (_, poly, shade) in &faces {
            let lit = self.color.map(|c| ((u16::from(c) * u16::from(*shade)) / 255) as u8);
            draw_polygon_mut(canvas, poly, Rgba([lit[0], lit[1], lit[2], 255]));
        }
    }
}

impl Projector for MeshProjector {
    fn generate(&self, params: &SceneParams<'_>) -> FactoryResult<ProjectionResult> {
        if params.base.is_empty() {
            return Err(FactoryError::projection(format!(
                "cannot render at {}",
                params.base
            )));
        }
        let mesh = self.preload(params.mesh_path)?;
        let mut rng = SmallRng::seed_from_u64(params.seed);

        let bounds = params.world_boundaries;
        let mut spread = |half: f64| {
            if half > 0.0 {
                rng.random_range(-half..=half)
            } else {
                0.0
            }
        };
        let translation = Vector3::new(spread(bounds.x), spread(bounds.y), spread(bounds.z));
        let object = UnitQuaternion::from_euler_angles(0.0, 0.0, rng.random_range(0.0..TAU));

        let view = PinholeView::new(params.pose, *params.camera);
        let world: Vec<Point3<f64>> = mesh
            .vertices
            .iter()
            .map(|&v| object * v + translation)
            .collect();

        let mut projection = RgbaImage::new(params.base.width, params.base.height);
        self.rasterize(&mut projection, &view, &world, &mesh);

        let center = view.to_optical(&(object * params.anchor + translation));
        let (u, v) = if center.z > 0.0 {
            view.project(&center)
        } else {
            (f64::NAN, f64::NAN)
        };

        Ok(ProjectionResult {
            projection,
            object_center: Point3::new(u, v, center.z),
            rotation: view.orientation.inverse() * object,
        })
    }
}
