use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use imaging::{Compositor, CoordinateMapper, MARKER_COLOR, Point2D, Resolution, draw_marker};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    annotation::{AnnotatedImage, SyntheticAnnotations},
    background::BackgroundSource,
    config::FactoryConfig,
    error::{FactoryError, FactoryResult},
    io::{DatasetSink, SaveReport},
    projector::{Projector, SceneParams},
};

#[derive(Debug)]
pub struct TaskFailure {
    pub index: usize,
    pub error: FactoryError,
}

#[derive(Debug)]
pub struct RunReport {
    pub requested: usize,
    pub emitted: usize,
    pub failures: Vec<TaskFailure>,
    pub skipped: usize,
    pub saved: SaveReport,
}

enum TaskOutcome {
    Emitted,
    Failed(FactoryError),
    Skipped,
}

/// Drives one generation task per output index over a fixed-size worker pool.
pub struct DatasetFactory<'a> {
    config: &'a FactoryConfig,
    background: &'a dyn BackgroundSource,
    projector: &'a dyn Projector,
    sink: &'a dyn DatasetSink,
    compositor: Compositor,
    mapper: CoordinateMapper,
    progress: bool,
}

impl<'a> DatasetFactory<'a> {
    pub fn new(
        config: &'a FactoryConfig,
        background: &'a dyn BackgroundSource,
        projector: &'a dyn Projector,
        sink: &'a dyn DatasetSink,
    ) -> FactoryResult<Self> {
        let compositor = Compositor::new(config.base, config.target)
            .map_err(|e| FactoryError::config(e.to_string()))?;
        Ok(Self {
            config,
            background,
            projector,
            sink,
            compositor,
            mapper: CoordinateMapper::new(config.base),
            progress: false,
        })
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Generates `count` images on `pool_size` workers, then saves them.
    ///
    /// A failed task is recorded and the others carry on. If no background
    /// can be drawn at all the run stops early and nothing is saved.
    pub fn run(&self, count: usize, pool_size: usize) -> FactoryResult<RunReport> {
        let pool_size = pool_size.max(1);
        info!(count, pool_size, "generating dataset");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(pool_size)
            .build()
            .map_err(|e| FactoryError::config(format!("failed to build rayon thread pool: {e}")))?;

        let bar = self.progress_bar(count);
        let emitted = AtomicUsize::new(0);
        let starved = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);

        let outcomes: Vec<(usize, TaskOutcome)> = pool.install(|| {
            (0..count)
                .into_par_iter()
                .map(|index| {
                    if abort.load(Ordering::Relaxed) {
                        return (index, TaskOutcome::Skipped);
                    }
                    let outcome = match self.generate_one(index) {
                        Ok(item) => {
                            info!(index, visible = item.annotations().visible, "object visibility");
                            self.sink.put(item);
                            emitted.fetch_add(1, Ordering::Relaxed);
                            TaskOutcome::Emitted
                        }
                        Err(error) => {
                            if error.is_fatal_resource() {
                                let n = starved.fetch_add(1, Ordering::Relaxed) + 1;
                                if n > pool_size && emitted.load(Ordering::Relaxed) == 0 {
                                    abort.store(true, Ordering::Relaxed);
                                }
                            }
                            warn!(index, %error, "task failed");
                            TaskOutcome::Failed(error)
                        }
                    };
                    bar.inc(1);
                    (index, outcome)
                })
                .collect()
        });
        bar.finish_and_clear();

        let mut emitted = 0;
        let mut skipped = 0;
        let mut failures = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                TaskOutcome::Emitted => emitted += 1,
                TaskOutcome::Skipped => skipped += 1,
                TaskOutcome::Failed(error) => failures.push(TaskFailure { index, error }),
            }
        }

        if emitted == 0
            && !failures.is_empty()
            && failures.iter().all(|f| f.error.is_fatal_resource())
        {
            return Err(FactoryError::background(format!(
                "no background could be drawn ({} attempts, {skipped} tasks skipped)",
                failures.len()
            )));
        }

        info!(resolution = %self.config.target, "scaled to output resolution");
        let saved = self.sink.save(self.config.save_threads)?;
        info!(
            requested = count,
            emitted,
            failed = failures.len(),
            skipped,
            written = saved.written.len(),
            "dataset generation finished"
        );

        Ok(RunReport {
            requested: count,
            emitted,
            failures,
            skipped,
            saved,
        })
    }

    /// Builds the annotated image for `index` without submitting it.
    pub fn generate_one(&self, index: usize) -> FactoryResult<AnnotatedImage> {
        let background = self.background.get()?;
        let params = SceneParams {
            mesh_path: &self.config.mesh_path,
            base: self.config.base,
            world_boundaries: self.config.world_boundaries,
            anchor: self.config.anchor,
            camera: &self.config.camera,
            pose: &background.annotations,
            seed: self.config.task_seed(index),
        };
        let projected = self.projector.generate(&params)?;

        let mut image = self.compositor.combine(projected.projection, &background.image)?;
        let output = Resolution::of(&image);

        let render_center = Point2D::new(projected.object_center.x, projected.object_center.y);
        let center = self.mapper.scale_to_output(render_center, output);
        let visible = self.mapper.is_visible(center, output);
        debug!(index, x = center.x, y = center.y, %output, "scaled object center");

        if self.config.draw_center {
            draw_marker(&mut image, center, MARKER_COLOR);
        }

        Ok(AnnotatedImage::new(
            image,
            index,
            SyntheticAnnotations {
                center,
                rotation: projected.rotation,
                visible,
            },
        ))
    }

    fn progress_bar(&self, count: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(count as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{bar:40.green/blue}] {pos}/{len} images ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏"));
        }
        pb.set_message("Generating");
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        background::{BackgroundSample, PoseAnnotations},
        config::CameraParams,
        projector::ProjectionResult,
    };
    use image::{DynamicImage, Rgba, RgbaImage};
    use nalgebra::{Point3, UnitQuaternion};
    use std::{collections::HashSet, sync::Mutex};

    struct FixedBackground {
        size: Resolution,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FixedBackground {
        fn new(size: Resolution) -> Self {
            Self {
                size,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl BackgroundSource for FixedBackground {
        fn get(&self) -> FactoryResult<BackgroundSample> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(FactoryError::background("stub exhausted"));
            }
            Ok(BackgroundSample {
                image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                    self.size.width,
                    self.size.height,
                    Rgba([20, 40, 60, 255]),
                )),
                annotations: PoseAnnotations::default(),
            })
        }

        fn image_size(&self) -> Option<Resolution> {
            Some(self.size)
        }
    }

    /// Drops one opaque pixel at a seed-dependent column.
    struct StubProjector {
        center: (f64, f64),
        fail_seed: Option<u64>,
    }

    impl Projector for StubProjector {
        fn generate(&self, params: &SceneParams<'_>) -> FactoryResult<ProjectionResult> {
            if Some(params.seed) == self.fail_seed {
                return Err(FactoryError::projection("stub refused"));
            }
            let mut projection = RgbaImage::new(params.base.width, params.base.height);
            let x = (params.seed % u64::from(params.base.width)) as u32;
            projection.put_pixel(x, 0, Rgba([255, 255, 255, 255]));
            Ok(ProjectionResult {
                projection,
                object_center: Point3::new(self.center.0, self.center.1, 1.0),
                rotation: UnitQuaternion::from_euler_angles(0.0, 0.0, (params.seed % 360) as f64),
            })
        }
    }

    #[derive(Default)]
    struct MemorySink {
        items: Mutex<Vec<AnnotatedImage>>,
        saved_with: Mutex<Option<usize>>,
    }

    impl MemorySink {
        fn by_index(&self) -> Vec<AnnotatedImage> {
            let mut items = self.items.lock().unwrap().clone();
            items.sort_by_key(AnnotatedImage::index);
            items
        }
    }

    impl DatasetSink for MemorySink {
        fn put(&self, item: AnnotatedImage) {
            self.items.lock().unwrap().push(item);
        }

        fn save(&self, parallelism: usize) -> FactoryResult<SaveReport> {
            *self.saved_with.lock().unwrap() = Some(parallelism);
            Ok(SaveReport {
                written: self.by_index().iter().map(AnnotatedImage::index).collect(),
                failed: Vec::new(),
            })
        }
    }

    fn config(base: Resolution, target: Resolution) -> FactoryConfig {
        let camera = CameraParams {
            fx: 100.0,
            fy: 100.0,
            cx: f64::from(base.width) / 2.0,
            cy: f64::from(base.height) / 2.0,
        };
        let mut cfg = FactoryConfig::new("stub.obj", base, target, camera);
        cfg.seed = 17;
        cfg.save_threads = 3;
        cfg
    }

    fn small() -> FactoryConfig {
        config(Resolution::new(192, 108), Resolution::new(64, 48))
    }

    fn centered() -> StubProjector {
        StubProjector {
            center: (96.0, 54.0),
            fail_seed: None,
        }
    }

    #[test]
    fn every_index_is_emitted_once_for_any_pool_size() {
        let cfg = small();
        let bg = FixedBackground::new(cfg.base);
        let proj = centered();
        let count = 6;
        for pool_size in 1..=count {
            let sink = MemorySink::default();
            let report = DatasetFactory::new(&cfg, &bg, &proj, &sink)
                .unwrap()
                .run(count, pool_size)
                .unwrap();
            assert_eq!(report.emitted, count);
            assert!(report.failures.is_empty());
            let indices: HashSet<usize> = sink.by_index().iter().map(AnnotatedImage::index).collect();
            assert_eq!(indices, (0..count).collect::<HashSet<_>>(), "pool size {pool_size}");
            assert_eq!(report.saved.written.len(), count);
            assert_eq!(*sink.saved_with.lock().unwrap(), Some(3));
        }
    }

    #[test]
    fn projection_failure_only_drops_its_own_task() {
        let cfg = small();
        let bg = FixedBackground::new(cfg.base);
        let proj = StubProjector {
            fail_seed: Some(cfg.task_seed(1)),
            ..centered()
        };
        let sink = MemorySink::default();
        let report = DatasetFactory::new(&cfg, &bg, &proj, &sink)
            .unwrap()
            .run(4, 2)
            .unwrap();

        assert_eq!(report.emitted, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(matches!(report.failures[0].error, FactoryError::Projection(_)));
        let saved: Vec<usize> = sink.by_index().iter().map(AnnotatedImage::index).collect();
        assert_eq!(saved, vec![0, 2, 3]);
        assert_eq!(report.saved.written, vec![0, 2, 3]);
    }

    #[test]
    fn serial_and_parallel_runs_match() {
        let cfg = small();
        let bg = FixedBackground::new(cfg.base);
        let proj = centered();

        let serial = MemorySink::default();
        DatasetFactory::new(&cfg, &bg, &proj, &serial).unwrap().run(3, 1).unwrap();
        let parallel = MemorySink::default();
        DatasetFactory::new(&cfg, &bg, &proj, &parallel).unwrap().run(3, 3).unwrap();

        let (a, b) = (serial.by_index(), parallel.by_index());
        assert_eq!(a.len(), 3);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.index(), y.index());
            assert_eq!(x.image(), y.image());
            assert_eq!(x.annotations(), y.annotations());
        }
    }

    #[test]
    fn starved_background_fails_fast_without_saving() {
        let cfg = small();
        let bg = FixedBackground {
            fail: true,
            ..FixedBackground::new(cfg.base)
        };
        let proj = centered();
        let sink = MemorySink::default();
        let err = DatasetFactory::new(&cfg, &bg, &proj, &sink)
            .unwrap()
            .run(200, 2)
            .unwrap_err();

        assert!(matches!(err, FactoryError::BackgroundUnavailable(_)));
        assert!(bg.calls.load(Ordering::Relaxed) < 200);
        assert!(sink.saved_with.lock().unwrap().is_none());
    }

    #[test]
    fn center_is_scaled_against_the_actual_output() {
        // 192x108 shrinks to 64x36 inside a 64x48 target.
        let cfg = small();
        let bg = FixedBackground::new(cfg.base);
        let proj = centered();
        let sink = MemorySink::default();
        let factory = DatasetFactory::new(&cfg, &bg, &proj, &sink).unwrap();

        let item = factory.generate_one(0).unwrap();
        assert_eq!(item.image().dimensions(), (64, 36));
        let ann = item.annotations();
        assert!((ann.center.x - 32.0).abs() < 1e-9);
        assert!((ann.center.y - 18.0).abs() < 1e-9);
        assert!(ann.visible);
        assert!(sink.by_index().is_empty());
    }

    #[test]
    fn uniform_scale_matches_reference_scenario() {
        let cfg = config(Resolution::new(1920, 1080), Resolution::new(1920, 1080));
        let bg = FixedBackground::new(cfg.base);
        let sink = MemorySink::default();
        let proj = StubProjector {
            center: (-100.0, 540.0),
            fail_seed: None,
        };
        let item = DatasetFactory::new(&cfg, &bg, &proj, &sink)
            .unwrap()
            .generate_one(0)
            .unwrap();
        assert!(item.annotations().center.x < 0.0);
        assert!(!item.annotations().visible);
    }

    #[test]
    fn marker_only_changes_pixels_not_labels() {
        let plain_cfg = small();
        let mut marked_cfg = small();
        marked_cfg.draw_center = true;
        let bg = FixedBackground::new(plain_cfg.base);
        let proj = centered();
        let sink = MemorySink::default();

        let plain = DatasetFactory::new(&plain_cfg, &bg, &proj, &sink)
            .unwrap()
            .generate_one(2)
            .unwrap();
        let marked = DatasetFactory::new(&marked_cfg, &bg, &proj, &sink)
            .unwrap()
            .generate_one(2)
            .unwrap();

        assert_eq!(plain.annotations(), marked.annotations());
        assert_eq!(*marked.image().get_pixel(32, 18), MARKER_COLOR);
        assert_ne!(*plain.image().get_pixel(32, 18), MARKER_COLOR);
    }

    #[test]
    fn invalid_target_is_a_config_error() {
        let cfg = config(Resolution::new(10, 10), Resolution::new(0, 10));
        let bg = FixedBackground::new(cfg.base);
        let sink = MemorySink::default();
        let err = DatasetFactory::new(&cfg, &bg, &centered(), &sink).err().unwrap();
        assert!(matches!(err, FactoryError::Config(_)));
    }
}
