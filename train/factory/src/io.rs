use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    annotation::AnnotatedImage,
    error::{FactoryError, FactoryResult},
    record::JsonRecord,
};

/// Collects annotated images from concurrent tasks and persists them once
/// generation is over.
pub trait DatasetSink: Send + Sync {
    fn put(&self, item: AnnotatedImage);

    /// Persists everything submitted so far using up to `parallelism` writers.
    fn save(&self, parallelism: usize) -> FactoryResult<SaveReport>;
}

#[derive(Debug, Default)]
pub struct SaveReport {
    pub written: Vec<usize>,
    pub failed: Vec<(usize, FactoryError)>,
}

/// Writes `images/{index:06}.png` plus a `labels.jsonl` index under `root`.
pub struct DirectorySink {
    root: PathBuf,
    pending: Mutex<Vec<AnnotatedImage>>,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn save_png(&self, item: &AnnotatedImage) -> FactoryResult<()> {
        let path = self.root.join(JsonRecord::image_path(item.index()));
        item.image()
            .save(&path)
            .map_err(|e| FactoryError::persistence(format!("write '{}': {e}", path.display())))
    }

    fn write_labels_jsonl(&self, records: &[JsonRecord]) -> FactoryResult<()> {
        let path = self.root.join("labels.jsonl");
        let fail = |e: std::io::Error| {
            FactoryError::persistence(format!("write '{}': {e}", path.display()))
        };
        let file = File::create(&path).map_err(fail)?;
        let mut writer = BufWriter::with_capacity(8 << 20, file);
        for rec in records {
            let json = serde_json::to_string(rec)
                .map_err(|e| FactoryError::persistence(format!("encode record {}: {e}", rec.index)))?;
            writeln!(writer, "{json}").map_err(fail)?;
        }
        writer
            .into_inner()
            .map_err(|e| fail(e.into_error()))?
            .sync_all()
            .map_err(fail)
    }
}

impl DatasetSink for DirectorySink {
    fn put(&self, item: AnnotatedImage) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }

    fn save(&self, parallelism: usize) -> FactoryResult<SaveReport> {
        let mut items =
            std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        items.sort_by_key(AnnotatedImage::index);

        let images = self.root.join("images");
        std::fs::create_dir_all(&images).map_err(|e| {
            FactoryError::persistence(format!("create '{}': {e}", images.display()))
        })?;

        info!(count = items.len(), parallelism, root = %self.root.display(), "saving dataset");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism.max(1))
            .build()
            .map_err(|e| FactoryError::persistence(format!("failed to build writer pool: {e}")))?;
        let outcomes: Vec<(usize, FactoryResult<()>)> = pool.install(|| {
            items
                .par_iter()
                .map(|item| (item.index(), self.save_png(item)))
                .collect()
        });

        let mut report = SaveReport::default();
        let mut records = Vec::with_capacity(items.len());
        for (item, (index, outcome)) in items.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    report.written.push(index);
                    records.push(JsonRecord::from_annotated(item));
                }
                Err(err) => {
                    warn!(index, error = %err, "record not saved");
                    report.failed.push((index, err));
                }
            }
        }

        self.write_labels_jsonl(&records)?;
        Ok(report)
    }
}
