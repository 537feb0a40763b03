use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use clap::Parser;
use imaging::Resolution;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    background::{BackgroundDataset, BackgroundSource},
    config::{CameraParams, FactoryConfig},
    generator::DatasetFactory,
    io::DirectorySink,
    projector::MeshProjector,
};

mod annotation;
mod background;
mod config;
mod error;
mod generator;
mod io;
mod mesh;
mod projector;
mod record;

/// Generate a hybrid synthetic dataset of projections of a 3D model, in
/// random positions and orientations, onto randomly selected background
/// images.
#[derive(Parser, Debug)]
#[command(name = "dataset-factory", version)]
struct Cli {
    /// The 3D mesh to project (Wavefront OBJ).
    mesh: PathBuf,

    /// Background images directory.
    dataset: PathBuf,

    /// CSV with `image,height,roll,pitch,yaw` for each background.
    annotations: PathBuf,

    /// Destination folder for the generated dataset.
    #[arg(value_name = "DEST")]
    destination: PathBuf,

    /// Number of images to generate.
    #[arg(long, default_value_t = 5)]
    count: usize,

    /// Fraction of motion blur to add.
    #[arg(long = "blur-amount", default_value_t = 0.3)]
    blur_amount: f32,

    /// Output resolution, WxH.
    #[arg(long = "res", default_value = "640x480")]
    resolution: Resolution,

    /// Number of generation workers.
    #[arg(short = 't', default_value_t = 4)]
    threads: usize,

    /// Camera intrinsics YAML (`fx`, `fy`, `cx`, `cy`).
    #[arg(long)]
    camera: PathBuf,

    /// Base seed for object placement. Random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of image writers. Defaults to `-t`.
    #[arg(long = "save-threads")]
    save_threads: Option<usize>,

    /// Burn a cross at the object center into every saved image.
    #[arg(long)]
    draw_center: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let camera = CameraParams::from_yaml_file(&cli.camera)?;

    let mut backgrounds = BackgroundDataset::new(&cli.dataset);
    backgrounds
        .load(cli.count, &cli.annotations)
        .context("could not load dataset")?;
    let base = backgrounds
        .image_size()
        .context("background dataset is empty")?;

    let projector = MeshProjector::new();
    projector
        .preload(&cli.mesh)
        .with_context(|| format!("could not load mesh '{}'", cli.mesh.display()))?;

    let mut config = FactoryConfig::new(cli.mesh, base, cli.resolution, camera);
    config.seed = cli.seed.unwrap_or_else(rand::random);
    config.save_threads = cli.save_threads.unwrap_or(cli.threads);
    config.draw_center = cli.draw_center;
    config.blur_amount = cli.blur_amount;
    debug!(blur_amount = config.blur_amount, "motion blur is not applied");
    info!(
        seed = config.seed,
        render = %config.base,
        output = %config.target,
        backgrounds = backgrounds.len(),
        "configuration ready"
    );

    let sink = DirectorySink::new(&cli.destination);
    let report = DatasetFactory::new(&config, &backgrounds, &projector, &sink)?
        .with_progress(!cli.no_progress)
        .run(cli.count, cli.threads)?;

    if !report.failures.is_empty() || !report.saved.failed.is_empty() {
        let skipped: Vec<usize> = report
            .failures
            .iter()
            .map(|f| f.index)
            .chain(report.saved.failed.iter().map(|(index, _)| *index))
            .collect();
        warn!(?skipped, "some images are missing from the dataset");
    }
    info!(
        written = report.saved.written.len(),
        requested = report.requested,
        emitted = report.emitted,
        cancelled = report.skipped,
        dest = %sink.root().display(),
        "dataset saved"
    );
    Ok(())
}
