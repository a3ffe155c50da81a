//! Fuse a recorded scan directory into one point cloud.
//!
//! # Usage
//!
//! ```bash
//! scan3d --data-dir data/ --frames 10 --output model.pcd
//! RUST_LOG=debug scan3d --data-dir data/ --config fusion.toml --strategy point-to-plane
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use scan3d::fusion::{FusionConfig, Pipeline, PointCloudFile};
use scan3d::io::ScanDirectory;
use scan3d::registration::RegistrationStrategy;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    PointToPoint,
    PointToPlane,
}

impl From<Strategy> for RegistrationStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::PointToPoint => RegistrationStrategy::PointToPoint,
            Strategy::PointToPlane => RegistrationStrategy::PointToPlane,
        }
    }
}

#[derive(Parser)]
#[command(name = "scan3d")]
#[command(about = "Register partial scans against a growing model and fuse them")]
struct Args {
    /// Directory with camera_pose.txt and src_NN.pcd scans
    #[arg(short, long)]
    data_dir: PathBuf,

    /// Stop after this many frames (default: all scans in the directory)
    #[arg(short, long)]
    frames: Option<u64>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the fused model (.pcd or .ply)
    #[arg(short, long, default_value = "model.pcd")]
    output: PathBuf,

    /// Worker threads for the parallel neighbour search
    #[arg(long)]
    threads: Option<usize>,

    /// Override the configured ICP error metric
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    scan3d::init_thread_pool(args.threads)?;

    let mut config = match &args.config {
        Some(path) => FusionConfig::load(path)?,
        None => FusionConfig::default(),
    };
    if let Some(strategy) = args.strategy {
        config.registration.strategy = strategy.into();
    }

    let mut source = ScanDirectory::open(&args.data_dir)?;
    if let Some(n) = args.frames {
        source = source.with_frame_limit(n);
    }

    tracing::info!(
        data_dir = %args.data_dir.display(),
        strategy = ?config.registration.strategy,
        threads = scan3d::core::current_cpu_threads(),
        "fusing scans"
    );

    let mut pipeline = Pipeline::new(config)?;
    let stop = AtomicBool::new(false);
    let summary = pipeline.run(&mut source, &mut (), &stop)?;
    tracing::info!(
        frames = summary.frames,
        merged = summary.merged,
        rejected = summary.rejected,
        model_points = summary.model_points,
        "all frames processed"
    );
    if let Some(e) = &summary.ingestion_error {
        tracing::warn!(error = %e, "input ended early");
    }

    let mut sink = PointCloudFile::new(&args.output);
    let (model, persisted) = pipeline.shutdown(&mut sink);
    persisted?;
    tracing::info!(
        path = %args.output.display(),
        points = model.len(),
        frames = model.frames_merged(),
        "model written"
    );
    Ok(())
}
