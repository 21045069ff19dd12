//! Splicer worker binary.
//!
//! Usage: `splicer-worker <input>...` where each input is a video, an image
//! or a directory of them. `splicer-worker --prep [--grain] [--greyscale]
//! <input>...` runs prep mode on the videos instead. Settings come from
//! `SPLICER_*` environment variables.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use splicer_media::{check_ffmpeg, check_ffprobe, FfmpegMediaService};
use splicer_worker::inputs::collect_inputs;
use splicer_worker::manifest::save_manifest;
use splicer_worker::pipeline::manifest_path;
use splicer_worker::prep::parse_args;
use splicer_worker::{PrepOptions, Preparer, SplicerPipeline, WorkerConfig};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("splicer=info,info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> Result<()> {
    let config = WorkerConfig::from_env().context("Invalid configuration")?;
    info!("Worker config: {:?}", config);

    check_ffmpeg().context("ffmpeg is required")?;
    check_ffprobe().context("ffprobe is required")?;

    let (prep, args) = parse_args(std::env::args_os().skip(1))?;
    if args.is_empty() {
        bail!("usage: splicer-worker [--prep [--grain] [--greyscale]] <input>...");
    }

    if let Some(options) = prep {
        return run_prep(&config, options, &args).await;
    }

    let inputs = collect_inputs(&args).await?;
    if inputs.is_empty() {
        bail!("no valid input files found");
    }
    info!(
        videos = inputs.videos.len(),
        images = inputs.images.len(),
        "Inputs collected"
    );

    // Held until the run finishes; dropping it removes the directory.
    let scratch = match config.work_dir {
        Some(_) => None,
        None => Some(
            tempfile::Builder::new()
                .prefix("splicer_")
                .tempdir()
                .context("Failed to create work directory")?,
        ),
    };
    let work_dir = config
        .work_dir
        .clone()
        .or_else(|| scratch.as_ref().map(|tmp| tmp.path().to_path_buf()))
        .context("No work directory")?;

    let service = FfmpegMediaService::new(&work_dir).with_timeouts(config.timeouts.clone());
    let pipeline = SplicerPipeline::new(
        Arc::new(service),
        config.splicer.clone(),
        &work_dir,
        &config.output_dir,
    );

    let (report, manifest) = pipeline.run(&inputs.videos, &inputs.images).await?;

    let manifest_file = manifest_path(&config.output_dir);
    save_manifest(&manifest, &manifest_file).await?;

    info!(
        output = %report.output.display(),
        manifest = %manifest_file.display(),
        seed = report.seed,
        frames = report.actual_frames,
        expected = report.expected_frames,
        "Done"
    );
    if report.luma_flags > 0 {
        warn!(count = report.luma_flags, "Luma warnings recorded in manifest");
    }

    Ok(())
}

async fn run_prep(config: &WorkerConfig, options: PrepOptions, args: &[PathBuf]) -> Result<()> {
    let inputs = collect_inputs(args).await?;
    if !inputs.images.is_empty() {
        info!(count = inputs.images.len(), "Prep ignores images");
    }

    let service = FfmpegMediaService::new(&config.output_dir).with_timeouts(config.timeouts.clone());
    let preparer = Preparer::new(Arc::new(service), config.splicer.clone());
    let report = preparer
        .run(&inputs.videos, options, &config.output_dir)
        .await?;

    info!(
        outputs = report.outputs.len(),
        grains = report.grains,
        skipped = report.skipped.len(),
        output_dir = %config.output_dir.display(),
        "Prep done"
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();
    info!("Starting splicer-worker");

    if let Err(e) = run().await {
        error!("Run failed: {:#}", e);
        std::process::exit(1);
    }
}
