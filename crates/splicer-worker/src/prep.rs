//! Prep mode: coarse-cut and desaturate raw material before a splice run.
//!
//! Grain splits long videos into stream-copied pieces of
//! `grain_duration` seconds. Greyscale re-encodes each file with no color.
//! When both run, grains are written to a scratch directory under the
//! output directory and removed once greyscale is done.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use splicer_media::{grain_prefix, MediaService};
use splicer_models::{SplicerConfig, TargetSpec};

use crate::error::{WorkerError, WorkerResult};

/// Scratch directory for grains that feed greyscale.
pub const GRAIN_TMP_DIR: &str = "_grain_tmp";

/// Which prep steps to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepOptions {
    pub grain: bool,
    pub greyscale: bool,
}

impl PrepOptions {
    pub fn any(&self) -> bool {
        self.grain || self.greyscale
    }
}

/// Split command-line arguments into prep flags and input paths.
///
/// Returns `None` for the options when `--prep` is absent. `--grain` and
/// `--greyscale` are rejected without it.
pub fn parse_args<I, S>(args: I) -> WorkerResult<(Option<PrepOptions>, Vec<PathBuf>)>
where
    I: IntoIterator<Item = S>,
    S: Into<PathBuf>,
{
    let mut prep = false;
    let mut options = PrepOptions::default();
    let mut inputs = Vec::new();

    for arg in args {
        let arg: PathBuf = arg.into();
        match arg.to_str() {
            Some("--prep") => prep = true,
            Some("--grain") => options.grain = true,
            Some("--greyscale") => options.greyscale = true,
            Some(flag) if flag.starts_with("--") => {
                return Err(WorkerError::config_error(format!("unknown flag '{}'", flag)))
            }
            _ => inputs.push(arg),
        }
    }

    if prep {
        Ok((Some(options), inputs))
    } else if options.any() {
        Err(WorkerError::config_error(
            "--grain and --greyscale only apply with --prep",
        ))
    } else {
        Ok((None, inputs))
    }
}

/// Result of a prep run.
#[derive(Debug, Clone, Default)]
pub struct PrepReport {
    /// Files left in the output directory
    pub outputs: Vec<PathBuf>,
    /// Grains produced, including ones later consumed by greyscale
    pub grains: usize,
    /// Inputs that could not be read
    pub skipped: Vec<PathBuf>,
    pub elapsed_secs: f64,
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}

/// Output name for a greyscale copy of `input`.
pub fn greyscale_name(input: &Path) -> String {
    format!("{}_grey.mp4", stem_of(input))
}

/// Grains and greyscale re-encodes over a fixed set of videos.
pub struct Preparer {
    service: Arc<dyn MediaService>,
    config: SplicerConfig,
    spec: TargetSpec,
}

impl Preparer {
    pub fn new(service: Arc<dyn MediaService>, config: SplicerConfig) -> Self {
        let spec = TargetSpec::from(&config);
        Self {
            service,
            config,
            spec,
        }
    }

    /// Split `input` into grains under `out_dir`.
    ///
    /// A video that fails to probe yields `Ok(None)`. One no longer than
    /// `grain_duration` is copied as a single `{stem}_grain_000` file with
    /// its extension kept.
    pub async fn grain_video(
        &self,
        input: &Path,
        out_dir: &Path,
    ) -> WorkerResult<Option<Vec<PathBuf>>> {
        let metadata = match self.service.probe(input).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(input = %input.display(), error = %e, "Skipping video that failed to probe");
                return Ok(None);
            }
        };

        let stem = stem_of(input);
        let limit = f64::from(self.config.grain_duration);

        if metadata.duration <= limit {
            let ext = input
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            let dest = out_dir.join(format!("{}000{}", grain_prefix(&stem), ext));
            info!(
                "{}: {:.1}s, under {}s, copying",
                input.display(),
                metadata.duration,
                self.config.grain_duration
            );
            tokio::fs::copy(input, &dest).await?;
            return Ok(Some(vec![dest]));
        }

        info!(
            "{}: {:.1}s, splitting into ~{}s grains",
            input.display(),
            metadata.duration,
            self.config.grain_duration
        );
        let grains = self
            .service
            .segment_copy(input, out_dir, &stem, self.config.grain_duration)
            .await?;
        Ok(Some(grains))
    }

    /// Write a desaturated copy of `input` into `out_dir`.
    pub async fn greyscale_video(&self, input: &Path, out_dir: &Path) -> WorkerResult<PathBuf> {
        let output = out_dir.join(greyscale_name(input));
        info!("{} -> {}", input.display(), output.display());
        Ok(self.service.greyscale(input, &output, &self.spec).await?)
    }

    /// Run the selected steps over `videos`, leaving results in `output_dir`.
    pub async fn run(
        &self,
        videos: &[PathBuf],
        options: PrepOptions,
        output_dir: &Path,
    ) -> WorkerResult<PrepReport> {
        if !options.any() {
            return Err(WorkerError::config_error(
                "prep needs at least one of grain or greyscale",
            ));
        }
        if videos.is_empty() {
            return Err(WorkerError::NoVideoInputs);
        }
        self.config.validate()?;

        let started = Instant::now();
        tokio::fs::create_dir_all(output_dir).await?;
        info!(videos = videos.len(), ?options, "Prep started");

        let mut report = PrepReport::default();
        let mut working = videos.to_vec();

        let grain_dir = if options.greyscale {
            output_dir.join(GRAIN_TMP_DIR)
        } else {
            output_dir.to_path_buf()
        };

        if options.grain {
            tokio::fs::create_dir_all(&grain_dir).await?;
            let mut grained = Vec::new();
            for video in &working {
                match self.grain_video(video, &grain_dir).await? {
                    Some(grains) => grained.extend(grains),
                    None => report.skipped.push(video.clone()),
                }
            }
            info!(grains = grained.len(), "Grain complete");
            report.grains = grained.len();
            working = grained;
        }

        if options.greyscale {
            let mut greyed = Vec::with_capacity(working.len());
            for video in &working {
                greyed.push(self.greyscale_video(video, output_dir).await?);
            }
            info!(files = greyed.len(), "Greyscale complete");
            working = greyed;

            if options.grain && tokio::fs::metadata(&grain_dir).await.is_ok() {
                tokio::fs::remove_dir_all(&grain_dir).await?;
            }
        }

        report.outputs = working;
        report.elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            outputs = report.outputs.len(),
            skipped = report.skipped.len(),
            output_dir = %output_dir.display(),
            "Prep done"
        );
        Ok(report)
    }
}
