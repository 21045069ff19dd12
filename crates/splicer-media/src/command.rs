//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use splicer_models::TargetSpec;

use crate::error::{MediaError, MediaResult};

/// How much of stderr is kept on failure.
const STDERR_TAIL_BYTES: usize = 2000;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path, or a lavfi source description
    input: PathBuf,
    /// Output file path, or `-` for null output
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Read from a lavfi virtual source (e.g. `color=c=0x808080:...`).
    pub fn lavfi(source: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self::new(source.into(), output).input_args(["-f", "lavfi"])
    }

    /// Decode the input and discard the result, for filters that only report.
    pub fn analyze(input: impl AsRef<Path>) -> Self {
        Self::new(input, "-").output_args(["-f", "null"])
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add multiple input arguments.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Loop a still image input forever; pair with [`duration`](Self::duration).
    pub fn loop_input(self) -> Self {
        self.input_arg("-loop").input_arg("1")
    }

    /// Limit input duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Copy all streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Tag output colorspace, primaries and transfer.
    pub fn color_tags(self, spec: &TargetSpec) -> Self {
        self.output_args([
            "-colorspace",
            spec.colorspace.as_str(),
            "-color_primaries",
            spec.color_primaries.as_str(),
            "-color_trc",
            spec.color_trc.as_str(),
        ])
    }

    /// Every frame a keyframe, no B-frames, so any cut point is exact.
    pub fn all_intra(self) -> Self {
        self.output_args(["-g", "1", "-bf", "0"])
    }

    /// Drop audio.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Codec, preset and intra settings for the run's target.
    pub fn encode_for(self, spec: &TargetSpec) -> Self {
        self.video_codec(&spec.codec)
            .preset(&spec.preset)
            .all_intra()
            .no_audio()
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Output path this command writes.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with a per-call timeout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand, description: &str) -> MediaResult<()> {
        self.run_capture_stderr(cmd, description).await.map(|_| ())
    }

    /// Run an FFmpeg command and return everything it wrote to stderr.
    ///
    /// Analysis filters (`signalstats`, `metadata=print`) report there.
    pub async fn run_capture_stderr(
        &self,
        cmd: &FfmpegCommand,
        description: &str,
    ) -> MediaResult<String> {
        let ffmpeg = check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg ({}): ffmpeg {}", description, args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let stderr_handle = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let status = self.wait_for_completion(&mut child).await;
        let stderr = stderr_handle.await.unwrap_or_default();

        match status? {
            Some(code) if code != 0 => Err(MediaError::ffmpeg_failed(
                format!("{} (exit code {})", description, code),
                Some(stderr_tail(&stderr)),
                Some(code),
            )),
            None => Err(MediaError::ffmpeg_failed(
                format!("{} (terminated by signal)", description),
                Some(stderr_tail(&stderr)),
                None,
            )),
            Some(_) => Ok(stderr),
        }
    }

    /// Wait for child process, killing it on timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<Option<i32>> {
        let status = match self.timeout_secs {
            Some(timeout_secs) => {
                match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
                    Ok(result) => result?,
                    Err(_) => {
                        warn!("FFmpeg timed out after {} seconds, killing process", timeout_secs);
                        let _ = child.kill().await;
                        return Err(MediaError::Timeout(timeout_secs));
                    }
                }
            }
            None => child.wait().await?,
        };

        Ok(status.code())
    }
}

/// Last few KB of stderr, on a char boundary.
fn stderr_tail(stderr: &str) -> String {
    if stderr.len() <= STDERR_TAIL_BYTES {
        return stderr.to_string();
    }
    let mut start = stderr.len() - STDERR_TAIL_BYTES;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    stderr[start..].to_string()
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
