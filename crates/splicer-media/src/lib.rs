//! FFmpeg CLI adapter for the splicer pipeline.
//!
//! This crate provides:
//! - The [`MediaService`] capability trait the core engine is written against
//! - [`FfmpegMediaService`], its ffmpeg/ffprobe implementation
//! - Type-safe FFmpeg command building with per-call timeouts
//! - FFprobe metadata and mean-luma parsing
//! - Filter graph and concat list builders

pub mod command;
pub mod concat;
pub mod error;
pub mod filters;
pub mod probe;
pub mod service;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_mean_luma, probe_media};
pub use service::{grain_prefix, FfmpegMediaService, MediaService, ToolTimeouts};
