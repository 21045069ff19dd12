//! Shared data models for the splicer pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Run configuration and output presets
//! - The encode target handed to the media adapter
//! - Probe metadata
//! - Chunk and image segment descriptors
//! - The reproducibility manifest

pub mod chunk;
pub mod config;
pub mod encoding;
pub mod manifest;
pub mod media;

// Re-export common types
pub use chunk::{ChunkDescriptor, ImageSegment};
pub use config::{AspectMode, AspectModeParseError, ConfigError, SplicerConfig};
pub use encoding::TargetSpec;
pub use manifest::{ImageInsertion, LumaFlag, Manifest, SkippedInput};
pub use media::{estimate_frame_count, MediaMetadata};
