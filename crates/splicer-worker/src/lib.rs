//! Deterministic sequencing and anti-strobe engine.
//!
//! This crate provides:
//! - Seeded chunking of normalized sources
//! - A bounded worker pool that hands results downstream in submission order
//! - Sequence assembly: shuffle, image interleave, buffer insertion
//! - Two-phase luma normalization with a shared cache, and the luma delta scan
//! - Expected frame reconciliation
//! - The reproducibility manifest recorder
//! - Prep mode: grain and greyscale passes over raw footage

pub mod chunker;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod inputs;
pub mod logging;
pub mod luma;
pub mod manifest;
pub mod metrics;
pub mod pipeline;
pub mod prep;
pub mod progress;
pub mod reconcile;
pub mod rng;
pub mod sequencer;

pub use config::WorkerConfig;
pub use coordinator::{Coordinator, NormalizedSource, PreparedInputs};
pub use error::{WorkerError, WorkerResult};
pub use logging::RunLogger;
pub use luma::{LumaCache, LumaEngine};
pub use manifest::ManifestRecorder;
pub use pipeline::{RunReport, SplicerPipeline};
pub use prep::{PrepOptions, PrepReport, Preparer};
pub use progress::{Phase, Progress};
pub use rng::SplicerRng;
pub use sequencer::{AssemblyOutcome, Assembler};
