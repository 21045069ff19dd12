//! Incremental done/total counters for the parallel phases.
//!
//! Counters are plain integers; presenting them is up to the caller, who can
//! read a snapshot at any time or register a callback that fires on every
//! change.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A parallel phase with progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Normalize,
    ImageProbe,
    Chunk,
    ImageRender,
    LumaProbe,
    LumaEncode,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Normalize,
        Phase::ImageProbe,
        Phase::Chunk,
        Phase::ImageRender,
        Phase::LumaProbe,
        Phase::LumaEncode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Normalize => "normalize",
            Phase::ImageProbe => "image_probe",
            Phase::Chunk => "chunk",
            Phase::ImageRender => "image_render",
            Phase::LumaProbe => "luma_probe",
            Phase::LumaEncode => "luma_encode",
        }
    }

    fn slot(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Callback invoked with `(phase, done, total)`.
pub type ProgressCallback = Arc<dyn Fn(Phase, usize, usize) + Send + Sync>;

#[derive(Default)]
struct Counter {
    done: AtomicUsize,
    total: AtomicUsize,
}

/// Shared progress counters for every [`Phase`].
#[derive(Clone, Default)]
pub struct Progress {
    counters: Arc<[Counter; 6]>,
    callback: Option<ProgressCallback>,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for phase in Phase::ALL {
            map.entry(&phase.as_str(), &self.snapshot(phase));
        }
        map.finish()
    }
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Reset `phase` to `0 / total`.
    pub fn begin(&self, phase: Phase, total: usize) {
        let counter = &self.counters[phase.slot()];
        counter.done.store(0, Ordering::SeqCst);
        counter.total.store(total, Ordering::SeqCst);
        self.notify(phase, 0, total);
    }

    /// Mark one unit of `phase` finished.
    pub fn advance(&self, phase: Phase) {
        let counter = &self.counters[phase.slot()];
        let done = counter.done.fetch_add(1, Ordering::SeqCst) + 1;
        let total = counter.total.load(Ordering::SeqCst);
        self.notify(phase, done, total);
    }

    /// Current `(done, total)` for `phase`.
    pub fn snapshot(&self, phase: Phase) -> (usize, usize) {
        let counter = &self.counters[phase.slot()];
        (
            counter.done.load(Ordering::SeqCst),
            counter.total.load(Ordering::SeqCst),
        )
    }

    fn notify(&self, phase: Phase, done: usize, total: usize) {
        if let Some(callback) = &self.callback {
            callback(phase, done, total);
        }
    }
}
