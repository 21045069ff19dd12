//! Luma measurement, normalization and the transition safety scan.
//!
//! [`LumaCache`] is the only cross-task mutable state of a run together with
//! the adjusted-path map. Both are keyed by path and written with
//! insert-if-absent, so a value once stored never changes. Locks are held for
//! lookups and inserts only, never across a media call.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use splicer_media::MediaService;
use splicer_models::{LumaFlag, TargetSpec};

use crate::coordinator::run_bounded;
use crate::metrics::{record_luma_encode, record_luma_flags, record_luma_probe};
use crate::progress::{Phase, Progress};

/// Mid-gray, used when a clip cannot be measured.
pub const NEUTRAL_LUMA: f64 = 128.0;

/// Shared path → mean luma map.
#[derive(Debug, Clone, Default)]
pub struct LumaCache {
    inner: Arc<RwLock<HashMap<PathBuf, f64>>>,
}

impl LumaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<f64> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
    }

    /// Luma of `path`, or [`NEUTRAL_LUMA`] when unknown.
    pub fn get_or_neutral(&self, path: &Path) -> f64 {
        self.get(path).unwrap_or(NEUTRAL_LUMA)
    }

    /// Store `luma` unless `path` already has a value; returns the stored value.
    pub fn insert_if_absent(&self, path: PathBuf, luma: f64) -> f64 {
        *self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path)
            .or_insert(luma)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    /// Distinct paths of `paths` with no cached value, in first-seen order.
    pub fn missing(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        distinct_in_order(paths)
            .into_iter()
            .filter(|p| !guard.contains_key(p))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Distinct entries of `paths`, in order of first occurrence.
pub fn distinct_in_order(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .filter(|p| seen.insert(p.as_path()))
        .cloned()
        .collect()
}

/// Arithmetic mean of `lumas`; neutral for an empty slice.
pub fn global_mean(lumas: &[f64]) -> f64 {
    if lumas.is_empty() {
        return NEUTRAL_LUMA;
    }
    lumas.iter().sum::<f64>() / lumas.len() as f64
}

/// Brightness shift that pulls `luma` toward `mean`, in `[-1, 1]`.
pub fn brightness_for(luma: f64, mean: f64, strength: f64) -> f64 {
    ((mean - luma) / 255.0 * strength).clamp(-1.0, 1.0)
}

/// A clip scheduled for a brightness re-encode.
#[derive(Debug, Clone, PartialEq)]
pub struct LumaAdjustment {
    pub path: PathBuf,
    pub luma: f64,
    /// `mean - luma`, unscaled
    pub delta: f64,
    pub brightness: f64,
}

impl LumaAdjustment {
    /// Analytic luma of the re-encoded clip; it is not re-measured.
    pub fn estimated_luma(&self, strength: f64) -> f64 {
        self.luma + self.delta * strength
    }
}

/// Clips whose distance to `mean` is at least `negligible`.
pub fn plan_adjustments(
    measured: &[(PathBuf, f64)],
    mean: f64,
    strength: f64,
    negligible: f64,
) -> Vec<LumaAdjustment> {
    measured
        .iter()
        .filter_map(|(path, luma)| {
            let delta = mean - luma;
            (delta.abs() >= negligible).then(|| LumaAdjustment {
                path: path.clone(),
                luma: *luma,
                delta,
                brightness: brightness_for(*luma, mean, strength),
            })
        })
        .collect()
}

/// Flag every adjacent pair whose luma differs by more than `threshold`.
pub fn scan_luma_deltas(lumas: &[f64], threshold: f64) -> Vec<LumaFlag> {
    if threshold <= 0.0 {
        return Vec::new();
    }
    lumas
        .windows(2)
        .enumerate()
        .filter_map(|(position, pair)| {
            let delta = (pair[0] - pair[1]).abs();
            (delta > threshold).then_some(LumaFlag {
                position,
                delta,
                threshold,
            })
        })
        .collect()
}

/// Result of [`LumaEngine::normalize`].
#[derive(Debug, Clone, Default)]
pub struct LumaNormalization {
    /// Input sequence with adjusted clips substituted
    pub sequence: Vec<PathBuf>,
    /// Adjusted path → original path, for frame reconciliation
    pub adjusted: HashMap<PathBuf, PathBuf>,
    /// Re-encodes performed by this call
    pub encodes: usize,
    pub global_mean: f64,
}

/// Drives luma measurement and brightness re-encodes through a [`MediaService`].
#[derive(Clone)]
pub struct LumaEngine {
    service: Arc<dyn MediaService>,
    spec: TargetSpec,
    cache: LumaCache,
    /// Original path → adjusted path
    adjusted: Arc<RwLock<HashMap<PathBuf, PathBuf>>>,
    max_workers: usize,
    progress: Progress,
}

impl LumaEngine {
    pub fn new(
        service: Arc<dyn MediaService>,
        spec: TargetSpec,
        cache: LumaCache,
        max_workers: usize,
    ) -> Self {
        Self {
            service,
            spec,
            cache,
            adjusted: Arc::new(RwLock::new(HashMap::new())),
            max_workers,
            progress: Progress::new(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn cache(&self) -> &LumaCache {
        &self.cache
    }

    fn adjusted_for(&self, path: &Path) -> Option<PathBuf> {
        self.adjusted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Measure every distinct uncached path of `paths` in parallel.
    ///
    /// A failed measurement stores [`NEUTRAL_LUMA`]. Returns the number of
    /// paths measured.
    pub async fn measure_missing(&self, paths: &[PathBuf]) -> usize {
        let missing = self.cache.missing(paths);
        if missing.is_empty() {
            return 0;
        }
        let count = missing.len();
        debug!(count, "Probing luma");

        run_bounded(
            missing,
            self.max_workers,
            Phase::LumaProbe,
            &self.progress,
            |_, path| async move {
                let luma = match self.service.mean_luma(&path).await {
                    Ok(luma) => {
                        record_luma_probe(false);
                        luma
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "Luma probe failed, assuming mid-gray"
                        );
                        record_luma_probe(true);
                        NEUTRAL_LUMA
                    }
                };
                self.cache.insert_if_absent(path, luma);
            },
        )
        .await;

        count
    }

    /// Pull every distinct clip of `sequence` toward the sequence's mean luma.
    ///
    /// Each distinct path is re-encoded at most once across the lifetime of
    /// this engine; repeats reuse the cached variant. Failed re-encodes leave
    /// the clip as it was.
    pub async fn normalize(
        &self,
        sequence: &[PathBuf],
        strength: f64,
        negligible: f64,
        out_dir: &Path,
    ) -> std::io::Result<LumaNormalization> {
        let distinct = distinct_in_order(sequence);
        if distinct.is_empty() || strength <= 0.0 {
            return Ok(LumaNormalization {
                sequence: sequence.to_vec(),
                global_mean: NEUTRAL_LUMA,
                ..Default::default()
            });
        }

        self.measure_missing(&distinct).await;

        let measured: Vec<(PathBuf, f64)> = distinct
            .iter()
            .map(|p| (p.clone(), self.cache.get_or_neutral(p)))
            .collect();
        let lumas: Vec<f64> = measured.iter().map(|(_, l)| *l).collect();
        let mean = global_mean(&lumas);

        let pending: Vec<LumaAdjustment> = plan_adjustments(&measured, mean, strength, negligible)
            .into_iter()
            .filter(|a| self.adjusted_for(&a.path).is_none())
            .collect();

        info!(
            clips = distinct.len(),
            global_mean = mean,
            encodes = pending.len(),
            "Luma normalization"
        );

        let mut encodes = 0;
        if !pending.is_empty() {
            tokio::fs::create_dir_all(out_dir).await?;
            // Continue numbering after variants made by earlier calls.
            let offset = self.adjusted.read().unwrap_or_else(PoisonError::into_inner).len();

            let results = run_bounded(
                pending,
                self.max_workers,
                Phase::LumaEncode,
                &self.progress,
                |index, adjustment| async move {
                    let output = out_dir.join(format!("lnorm_{:05}.mp4", offset + index));
                    let outcome = self
                        .service
                        .adjust_brightness(
                            &adjustment.path,
                            &output,
                            adjustment.brightness,
                            &self.spec,
                        )
                        .await;
                    (adjustment, outcome)
                },
            )
            .await;

            for (adjustment, outcome) in results {
                match outcome {
                    Ok(adjusted_path) => {
                        record_luma_encode(true);
                        encodes += 1;
                        let estimated = adjustment.estimated_luma(strength);
                        self.cache.insert_if_absent(adjusted_path.clone(), estimated);
                        self.adjusted
                            .write()
                            .unwrap_or_else(PoisonError::into_inner)
                            .entry(adjustment.path)
                            .or_insert(adjusted_path);
                    }
                    Err(e) => {
                        record_luma_encode(false);
                        warn!(
                            path = %adjustment.path.display(),
                            error = %e,
                            "Luma re-encode failed, keeping original"
                        );
                    }
                }
            }
        }

        let mut adjusted = HashMap::new();
        let sequence = sequence
            .iter()
            .map(|path| match self.adjusted_for(path) {
                Some(variant) => {
                    adjusted.insert(variant.clone(), path.clone());
                    variant
                }
                None => path.clone(),
            })
            .collect();

        Ok(LumaNormalization {
            sequence,
            adjusted,
            encodes,
            global_mean: mean,
        })
    }

    /// Flag adjacent clips of `sequence` whose luma jump exceeds `threshold`.
    ///
    /// Uncached clips are measured first. Never fails.
    pub async fn delta_pass(&self, sequence: &[PathBuf], threshold: f64) -> Vec<LumaFlag> {
        if threshold <= 0.0 || sequence.len() < 2 {
            return Vec::new();
        }

        self.measure_missing(sequence).await;

        let lumas: Vec<f64> = sequence
            .iter()
            .map(|p| self.cache.get_or_neutral(p))
            .collect();
        let flags = scan_luma_deltas(&lumas, threshold);

        for flag in &flags {
            warn!(
                position = flag.position,
                delta = flag.delta,
                threshold = flag.threshold,
                from = %sequence[flag.position].display(),
                to = %sequence[flag.position + 1].display(),
                "Luma jump exceeds threshold"
            );
        }
        record_luma_flags(flags.len());

        info!(
            transitions = sequence.len() - 1,
            flagged = flags.len(),
            "Luma delta pass complete"
        );

        flags
    }
}
