//! Engine metrics.
//!
//! The engine only records; installing an exporter is the caller's business.
//! Without a recorder every call is a no-op.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const SOURCES_SKIPPED_TOTAL: &str = "splicer_sources_skipped_total";
    pub const CHUNKS_EXTRACTED_TOTAL: &str = "splicer_chunks_extracted_total";
    pub const LUMA_PROBES_TOTAL: &str = "splicer_luma_probes_total";
    pub const LUMA_ENCODES_TOTAL: &str = "splicer_luma_encodes_total";
    pub const LUMA_FLAGS_TOTAL: &str = "splicer_luma_flags_total";
}

/// Record a skipped input, labelled `video` or `image`.
pub fn record_source_skipped(kind: &'static str) {
    counter!(names::SOURCES_SKIPPED_TOTAL, "kind" => kind).increment(1);
}

pub fn record_chunks_extracted(count: usize) {
    counter!(names::CHUNKS_EXTRACTED_TOTAL).increment(count as u64);
}

/// Record a luma measurement; `fallback` is true when the neutral default was used.
pub fn record_luma_probe(fallback: bool) {
    let outcome = if fallback { "fallback" } else { "measured" };
    counter!(names::LUMA_PROBES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_luma_encode(success: bool) {
    let status = if success { "success" } else { "failed" };
    counter!(names::LUMA_ENCODES_TOTAL, "status" => status).increment(1);
}

pub fn record_luma_flags(count: usize) {
    counter!(names::LUMA_FLAGS_TOTAL).increment(count as u64);
}
