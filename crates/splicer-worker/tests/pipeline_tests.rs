//! End-to-end pipeline tests against the in-memory media service.

mod support;

use std::path::{Path, PathBuf};

use splicer_models::{Manifest, MediaMetadata, SplicerConfig, TargetSpec};
use splicer_worker::chunker::plan_chunks;
use splicer_worker::manifest::{load_manifest, save_manifest};
use splicer_worker::pipeline::manifest_path;
use splicer_worker::{
    Coordinator, NormalizedSource, Phase, Progress, RunReport, SplicerPipeline, SplicerRng,
    WorkerError,
};
use support::FakeMediaService;

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

async fn run(
    fake: &FakeMediaService,
    config: SplicerConfig,
    dir: &Path,
    videos: &[PathBuf],
    images: &[PathBuf],
) -> Result<(RunReport, Manifest), WorkerError> {
    SplicerPipeline::new(fake.shared(), config, dir.join("work"), dir.join("out"))
        .run(videos, images)
        .await
}

fn two_sources() -> FakeMediaService {
    let fake = FakeMediaService::new();
    fake.add_video("a.mp4", 100, 90.0);
    fake.add_video("b.mp4", 100, 150.0);
    fake
}

/// Same seed, same inputs: same chunks, same sequence, and chunk boundaries
/// match an independent replay of the per-source sub-seeds.
#[tokio::test]
async fn test_seeded_runs_are_reproducible() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SplicerConfig::default()
        .with_seed(42)
        .with_chunk_frames(3, 5)
        .without_antistrobe();
    let videos = paths(&["a.mp4", "b.mp4"]);

    let (_, first) = run(&two_sources(), config.clone(), dir.path(), &videos, &[])
        .await
        .expect("first run");
    let (_, second) = run(&two_sources(), config, dir.path(), &videos, &[])
        .await
        .expect("second run");

    assert_eq!(first.chunks, second.chunks);
    assert_eq!(first.sequence_order, second.sequence_order);
    assert_eq!(first.rng_seed, 42);

    let mut parent = SplicerRng::from_seed(42);
    let sub_seeds = [parent.next_seed(), parent.next_seed()];
    let work = dir.path().join("work");

    let mut expected = Vec::new();
    for (source, seed) in sub_seeds.into_iter().enumerate() {
        let plans = plan_chunks(100, 3, 5, &mut SplicerRng::from_seed(seed));
        for (local, plan) in plans.into_iter().enumerate() {
            expected.push((
                work.join("normalized").join(format!("norm_{:04}.mp4", source)),
                plan.start_frame,
                plan.frame_count,
                work.join("chunks")
                    .join(format!("v{:04}", source))
                    .join(format!("chunk_{:05}.mp4", local)),
            ));
        }
    }
    let actual: Vec<_> = first
        .chunks
        .iter()
        .map(|c| {
            (
                c.source_file.clone(),
                c.start_frame,
                c.frame_count,
                c.chunk_path.clone(),
            )
        })
        .collect();
    assert_eq!(actual, expected);

    for (index, chunk) in first.chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, index);
        assert!((3..=5).contains(&chunk.frame_count));
    }

    // With no images the sequence is one shuffle drawn after the sub-seeds.
    let mut sequence: Vec<PathBuf> = first.chunks.iter().map(|c| c.chunk_path.clone()).collect();
    parent.shuffle(&mut sequence);
    assert_eq!(first.sequence_order, sequence);
}

/// A slow first source still gets the first chunk indices.
#[tokio::test]
async fn test_chunk_indices_follow_submission_order() {
    let fake = two_sources();
    fake.delay("a.mp4", 50);
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SplicerConfig::default()
        .with_seed(7)
        .with_chunk_frames(10, 20)
        .without_antistrobe();

    let (_, manifest) = run(&fake, config, dir.path(), &paths(&["a.mp4", "b.mp4"]), &[])
        .await
        .expect("run");

    let first_b = manifest
        .chunks
        .iter()
        .position(|c| c.source_file.ends_with("norm_0001.mp4"))
        .expect("chunks from b");
    assert!(first_b > 0);
    assert!(manifest.chunks[..first_b]
        .iter()
        .all(|c| c.source_file.ends_with("norm_0000.mp4")));
    assert!(manifest.chunks[first_b..]
        .iter()
        .all(|c| c.source_file.ends_with("norm_0001.mp4")));
}

/// Inputs that fail probing or normalization are skipped and recorded.
#[tokio::test]
async fn test_failed_sources_are_skipped() {
    let fake = FakeMediaService::new();
    fake.add_video("good.mp4", 60, 100.0);
    fake.add_video("unprobable.mp4", 60, 100.0);
    fake.add_video("unencodable.mp4", 60, 100.0);
    fake.fail_probe("unprobable.mp4");
    fake.fail_normalize("unencodable.mp4");
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SplicerConfig::default().with_seed(3).without_antistrobe();

    let (report, manifest) = run(
        &fake,
        config,
        dir.path(),
        &paths(&["unprobable.mp4", "good.mp4", "unencodable.mp4"]),
        &[],
    )
    .await
    .expect("run");

    let mut skipped: Vec<PathBuf> = manifest.skipped_inputs.iter().map(|s| s.path.clone()).collect();
    skipped.sort();
    assert_eq!(skipped, paths(&["unencodable.mp4", "unprobable.mp4"]));
    assert_eq!(report.skipped, 2);
    assert_eq!(report.videos_used, 1);
    assert!(manifest
        .chunks
        .iter()
        .all(|c| c.source_file.ends_with("norm_0001.mp4")));
}

/// Nothing usable is a run-level error.
#[tokio::test]
async fn test_no_surviving_inputs() {
    let fake = FakeMediaService::new();
    fake.add_video("a.mp4", 60, 100.0);
    fake.fail_probe("a.mp4");
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SplicerConfig::default().with_seed(1);

    let result = run(&fake, config, dir.path(), &paths(&["a.mp4", "missing.png"]), &[]).await;

    assert!(matches!(result, Err(WorkerError::NoSurvivingInputs)));
}

/// Images alone are enough to produce an output.
#[tokio::test]
async fn test_images_only_run() {
    let fake = FakeMediaService::new();
    fake.add_image("one.png", 80.0);
    fake.add_image("two.png", 160.0);
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SplicerConfig::default().with_seed(12).without_antistrobe();

    let (report, manifest) = run(
        &fake,
        config.clone(),
        dir.path(),
        &[],
        &paths(&["one.png", "two.png"]),
    )
    .await
    .expect("run");

    assert_eq!(report.chunks, 0);
    assert_eq!(report.images_used, 2);
    assert_eq!(manifest.sequence_order.len(), 2);
    assert_eq!(manifest.image_insertions.len(), 2);

    let total: u64 = manifest
        .image_insertions
        .iter()
        .map(|i| u64::from(i.duration_frames))
        .sum();
    assert_eq!(report.expected_frames, total);
    assert_eq!(report.actual_frames, total);
    for insertion in &manifest.image_insertions {
        assert!(insertion.duration_frames >= config.image_frames_min);
        assert!(insertion.duration_frames <= config.image_frames_max);
    }
}

/// A failed concatenation fails the run.
#[tokio::test]
async fn test_concat_failure_fails_run() {
    let fake = two_sources();
    fake.fail_concat();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SplicerConfig::default().with_seed(2).without_antistrobe();

    let result = run(&fake, config, dir.path(), &paths(&["a.mp4", "b.mp4"]), &[]).await;

    assert!(matches!(result, Err(WorkerError::ConcatFailed(_))));
}

/// An invalid configuration is rejected before any media work.
#[tokio::test]
async fn test_invalid_config_rejected() {
    let fake = two_sources();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SplicerConfig {
        chunk_frames_min: 10,
        chunk_frames_max: 5,
        ..SplicerConfig::default()
    };

    let result = run(&fake, config, dir.path(), &paths(&["a.mp4"]), &[]).await;

    assert!(matches!(result, Err(WorkerError::Config(_))));
    assert!(fake.calls().is_empty());
}

/// An unseeded run records the seed it drew, in both places.
#[tokio::test]
async fn test_drawn_seed_recorded_in_manifest() {
    let fake = two_sources();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SplicerConfig::default().without_antistrobe();
    assert!(config.rng_seed.is_none());

    let (report, manifest) = run(&fake, config, dir.path(), &paths(&["a.mp4"]), &[])
        .await
        .expect("run");

    assert_eq!(manifest.config.rng_seed, Some(manifest.rng_seed));
    assert_eq!(report.seed, manifest.rng_seed);
    assert!(manifest.rng_seed <= i32::MAX as u64);
}

/// The full anti-strobe path runs end to end and frames still reconcile.
#[tokio::test]
async fn test_antistrobe_run_reconciles_frames() {
    let fake = two_sources();
    fake.add_image("flash.png", 250.0);
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SplicerConfig {
        antistrobe_enabled: true,
        antistrobe_buffer_frames: 2,
        antistrobe_luma_strength: 0.5,
        antistrobe_delta_threshold: 60.0,
        ..SplicerConfig::default().with_seed(99).with_chunk_frames(20, 30)
    };
    let progress = Progress::new();

    let (report, manifest) = SplicerPipeline::new(
        fake.shared(),
        config,
        dir.path().join("work"),
        dir.path().join("out"),
    )
    .with_progress(progress.clone())
    .run(&paths(&["a.mp4", "b.mp4"]), &paths(&["flash.png"]))
    .await
    .expect("run");

    let entries = manifest.sequence_order.len();
    assert_eq!(entries, 2 * (report.chunks + 1) - 1);
    assert_eq!(report.sequence_len, entries);
    assert!(report.luma_encodes > 0);

    let chunk_frames: u64 = manifest.chunks.iter().map(|c| c.frame_count).sum();
    let image_frames = u64::from(manifest.image_insertions[0].duration_frames);
    let buffers = (entries as u64 - 1) / 2;
    let buffer_frames = buffers * 2;
    assert_eq!(
        report.expected_frames,
        chunk_frames + image_frames + buffer_frames
    );
    assert_eq!(manifest.frame_mismatch(), 0);
    assert_eq!(manifest.luma_flags.len(), report.luma_flags);

    let (done, total) = progress.snapshot(Phase::Normalize);
    assert_eq!((done, total), (2, 2));
}

/// The saved manifest reads back with the same decisions.
#[tokio::test]
async fn test_manifest_saved_next_to_output() {
    let fake = two_sources();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SplicerConfig::default().with_seed(5).without_antistrobe();

    let (report, manifest) = run(&fake, config, dir.path(), &paths(&["a.mp4", "b.mp4"]), &[])
        .await
        .expect("run");

    let file = manifest_path(&dir.path().join("out"));
    save_manifest(&manifest, &file).await.expect("save");
    let loaded = load_manifest(&file).await.expect("load");

    assert_eq!(loaded.sequence_order, manifest.sequence_order);
    assert_eq!(loaded.chunks, manifest.chunks);
    assert_eq!(loaded.output_path, Some(report.output));
    assert!(loaded.output_checksum.starts_with("sha256:"));
}

/// Chunking with an inverted range fails without consuming the generator.
#[tokio::test]
async fn test_chunking_rejects_inverted_range() {
    let fake = two_sources();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SplicerConfig {
        chunk_frames_min: 9,
        chunk_frames_max: 4,
        ..SplicerConfig::default().with_seed(8)
    };
    let coordinator = Coordinator::new(fake.shared(), TargetSpec::from(&config), 2);
    let sources = vec![NormalizedSource {
        index: 0,
        original: PathBuf::from("a.mp4"),
        normalized: PathBuf::from("a.mp4"),
        metadata: MediaMetadata::video("a.mp4", 100, 24.0),
    }];
    let mut rng = SplicerRng::from_seed(8);

    let result = coordinator
        .chunk_sources(&sources, &config, &mut rng, dir.path())
        .await;

    assert!(matches!(result, Err(WorkerError::Config(_))));
    assert!(fake.calls().is_empty());
    assert_eq!(rng.next_seed(), SplicerRng::from_seed(8).next_seed());
}
