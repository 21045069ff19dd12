//! FFmpeg filter graph definitions.

use splicer_models::encoding::NEUTRAL_GRAY;
use splicer_models::{AspectMode, TargetSpec};

/// Per-frame average luma, printed to stderr.
pub const LUMA_PROBE_FILTER: &str = "signalstats,metadata=print:key=lavfi.signalstats.YAVG";

/// Full desaturation.
pub const GREYSCALE_FILTER: &str = "hue=s=0";

/// Scale/pad/crop to the target, force CFR, then convert pixel format.
pub fn normalize_filter(spec: &TargetSpec) -> String {
    let (w, h) = (spec.width, spec.height);

    let mut parts = match spec.aspect_mode {
        AspectMode::Letterbox => vec![
            format!("scale={}:{}:force_original_aspect_ratio=decrease", w, h),
            format!("pad={}:{}:(ow-iw)/2:(oh-ih)/2", w, h),
        ],
        AspectMode::Crop => vec![
            format!("scale={}:{}:force_original_aspect_ratio=increase", w, h),
            format!("crop={}:{}", w, h),
        ],
        AspectMode::Stretch => vec![format!("scale={}:{}", w, h)],
    };

    parts.push(format!("fps={}", spec.fps));
    parts.push(format!("format={}", spec.pix_fmt));

    parts.join(",")
}

/// Frame-exact cut of `[start_frame, end_frame)` with timestamps reset.
pub fn trim_filter(start_frame: u64, end_frame: u64) -> String {
    format!(
        "trim=start_frame={}:end_frame={},setpts=PTS-STARTPTS",
        start_frame, end_frame
    )
}

/// Brightness shift; `brightness` is in `[-1, 1]`.
pub fn brightness_filter(brightness: f64) -> String {
    format!("eq=brightness={:.4}", brightness.clamp(-1.0, 1.0))
}

/// lavfi source for a solid mid-gray clip of `frames` frames.
pub fn buffer_source(spec: &TargetSpec, frames: u32) -> String {
    format!(
        "color=c=0x{:02x}{:02x}{:02x}:s={}x{}:r={}:d={}",
        NEUTRAL_GRAY,
        NEUTRAL_GRAY,
        NEUTRAL_GRAY,
        spec.width,
        spec.height,
        spec.fps,
        spec.frames_to_secs(frames)
    )
}

/// Muxer arguments that cut a stream copy into `secs`-second files.
pub fn segment_args(secs: u32) -> [String; 6] {
    [
        "-f".to_string(),
        "segment".to_string(),
        "-segment_time".to_string(),
        secs.to_string(),
        "-reset_timestamps".to_string(),
        "1".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use splicer_models::SplicerConfig;

    fn spec(aspect_mode: AspectMode) -> TargetSpec {
        TargetSpec::from(&SplicerConfig {
            aspect_mode,
            ..Default::default()
        })
    }

    #[test]
    fn test_letterbox_filter() {
        assert_eq!(
            normalize_filter(&spec(AspectMode::Letterbox)),
            "scale=1920:1080:force_original_aspect_ratio=decrease,\
             pad=1920:1080:(ow-iw)/2:(oh-ih)/2,fps=24,format=yuv420p"
        );
    }

    #[test]
    fn test_crop_filter() {
        let filter = normalize_filter(&spec(AspectMode::Crop));
        assert!(filter.starts_with("scale=1920:1080:force_original_aspect_ratio=increase,crop=1920:1080"));
        assert!(filter.ends_with("fps=24,format=yuv420p"));
    }

    #[test]
    fn test_stretch_filter() {
        assert_eq!(
            normalize_filter(&spec(AspectMode::Stretch)),
            "scale=1920:1080,fps=24,format=yuv420p"
        );
    }

    #[test]
    fn test_trim_filter() {
        assert_eq!(
            trim_filter(10, 14),
            "trim=start_frame=10:end_frame=14,setpts=PTS-STARTPTS"
        );
    }

    #[test]
    fn test_brightness_filter_clamps() {
        assert_eq!(brightness_filter(0.0549), "eq=brightness=0.0549");
        assert_eq!(brightness_filter(-3.0), "eq=brightness=-1.0000");
    }

    #[test]
    fn test_buffer_source() {
        let source = buffer_source(&spec(AspectMode::Letterbox), 12);
        assert_eq!(source, "color=c=0x808080:s=1920x1080:r=24:d=0.5");
    }

    #[test]
    fn test_segment_args() {
        assert_eq!(
            segment_args(60).join(" "),
            "-f segment -segment_time 60 -reset_timestamps 1"
        );
    }
}
