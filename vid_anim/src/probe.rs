//! Input codec probe: stream prober first, ffmpeg's diagnostics as fallback.

use crate::codec::{codec_from_describe_output, normalize_codec};
use crate::engine::MediaTools;
use std::path::Path;
use tracing::debug;

/// Canonical codec name of the first video stream, or `None` when unknown.
///
/// Unknown is not an error: callers proceed and let ffmpeg decide.
pub fn probe_video_codec<T: MediaTools + ?Sized>(tools: &T, input: &Path) -> Option<String> {
    match tools.probe_stream_codec(input) {
        Ok(name) if !name.trim().is_empty() => return Some(normalize_codec(&name)),
        Ok(_) => debug!(input = %input.display(), "ffprobe returned an empty codec name"),
        Err(e) => debug!(input = %input.display(), error = %e, "ffprobe probe failed, falling back to ffmpeg -i"),
    }

    match tools.describe_input(input) {
        Ok(text) => codec_from_describe_output(&text),
        Err(e) => {
            debug!(input = %input.display(), error = %e, "ffmpeg -i probe failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TrialDecode;
    use anyhow::{anyhow, Result};

    struct ProbeOnly {
        ffprobe: Option<&'static str>,
        describe: Option<&'static str>,
    }

    impl MediaTools for ProbeOnly {
        fn probe_stream_codec(&self, _input: &Path) -> Result<String> {
            self.ffprobe
                .map(str::to_string)
                .ok_or_else(|| anyhow!("ffprobe not available"))
        }
        fn describe_input(&self, _input: &Path) -> Result<String> {
            self.describe
                .map(str::to_string)
                .ok_or_else(|| anyhow!("spawn failed"))
        }
        fn list_decoders(&self) -> Result<String> {
            Ok(String::new())
        }
        fn trial_decode(&self, _input: &Path, _decoder: Option<&str>) -> TrialDecode {
            TrialDecode::passed()
        }
    }

    #[test]
    fn test_ffprobe_result_is_normalized() {
        let tools = ProbeOnly {
            ffprobe: Some("H265"),
            describe: None,
        };
        assert_eq!(probe_video_codec(&tools, Path::new("a.mkv")), Some("hevc".into()));
    }

    #[test]
    fn test_falls_back_to_describe_output() {
        let tools = ProbeOnly {
            ffprobe: None,
            describe: Some("  Stream #0:0: Video: avc1 (High), yuv420p, 640x360"),
        };
        assert_eq!(probe_video_codec(&tools, Path::new("a.mp4")), Some("h264".into()));
    }

    #[test]
    fn test_empty_ffprobe_answer_falls_back() {
        let tools = ProbeOnly {
            ffprobe: Some("  "),
            describe: Some("Stream #0:0: Video: vp9, yuv420p"),
        };
        assert_eq!(probe_video_codec(&tools, Path::new("a.webm")), Some("vp9".into()));
    }

    #[test]
    fn test_both_methods_failing_is_unknown() {
        let tools = ProbeOnly {
            ffprobe: None,
            describe: None,
        };
        assert_eq!(probe_video_codec(&tools, Path::new("a.mp4")), None);

        let tools = ProbeOnly {
            ffprobe: None,
            describe: Some("a.mp4: Invalid data found when processing input"),
        };
        assert_eq!(probe_video_codec(&tools, Path::new("a.mp4")), None);
    }
}
