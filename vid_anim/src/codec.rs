//! Codec names: canonical aliases and parsing of ffmpeg's "describe input" text.

/// Codec families that get decoder steering and an inventory check before any trial decode.
pub const STEERABLE_CODECS: &[&str] = &["h264", "hevc"];

/// Hardware-accelerated decoder suffixes accepted as a fallback for steerable codecs.
pub const HW_DECODER_SUFFIXES: &[&str] = &["cuvid", "qsv", "vaapi"];

/// Lowercase and map container/tag aliases onto ffmpeg's decoder names.
///
/// Total and idempotent: `normalize_codec(normalize_codec(x)) == normalize_codec(x)`.
pub fn normalize_codec(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.as_str() {
        "avc1" => "h264".to_string(),
        "h265" => "hevc".to_string(),
        _ => lower,
    }
}

pub fn is_steerable(codec: &str) -> bool {
    STEERABLE_CODECS.contains(&codec)
}

/// Scan `ffmpeg -i` diagnostics for the first `Video: <codec> ...` line.
///
/// ```text
///   Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 1920x1080
/// ```
/// yields `h264`. Lines whose codec token is empty are skipped.
pub fn codec_from_describe_output(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| line.split_once("Video:").map(|(_, after)| after))
        .find_map(|after| {
            let first = after.trim().split(',').next().unwrap_or("").trim();
            first.split_whitespace().next().map(normalize_codec)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFMPEG_I_H264: &str = r#"Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':
  Metadata:
    major_brand     : isom
  Duration: 00:00:12.01, start: 0.000000, bitrate: 2050 kb/s
  Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p(progressive), 1920x1080, 1917 kb/s, 30 fps
  Stream #0:1[0x2](und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp, 128 kb/s
At least one output file must be specified"#;

    #[test]
    fn test_describe_output_h264() {
        assert_eq!(codec_from_describe_output(FFMPEG_I_H264), Some("h264".into()));
    }

    #[test]
    fn test_describe_output_aliases_and_case() {
        let text = "  Stream #0:0: Video: AVC1, yuv420p";
        assert_eq!(codec_from_describe_output(text), Some("h264".into()));
        let text = "  Stream #0:0: Video: H265 (Main), yuv420p10le";
        assert_eq!(codec_from_describe_output(text), Some("hevc".into()));
    }

    #[test]
    fn test_describe_output_skips_empty_token() {
        let text = "Stream #0:0: Video: , broken\nStream #0:1: Video: vp9 (Profile 0), yuv420p";
        assert_eq!(codec_from_describe_output(text), Some("vp9".into()));
    }

    #[test]
    fn test_describe_output_without_video() {
        let text = "Stream #0:0: Audio: mp3, 44100 Hz\nclip.mp3: Invalid data found";
        assert_eq!(codec_from_describe_output(text), None);
        assert_eq!(codec_from_describe_output(""), None);
    }

    #[test]
    fn test_normalize_codec() {
        assert_eq!(normalize_codec("avc1"), "h264");
        assert_eq!(normalize_codec("H264"), "h264");
        assert_eq!(normalize_codec("h265"), "hevc");
        assert_eq!(normalize_codec(" HEVC\n"), "hevc");
        assert_eq!(normalize_codec("VP9"), "vp9");
    }

    #[test]
    fn test_is_steerable() {
        assert!(is_steerable("h264"));
        assert!(is_steerable("hevc"));
        assert!(!is_steerable("av1"));
        assert!(!is_steerable("avc1"));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Normalizing twice changes nothing.
        #[test]
        fn prop_normalize_idempotent(name in "[a-zA-Z0-9_ ]{0,16}") {
            let once = normalize_codec(&name);
            prop_assert_eq!(normalize_codec(&once), once);
        }

        /// avc1/h264 and h265/hevc land on the same family in any letter case.
        #[test]
        fn prop_aliases_share_family(upper in any::<[bool; 4]>()) {
            let case = |s: &str| -> String {
                s.chars()
                    .zip(upper.iter().cycle())
                    .map(|(c, up)| if *up { c.to_ascii_uppercase() } else { c })
                    .collect()
            };
            prop_assert_eq!(normalize_codec(&case("avc1")), normalize_codec(&case("h264")));
            prop_assert_eq!(normalize_codec(&case("h265")), normalize_codec(&case("hevc")));
        }
    }
}
