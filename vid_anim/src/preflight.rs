//! Decode feasibility check run before any transcode is spawned.
//!
//! Policy, in order:
//! 1. unknown codec: pass and let the engine try
//! 2. h264/hevc with neither the software decoder nor a `_cuvid`/`_qsv`/`_vaapi`
//!    variant in the inventory: fail with remediation, no trial decode
//! 3. h264/hevc with only accelerated variants: pass, no trial decode
//! 4. everything else: trial decode ~0.2 s of input, forcing the software
//!    decoder when the inventory has it

use crate::codec::is_steerable;
use crate::decoders::{has_any_variant, has_exact, DecoderInventory, DecoderSet};
use crate::engine::MediaTools;
use crate::probe::probe_video_codec;
use crate::remediation::{remediation_message, DistroInfo};
use shared_utils::AppError;
use std::path::Path;
use tracing::{debug, info, warn};

/// Verdict of the feasibility check. `message` is empty when `ok`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub ok: bool,
    pub message: String,
    /// Codec the remediation text is about
    pub blamed: Option<String>,
}

impl Preflight {
    fn pass() -> Self {
        Self {
            ok: true,
            message: String::new(),
            blamed: None,
        }
    }

    fn fail(codec: &str, distro: &DistroInfo) -> Self {
        Self {
            ok: false,
            message: remediation_message(codec, distro),
            blamed: Some(codec.to_string()),
        }
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.ok {
            return Ok(());
        }
        Err(AppError::DecodeInfeasible {
            codec: self.blamed.unwrap_or_default(),
            remediation: self.message,
        })
    }
}

/// Probe `input` and check that the host can decode it.
pub fn preflight<T: MediaTools + ?Sized>(
    tools: &T,
    inventory: &DecoderInventory,
    input: &Path,
    distro: &DistroInfo,
) -> Preflight {
    let codec = probe_video_codec(tools, input);
    preflight_for_codec(tools, inventory, input, codec.as_deref(), distro)
}

/// [`preflight`] with an already probed codec.
pub fn preflight_for_codec<T: MediaTools + ?Sized>(
    tools: &T,
    inventory: &DecoderInventory,
    input: &Path,
    codec: Option<&str>,
    distro: &DistroInfo,
) -> Preflight {
    let Some(codec) = codec else {
        debug!(input = %input.display(), "Codec unknown, skipping preflight");
        return Preflight::pass();
    };

    let mut forced = None;
    if is_steerable(codec) {
        let decoders = inventory.available(tools);
        if !has_any_variant(decoders, codec) {
            warn!(codec, "No decoder for this codec in the ffmpeg inventory");
            return Preflight::fail(codec, distro);
        }
        if !has_exact(decoders, codec) {
            info!(codec, "Only hardware decoders available, skipping trial decode");
            return Preflight::pass();
        }
        forced = Some(codec);
    }

    let trial = tools.trial_decode(input, forced);
    if trial.ok {
        return Preflight::pass();
    }
    let blamed = blame_codec(&trial.diagnostics, codec);
    warn!(probed = codec, blamed = %blamed, "Trial decode failed");
    Preflight::fail(&blamed, distro)
}

/// Codec to name in the remediation text, refined from trial-decode stderr.
pub fn blame_codec(diagnostics: &str, probed: &str) -> String {
    let text = diagnostics.to_lowercase();
    let no_decoder = text.contains("no decoder");
    if text.contains("openh264") {
        "h264".to_string()
    } else if no_decoder && text.contains("hevc") {
        "hevc".to_string()
    } else if no_decoder && text.contains("h264") {
        "h264".to_string()
    } else {
        probed.to_string()
    }
}

/// `-c:v <codec>` when the input is h264/hevc and the software decoder exists.
pub fn decoder_override_args<T: MediaTools + ?Sized>(
    tools: &T,
    inventory: &DecoderInventory,
    input: &Path,
) -> Vec<String> {
    match probe_video_codec(tools, input) {
        Some(codec) if is_steerable(&codec) => {
            decoder_args_for_codec(inventory.available(tools), Some(&codec))
        }
        _ => Vec::new(),
    }
}

/// Pure half of [`decoder_override_args`].
pub fn decoder_args_for_codec(decoders: &DecoderSet, codec: Option<&str>) -> Vec<String> {
    match codec {
        Some(c) if is_steerable(c) && has_exact(decoders, c) => {
            vec!["-c:v".to_string(), c.to_string()]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TrialDecode;
    use anyhow::{anyhow, Result};
    use std::cell::RefCell;

    struct FakeTools {
        codec: Option<&'static str>,
        decoders: &'static str,
        trial: TrialDecode,
        trial_calls: RefCell<Vec<Option<String>>>,
    }

    impl FakeTools {
        fn new(codec: Option<&'static str>, decoders: &'static str) -> Self {
            Self {
                codec,
                decoders,
                trial: TrialDecode::passed(),
                trial_calls: RefCell::new(Vec::new()),
            }
        }

        fn failing_trial(mut self, stderr: &str) -> Self {
            self.trial = TrialDecode::failed(stderr);
            self
        }
    }

    impl MediaTools for FakeTools {
        fn probe_stream_codec(&self, _input: &Path) -> Result<String> {
            self.codec
                .map(str::to_string)
                .ok_or_else(|| anyhow!("no stream"))
        }
        fn describe_input(&self, _input: &Path) -> Result<String> {
            Ok("Invalid data found when processing input".to_string())
        }
        fn list_decoders(&self) -> Result<String> {
            Ok(self.decoders.to_string())
        }
        fn trial_decode(&self, _input: &Path, decoder: Option<&str>) -> TrialDecode {
            self.trial_calls.borrow_mut().push(decoder.map(str::to_string));
            self.trial.clone()
        }
    }

    const FULL: &str = " VFS..D h264   H.264\n VFS..D hevc   HEVC\n V....D vp9    VP9\n";
    const EMPTY: &str = "";

    fn run(tools: &FakeTools) -> Preflight {
        let distro = DistroInfo::parse("ID=ubuntu\n");
        preflight(tools, &DecoderInventory::new(), Path::new("in.mp4"), &distro)
    }

    #[test]
    fn test_unknown_codec_passes_without_decode() {
        let tools = FakeTools::new(None, EMPTY);
        assert!(run(&tools).ok);
        assert!(tools.trial_calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_decoder_fails_without_decode() {
        let tools = FakeTools::new(Some("hevc"), " V....D vp9  VP9\n");
        let verdict = run(&tools);
        assert!(!verdict.ok);
        assert!(verdict.message.contains("HEVC"));
        assert!(verdict.message.contains("apt"));
        assert!(tools.trial_calls.borrow().is_empty());
    }

    #[test]
    fn test_hardware_only_passes_without_decode() {
        let tools = FakeTools::new(Some("h264"), " V..... h264_qsv  QSV\n");
        assert!(run(&tools).ok);
        assert!(tools.trial_calls.borrow().is_empty());
    }

    #[test]
    fn test_software_decoder_is_forced_in_trial() {
        let tools = FakeTools::new(Some("avc1"), FULL);
        assert!(run(&tools).ok);
        assert_eq!(*tools.trial_calls.borrow(), vec![Some("h264".to_string())]);
    }

    #[test]
    fn test_other_codecs_always_trial_decode_unforced() {
        let tools = FakeTools::new(Some("vp9"), EMPTY);
        assert!(run(&tools).ok);
        assert_eq!(*tools.trial_calls.borrow(), vec![None]);
    }

    #[test]
    fn test_failed_trial_blames_from_stderr() {
        let tools = FakeTools::new(Some("h264"), FULL)
            .failing_trial("[libopenh264 @ 0x55] DecodeFrame failed");
        let verdict = run(&tools);
        assert!(!verdict.ok);
        assert!(verdict.message.contains("decode H264"));
    }

    #[test]
    fn test_timeout_blames_probed_codec() {
        let tools = FakeTools::new(Some("vp9"), EMPTY).failing_trial("timeout");
        let verdict = run(&tools);
        assert!(!verdict.ok);
        assert!(verdict.message.contains("decode VP9"));
    }

    #[test]
    fn test_blame_codec() {
        assert_eq!(blame_codec("Error while opening OpenH264 decoder", "hevc"), "h264");
        assert_eq!(blame_codec("No decoder found for codec hevc", "vp9"), "hevc");
        assert_eq!(blame_codec("no decoder for h264 stream", "vp9"), "h264");
        assert_eq!(blame_codec("h264 is mentioned without the phrase", "av1"), "av1");
        assert_eq!(blame_codec("", "av1"), "av1");
    }

    #[test]
    fn test_override_args() {
        let tools = FakeTools::new(Some("H265"), FULL);
        let inventory = DecoderInventory::new();
        assert_eq!(
            decoder_override_args(&tools, &inventory, Path::new("in.mkv")),
            vec!["-c:v", "hevc"]
        );

        let tools = FakeTools::new(Some("hevc"), " V..... hevc_cuvid  CUVID\n");
        let inventory = DecoderInventory::new();
        assert!(decoder_override_args(&tools, &inventory, Path::new("in.mkv")).is_empty());

        let tools = FakeTools::new(Some("vp9"), FULL);
        let inventory = DecoderInventory::new();
        assert!(decoder_override_args(&tools, &inventory, Path::new("in.webm")).is_empty());
    }

    #[test]
    fn test_into_result() {
        let tools = FakeTools::new(Some("h264"), FULL).failing_trial("No decoder for hevc");
        match run(&tools).into_result() {
            Err(AppError::DecodeInfeasible { codec, remediation }) => {
                assert_eq!(codec, "hevc");
                assert!(remediation.contains("decode HEVC"));
            }
            other => panic!("expected DecodeInfeasible, got {:?}", other),
        }
        assert!(run(&FakeTools::new(None, EMPTY)).into_result().is_ok());
    }

    #[test]
    fn test_decoder_args_for_unknown_codec() {
        let set = crate::decoders::parse_decoder_listing(FULL);
        assert!(decoder_args_for_codec(&set, None).is_empty());
    }
}
