//! The conversion engine (ffmpeg) and stream prober (ffprobe) in their
//! non-transcoding modes: describe input, list decoders, trial decode, probe.
//!
//! Everything above this module talks to [`MediaTools`], so probing and
//! preflight logic can be exercised without ffmpeg installed.

use anyhow::{bail, Context, Result};
use shared_utils::{capture, capture_with_timeout, safe_path_arg, AppError, TimedOutput, ToolPaths};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Seconds of input decoded by the preflight trial decode.
pub const TRIAL_DECODE_SECONDS: &str = "0.2";

/// Wall-clock limit for the trial decode.
pub const TRIAL_DECODE_TIMEOUT: Duration = Duration::from_secs(8);

/// Outcome of a short decode of the input into the null muxer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialDecode {
    pub ok: bool,
    /// stderr of the decode, or a short reason when it never ran to completion
    pub diagnostics: String,
}

impl TrialDecode {
    pub fn passed() -> Self {
        Self {
            ok: true,
            diagnostics: String::new(),
        }
    }

    pub fn failed(diagnostics: impl Into<String>) -> Self {
        Self {
            ok: false,
            diagnostics: diagnostics.into(),
        }
    }
}

pub trait MediaTools {
    /// First video stream's codec name as reported by the stream prober.
    fn probe_stream_codec(&self, input: &Path) -> Result<String>;

    /// Diagnostic text of `ffmpeg -hide_banner -i <input>` (stderr, then stdout).
    fn describe_input(&self, input: &Path) -> Result<String>;

    /// Raw `ffmpeg -hide_banner -decoders` listing.
    fn list_decoders(&self) -> Result<String>;

    /// Decode a fraction of a second of `input`, optionally forcing a decoder.
    fn trial_decode(&self, input: &Path, decoder: Option<&str>) -> TrialDecode;
}

/// [`MediaTools`] backed by the real binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    ffmpeg: PathBuf,
    ffprobe: Option<PathBuf>,
}

impl FfmpegTools {
    pub fn new(paths: &ToolPaths) -> Result<Self, AppError> {
        Ok(Self {
            ffmpeg: paths.require_ffmpeg()?.to_path_buf(),
            ffprobe: paths.ffprobe.clone(),
        })
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    fn ffmpeg_cmd(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-hide_banner");
        cmd
    }
}

impl MediaTools for FfmpegTools {
    fn probe_stream_codec(&self, input: &Path) -> Result<String> {
        let Some(ffprobe) = &self.ffprobe else {
            bail!("ffprobe not available");
        };
        let mut cmd = Command::new(ffprobe);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_name",
            "-of",
            "default=nw=1:nk=1",
        ])
        .arg(safe_path_arg(input));

        let out = capture(&mut cmd)?;
        if !out.success() {
            bail!(
                "ffprobe exited with {:?}: {}",
                out.status.code(),
                out.stderr.trim()
            );
        }
        out.stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .context("ffprobe reported no video stream")
    }

    fn describe_input(&self, input: &Path) -> Result<String> {
        let mut cmd = self.ffmpeg_cmd();
        cmd.arg("-i").arg(safe_path_arg(input));
        // always exits non-zero ("At least one output file must be specified")
        let out = capture(&mut cmd)?;
        Ok(out.combined())
    }

    fn list_decoders(&self) -> Result<String> {
        let mut cmd = self.ffmpeg_cmd();
        cmd.arg("-decoders");
        let out = capture(&mut cmd)?;
        if !out.success() {
            bail!("ffmpeg -decoders exited with {:?}", out.status.code());
        }
        Ok(out.stdout)
    }

    fn trial_decode(&self, input: &Path, decoder: Option<&str>) -> TrialDecode {
        let mut cmd = self.ffmpeg_cmd();
        cmd.args(["-v", "error"]);
        if let Some(dec) = decoder {
            cmd.args(["-c:v", dec]);
        }
        cmd.args(["-t", TRIAL_DECODE_SECONDS, "-i"])
            .arg(safe_path_arg(input))
            .args(["-f", "null", "-"]);

        match capture_with_timeout(&mut cmd, TRIAL_DECODE_TIMEOUT) {
            Ok(TimedOutput::Finished(out)) => {
                debug!(ok = out.success(), decoder = ?decoder, "Trial decode finished");
                TrialDecode {
                    ok: out.success(),
                    diagnostics: out.stderr,
                }
            }
            Ok(TimedOutput::TimedOut { .. }) => TrialDecode::failed("timeout"),
            Err(e) => TrialDecode::failed(format!("{:#}", e)),
        }
    }
}
