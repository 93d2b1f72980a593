//! Transcode invocations per output format.
//!
//! Builders are pure: they only assemble argument vectors. The one side effect
//! of planning is the GIF palette directory, owned by [`TempWorkspace`].

use crate::filter_chain::build_filter_chain;
use crate::request::{ConversionRequest, OutputFormat};
use serde::{Serialize, Serializer};
use shared_utils::{note_optional, quote_parts, safe_path_arg};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::debug;

pub const PALETTE_LABEL: &str = "palettegen";
pub const ENCODE_LABEL: &str = "encode";

const PALETTE_FILE: &str = "palette.png";
const PALETTEUSE: &str = "paletteuse=dither=sierra2_4a";

/// One engine invocation.
///
/// Arguments are kept as `OsString` so file names reach the engine byte for
/// byte; only [`display_command`](Self::display_command) and the JSON form
/// render them lossily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStep {
    pub label: String,
    pub program: PathBuf,
    #[serde(serialize_with = "serialize_lossy")]
    pub args: Vec<OsString>,
}

fn serialize_lossy<S: Serializer>(args: &[OsString], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(args.iter().map(|a| a.to_string_lossy()))
}

impl PipelineStep {
    fn new(label: &str, program: &Path, args: Vec<OsString>) -> Self {
        Self {
            label: label.to_string(),
            program: program.to_path_buf(),
            args,
        }
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(self.program.clone().into_os_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Command line for the conversion log.
    pub fn display_command(&self) -> String {
        let parts: Vec<String> = self
            .argv()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        quote_parts(&parts)
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    pub fn has_flag_pair(&self, flag: &str, value: &str) -> bool {
        self.args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }
}

fn path_arg(path: &Path) -> OsString {
    safe_path_arg(path).into_owned()
}

/// `-hide_banner -y [decoder override] -i <input>`
fn input_args(request: &ConversionRequest, decoder_args: &[String]) -> Vec<OsString> {
    let mut args = os_args(&["-hide_banner", "-y"]);
    args.extend(decoder_args.iter().map(OsString::from));
    args.push("-i".into());
    args.push(path_arg(&request.input));
    args
}

fn os_args(parts: &[&str]) -> Vec<OsString> {
    parts.iter().map(OsString::from).collect()
}

/// Lossy WebP, `-loop 0` when looping.
pub fn build_webp_step(
    ffmpeg: &Path,
    request: &ConversionRequest,
    decoder_args: &[String],
) -> PipelineStep {
    let mut args = input_args(request, decoder_args);
    args.push("-vf".into());
    args.push(build_filter_chain(request).into());
    args.extend(os_args(&["-an", "-c:v", "libwebp", "-lossless", "0", "-q:v"]));
    args.push(request.quality.to_string().into());
    if request.loop_forever {
        args.extend(os_args(&["-loop", "0"]));
    }
    args.push(path_arg(&request.output));
    PipelineStep::new(ENCODE_LABEL, ffmpeg, args)
}

/// APNG, `-plays 0` when looping. No quality knob.
pub fn build_apng_step(
    ffmpeg: &Path,
    request: &ConversionRequest,
    decoder_args: &[String],
) -> PipelineStep {
    let mut args = input_args(request, decoder_args);
    args.push("-vf".into());
    args.push(build_filter_chain(request).into());
    args.extend(os_args(&["-an", "-c:v", "apng"]));
    if request.loop_forever {
        args.extend(os_args(&["-plays", "0"]));
    }
    args.push(path_arg(&request.output));
    PipelineStep::new(ENCODE_LABEL, ffmpeg, args)
}

/// Two-pass GIF: generate a palette into `palette`, then encode with it.
pub fn build_gif_steps(
    ffmpeg: &Path,
    request: &ConversionRequest,
    decoder_args: &[String],
    palette: &Path,
) -> Vec<PipelineStep> {
    let vf = build_filter_chain(request);
    let palette_arg = path_arg(palette);

    let mut palettegen = input_args(request, decoder_args);
    palettegen.push("-vf".into());
    palettegen.push(format!("{},palettegen", vf).into());
    palettegen.push(palette_arg.clone());

    let mut encode = input_args(request, decoder_args);
    encode.push("-i".into());
    encode.push(palette_arg);
    encode.push("-lavfi".into());
    encode.push(format!("{}[x];[x][1:v]{}", vf, PALETTEUSE).into());
    encode.push("-an".into());
    if request.loop_forever {
        encode.extend(os_args(&["-loop", "0"]));
    }
    encode.push(path_arg(&request.output));

    vec![
        PipelineStep::new(PALETTE_LABEL, ffmpeg, palettegen),
        PipelineStep::new(ENCODE_LABEL, ffmpeg, encode),
    ]
}

/// Scratch directory for the GIF palette. Removed on [`close`](Self::close)
/// or drop; removal errors are logged and ignored.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("vid_anim_").tempdir()?;
        debug!(path = %dir.path().display(), "Created palette workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn palette_path(&self) -> PathBuf {
        self.dir.path().join(PALETTE_FILE)
    }

    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            note_optional(&format!("Removing palette workspace {}", path.display()), e);
        }
    }
}

/// Everything needed to run one conversion.
#[derive(Debug, Serialize)]
pub struct ConversionPlan {
    pub format: OutputFormat,
    pub steps: Vec<PipelineStep>,
    #[serde(skip)]
    pub workspace: Option<TempWorkspace>,
}

impl ConversionPlan {
    /// Step labels in execution order.
    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.label.as_str()).collect()
    }
}

/// Build the steps for `request`, creating the palette workspace for GIF.
pub fn plan_conversion(
    ffmpeg: &Path,
    request: &ConversionRequest,
    decoder_args: &[String],
) -> io::Result<ConversionPlan> {
    let (steps, workspace) = match request.format {
        OutputFormat::Webp => (vec![build_webp_step(ffmpeg, request, decoder_args)], None),
        OutputFormat::Apng => (vec![build_apng_step(ffmpeg, request, decoder_args)], None),
        OutputFormat::Gif => {
            let ws = TempWorkspace::create()?;
            let steps = build_gif_steps(ffmpeg, request, decoder_args, &ws.palette_path());
            (steps, Some(ws))
        }
    };
    Ok(ConversionPlan {
        format: request.format,
        steps,
        workspace,
    })
}
