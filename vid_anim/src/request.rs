//! Conversion request: user input → validated, immutable parameters for one run.

use serde::{Deserialize, Serialize};
use shared_utils::ValidationError;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_WIDTH: u32 = 480;
pub const DEFAULT_FPS: u32 = 10;
pub const DEFAULT_SPEED: f64 = 8.0;
pub const DEFAULT_QUALITY: u8 = 60;

/// Animation container produced by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    Gif,
    Apng,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Gif => "gif",
            OutputFormat::Apng => "apng",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Only lossy WebP takes a quality setting.
    pub fn uses_quality(&self) -> bool {
        matches!(self, OutputFormat::Webp)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one conversion. Built once by [`RequestInput::validate`], then only read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub width: u32,
    pub fps: u32,
    /// 8.0 → eight times faster than the source
    pub speed: f64,
    /// 0-100, WebP only
    pub quality: u8,
    pub loop_forever: bool,
    pub interpolate: bool,
}

/// Raw, unvalidated user input.
#[derive(Debug, Clone)]
pub struct RequestInput {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub width: u32,
    pub fps: u32,
    pub speed: f64,
    pub quality: u8,
    pub loop_forever: bool,
    pub interpolate: bool,
}

impl Default for RequestInput {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            format: OutputFormat::Webp,
            width: DEFAULT_WIDTH,
            fps: DEFAULT_FPS,
            speed: DEFAULT_SPEED,
            quality: DEFAULT_QUALITY,
            loop_forever: true,
            interpolate: false,
        }
    }
}

/// Treat blank text as "not given" and strip surrounding whitespace.
/// Names that are not valid UTF-8 are never blank and are kept byte for byte.
fn non_empty(path: Option<PathBuf>) -> Option<PathBuf> {
    let path = path?;
    let Some(text) = path.to_str() else {
        return Some(path);
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == text.len() {
        Some(path)
    } else {
        Some(PathBuf::from(trimmed))
    }
}

impl RequestInput {
    /// Local filesystem checks only; the video content is not looked at here.
    pub fn validate(self) -> Result<ConversionRequest, ValidationError> {
        let input = non_empty(self.input).ok_or(ValidationError::MissingInput)?;
        if !input.is_file() {
            return Err(ValidationError::InputNotFound(input));
        }

        let output = non_empty(self.output).ok_or(ValidationError::MissingOutput)?;
        let out_dir = output_dir(&output);
        if !out_dir.is_dir() {
            return Err(ValidationError::OutputDirNotFound(out_dir.to_path_buf()));
        }

        Ok(ConversionRequest {
            input,
            output,
            format: self.format,
            width: self.width,
            fps: self.fps,
            speed: self.speed,
            quality: self.quality,
            loop_forever: self.loop_forever,
            interpolate: self.interpolate,
        })
    }
}

/// Directory the output will be written into; a bare file name means the cwd.
fn output_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// `clip.mp4` + gif → `clip.gif`, next to the input.
pub fn suggest_output_path(input: &Path, format: OutputFormat) -> PathBuf {
    input.with_extension(format.extension())
}

/// Append `.<ext>` unless the path already ends with it (case-insensitive).
pub fn ensure_extension(path: PathBuf, format: OutputFormat) -> PathBuf {
    let suffix = format!(".{}", format.extension());
    if path.to_string_lossy().to_lowercase().ends_with(&suffix) {
        path
    } else {
        let mut s = path.into_os_string();
        s.push(&suffix);
        PathBuf::from(s)
    }
}
