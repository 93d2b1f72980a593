//! External tools detection
//!
//! Lookup order for each tool: explicit override (CLI flag), then the
//! environment variable, then `PATH`.

use crate::app_error::AppError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const FFMPEG_ENV: &str = "VID_ANIM_FFMPEG";
pub const FFPROBE_ENV: &str = "VID_ANIM_FFPROBE";

/// User-supplied tool locations. Either a path or a bare program name.
#[derive(Debug, Clone, Default)]
pub struct ToolOverrides {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

impl ToolOverrides {
    /// Fill unset fields from `VID_ANIM_FFMPEG` / `VID_ANIM_FFPROBE`.
    pub fn with_env(mut self) -> Self {
        if self.ffmpeg.is_none() {
            self.ffmpeg = env_path(FFMPEG_ENV);
        }
        if self.ffprobe.is_none() {
            self.ffprobe = env_path(FFPROBE_ENV);
        }
        self
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Resolved locations of the conversion engine and the stream prober.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

impl ToolPaths {
    pub fn discover(overrides: &ToolOverrides) -> Self {
        let paths = Self {
            ffmpeg: resolve("ffmpeg", overrides.ffmpeg.as_deref()),
            ffprobe: resolve("ffprobe", overrides.ffprobe.as_deref()),
        };
        debug!(ffmpeg = ?paths.ffmpeg, ffprobe = ?paths.ffprobe, "External tools resolved");
        paths
    }

    /// The conversion engine, or `ToolNotFound`: nothing works without it.
    pub fn require_ffmpeg(&self) -> Result<&Path, AppError> {
        self.ffmpeg.as_deref().ok_or_else(|| AppError::ToolNotFound {
            tool_name: "ffmpeg".to_string(),
            hint: format!(
                "Install ffmpeg and make sure it is in PATH, or point {} / --ffmpeg at it.",
                FFMPEG_ENV
            ),
        })
    }

    pub fn has_ffprobe(&self) -> bool {
        self.ffprobe.is_some()
    }
}

fn resolve(default_name: &str, explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(candidate) => match which::which(candidate) {
            Ok(found) => Some(found),
            Err(e) => {
                warn!(
                    tool = default_name,
                    candidate = %candidate.display(),
                    error = %e,
                    "Configured tool is not executable"
                );
                None
            }
        },
        None => which::which(OsStr::new(default_name)).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_tool_resolves_to_none() {
        let overrides = ToolOverrides {
            ffmpeg: Some(PathBuf::from("/nonexistent/dir/ffmpeg_xyz")),
            ffprobe: Some(PathBuf::from("ffprobe_that_does_not_exist_xyz")),
        };
        let paths = ToolPaths::discover(&overrides);
        assert_eq!(paths.ffmpeg, None);
        assert!(!paths.has_ffprobe());
    }

    #[test]
    fn test_require_ffmpeg_error() {
        let paths = ToolPaths::default();
        let err = paths.require_ffmpeg().unwrap_err();
        assert!(matches!(err, AppError::ToolNotFound { ref tool_name, .. } if tool_name == "ffmpeg"));
    }

    #[test]
    fn test_require_ffmpeg_ok() {
        let paths = ToolPaths {
            ffmpeg: Some(PathBuf::from("/usr/bin/ffmpeg")),
            ffprobe: None,
        };
        assert_eq!(paths.require_ffmpeg().unwrap(), Path::new("/usr/bin/ffmpeg"));
    }

    #[cfg(unix)]
    #[test]
    fn test_explicit_program_name_found_on_path() {
        let overrides = ToolOverrides {
            ffmpeg: Some(PathBuf::from("sh")),
            ffprobe: None,
        };
        let paths = ToolPaths::discover(&overrides);
        assert!(paths.ffmpeg.is_some());
    }
}
