//! Shared Utilities for vid_anim
//!
//! External-tool plumbing that does not know anything about animations:
//! - Locating ffmpeg / ffprobe on the host
//! - Running tools with captured (or time-boxed) output
//! - Argument and display helpers for file paths
//! - Unified error taxonomy and error reporting
//! - tracing-based logging setup

pub mod app_error;
pub mod error_handler;
pub mod ffmpeg_process;
pub mod logging;
pub mod path_safety;
pub mod tools;

pub use app_error::{AppError, ValidationError};
pub use error_handler::{install_panic_handler, note_optional, report_error, ErrorCategory};
pub use ffmpeg_process::{
    capture, capture_with_timeout, format_ffmpeg_error, stream_lines, CapturedOutput, TimedOutput,
};
pub use path_safety::{quote_parts, safe_path_arg};
pub use tools::{ToolOverrides, ToolPaths};
