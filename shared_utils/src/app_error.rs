//! AppError - 统一的应用错误类型
//!
//! One variant per failure class a conversion run can hit. Probe failures and
//! cleanup failures have no variant: they never reach the caller.

use crate::error_handler::ErrorCategory;
use std::path::PathBuf;
use thiserror::Error;

/// Rejected user input. Raised before any subprocess or temp file exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please choose an input video file.")]
    MissingInput,

    #[error("The selected input file does not exist: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Please choose an output file path.")]
    MissingOutput,

    #[error("The output directory does not exist: {}", .0.display())]
    OutputDirNotFound(PathBuf),
}

impl ValidationError {
    /// Short title, suitable for a dialog caption or a log prefix.
    pub fn title(&self) -> &'static str {
        match self {
            ValidationError::MissingInput => "Missing input",
            ValidationError::InputNotFound(_) => "Invalid input",
            ValidationError::MissingOutput => "Missing output",
            ValidationError::OutputDirNotFound(_) => "Invalid output",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{tool_name} is required but was not found in PATH")]
    ToolNotFound { tool_name: String, hint: String },

    #[error("cannot decode {} input on this system", .codec.to_uppercase())]
    DecodeInfeasible { codec: String, remediation: String },

    #[error("{label} step failed ({}): {detail}", describe_exit(.exit_code))]
    SubprocessFailed {
        label: String,
        exit_code: Option<i32>,
        detail: String,
    },

    #[error("a conversion is already running")]
    Busy,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "terminated by signal".to_string(),
    }
}

impl AppError {
    /// Session-wide failures stop everything; the rest only end the current run.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::ToolNotFound { .. } => ErrorCategory::Fatal,
            AppError::Validation(_)
            | AppError::DecodeInfeasible { .. }
            | AppError::SubprocessFailed { .. }
            | AppError::Busy => ErrorCategory::Recoverable,
            AppError::Io(_) | AppError::Other(_) => ErrorCategory::Fatal,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(e) => format!("⚠️ {}: {}", e.title(), e),
            AppError::ToolNotFound { tool_name, hint } => {
                format!("❌ {} not found\n   💡 {}", tool_name, hint)
            }
            AppError::DecodeInfeasible { remediation, .. } => {
                format!("❌ Missing codec support\n{}", remediation)
            }
            AppError::SubprocessFailed {
                label,
                exit_code,
                detail,
            } => {
                let mut msg = format!(
                    "❌ Conversion failed at the {} step ({})",
                    label,
                    describe_exit(exit_code)
                );
                if !detail.is_empty() {
                    msg.push_str(&format!("\n   Error output: {}", detail));
                }
                msg.push_str("\n   ffmpeg reported an error. See the log for details.");
                msg
            }
            AppError::Busy => "⏳ A conversion is already running".to_string(),
            AppError::Io(e) => format!("❌ IO error: {}", e),
            AppError::Other(e) => format!("❌ {:#}", e),
        }
    }
}
