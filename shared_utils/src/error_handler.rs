//! Unified Error Handler Module - 统一错误处理策略
//!
//! ## 错误分类
//! - Recoverable: ends the current run only; the session can try again
//! - Fatal: nothing else can proceed in this session
//! - Optional: logged and ignored (probe and cleanup failures)
//!
//! ## 错误报告功能
//! - `report_error()`: 响亮报错到 stderr 和日志
//! - `install_panic_handler()`: 在程序崩溃前记录详细信息

use std::fmt;
use std::panic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Recoverable,
    Fatal,
    Optional,
}

impl ErrorCategory {
    /// Process exit code used by the CLI for an error of this category.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCategory::Recoverable => 1,
            ErrorCategory::Fatal => 2,
            ErrorCategory::Optional => 0,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Recoverable => write!(f, "RECOVERABLE"),
            ErrorCategory::Fatal => write!(f, "FATAL"),
            ErrorCategory::Optional => write!(f, "OPTIONAL"),
        }
    }
}

/// Log an error that is swallowed on purpose, keeping it out of the user's way.
pub fn note_optional<E: fmt::Display>(context: &str, error: E) {
    tracing::debug!(
        category = %ErrorCategory::Optional,
        error = %error,
        "{} (ignored)",
        context
    );
}

pub fn report_error<E: std::error::Error + ?Sized>(error: &E) {
    eprintln!("🔥 ERROR: {}", error);

    let mut source = error.source();
    let mut level = 1;
    while let Some(err) = source {
        eprintln!("   {}. Caused by: {}", level, err);
        source = err.source();
        level += 1;
    }

    tracing::error!("Error occurred: {}", error);

    let mut source = error.source();
    let mut level = 1;
    while let Some(err) = source {
        tracing::error!("  Caused by (level {}): {}", level, err);
        source = err.source();
        level += 1;
    }
}

pub fn install_panic_handler() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic payload".to_string()
        };

        let location = if let Some(loc) = panic_info.location() {
            format!("{}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            "Unknown location".to_string()
        };

        eprintln!("💥 PANIC occurred!");
        eprintln!("   Message: {}", message);
        eprintln!("   Location: {}", location);
        eprintln!("   This is a bug! Please report it.");

        tracing::error!("PANIC: {} at {}", message, location);

        default_hook(panic_info);
    }));
}
