//! FFmpeg 进程管理模块 - 防止管道死锁
//!
//! ## 问题背景
//!
//! When stdout and stderr are both piped but only one is read, a tool that
//! writes more than a pipe buffer (~64KB) to the other one blocks forever.
//! ffmpeg writes nearly everything to stderr, so this is easy to hit.
//!
//! ## 解决方案
//!
//! Both streams are drained on their own threads while the caller waits on
//! the child (optionally with a deadline).
//!
//! ```ignore
//! use shared_utils::ffmpeg_process::capture;
//! use std::process::Command;
//!
//! let mut cmd = Command::new("ffmpeg");
//! cmd.args(["-hide_banner", "-decoders"]);
//! let out = capture(&mut cmd)?;
//! assert!(out.success());
//! ```

use anyhow::{Context, Result};
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::logging::log_external_tool;

/// How often a time-boxed child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

// ═══════════════════════════════════════════════════════════════
// FfmpegProcess - 防死锁的进程包装器
// ═══════════════════════════════════════════════════════════════

/// A spawned tool whose stdout and stderr are drained concurrently.
struct FfmpegProcess {
    child: Child,
    started: Instant,
    command: String,
    stdout_thread: Option<JoinHandle<String>>,
    stderr_thread: Option<JoinHandle<String>>,
}

fn drain<R: Read + Send + 'static>(stream: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(|l| l.ok()) {
            buf.push_str(&line);
            buf.push('\n');
        }
        buf
    })
}

impl FfmpegProcess {
    fn spawn(cmd: &mut Command) -> Result<Self> {
        let command = format!("{:?}", cmd);
        debug!(command = %command, "Spawning external tool");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", command))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture stderr"))?;

        Ok(Self {
            child,
            started: Instant::now(),
            command,
            stdout_thread: Some(drain(stdout)),
            stderr_thread: Some(drain(stderr)),
        })
    }

    fn collect(&mut self) -> (String, String) {
        let stdout = self
            .stdout_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();
        let stderr = self
            .stderr_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();
        (stdout, stderr)
    }

    fn finish(mut self, status: ExitStatus) -> CapturedOutput {
        let (stdout, stderr) = self.collect();
        let duration = self.started.elapsed();
        log_external_tool(&self.command, &stderr, status.code(), duration);
        CapturedOutput {
            status,
            stdout,
            stderr,
            duration,
        }
    }
}

/// Result of a tool run that went to completion.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stderr followed by stdout, the order ffmpeg's diagnostics are read in.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stderr, self.stdout)
    }
}

/// Result of a tool run under a deadline.
#[derive(Debug)]
pub enum TimedOutput {
    Finished(CapturedOutput),
    TimedOut { after: Duration, stderr: String },
}

/// Run `cmd` to completion, capturing both streams.
///
/// A non-zero exit is not an error here; only failing to spawn or wait is.
pub fn capture(cmd: &mut Command) -> Result<CapturedOutput> {
    let mut process = FfmpegProcess::spawn(cmd)?;
    let status = process
        .child
        .wait()
        .with_context(|| format!("Failed to wait for {}", process.command))?;
    Ok(process.finish(status))
}

/// Run `cmd`, killing it if it has not exited within `timeout`.
pub fn capture_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<TimedOutput> {
    let mut process = FfmpegProcess::spawn(cmd)?;
    let deadline = process.started + timeout;

    loop {
        if let Some(status) = process
            .child
            .try_wait()
            .with_context(|| format!("Failed to check {}", process.command))?
        {
            return Ok(TimedOutput::Finished(process.finish(status)));
        }
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    warn!(
        command = %process.command,
        timeout_secs = timeout.as_secs_f64(),
        "External tool timed out, killing it"
    );
    if let Err(e) = process.child.kill() {
        debug!(error = %e, "Kill after timeout failed (process may have just exited)");
    }
    let _ = process.child.wait();
    let (_, stderr) = process.collect();
    Ok(TimedOutput::TimedOut {
        after: process.started.elapsed(),
        stderr,
    })
}

// ═══════════════════════════════════════════════════════════════
// 逐行转发 - live output
// ═══════════════════════════════════════════════════════════════

/// Feed `stream` to `on_line` as lines arrive, treating `\r` as a line break
/// so ffmpeg's in-place progress updates are delivered as they are written.
///
/// Bytes are decoded lossily; blank lines are dropped. Returns at EOF or on
/// the first read error.
pub fn stream_lines<R: Read>(stream: R, mut on_line: impl FnMut(String)) {
    let mut reader = BufReader::new(stream);
    let mut pending = Vec::new();
    loop {
        let chunk = match reader.fill_buf() {
            Ok([]) => break,
            Ok(chunk) => chunk,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "Output stream read failed");
                break;
            }
        };
        let len = chunk.len();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                flush_line(&mut pending, &mut on_line);
            } else {
                pending.push(byte);
            }
        }
        reader.consume(len);
    }
    flush_line(&mut pending, &mut on_line);
}

fn flush_line(pending: &mut Vec<u8>, on_line: &mut impl FnMut(String)) {
    let line = String::from_utf8_lossy(pending).trim_end().to_string();
    pending.clear();
    if !line.is_empty() {
        on_line(line);
    }
}

// ═══════════════════════════════════════════════════════════════
// FFmpeg 错误格式化
// ═══════════════════════════════════════════════════════════════

/// Pick the most meaningful line out of a tool's output.
///
/// 1. The last line mentioning "error" (any case)
/// 2. Otherwise the last non-empty line that is not a progress line
/// 3. Otherwise "Unknown FFmpeg error"
pub fn format_ffmpeg_error(output: &str) -> String {
    if let Some(error_line) = output
        .lines()
        .rev()
        .find(|line| line.to_lowercase().contains("error"))
    {
        return error_line.trim().to_string();
    }

    output
        .lines()
        .rev()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("frame=")
                && !trimmed.starts_with("fps=")
                && !trimmed.starts_with("size=")
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown FFmpeg error".to_string())
}
