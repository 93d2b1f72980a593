//! vid-anim - Video to mini-animation converter (WebP / GIF / APNG)
//!
//! Shells out to ffmpeg for all pixel work. This crate decides what to run:
//! - which codec the input uses and whether this host can decode it
//! - which decoder to force when a known-good one exists
//! - the filter chain and the one or two ffmpeg invocations per format
//! - running those invocations in order, streaming their output
//!
//! ```rust,ignore
//! use vid_anim::{Converter, MemoryLog, RequestInput, OutputFormat};
//! use shared_utils::{ToolOverrides, ToolPaths};
//!
//! let request = RequestInput {
//!     input: Some("clip.mp4".into()),
//!     output: Some("clip.gif".into()),
//!     format: OutputFormat::Gif,
//!     ..Default::default()
//! }
//! .validate()?;
//! let converter = Converter::new(&ToolPaths::discover(&ToolOverrides::default().with_env()))?;
//! let outcome = converter.convert(&request, Box::new(MemoryLog::new()))?.wait();
//! outcome.into_result()?;
//! ```

pub mod codec;
pub mod converter;
pub mod decoders;
pub mod engine;
pub mod filter_chain;
pub mod pipeline;
pub mod preflight;
pub mod probe;
pub mod remediation;
pub mod request;
pub mod runner;

pub use codec::normalize_codec;
pub use converter::{CheckReport, Converter};
pub use decoders::{parse_decoder_listing, DecoderInventory, DecoderSet};
pub use engine::{FfmpegTools, MediaTools, TrialDecode};
pub use filter_chain::build_filter_chain;
pub use pipeline::{plan_conversion, ConversionPlan, PipelineStep, TempWorkspace};
pub use preflight::{decoder_override_args, preflight, Preflight};
pub use probe::probe_video_codec;
pub use remediation::{remediation_message, DistroInfo};
pub use request::{
    ensure_extension, suggest_output_path, ConversionRequest, OutputFormat, RequestInput,
};
pub use runner::{
    LogSink, MemoryLog, PipelineRun, PipelineState, RunOutcome, RunnerEvent, StepExecutor,
    StepExit, SystemExecutor,
};
