//! Front door of the library: one converter per session, one run at a time.

use crate::decoders::{DecoderInventory, DecoderSet};
use crate::engine::{FfmpegTools, MediaTools};
use crate::pipeline::{plan_conversion, ConversionPlan};
use crate::preflight::{decoder_args_for_codec, preflight_for_codec, Preflight};
use crate::probe::probe_video_codec;
use crate::remediation::DistroInfo;
use crate::request::ConversionRequest;
use crate::runner::{BusyGuard, LogSink, PipelineRun, StepExecutor, SystemExecutor};
use shared_utils::{AppError, ToolPaths};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Result of probing and preflighting an input without converting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub codec: Option<String>,
    pub preflight: Preflight,
}

pub struct Converter<T: MediaTools = FfmpegTools> {
    tools: T,
    ffmpeg: PathBuf,
    inventory: DecoderInventory,
    distro: OnceLock<DistroInfo>,
    executor: Arc<dyn StepExecutor>,
    busy: Arc<AtomicBool>,
}

impl Converter<FfmpegTools> {
    /// Requires ffmpeg; ffprobe is optional. Lists decoders once up front.
    pub fn new(paths: &ToolPaths) -> Result<Self, AppError> {
        let tools = FfmpegTools::new(paths)?;
        let ffmpeg = tools.ffmpeg().to_path_buf();
        if !paths.has_ffprobe() {
            warn!("ffprobe not found; codec detection falls back to ffmpeg -i");
        }
        let converter = Self::with_tools(tools, ffmpeg);
        converter.warm_up();
        Ok(converter)
    }
}

impl<T: MediaTools> Converter<T> {
    /// Converter over custom tools. `ffmpeg` is the program the pipeline steps run.
    pub fn with_tools(tools: T, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            tools,
            ffmpeg: ffmpeg.into(),
            inventory: DecoderInventory::new(),
            distro: OnceLock::new(),
            executor: Arc::new(SystemExecutor),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Skip os-release detection and use `distro` for remediation text.
    pub fn with_distro(mut self, distro: DistroInfo) -> Self {
        self.distro = OnceLock::from(distro);
        self
    }

    pub fn warm_up(&self) {
        let count = self.inventory.available(&self.tools).len();
        info!(decoders = count, "Decoder inventory ready");
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn decoders(&self) -> &DecoderSet {
        self.inventory.available(&self.tools)
    }

    fn distro(&self) -> &DistroInfo {
        self.distro.get_or_init(DistroInfo::detect)
    }

    pub fn check(&self, input: &Path) -> CheckReport {
        let codec = probe_video_codec(&self.tools, input);
        let preflight = preflight_for_codec(
            &self.tools,
            &self.inventory,
            input,
            codec.as_deref(),
            self.distro(),
        );
        CheckReport { codec, preflight }
    }

    fn plan_for_codec(
        &self,
        request: &ConversionRequest,
        codec: Option<&str>,
    ) -> Result<ConversionPlan, AppError> {
        let decoder_args = decoder_args_for_codec(self.inventory.available(&self.tools), codec);
        Ok(plan_conversion(&self.ffmpeg, request, &decoder_args)?)
    }

    /// Steps `convert` would run, without running them.
    pub fn plan(&self, request: &ConversionRequest) -> Result<ConversionPlan, AppError> {
        let codec = probe_video_codec(&self.tools, &request.input);
        self.plan_for_codec(request, codec.as_deref())
    }

    /// Probe, preflight, plan and start a run.
    ///
    /// Returns as soon as the first step is launched; drive the run with
    /// [`PipelineRun::poll`] or [`PipelineRun::wait`]. The converter stays busy
    /// until the run reaches a terminal state or is dropped.
    pub fn convert(
        &self,
        request: &ConversionRequest,
        mut sink: Box<dyn LogSink>,
    ) -> Result<PipelineRun, AppError> {
        let busy = BusyGuard::acquire(&self.busy).ok_or(AppError::Busy)?;

        sink.line("Starting conversion…");
        info!(
            input = %request.input.display(),
            output = %request.output.display(),
            format = %request.format,
            "Starting conversion"
        );

        let codec = probe_video_codec(&self.tools, &request.input);
        sink.line(&format!(
            "Detected video codec: {}",
            codec.as_deref().unwrap_or("unknown")
        ));

        let verdict = preflight_for_codec(
            &self.tools,
            &self.inventory,
            &request.input,
            codec.as_deref(),
            self.distro(),
        );
        if !verdict.ok {
            sink.line(&verdict.message);
        }
        verdict.into_result()?;

        let plan = self.plan_for_codec(request, codec.as_deref())?;
        Ok(PipelineRun::start_holding(
            plan,
            Arc::clone(&self.executor),
            sink,
            Some(busy),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TrialDecode;
    use crate::pipeline::PipelineStep;
    use crate::request::OutputFormat;
    use crate::runner::{MemoryLog, RunnerEvent, StepExit};
    use anyhow::{anyhow, Result};
    use crossbeam_channel::Sender;
    use std::sync::Mutex;

    struct H264Host {
        decoders: &'static str,
    }

    impl MediaTools for H264Host {
        fn probe_stream_codec(&self, _input: &Path) -> Result<String> {
            Ok("h264".into())
        }
        fn describe_input(&self, _input: &Path) -> Result<String> {
            Err(anyhow!("unused"))
        }
        fn list_decoders(&self) -> Result<String> {
            Ok(self.decoders.into())
        }
        fn trial_decode(&self, _input: &Path, _decoder: Option<&str>) -> TrialDecode {
            TrialDecode::passed()
        }
    }

    /// Holds every step open until `release` is called.
    #[derive(Default)]
    struct Held {
        pending: Mutex<Vec<Sender<RunnerEvent>>>,
    }

    impl Held {
        fn release(&self, code: i32) {
            for tx in self.pending.lock().unwrap().drain(..) {
                tx.send(RunnerEvent::Exited(StepExit::code(code))).unwrap();
            }
        }
    }

    impl StepExecutor for Held {
        fn launch(&self, _step: &PipelineStep, events: Sender<RunnerEvent>) {
            self.pending.lock().unwrap().push(events);
        }
    }

    fn request() -> ConversionRequest {
        ConversionRequest {
            input: PathBuf::from("clip.mp4"),
            output: PathBuf::from("clip.webp"),
            format: OutputFormat::Webp,
            width: 480,
            fps: 10,
            speed: 8.0,
            quality: 60,
            loop_forever: true,
            interpolate: false,
        }
    }

    fn converter(decoders: &'static str, executor: Arc<Held>) -> Converter<H264Host> {
        Converter::with_tools(H264Host { decoders }, "/opt/ffmpeg/bin/ffmpeg")
            .with_executor(executor)
            .with_distro(DistroInfo::parse("ID=fedora\n"))
    }

    #[test]
    fn test_second_run_is_rejected_until_first_finishes() {
        let held = Arc::new(Held::default());
        let conv = converter(" VFS..D h264  H.264\n", Arc::clone(&held));

        let mut run = conv.convert(&request(), Box::new(MemoryLog::new())).unwrap();
        assert!(conv.is_busy());
        assert!(matches!(
            conv.convert(&request(), Box::new(MemoryLog::new())),
            Err(AppError::Busy)
        ));

        held.release(0);
        assert!(run.poll().map(|o| o.is_success()).unwrap_or(false));
        assert!(!conv.is_busy());
        assert!(conv.convert(&request(), Box::new(MemoryLog::new())).is_ok());
    }

    #[test]
    fn test_infeasible_decode_releases_busy_and_logs_remediation() {
        let held = Arc::new(Held::default());
        let conv = converter(" V....D vp9  VP9\n", Arc::clone(&held));
        let log = MemoryLog::new();

        let err = conv.convert(&request(), Box::new(log.clone())).unwrap_err();
        assert!(matches!(err, AppError::DecodeInfeasible { ref codec, .. } if codec == "h264"));
        assert!(!conv.is_busy());
        assert!(held.pending.lock().unwrap().is_empty());

        let lines = log.lines();
        assert_eq!(lines[0], "Starting conversion…");
        assert_eq!(lines[1], "Detected video codec: h264");
        assert!(lines[2].contains("sudo dnf"));
    }

    #[test]
    fn test_plan_steers_decoder_and_uses_configured_ffmpeg() {
        let conv = converter(" VFS..D h264  H.264\n", Arc::new(Held::default()));
        let plan = conv.plan(&request()).unwrap();
        assert_eq!(plan.steps.len(), 1);
        let step = &plan.steps[0];
        assert_eq!(step.program, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(&step.args[2..5], &["-c:v", "h264", "-i"]);
    }

    #[test]
    fn test_check_reports_codec() {
        let conv = converter(" V..... h264_cuvid  CUVID\n", Arc::new(Held::default()));
        let report = conv.check(Path::new("clip.mp4"));
        assert_eq!(report.codec.as_deref(), Some("h264"));
        assert!(report.preflight.ok);
        assert!(conv.decoders().contains("h264_cuvid"));
    }
}
