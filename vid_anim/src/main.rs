use clap::{value_parser, Args, Parser, Subcommand};
use console::{style, Term};
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::{
    install_panic_handler, report_error, AppError, ErrorCategory, ToolOverrides, ToolPaths,
    ValidationError,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, Level};

use vid_anim::request::{DEFAULT_FPS, DEFAULT_QUALITY, DEFAULT_SPEED, DEFAULT_WIDTH};
use vid_anim::{
    ensure_extension, suggest_output_path, ConversionRequest, Converter, LogSink, OutputFormat,
    RequestInput,
};

#[derive(Parser)]
#[command(name = "vid-anim")]
#[command(version, about = "Turn video clips into small looping WebP / GIF / APNG animations", long_about = None)]
struct Cli {
    /// ffmpeg to use (default: $VID_ANIM_FFMPEG, then PATH)
    #[arg(long, global = true, value_name = "PATH")]
    ffmpeg: Option<PathBuf>,
    /// ffprobe to use (default: $VID_ANIM_FFPROBE, then PATH)
    #[arg(long, global = true, value_name = "PATH")]
    ffprobe: Option<PathBuf>,
    /// Directory for log files (default: system temp dir)
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a video into an animation
    Convert(AnimArgs),
    /// Print the ffmpeg invocations a conversion would run
    ///
    /// GIF plans name a palette file in a temporary directory that is removed
    /// when this command exits; rerun `convert` rather than the printed commands.
    Plan {
        #[command(flatten)]
        anim: AnimArgs,
        #[arg(long)]
        json: bool,
    },
    /// Detect the input codec and check this host can decode it
    Check {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
    /// List the video decoders ffmpeg reports
    Decoders,
}

#[derive(Args)]
struct AnimArgs {
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    /// Output file (default: input name with the format's extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Webp)]
    format: OutputFormat,
    /// Target width in pixels; height follows the aspect ratio
    #[arg(short, long, default_value_t = DEFAULT_WIDTH, value_parser = value_parser!(u32).range(64..=2048))]
    width: u32,
    #[arg(long, default_value_t = DEFAULT_FPS, value_parser = value_parser!(u32).range(1..=60))]
    fps: u32,
    /// Playback speedup, 8 = eight times faster
    #[arg(short, long, default_value_t = DEFAULT_SPEED as u32, value_parser = value_parser!(u32).range(1..=32))]
    speed: u32,
    /// WebP quality
    #[arg(short, long, default_value_t = DEFAULT_QUALITY, value_parser = value_parser!(u8).range(0..=100))]
    quality: u8,
    /// Play once instead of looping forever
    #[arg(long)]
    no_loop: bool,
    /// Motion-interpolate frames instead of dropping them
    #[arg(long)]
    interpolate: bool,
}

impl AnimArgs {
    fn into_request(self) -> Result<ConversionRequest, AppError> {
        let output = match self.output {
            Some(path) => ensure_extension(path, self.format),
            None => suggest_output_path(&self.input, self.format),
        };
        let request = RequestInput {
            input: Some(self.input),
            output: Some(output),
            format: self.format,
            width: self.width,
            fps: self.fps,
            speed: f64::from(self.speed),
            quality: self.quality,
            loop_forever: !self.no_loop,
            interpolate: self.interpolate,
        }
        .validate()?;
        Ok(request)
    }
}

/// Conversion log on stdout.
struct ConsoleLog {
    term: Term,
}

impl LogSink for ConsoleLog {
    fn line(&mut self, text: &str) {
        let styled = if text.contains("Done!") {
            style(text).green().bold().to_string()
        } else if text.contains("Failed.") {
            style(text).red().bold().to_string()
        } else if text.starts_with("Running") {
            style(text).cyan().to_string()
        } else {
            text.to_string()
        };
        let _ = self.term.write_line(&styled);
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let tools = ToolPaths::discover(
        &ToolOverrides {
            ffmpeg: cli.ffmpeg,
            ffprobe: cli.ffprobe,
        }
        .with_env(),
    );

    match cli.command {
        Commands::Convert(anim) => {
            let request = anim.into_request()?;
            let converter = Converter::new(&tools)?;
            let sink = ConsoleLog {
                term: Term::stdout(),
            };
            let outcome = converter.convert(&request, Box::new(sink))?.wait();
            outcome.into_result()?;
            println!("📁 Output: {}", request.output.display());
        }

        Commands::Plan { anim, json } => {
            let request = anim.into_request()?;
            let converter = Converter::new(&tools)?;
            let plan = converter.plan(&request)?;
            if let Some(ws) = &plan.workspace {
                eprintln!(
                    "{}",
                    style(format!(
                        "ℹ️  Palette directory {} is temporary and removed on exit",
                        ws.path().display()
                    ))
                    .dim()
                );
            }
            if json {
                let text = serde_json::to_string_pretty(&plan)
                    .map_err(|e| AppError::Other(e.into()))?;
                println!("{}", text);
            } else {
                for (i, step) in plan.steps.iter().enumerate() {
                    println!(
                        "{} {}",
                        style(format!("[{}/{} {}]", i + 1, plan.steps.len(), step.label)).bold(),
                        step.display_command()
                    );
                }
            }
        }

        Commands::Check { input } => {
            if !input.is_file() {
                return Err(ValidationError::InputNotFound(input).into());
            }
            let converter = Converter::new(&tools)?;
            let report = converter.check(&input);
            println!(
                "🎬 Codec: {}",
                report.codec.as_deref().unwrap_or("unknown")
            );
            report.preflight.into_result()?;
            println!("{}", style("✅ Decoding looks OK").green());
        }

        Commands::Decoders => {
            let converter = Converter::new(&tools)?;
            for name in converter.decoders() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = LogConfig::default().with_level(if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    });
    if let Some(dir) = &cli.log_dir {
        config = config.with_log_dir(dir);
    }
    if let Err(e) = init_logging("vid_anim", config) {
        eprintln!("⚠️  Could not initialize logging: {:#}", e);
    }
    install_panic_handler();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let category = e.category();
            if category == ErrorCategory::Fatal {
                report_error(&e);
            } else {
                error!(category = %category, error = %e, "Conversion did not complete");
            }
            eprintln!("{}", style(e.user_message()).red());
            ExitCode::from(category.exit_code() as u8)
        }
    }
}
