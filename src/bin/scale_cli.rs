use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use scale_monitor::calibration::{
    cumulative_weights, load_calibration, CalibrationInfo, CalibrationMethod, CalibrationResult,
    CalibrationState,
};
use scale_monitor::config::AppConfig;
use scale_monitor::engine::{
    LineReaderSource, LoadHandle, MonitorHandle, SampleSource, SimulatedConfig, SimulatedSource,
};
use scale_monitor::events::{CalibrationEvent, ProcessorEvent};
use serde_json::json;
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
#[command(
    name = "scale_cli",
    about = "Load-cell monitor: filtering, statistics and multi-point calibration"
)]
struct Cli {
    /// JSON configuration file (defaults are used when absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream processed samples as JSON lines
    Monitor(MonitorArgs),
    /// Run the multi-point calibration protocol and save the result
    Calibrate(CalibrateArgs),
    /// Print a saved calibration
    Inspect {
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Line-delimited input (serial capture, pipe, tty); "-" reads stdin
    #[arg(long, conflicts_with = "simulate")]
    input: Option<PathBuf>,
    /// Replay input at this many lines per second
    #[arg(long, requires = "input")]
    replay_rate: Option<f64>,
    /// Use the built-in load-cell simulator
    #[arg(long, default_value_t = false)]
    simulate: bool,
    /// Simulator sample rate (Hz)
    #[arg(long, default_value_t = 100.0)]
    sim_rate: f64,
}

#[derive(Args, Debug, Clone)]
struct MonitorArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Calibration file applied to the output
    #[arg(long)]
    calibration: Option<PathBuf>,
    /// Stop after this many seconds
    #[arg(long)]
    duration_secs: Option<f64>,
    /// Simulated load in grams
    #[arg(long, default_value_t = 0.0)]
    load: f64,
    /// Also print periodic statistics events
    #[arg(long, default_value_t = false)]
    stats: bool,
}

#[derive(Args, Debug, Clone)]
struct CalibrateArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Reference weights in grams, comma separated (first is the zero point)
    #[arg(long, value_delimiter = ',', required = true)]
    weights: Vec<f64>,
    /// Treat weights as amounts added per step rather than totals
    #[arg(long, default_value_t = false)]
    cumulative: bool,
    /// Regression method; picks the best validated fit when omitted
    #[arg(long)]
    method: Option<CalibrationMethod>,
    /// Where to write the calibration
    #[arg(long)]
    output: PathBuf,
    /// Wait for Enter before each step (when weights are placed by hand)
    #[arg(long, default_value_t = false)]
    interactive: bool,
    /// Exit with status 2 instead of saving a result that fails validation
    #[arg(long, default_value_t = false)]
    require_valid: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_or_default(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Monitor(args) => block_on(run_monitor(config, args)),
        Commands::Calibrate(args) => block_on(run_calibrate(config, args)),
        Commands::Inspect { file } => run_inspect(&file),
        Commands::Config { output } => run_config(&config, output),
    }
}

fn block_on<F: std::future::Future<Output = Result<ExitCode>>>(future: F) -> Result<ExitCode> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("creating Tokio runtime")?
        .block_on(future)
}

/// Source plus the simulator's load control when simulating
fn build_source(args: &SourceArgs) -> Result<(Arc<dyn SampleSource>, Option<LoadHandle>)> {
    if args.simulate {
        let source = SimulatedSource::new(SimulatedConfig {
            rate_hz: args.sim_rate,
            ..SimulatedConfig::default()
        });
        let load = source.load_handle();
        return Ok((Arc::new(source), Some(load)));
    }

    let reader = match args.input.as_deref() {
        Some(path) if path == Path::new("-") => LineReaderSource::stdin(),
        Some(path) => LineReaderSource::from_path(path),
        None => bail!("either --input or --simulate is required"),
    };
    let reader = match args.replay_rate {
        Some(rate) if rate > 0.0 => reader.with_pacing(Duration::from_secs_f64(1.0 / rate)),
        Some(rate) => bail!("--replay-rate must be positive (got {rate})"),
        None => reader,
    };
    Ok((Arc::new(reader), None))
}

async fn run_monitor(config: AppConfig, args: MonitorArgs) -> Result<ExitCode> {
    let handle = MonitorHandle::new(config).context("building monitor")?;
    if let Some(path) = &args.calibration {
        let result = handle
            .load_calibration(path)
            .with_context(|| format!("loading calibration {}", path.display()))?;
        eprintln!(
            "Calibration: {} ({}, R²={:.4})",
            result.method,
            result.quality_grade(),
            result.r_squared
        );
    }

    let (source, load) = build_source(&args.source)?;
    if let Some(load) = &load {
        load.set_grams(args.load);
    }
    let mut events = handle.processor_stream();
    handle.start(source).context("starting sample source")?;

    let deadline = args
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    let mut check = tokio::time::interval(Duration::from_millis(100));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(event) = events.next() => print_processor_event(&event, args.stats)?,
            _ = check.tick() => {
                let expired = deadline.is_some_and(|d| Instant::now() >= d);
                if expired || !handle.is_source_active() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                eprintln!("Interrupted");
                break;
            }
        }
    }

    let metrics = handle.source_metrics();
    handle.stop().context("stopping monitor")?;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), events.next()).await
    {
        print_processor_event(&event, args.stats)?;
    }

    if let Some(metrics) = metrics {
        eprintln!(
            "Received {} lines ({:.1} lines/s, {:.0} B/s), {} read errors, {} dropped",
            metrics.packets_received,
            metrics.packet_rate(),
            metrics.data_rate(),
            metrics.errors,
            metrics.dropped_samples
        );
    }
    let stats = handle.update_statistics();
    eprintln!(
        "Statistics: n={} mean={:.4} std={:.4} min={:.4} max={:.4} trend={:?}",
        stats.count, stats.mean, stats.std, stats.min, stats.max, stats.trend
    );
    Ok(ExitCode::SUCCESS)
}

fn print_processor_event(event: &ProcessorEvent, with_stats: bool) -> Result<()> {
    if matches!(event, ProcessorEvent::StatisticsUpdated(_)) && !with_stats {
        return Ok(());
    }
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", serde_json::to_string(event)?)?;
    Ok(())
}

async fn run_calibrate(config: AppConfig, args: CalibrateArgs) -> Result<ExitCode> {
    if args.interactive && args.source.input.as_deref() == Some(Path::new("-")) {
        bail!("--interactive needs stdin for prompts; read samples from a file or device");
    }
    let weights = if args.cumulative {
        cumulative_weights(&args.weights)
    } else {
        args.weights.clone()
    };
    if weights.len() < 2 {
        bail!("at least two reference weights are required");
    }

    let handle = MonitorHandle::new(config).context("building monitor")?;
    let mut events = handle
        .calibration_receiver()
        .context("calibration channel not initialized")?;
    let (source, load) = build_source(&args.source)?;
    handle.start(source).context("starting sample source")?;
    handle
        .start_calibration(&weights)
        .context("starting calibration")?;

    let outcome = collect_all_points(&handle, &mut events, load.as_ref(), args.interactive).await;
    if let Err(err) = outcome {
        let _ = handle.cancel_calibration();
        let _ = handle.stop();
        return Err(err);
    }

    let result = match args.method {
        Some(method) => handle.calculate_calibration(method),
        None => handle.select_best_calibration(),
    }
    .context("calculating calibration")?;
    handle.stop().context("stopping monitor")?;

    print_result(&result)?;
    if !result.validation_passed {
        eprintln!("Warning: calibration failed validation");
        if args.require_valid {
            return Ok(ExitCode::from(2));
        }
    }

    handle
        .save_calibration(&args.output)
        .with_context(|| format!("saving {}", args.output.display()))?;
    eprintln!("Saved calibration to {}", args.output.display());
    Ok(ExitCode::SUCCESS)
}

async fn collect_all_points(
    handle: &MonitorHandle,
    events: &mut broadcast::Receiver<CalibrationEvent>,
    load: Option<&LoadHandle>,
    interactive: bool,
) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while let Some(weight) = handle.next_reference_weight()? {
        if let Some(load) = load {
            load.set_grams(weight);
        }
        if interactive {
            prompt(&format!("Place {weight}g on the scale and press Enter"))?;
        }
        handle.start_point_collection(weight)?;

        let mut poll = tokio::time::interval(Duration::from_millis(50));
        let mut last_decile = None;
        loop {
            tokio::select! {
                _ = poll.tick() => {}
                _ = &mut ctrl_c => bail!("calibration interrupted"),
            }
            while let Ok(event) = events.try_recv() {
                if let CalibrationEvent::Progress { percent, status } = event {
                    let decile = percent / 10;
                    if last_decile != Some((decile, status.starts_with("Collecting"))) {
                        last_decile = Some((decile, status.starts_with("Collecting")));
                        eprintln!("[{percent:>3}%] {status}");
                    }
                }
            }
            match handle.calibration_state()? {
                CalibrationState::Collecting => {}
                CalibrationState::Error => bail!("point collection at {weight}g failed"),
                _ => break,
            }
        }
    }
    Ok(())
}

fn prompt(message: &str) -> Result<()> {
    eprint!("{message}: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

fn print_result(result: &CalibrationResult) -> Result<()> {
    let points: Vec<_> = result
        .points
        .iter()
        .map(|p| {
            json!({
                "reference_weight": p.reference_weight,
                "average_reading": p.average_reading(),
                "std_reading": p.std_reading(),
                "cv_percentage": p.cv_percentage(),
                "samples": p.sensor_readings.len(),
                "quality_score": p.quality_score,
                "grade": p.grade().to_string(),
            })
        })
        .collect();
    let report = json!({
        "info": CalibrationInfo::from(result),
        "quality_grade": result.quality_grade().to_string(),
        "coefficients": result.coefficients,
        "points": points,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_inspect(file: &Path) -> Result<ExitCode> {
    let result =
        load_calibration(file).with_context(|| format!("loading {}", file.display()))?;
    print_result(&result)?;
    Ok(ExitCode::SUCCESS)
}

fn run_config(config: &AppConfig, output: Option<PathBuf>) -> Result<ExitCode> {
    match output {
        Some(path) => {
            config
                .save_to_file(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Wrote configuration to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(ExitCode::SUCCESS)
}
