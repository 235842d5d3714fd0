use ecg_workflow::chart::{ChartOptions, ChartRenderer};
use ecg_workflow::console_display::ConsoleDisplay;
use ecg_workflow::plots::save_plots;
use ecg_workflow::presentation::{LogNavigator, NoAnimation};
use ecg_workflow::runner::RunnerHandle;
use ecg_workflow::service::{AnalysisService, ClientConfig, HttpAnalysisService};
use ecg_workflow::surface::{Color, MAX_DEVICE_PIXEL_RATIO};
use ecg_workflow::types::DEFAULT_API_URL;
use ecg_workflow::upload_slots::{load_record, record_base};
use ecg_workflow::workflow::Snapshot;

use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;
use log::{error, info, warn};
use serde::Deserialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ecg-workflow")]
#[command(about = "ECG beat analysis client: upload a record, classify a beat, render the signal")]
struct Cli {
    /// Analysis backend base URL
    #[arg(long, global = true, env = "ECG_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Per-request timeout (seconds)
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Probe the backend health endpoint
    Health,

    /// Upload a record, analyze one beat, save plots and a chart
    Run {
        /// Record base path or any of its files (e.g. data/100 or data/100.dat)
        #[arg(long)]
        record: PathBuf,

        /// Beat index to analyze (out-of-range values are reported, not sent)
        #[arg(long, allow_negative_numbers = true)]
        beat: i64,

        /// Where plots and the chart are written
        #[arg(long, default_value = "./results")]
        out_dir: PathBuf,

        /// Leave the server session alive instead of cleaning it up
        #[arg(long)]
        keep_session: bool,

        /// Show the live console panel while the workflow runs
        #[arg(long)]
        console: bool,
    },

    /// Fetch one beat's signal from an existing session
    Beat {
        #[arg(long)]
        session: String,

        #[arg(long)]
        index: usize,

        /// Render the signal to this PNG
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Render a JSON sample array (or an object with a `signal` field) to PNG
    Render {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value_t = 800, value_parser = clap::value_parser!(u32).range(1..=MAX_CHART_SIDE))]
        width: u32,

        #[arg(long, default_value_t = 200, value_parser = clap::value_parser!(u32).range(1..=MAX_CHART_SIDE))]
        height: u32,

        /// Device pixel ratio
        #[arg(long, default_value_t = 1.0, value_parser = parse_dpr)]
        dpr: f64,

        #[arg(long)]
        no_grid: bool,

        /// Trace color as #rrggbb
        #[arg(long, default_value = "#2563eb")]
        color: String,
    },
}

/// Largest logical chart side accepted on the command line.
const MAX_CHART_SIDE: i64 = 8192;

fn parse_dpr(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if v.is_finite() && v > 0.0 && v <= MAX_DEVICE_PIXEL_RATIO {
        Ok(v)
    } else {
        Err(format!("must be in (0, {}]", MAX_DEVICE_PIXEL_RATIO))
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();
    let config = ClientConfig {
        base_url: cli.api_url.clone(),
        timeout: Duration::from_secs(cli.timeout_secs.max(1)),
    };

    info!("═══════════════════════════════════════════════");
    info!("  ECG WORKFLOW v{}", env!("CARGO_PKG_VERSION"));
    info!("  Backend: {}", config.base_url);
    info!("═══════════════════════════════════════════════");

    let result = match cli.command {
        Cmd::Health => cmd_health(&config),
        Cmd::Run {
            record,
            beat,
            out_dir,
            keep_session,
            console,
        } => cmd_run(&config, &record, beat, &out_dir, keep_session, console),
        Cmd::Beat {
            session,
            index,
            out,
        } => cmd_beat(&config, &session, index, out.as_deref()),
        Cmd::Render {
            input,
            out,
            width,
            height,
            dpr,
            no_grid,
            color,
        } => {
            let color = match Color::from_hex(&color) {
                Some(c) => c,
                None => {
                    error!("Invalid color '{}', expected #rrggbb", color);
                    return ExitCode::from(2);
                }
            };
            let opts = ChartOptions {
                width,
                height,
                device_pixel_ratio: dpr,
                show_grid: !no_grid,
                color,
                ..ChartOptions::default()
            };
            cmd_render(&input, &out, opts)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{}", msg);
            ExitCode::FAILURE
        }
    }
}

// ─── health ─────────────────────────────────────────────────────────────────

fn cmd_health(config: &ClientConfig) -> Result<(), String> {
    let service = HttpAnalysisService::new(config);
    let h = service.health().map_err(|e| e.user_message())?;
    println!("status:            {}", h.status);
    println!("reference loaded:  {}", h.normal_reference_loaded);
    if let Some(mode) = &h.classification_mode {
        println!("mode:              {}", mode);
    }
    if let Some(t) = h.threshold {
        println!("threshold:         {:.3}", t);
    }
    if let Some(n) = h.active_sessions {
        println!("active sessions:   {}", n);
    }
    if h.is_healthy() {
        Ok(())
    } else {
        Err("Backend is up but not ready for analysis".into())
    }
}

// ─── run ────────────────────────────────────────────────────────────────────

fn cmd_run(
    config: &ClientConfig,
    record: &Path,
    beat: i64,
    out_dir: &Path,
    keep_session: bool,
    console: bool,
) -> Result<(), String> {
    let slots = load_record(record)
        .map_err(|e| format!("Cannot read record {}: {}", record.display(), e))?;
    let base = record_base(record);
    let prefix = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".into());

    let service: Arc<dyn AnalysisService> = Arc::new(HttpAnalysisService::new(config));
    let mut observers = Vec::new();
    let mut display = None;
    if console {
        let (tx, rx) = unbounded::<Snapshot>();
        observers.push(tx);
        let mut panel = ConsoleDisplay::new(rx);
        if !std::io::stdout().is_terminal() {
            panel = panel.scrolling();
        }
        display = Some(
            thread::Builder::new()
                .name("display".into())
                .spawn(move || panel.run())
                .map_err(|e| e.to_string())?,
        );
    }

    let mut handle = RunnerHandle::spawn(
        service,
        observers,
        Box::new(NoAnimation),
        Box::new(LogNavigator::new()),
    )
    .map_err(|e| format!("Cannot start workflow threads: {}", e))?;

    // Generous: one request plus slack.
    let wait = config.timeout + Duration::from_secs(5);
    let outcome = handle.analyze_record(&slots, beat, keep_session, wait);
    // Joins the dispatcher, so a queued cleanup still reaches the backend.
    handle.shutdown();
    if let Some(h) = display {
        let _ = h.join();
    }

    let snap = outcome?;
    if let Some(result) = &snap.result {
        println!(
            "Session {}: {} beats ({} previews)",
            snap.session_id.as_deref().unwrap_or("?"),
            snap.total_beats,
            snap.preview_count
        );
        println!("{}", result);
        println!("{}", result.predicted_class.verdict());
        let beat_prefix = format!("{}_beat{}", prefix, result.beat_index);
        match save_plots(&result.plots, out_dir, &beat_prefix) {
            Ok(paths) => {
                for p in paths {
                    info!("Wrote {}", p.display());
                }
            }
            Err(e) => warn!("Could not save plots: {}", e),
        }
        if !result.patient_signal.is_empty() {
            let path = out_dir.join(format!("{}_chart.png", beat_prefix));
            if let Err(e) = render_to(&result.patient_signal, ChartOptions::default(), &path) {
                warn!("Could not save chart: {}", e);
            }
        }
    }
    Ok(())
}

/// Render `samples` and write the PNG. Errors when there is nothing to draw.
fn render_to(samples: &[f64], opts: ChartOptions, path: &Path) -> Result<(), String> {
    let mut chart = ChartRenderer::new(opts);
    if !chart.render(samples).map_err(|e| e.to_string())? {
        return Err("No samples to render".into());
    }
    chart.save_png(path).map_err(|e| e.to_string())?;
    info!("Wrote {}", path.display());
    Ok(())
}

// ─── beat ───────────────────────────────────────────────────────────────────

fn cmd_beat(
    config: &ClientConfig,
    session: &str,
    index: usize,
    out: Option<&Path>,
) -> Result<(), String> {
    let service = HttpAnalysisService::new(config);
    let beat = service
        .get_beat(session, index)
        .map_err(|e| e.user_message())?;
    println!(
        "Beat {} ({}): {} samples",
        beat.beat_index,
        beat.label.as_deref().unwrap_or("?"),
        beat.signal.len()
    );
    if let Some(path) = out {
        render_to(&beat.signal, ChartOptions::default(), path)?;
    }
    Ok(())
}

// ─── render ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum SampleFile {
    Bare(Vec<f64>),
    Wrapped { signal: Vec<f64> },
}

fn cmd_render(input: &Path, out: &Path, opts: ChartOptions) -> Result<(), String> {
    let text = std::fs::read_to_string(input)
        .map_err(|e| format!("Cannot read {}: {}", input.display(), e))?;
    let samples = match serde_json::from_str::<SampleFile>(&text)
        .map_err(|e| format!("{}: {}", input.display(), e))?
    {
        SampleFile::Bare(v) | SampleFile::Wrapped { signal: v } => v,
    };
    render_to(&samples, opts, out)?;
    info!("Rendered {} samples", samples.len());
    Ok(())
}
