//! Sensor Filter Pipeline CLI
//!
//! Runs filters against a synthetic sensor session and reports what was
//! forwarded and what was gated.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sensor_filter_pipeline::{
    config::{Config, FilterSelection},
    filter::{GsrFilter, QrsFilter, RateGatedFilter},
    pipeline::Pipeline,
    reading::{attr, FilterEvent, Reading, ReadingInput},
    stats::create_shared_stats_with_persistence,
    VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "sensor-filters")]
#[command(version = VERSION)]
#[command(about = "Rate gating and feature extraction for sensor streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run filters against a synthetic sensor session
    Run {
        /// Filters to run (sine, gsr, qrs, or all)
        #[arg(long)]
        filters: Option<String>,

        /// Stop after this many seconds (runs until Ctrl+C when omitted)
        #[arg(long)]
        duration: Option<u64>,

        /// Synthetic sample period in milliseconds
        #[arg(long)]
        period_ms: Option<u64>,
    },

    /// Show persisted session statistics
    Stats,

    /// Show configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            filters,
            duration,
            period_ms,
        } => cmd_run(filters.as_deref(), duration, period_ms),
        Commands::Stats => {
            cmd_stats();
            Ok(())
        }
        Commands::Config => {
            cmd_config();
            Ok(())
        }
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn cmd_run(
    filters: Option<&str>,
    duration: Option<u64>,
    period_ms: Option<u64>,
) -> anyhow::Result<()> {
    println!("Sensor Filter Pipeline v{VERSION}");
    println!();

    let mut config = Config::load().context("loading configuration")?;
    if let Some(csv) = filters {
        config.filters = FilterSelection::from_csv(csv);
    }
    if let Some(ms) = period_ms {
        config.sample_period = Duration::from_millis(ms);
    }
    if !config.filters.any_enabled() {
        anyhow::bail!("at least one filter must be enabled (sine, gsr, or qrs)");
    }
    config
        .ensure_directories()
        .context("creating data directories")?;

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let mut pipeline = Pipeline::new(stats.clone());

    let mut sine_sensor = None;
    let mut gsr_sensor = None;
    let mut qrs_sensor = None;

    if config.filters.sine_wave {
        let filter = RateGatedFilter::sine_wave(Uuid::new_v4())
            .context("building sine wave filter")?;
        sine_sensor = Some(pipeline.bind("sine-wave", Box::new(filter)));
        println!("  Sine wave filter: enabled");
    }
    if config.filters.gsr {
        let filter = GsrFilter::new(Uuid::new_v4(), config.gsr.clone())
            .context("building gsr filter")?;
        gsr_sensor = Some(pipeline.bind("gsr", Box::new(filter)));
        println!(
            "  GSR filter: enabled ({} Hz, {}s window)",
            config.gsr.sampling_rate_hz, config.gsr.reaction_window_secs
        );
    }
    if config.filters.qrs {
        let filter = QrsFilter::new(Uuid::new_v4(), config.qrs.clone())
            .context("connecting to qrs detection service")?
            .with_stats(stats.clone());
        qrs_sensor = Some(pipeline.bind("ecg", Box::new(filter)));
        println!("  QRS filter: enabled ({})", config.qrs.url());
    }

    pipeline
        .start()
        .context("starting pipeline")?;

    println!("  Sample period: {}ms", config.sample_period.as_millis());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    // Synthetic producer thread; one payload per tick per bound sensor.
    let (sender, receiver) = crossbeam_channel::bounded::<(Uuid, ReadingInput)>(256);
    let producer_running = running.clone();
    let sample_period = config.sample_period;
    let producer = thread::spawn(move || {
        let start = Instant::now();
        let mut tick: u64 = 0;
        while producer_running.load(Ordering::SeqCst) {
            let elapsed_ms = start.elapsed().as_millis() as i64;
            let phase = tick as f64 * 0.1;

            if let Some(id) = sine_sensor {
                let reading = Reading::new(elapsed_ms).with(attr::SINE_WAVE, phase.sin());
                if sender.send((id, reading.into())).is_err() {
                    break;
                }
            }
            if let Some(id) = gsr_sensor {
                let conductance = 2.0 + 0.3 * (phase * 0.25).sin();
                let reading = Reading::new(elapsed_ms)
                    .with(attr::GSR_CONDUCTANCE, conductance)
                    .with(attr::TEMPERATURE, 33.5);
                if sender.send((id, reading.into())).is_err() {
                    break;
                }
            }
            if let Some(id) = qrs_sensor {
                let reading = Reading::new(elapsed_ms).with(attr::ECG_WAVEFORM_SAMPLE, phase.sin());
                if sender.send((id, reading.into())).is_err() {
                    break;
                }
            }

            tick += 1;
            thread::sleep(sample_period);
        }
    });

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut sink: Vec<FilterEvent> = Vec::new();

    while running.load(Ordering::SeqCst) {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                running.store(false, Ordering::SeqCst);
                break;
            }
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok((sensor_id, input)) => {
                pipeline.dispatch(sensor_id, input, &mut sink);
                for event in sink.drain(..) {
                    let attrs: Vec<String> = event
                        .data
                        .attributes
                        .iter()
                        .map(|(k, v)| format!("{k}={v:?}"))
                        .collect();
                    println!("[{:>8}ms] {}", event.data.elapsed_ms, attrs.join(", "));
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    println!();
    println!("Stopping pipeline...");
    pipeline.stop();
    let _ = producer.join();

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save session stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_stats() {
    let config = Config::load().unwrap_or_default();

    let stats_path = config.stats_path();
    if !stats_path.exists() {
        println!("No previous session data found.");
        println!("Run 'sensor-filters run' to start a session.");
        return;
    }

    if let Ok(content) = std::fs::read_to_string(&stats_path) {
        if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
            println!("Cumulative Statistics:");
            if let Some(v) = stats.get("readings_received") {
                println!("  Readings received: {v}");
            }
            if let Some(v) = stats.get("events_forwarded") {
                println!("  Events forwarded: {v}");
            }
            if let Some(v) = stats.get("readings_gated") {
                println!("  Readings gated: {v}");
            }
            if let Some(v) = stats.get("decode_errors") {
                println!("  Decode errors: {v}");
            }
            if let Some(v) = stats.get("detection_failures") {
                println!("  Detection failures: {v}");
            }
        }
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
