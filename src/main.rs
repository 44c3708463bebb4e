//! Sorter — main entry point.
//!
//! Hexagonal layout: the binary only picks adapters and wires them into the
//! [`SortingLoop`].
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimCamera   ScriptedClassifier   HardwareAdapter   CsvLog     │
//! │  MqttTelemetry / LogTelemetry     LogEventSink   JsonConfigFile│
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            SortingLoop (domain core)                   │    │
//! │  │  FSM · DecisionTable · Health · Tally                  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  telemetry thread (publisher) · ctrl-c → StopToken             │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use sorter::adapters::camera::SimCamera;
use sorter::adapters::classifier::ScriptedClassifier;
use sorter::adapters::config_file::JsonConfigFile;
use sorter::adapters::csv_log::CsvLog;
use sorter::adapters::hardware::HardwareAdapter;
use sorter::adapters::log_sink::LogEventSink;
use sorter::adapters::log_telemetry::LogTelemetry;
use sorter::adapters::mqtt::{MqttEndpoint, MqttTelemetry};
use sorter::app::ports::{ActuationPort, ConfigPort, TelemetryPort};
use sorter::app::service::SortingLoop;
use sorter::config::SorterConfig;
use sorter::diagnostics::RunSummary;
use sorter::error::StartupError;

/// Exit status for a failed startup (actuators or publisher unavailable).
const EXIT_STARTUP: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "sorter", version, about = "Closed-loop vision sorter controller")]
struct Cli {
    /// JSON configuration file; defaults are used if it does not exist.
    #[arg(short, long, env = "SORTER_CONFIG", default_value = "sorter.json")]
    config: PathBuf,

    /// Stop after this many cycles.
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Stop after this many seconds.
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Drive in-memory PWM channels instead of sysfs.
    #[arg(long)]
    simulate: bool,

    /// Write the effective configuration to `--config` and exit.
    #[arg(long)]
    write_default_config: bool,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(Some(summary)) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(startup) = e.downcast_ref::<StartupError>() {
                error!("startup failed: {startup}");
                ExitCode::from(EXIT_STARTUP)
            } else {
                error!("{e:#}");
                ExitCode::FAILURE
            }
        }
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: Cli) -> Result<Option<RunSummary>> {
    let store = JsonConfigFile::new(&cli.config);
    let mut config = store
        .load()
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if cli.max_cycles.is_some() {
        config.control.max_cycles = cli.max_cycles;
    }
    if cli.duration_secs.is_some() {
        config.control.max_duration_secs = cli.duration_secs;
    }
    if cli.simulate {
        config.servo.simulate = true;
    }
    config
        .validate()
        .map_err(|msg| anyhow::anyhow!("invalid configuration: {msg}"))?;

    if cli.write_default_config {
        store
            .save(&config)
            .with_context(|| format!("writing {}", cli.config.display()))?;
        info!("wrote {}", cli.config.display());
        return Ok(None);
    }

    info!(
        "{} v{} starting ({} servos)",
        config.device_name,
        env!("CARGO_PKG_VERSION"),
        if config.servo.simulate { "simulated" } else { "sysfs" }
    );

    let summary = if config.servo.simulate {
        sort(&config, HardwareAdapter::simulated(&config.servo))?
    } else {
        sort(&config, HardwareAdapter::sysfs(&config.servo))?
    };
    Ok(Some(summary))
}

fn telemetry_port(config: &SorterConfig) -> Box<dyn TelemetryPort> {
    match MqttEndpoint::from_config(&config.telemetry) {
        Some(endpoint) => {
            info!("telemetry to {}:{}", endpoint.host, endpoint.port);
            Box::new(MqttTelemetry::new(endpoint))
        }
        None => {
            info!("telemetry disabled, logging payloads only");
            Box::new(LogTelemetry::new())
        }
    }
}

fn sort<A: ActuationPort>(config: &SorterConfig, actuators: A) -> Result<RunSummary> {
    let mut sorter = SortingLoop::new(
        config,
        SimCamera::new(&config.camera),
        ScriptedClassifier::from_config(&config.classifier),
        actuators,
        CsvLog::new(&config.persistence.csv_path),
    );

    let stop = sorter.stop_token();
    if let Err(err) = ctrlc::set_handler(move || stop.trigger()) {
        warn!("Failed to install Ctrl+C handler: {err}");
    }

    let mut sink = LogEventSink::new();
    let summary = sorter.run(telemetry_port(config), &mut sink)?;
    Ok(summary)
}
