// src/main.rs - Host for the vegimeter2 mapping
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use vegimeter::app::MappingRegistry;
use vegimeter::engine::{EnginePins, EngineStatus};
use vegimeter::hardware::{BoardIo, McuLink};
use vegimeter::runtime::{EntryPoints, Resources, Runtime};
use vegimeter::simulator::SimulatedGreenhouse;
use vegimeter::telemetry::{LogTelemetry, SerialTelemetry, Telemetry};
use vegimeter::vegimeter::ENGINE_ENTRY_POINT;
use vegimeter::{config, vegimeter as app_decl};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Parser)]
#[command(name = "vegimeter-host", version, about = "Runs the Vegimeter 2 greenhouse controller")]
struct Args {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against the simulated greenhouse instead of the MCU
    #[arg(long)]
    simulate: bool,

    /// Print the declared mapping and thread placement as JSON and exit
    #[arg(long)]
    dump_mapping: bool,

    /// Stop after this many engine cycles instead of waiting for Ctrl-C
    #[arg(long)]
    cycles: Option<u64>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    tracing::info!("Starting Vegimeter 2 host");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            config::load_config(path).map_err(|e| {
                tracing::error!("Please ensure the configuration file exists and is properly formatted");
                Box::new(e) as BoxError
            })?
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            config::Config::default()
        }
    };

    let mut registry = MappingRegistry::new();
    let mapping = registry.register(app_decl::declare_from(&config)?)?.clone();
    let placement = mapping.placement()?;

    if args.dump_mapping {
        let dump = serde_json::json!({
            "mapping": mapping,
            "placement": placement,
        });
        println!("{}", serde_json::to_string_pretty(&dump)?);
        return Ok(());
    }

    tracing::info!(
        "Mapping: {} on {} @ {} MHz",
        mapping.name(),
        mapping.processor().model,
        mapping.processor().clock_hz / 1_000_000
    );

    let board = open_board(&config, args.simulate).await?;
    let telemetry = open_telemetry(&config).await;
    let mut resources = Resources::new(config.clone())
        .with_board(board)
        .with_telemetry(telemetry);

    let engine_port = mapping
        .threads()
        .iter()
        .find(|t| t.entry_point == ENGINE_ENTRY_POINT)
        .map(|t| t.port);

    let mut runtime = Runtime::new(mapping, EntryPoints::standard());
    runtime.start(&mut resources)?;

    match (args.cycles, engine_port.and_then(|p| runtime.endpoint(p))) {
        (Some(target), Some(engine)) => {
            let period = Duration::from_millis(config.engine.polling_period_ms);
            loop {
                tokio::time::sleep(period).await;
                let status: EngineStatus = serde_json::from_value(engine.status().await?)?;
                if status.cycles + status.failed_cycles >= target {
                    log_summary(&status);
                    break;
                }
            }
        }
        _ => {
            tokio::signal::ctrl_c().await?;
            tracing::info!("Interrupted");
            if let Some(engine) = engine_port.and_then(|p| runtime.endpoint(p)) {
                if let Ok(value) = engine.status().await {
                    if let Ok(status) = serde_json::from_value::<EngineStatus>(value) {
                        log_summary(&status);
                    }
                }
            }
        }
    }

    runtime.shutdown().await?;
    Ok(())
}

async fn open_board(config: &config::Config, simulate: bool) -> Result<Box<dyn BoardIo>, BoxError> {
    let pins = EnginePins::from_config(&config.pins)?;
    if simulate {
        tracing::info!("Using simulated greenhouse");
        let sim = SimulatedGreenhouse::new(pins, &config.simulator).with_realtime(1.0);
        return Ok(Box::new(sim));
    }

    let Some(path) = config.mcu.serial.as_deref() else {
        tracing::error!("No [mcu] serial device configured; pass --simulate to run without hardware");
        return Err("no MCU serial device configured".into());
    };
    let mut link = McuLink::open(
        path,
        config.mcu.baud,
        Duration::from_millis(config.mcu.response_timeout_ms),
    )?;
    match link.reset().await {
        Ok(()) => tracing::debug!("MCU reset acknowledged"),
        // MCU might already be in a good state
        Err(e) => tracing::warn!("Reset command failed: {}", e),
    }
    Ok(Box::new(link))
}

async fn open_telemetry(config: &config::Config) -> Box<dyn Telemetry> {
    if let Some(path) = config.telemetry.serial.as_deref() {
        match SerialTelemetry::open(path, config.telemetry.baud).await {
            Ok(link) => return Box::new(link),
            Err(e) => tracing::error!("Cannot open XBee on {}: {}; reporting to log", path, e),
        }
    }
    Box::new(LogTelemetry)
}

fn log_summary(status: &EngineStatus) {
    tracing::info!(
        "Engine: {} cycle(s), {} failed",
        status.cycles,
        status.failed_cycles
    );
    if let Some(report) = &status.last_report {
        tracing::info!(
            "Last cycle: soil {} water {} heater {:?} pump {:?}",
            report.readings.soil_total(),
            report.readings.water_total(),
            report.decision.heater,
            report.decision.pump
        );
    }
}
