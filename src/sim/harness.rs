//! CLI entry point for the simulation harness: runs the engine against the
//! simulated greenhouse in accelerated time and writes one CSV row per cycle.

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use vegimeter::config::{self, Config};
use vegimeter::engine::{Engine, EnginePins};
use vegimeter::hardware::Pin;
use vegimeter::simulator::{SensorFault, SimulatedGreenhouse};
use vegimeter::telemetry::{BufferTelemetry, LogTelemetry, Telemetry};

/// Simulation Harness CLI
#[derive(Parser, Debug)]
#[command(name = "sim-harness", about = "Greenhouse simulation harness for the Vegimeter 2 engine.")]
pub struct Cli {
    /// Path to a TOML config file (overrides defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of engine cycles to simulate
    #[arg(long, default_value_t = 3600)]
    cycles: u64,

    /// CSV file for per-cycle readings
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Ambient temperature override, centi-degrees Celsius
    #[arg(long)]
    ambient: Option<i32>,

    /// Disconnect the probe on this pin halfway through the run
    #[arg(long)]
    fail_pin: Option<u8>,

    /// Echo telemetry to the log instead of discarding it
    #[arg(long)]
    echo: bool,
}

#[derive(Debug, Serialize)]
struct Row {
    cycle: u64,
    time_s: f64,
    air: i32,
    soil_a: i32,
    soil_b: i32,
    soil_c: i32,
    soil_d: i32,
    soil_total: i32,
    water_a: i32,
    water_b: i32,
    heater: bool,
    pump: bool,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(ambient) = cli.ambient {
        config.simulator.ambient = ambient;
    }

    let pins = EnginePins::from_config(&config.pins)?;
    let sim = SimulatedGreenhouse::new(pins, &config.simulator);
    let telemetry: Box<dyn Telemetry> = if cli.echo {
        Box::new(LogTelemetry)
    } else {
        Box::new(BufferTelemetry::new())
    };
    let mut engine = Engine::new(sim, telemetry, pins, &config.engine);
    let period = config.engine.polling_period_ms as f64 / 1000.0;

    let mut writer = match &cli.output {
        Some(path) => Some(csv::Writer::from_path(path)?),
        None => None,
    };

    let mut heater_cycles = 0u64;
    let mut pump_cycles = 0u64;
    for cycle in 0..cli.cycles {
        if let Some(pin) = cli.fail_pin {
            if cycle == cli.cycles / 2 {
                engine.board_mut().inject_fault(Pin::new(pin)?, SensorFault::Disconnected);
            }
        }

        match engine.step().await {
            Ok(report) => {
                heater_cycles += report.decision.heater.is_high() as u64;
                pump_cycles += report.decision.pump.is_high() as u64;
                if let Some(writer) = writer.as_mut() {
                    let r = report.readings;
                    writer.serialize(Row {
                        cycle,
                        time_s: engine.board().elapsed_secs(),
                        air: r.air,
                        soil_a: r.soil[0],
                        soil_b: r.soil[1],
                        soil_c: r.soil[2],
                        soil_d: r.soil[3],
                        soil_total: r.soil_total(),
                        water_a: r.water_a,
                        water_b: r.water_b,
                        heater: report.decision.heater.is_high(),
                        pump: report.decision.pump.is_high(),
                    })?;
                }
            }
            Err(e) => {
                tracing::warn!("Cycle {} failed: {}", cycle, e);
                engine.shut_off().await;
            }
        }
        engine.board_mut().advance(period);
    }

    if let Some(mut writer) = writer {
        writer.flush()?;
    }

    let climate = engine.board().climate();
    println!(
        "[Sim] {} cycles ({:.0}s simulated): heater on {} cycles, pump on {} cycles",
        cli.cycles,
        engine.board().elapsed_secs(),
        heater_cycles,
        pump_cycles
    );
    println!(
        "[Sim] final soil {:.2}/{:.2}/{:.2}/{:.2}C, water {:.2}/{:.2}C",
        climate.soil[0],
        climate.soil[1],
        climate.soil[2],
        climate.soil[3],
        climate.water_a,
        climate.water_b
    );
    Ok(())
}
