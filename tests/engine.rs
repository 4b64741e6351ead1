// Engine behaviour against the simulated greenhouse

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use vegimeter::config::{EngineConfig, PinConfig, SimulatorConfig};
use vegimeter::engine::{CycleReport, Engine, EnginePins, EngineStatus};
use vegimeter::hardware::{BoardIo, CentiCelsius, HardwareError, Level, Pin};
use vegimeter::runtime::PortRequest;
use vegimeter::simulator::{Climate, SensorFault, SimulatedGreenhouse};
use vegimeter::telemetry::BufferTelemetry;

fn pins() -> EnginePins {
    EnginePins::from_config(&PinConfig::default()).unwrap()
}

fn greenhouse(climate: Climate) -> SimulatedGreenhouse {
    let config = SimulatorConfig {
        ambient: 1800,
        seed: 7,
        noise: 0,
    };
    let mut sim = SimulatedGreenhouse::new(pins(), &config);
    sim.set_climate(climate);
    sim
}

fn cold_soil() -> Climate {
    Climate {
        air: 18.0,
        soil: [20.0, 20.0, 15.0, 25.0],
        water_a: 30.0,
        water_b: 25.0,
    }
}

fn engine(
    climate: Climate,
    config: &EngineConfig,
) -> (Engine<SimulatedGreenhouse, BufferTelemetry>, BufferTelemetry) {
    let telemetry = BufferTelemetry::new();
    let engine = Engine::new(greenhouse(climate), telemetry.clone(), pins(), config);
    (engine, telemetry)
}

#[tokio::test]
async fn first_cycle_reports_in_firmware_format() {
    let (mut engine, telemetry) = engine(cold_soil(), &EngineConfig::default());

    let report = engine.step().await.unwrap();

    assert_eq!(
        telemetry.contents(),
        "\n\nInitializing Vegimeter 2...\n\
         \nAir temperature: 1800\n\
         Soil A,B,C,D,+: 2000,2000,1500,2500,8000\n\
         Water A,B,+: 3000,2500,5500\n\
         Heater on.\n\
         Pump on.\n"
    );
    assert!(report.decision.heat_pump_active);
    assert_eq!(engine.board().heater(), Level::High);
    assert_eq!(engine.board().pump(), Level::High);
}

#[tokio::test]
async fn init_happens_once() {
    let (mut engine, telemetry) = engine(cold_soil(), &EngineConfig::default());
    engine.init().await.unwrap();
    engine.step().await.unwrap();
    engine.step().await.unwrap();

    let banners = telemetry
        .lines()
        .iter()
        .filter(|l| l.as_str() == "Initializing Vegimeter 2...")
        .count();
    assert_eq!(banners, 1);
    assert_eq!(engine.status().cycles, 2);
}

#[tokio::test]
async fn init_drives_outputs_low() {
    let (mut engine, _) = engine(cold_soil(), &EngineConfig::default());
    let heater = Pin::new(6).unwrap();
    engine.init().await.unwrap();
    assert!(engine.board().register().is_output(heater));
    assert_eq!(engine.board().heater(), Level::Low);
    assert_eq!(engine.board().pump(), Level::Low);
}

#[tokio::test]
async fn warm_soil_deactivates_heat_pump() {
    let climate = Climate {
        soil: [22.0; 4],
        ..cold_soil()
    };
    let (mut engine, telemetry) = engine(climate, &EngineConfig::default());
    let report = engine.step().await.unwrap();

    assert!(!report.decision.heat_pump_active);
    assert_eq!(telemetry.lines().last().unwrap(), "Heat pump deactivated");
    assert_eq!(engine.board().heater(), Level::Low);
    assert_eq!(engine.board().pump(), Level::Low);
}

#[tokio::test]
async fn hot_water_keeps_pump_but_stops_heater() {
    let climate = Climate {
        water_a: 45.0,
        water_b: 43.75,
        ..cold_soil()
    };
    let (mut engine, telemetry) = engine(climate, &EngineConfig::default());
    engine.step().await.unwrap();

    let lines = telemetry.lines();
    assert_eq!(&lines[lines.len() - 2..], ["Heater off.", "Pump on."]);
    assert_eq!(engine.board().heater(), Level::Low);
    assert_eq!(engine.board().pump(), Level::High);
}

#[tokio::test]
async fn thresholds_come_from_config() {
    let config = EngineConfig {
        heat_pump_activation: 1000,
        ..EngineConfig::default()
    };
    let (mut engine, _) = engine(cold_soil(), &config);
    let report = engine.step().await.unwrap();
    assert!(!report.decision.heat_pump_active);
}

#[tokio::test]
async fn failed_probe_aborts_cycle() {
    let (mut engine, _) = engine(cold_soil(), &EngineConfig::default());
    engine.step().await.unwrap();
    assert_eq!(engine.board().heater(), Level::High);

    engine
        .board_mut()
        .inject_fault(Pin::new(10).unwrap(), SensorFault::Corrupted);
    assert!(engine.step().await.is_err());
    assert_eq!(engine.status().cycles, 1);

    engine.shut_off().await;
    assert_eq!(engine.board().heater(), Level::Low);
    assert_eq!(engine.board().pump(), Level::Low);
}

#[tokio::test]
async fn run_loop_serves_port_and_switches_off_on_shutdown() {
    let config = EngineConfig {
        polling_period_ms: 10,
        ..EngineConfig::default()
    };
    let (engine, telemetry) = engine(cold_soil(), &config);
    let (req_tx, req_rx) = mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(engine.run(req_rx, shutdown_rx));

    let (respond_to, rx) = oneshot::channel();
    req_tx.send(PortRequest::RunCycle { respond_to }).await.unwrap();
    let report: CycleReport = serde_json::from_value(rx.await.unwrap().unwrap()).unwrap();
    assert_eq!(report.readings.soil_total(), 8000);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let (respond_to, rx) = oneshot::channel();
    req_tx.send(PortRequest::Status { respond_to }).await.unwrap();
    let status: EngineStatus = serde_json::from_value(rx.await.unwrap().unwrap()).unwrap();
    assert!(status.initialized);
    assert!(status.cycles >= 2);
    assert!(status.last_cycle_at.is_some());

    shutdown_tx.send(()).unwrap();
    let engine = task.await.unwrap();
    assert_eq!(engine.board().heater(), Level::Low);
    assert_eq!(engine.board().pump(), Level::Low);
    assert!(telemetry.contents().contains("Pump on."));
}

/// Lets the test reach the greenhouse while the engine task owns the board.
#[derive(Clone)]
struct SharedGreenhouse(Arc<Mutex<SimulatedGreenhouse>>);

#[async_trait]
impl BoardIo for SharedGreenhouse {
    async fn read_temperature(&mut self, pin: Pin) -> Result<CentiCelsius, HardwareError> {
        self.0.lock().await.read_temperature(pin).await
    }

    async fn write_output(&mut self, pin: Pin, level: Level) -> Result<(), HardwareError> {
        self.0.lock().await.write_output(pin, level).await
    }
}

async fn status_of(req_tx: &mpsc::Sender<PortRequest>) -> EngineStatus {
    let (respond_to, rx) = oneshot::channel();
    req_tx.send(PortRequest::Status { respond_to }).await.unwrap();
    serde_json::from_value(rx.await.unwrap().unwrap()).unwrap()
}

#[tokio::test]
async fn failed_cycle_switches_outputs_off_and_loop_keeps_going() {
    let config = EngineConfig {
        polling_period_ms: 5,
        ..EngineConfig::default()
    };
    let board = SharedGreenhouse(Arc::new(Mutex::new(greenhouse(cold_soil()))));
    let engine = Engine::new(board.clone(), BufferTelemetry::new(), pins(), &config);

    let (req_tx, req_rx) = mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(engine.run(req_rx, shutdown_rx));

    tokio::time::sleep(Duration::from_millis(30)).await;
    {
        let mut sim = board.0.lock().await;
        assert_eq!(sim.heater(), Level::High);
        assert_eq!(sim.pump(), Level::High);
        sim.inject_fault(Pin::new(0).unwrap(), SensorFault::Disconnected);
    }
    let good_cycles = status_of(&req_tx).await.cycles;
    assert!(good_cycles >= 1);

    tokio::time::sleep(Duration::from_millis(40)).await;
    {
        let sim = board.0.lock().await;
        assert_eq!(sim.heater(), Level::Low);
        assert_eq!(sim.pump(), Level::Low);
    }
    let status = status_of(&req_tx).await;
    assert!(status.failed_cycles >= 2);
    assert!(status.cycles <= good_cycles + 1);
    assert!(status.last_error.as_deref().unwrap().contains("Timeout"));
    assert!(!task.is_finished());

    board.0.lock().await.clear_fault(Pin::new(0).unwrap());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(status_of(&req_tx).await.cycles > status.cycles);
    assert_eq!(board.0.lock().await.heater(), Level::High);

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
    assert_eq!(board.0.lock().await.heater(), Level::Low);
}
