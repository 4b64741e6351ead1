//! The `engine_runner` thread: polls the greenhouse probes, drives the heater
//! and the circulation pump, and reports each cycle over telemetry.

pub mod control;

pub use control::{Decision, Readings, Thresholds, decide};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Duration, MissedTickBehavior};

use crate::config::{EngineConfig, PinConfig};
use crate::hardware::{BoardIo, HardwareError, Level, Pin};
use crate::runtime::{PortRequest, Resources, RuntimeError, ThreadContext, ThreadFuture};
use crate::telemetry::{LogTelemetry, Telemetry};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
}

/// Probe and output pins, checked against the processor's pin range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnginePins {
    pub air: Pin,
    pub soil: [Pin; 4],
    pub water_a: Pin,
    pub water_b: Pin,
    pub heater: Pin,
    pub pump: Pin,
}

impl EnginePins {
    pub fn from_config(pins: &PinConfig) -> Result<Self, HardwareError> {
        Ok(Self {
            air: Pin::new(pins.air)?,
            soil: [
                Pin::new(pins.soil_a)?,
                Pin::new(pins.soil_b)?,
                Pin::new(pins.soil_c)?,
                Pin::new(pins.soil_d)?,
            ],
            water_a: Pin::new(pins.water_a)?,
            water_b: Pin::new(pins.water_b)?,
            heater: Pin::new(pins.heater)?,
            pump: Pin::new(pins.pump)?,
        })
    }
}

/// What one completed cycle measured and decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub readings: Readings,
    pub decision: Decision,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub initialized: bool,
    pub cycles: u64,
    pub failed_cycles: u64,
    pub last_report: Option<CycleReport>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

pub struct Engine<B, T> {
    board: B,
    telemetry: T,
    pins: EnginePins,
    thresholds: Thresholds,
    polling_period: Duration,
    status: EngineStatus,
}

impl<B: BoardIo, T: Telemetry> Engine<B, T> {
    pub fn new(board: B, telemetry: T, pins: EnginePins, config: &EngineConfig) -> Self {
        Self {
            board,
            telemetry,
            pins,
            thresholds: Thresholds::from(config),
            polling_period: Duration::from_millis(config.polling_period_ms),
            status: EngineStatus::default(),
        }
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn into_parts(self) -> (B, T) {
        (self.board, self.telemetry)
    }

    /// Runs once; later calls are no-ops.
    pub async fn init(&mut self) -> Result<(), EngineError> {
        if self.status.initialized {
            return Ok(());
        }
        self.report("\n\nInitializing Vegimeter 2...\n").await;
        self.board.write_output(self.pins.heater, Level::Low).await?;
        self.board.write_output(self.pins.pump, Level::Low).await?;
        self.status.initialized = true;
        tracing::info!("Engine initialized (heater {}, pump {})", self.pins.heater, self.pins.pump);
        Ok(())
    }

    /// One full poll: read, report, decide, actuate.
    pub async fn step(&mut self) -> Result<CycleReport, EngineError> {
        self.init().await?;

        let mut readings = Readings {
            air: self.board.read_temperature(self.pins.air).await?,
            ..Readings::default()
        };
        self.report(&control::air_report(&readings)).await;

        for (slot, pin) in readings.soil.iter_mut().zip(self.pins.soil) {
            *slot = self.board.read_temperature(pin).await?;
        }
        self.report(&control::soil_report(&readings)).await;

        readings.water_a = self.board.read_temperature(self.pins.water_a).await?;
        readings.water_b = self.board.read_temperature(self.pins.water_b).await?;
        self.report(&control::water_report(&readings)).await;

        let decision = decide(&readings, &self.thresholds);
        self.apply(&decision).await?;
        self.report(&control::decision_report(&decision)).await;

        let report = CycleReport { readings, decision };
        self.status.cycles += 1;
        self.status.last_report = Some(report);
        self.status.last_cycle_at = Some(Utc::now());
        tracing::debug!(
            "Cycle {}: soil {} water {} -> heater {:?} pump {:?}",
            self.status.cycles,
            readings.soil_total(),
            readings.water_total(),
            decision.heater,
            decision.pump
        );
        Ok(report)
    }

    async fn apply(&mut self, decision: &Decision) -> Result<(), HardwareError> {
        self.board.write_output(self.pins.heater, decision.heater).await?;
        self.board.write_output(self.pins.pump, decision.pump).await
    }

    /// Drive both outputs low, logging rather than returning failures.
    pub async fn shut_off(&mut self) {
        if let Err(e) = self.apply(&Decision::ALL_OFF).await {
            tracing::error!("Failed to switch off heater and pump: {}", e);
        }
    }

    async fn report(&mut self, text: &str) {
        if let Err(e) = self.telemetry.send_line(text).await {
            tracing::warn!("Telemetry write failed: {}", e);
        }
    }

    async fn step_logged(&mut self) -> Result<CycleReport, String> {
        match self.step().await {
            Ok(report) => {
                self.status.last_error = None;
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Engine cycle failed: {}", e);
                self.status.failed_cycles += 1;
                self.status.last_error = Some(e.to_string());
                self.shut_off().await;
                Err(e.to_string())
            }
        }
    }

    /// Poll every period until shutdown, serving requests from the port.
    ///
    /// A failed cycle switches the outputs off and the loop carries on with
    /// the next period. Outputs are switched off on the way out.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<PortRequest>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Self {
        tracing::info!("Engine running, polling every {:?}", self.polling_period);
        let mut interval = tokio::time::interval(self.polling_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Engine loop shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let _ = self.step_logged().await;
                }
                Some(request) = requests.recv() => {
                    self.handle(request).await;
                }
            }
        }

        self.shut_off().await;
        self
    }

    async fn handle(&mut self, request: PortRequest) {
        match request {
            PortRequest::Status { respond_to } => {
                let _ = respond_to.send(serde_json::to_value(&self.status).map_err(|e| e.to_string()));
            }
            PortRequest::RunCycle { respond_to } => {
                let result = self
                    .step_logged()
                    .await
                    .and_then(|report| serde_json::to_value(report).map_err(|e| e.to_string()));
                let _ = respond_to.send(result);
            }
        }
    }
}

/// Entry point `engine_runner`. Takes the board (required) and telemetry
/// (logged when absent) from the shared resources.
pub fn runner(ctx: ThreadContext, resources: &mut Resources) -> Result<ThreadFuture, RuntimeError> {
    let board = resources
        .take_board()
        .ok_or_else(|| RuntimeError::MissingResource {
            thread: ctx.label.clone(),
            resource: "board",
        })?;
    let telemetry = resources
        .take_telemetry()
        .unwrap_or_else(|| Box::new(LogTelemetry) as Box<dyn Telemetry>);
    let pins = EnginePins::from_config(&resources.config.pins)?;
    let engine = Engine::new(board, telemetry, pins, &resources.config.engine);

    let ThreadContext {
        label,
        core,
        requests,
        shutdown,
        ..
    } = ctx;
    Ok(Box::pin(async move {
        tracing::info!("{} running on core {}", label, core);
        let engine = engine.run(requests, shutdown).await;
        tracing::info!("{} stopped after {} cycle(s)", label, engine.status().cycles);
    }))
}
