// src/runtime.rs - Runs a mapping: one task per thread, one endpoint per port
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::app::{AppError, Mapping, Port};
use crate::config::Config;
use crate::hardware::{BoardIo, HardwareError};
use crate::telemetry::Telemetry;

/// Requests per port that may wait before senders block.
const PORT_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Application error: {0}")]
    App(#[from] AppError),
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("thread '{thread}' refers to unknown entry point '{entry_point}'")]
    UnknownEntryPoint { thread: String, entry_point: String },
    #[error("thread '{thread}' needs a {resource} but none was provided")]
    MissingResource { thread: String, resource: &'static str },
    #[error("runtime for '{0}' is already started")]
    AlreadyStarted(String),
    #[error("{0} is closed")]
    PortClosed(Port),
    #[error("{0}: {1}")]
    Request(Port, String),
    #[error("thread '{0}' panicked")]
    ThreadPanicked(String),
}

/// Messages accepted on a thread's port. Replies are JSON so the runtime
/// does not need to know each thread's types.
#[derive(Debug)]
pub enum PortRequest {
    Status {
        respond_to: oneshot::Sender<Result<serde_json::Value, String>>,
    },
    RunCycle {
        respond_to: oneshot::Sender<Result<serde_json::Value, String>>,
    },
}

/// Everything a thread gets from the runtime when it starts.
pub struct ThreadContext {
    pub label: String,
    pub port: Port,
    pub core: u8,
    pub requests: mpsc::Receiver<PortRequest>,
    pub shutdown: broadcast::Receiver<()>,
}

/// Shared devices and configuration. Devices are handed to the first thread
/// that takes them.
pub struct Resources {
    pub config: Config,
    board: Option<Box<dyn BoardIo>>,
    telemetry: Option<Box<dyn Telemetry>>,
}

impl Resources {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            board: None,
            telemetry: None,
        }
    }

    pub fn with_board(mut self, board: Box<dyn BoardIo>) -> Self {
        self.board = Some(board);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Box<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn take_board(&mut self) -> Option<Box<dyn BoardIo>> {
        self.board.take()
    }

    pub fn take_telemetry(&mut self) -> Option<Box<dyn Telemetry>> {
        self.telemetry.take()
    }
}

pub type ThreadFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub type EntryPoint =
    Box<dyn Fn(ThreadContext, &mut Resources) -> Result<ThreadFuture, RuntimeError> + Send + Sync>;

/// Entry points by name.
#[derive(Default)]
pub struct EntryPoints {
    table: HashMap<String, EntryPoint>,
}

impl EntryPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry points shipped with this crate.
    pub fn standard() -> Self {
        let mut entry_points = Self::new();
        entry_points.register("engine_runner", crate::engine::runner);
        entry_points
    }

    pub fn register<F>(&mut self, name: &str, entry: F)
    where
        F: Fn(ThreadContext, &mut Resources) -> Result<ThreadFuture, RuntimeError>
            + Send
            + Sync
            + 'static,
    {
        self.table.insert(name.to_string(), Box::new(entry));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<&EntryPoint> {
        self.table.get(name)
    }
}

/// Client side of a port.
#[derive(Debug, Clone)]
pub struct PortHandle {
    port: Port,
    tx: mpsc::Sender<PortRequest>,
}

impl PortHandle {
    pub fn port(&self) -> Port {
        self.port
    }

    pub async fn status(&self) -> Result<serde_json::Value, RuntimeError> {
        let (respond_to, rx) = oneshot::channel();
        self.request(PortRequest::Status { respond_to }, rx).await
    }

    pub async fn run_cycle(&self) -> Result<serde_json::Value, RuntimeError> {
        let (respond_to, rx) = oneshot::channel();
        self.request(PortRequest::RunCycle { respond_to }, rx).await
    }

    async fn request(
        &self,
        request: PortRequest,
        rx: oneshot::Receiver<Result<serde_json::Value, String>>,
    ) -> Result<serde_json::Value, RuntimeError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| RuntimeError::PortClosed(self.port))?;
        rx.await
            .map_err(|_| RuntimeError::PortClosed(self.port))?
            .map_err(|e| RuntimeError::Request(self.port, e))
    }
}

pub struct Runtime {
    mapping: Mapping,
    entry_points: EntryPoints,
    endpoints: HashMap<Port, mpsc::Sender<PortRequest>>,
    handles: Vec<(String, JoinHandle<()>)>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Runtime {
    pub fn new(mapping: Mapping, entry_points: EntryPoints) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            mapping,
            entry_points,
            endpoints: HashMap::new(),
            handles: Vec::new(),
            shutdown_tx,
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Spawn every thread of the mapping. Nothing is spawned unless all entry
    /// points resolve and the threads can be placed.
    pub fn start(&mut self, resources: &mut Resources) -> Result<(), RuntimeError> {
        if !self.handles.is_empty() {
            return Err(RuntimeError::AlreadyStarted(self.mapping.name().to_string()));
        }

        for thread in self.mapping.threads() {
            if !self.entry_points.contains(&thread.entry_point) {
                return Err(RuntimeError::UnknownEntryPoint {
                    thread: thread.label.clone(),
                    entry_point: thread.entry_point.clone(),
                });
            }
        }
        let placement = self.mapping.placement()?;

        tracing::info!(
            "Starting mapping '{}' on {} ({} thread(s), {:?} distributor)",
            self.mapping.name(),
            self.mapping.processor().model,
            self.mapping.threads().len(),
            self.mapping.distributor()
        );

        for thread in self.mapping.threads() {
            let core = placement.core_of(&thread.label).unwrap_or(0);
            let (tx, rx) = mpsc::channel(PORT_CAPACITY);
            let ctx = ThreadContext {
                label: thread.label.clone(),
                port: thread.port,
                core,
                requests: rx,
                shutdown: self.shutdown_tx.subscribe(),
            };
            let entry = self.entry_points.get(&thread.entry_point).ok_or_else(|| {
                RuntimeError::UnknownEntryPoint {
                    thread: thread.label.clone(),
                    entry_point: thread.entry_point.clone(),
                }
            })?;
            let future = entry(ctx, resources)?;

            tracing::info!(
                "Thread {} ({}) on core {} listening on {}",
                thread.label,
                thread.entry_point,
                core,
                thread.port
            );
            self.endpoints.insert(thread.port, tx);
            self.handles.push((thread.label.clone(), tokio::spawn(future)));
        }
        Ok(())
    }

    pub fn endpoint(&self, port: Port) -> Option<PortHandle> {
        self.endpoints.get(&port).map(|tx| PortHandle {
            port,
            tx: tx.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|(_, h)| !h.is_finished())
    }

    /// Signal every thread and wait for all of them to finish.
    pub async fn shutdown(mut self) -> Result<(), RuntimeError> {
        tracing::info!("Shutting down mapping '{}'", self.mapping.name());
        let _ = self.shutdown_tx.send(());
        self.endpoints.clear();

        let mut result = Ok(());
        for (label, handle) in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!("Thread {} ended abnormally: {}", label, e);
                result = Err(RuntimeError::ThreadPanicked(label));
            }
        }
        result
    }
}
