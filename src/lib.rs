// vegimeter: greenhouse heat pump controller for Propeller boards

pub mod app;
pub mod config;
pub mod engine;
pub mod hardware;
pub mod runtime;
pub mod simulator;
pub mod telemetry;
pub mod vegimeter;

pub use app::{Board, Mapping, Port, Thread};
pub use config::{Config, load_config};
pub use engine::{Engine, EngineStatus};
pub use runtime::{EntryPoints, Resources, Runtime};
