//! Configuration for the host, the simulator and tests.
//!
//! Every field has a default, so an empty file describes the stock
//! Vegimeter 2 installation: the `vegimeter2` mapping on a QuickStart board,
//! probes on P0..P5 and P10, heater on P6 and pump on P7.
//!
//! ```toml
//! [mapping]
//! name = "vegimeter2"
//! distributor = "round_robin"
//!
//! [[mapping.threads]]
//! label = "ENGINE"
//! entry_point = "engine_runner"
//! port = 10
//!
//! [engine]
//! heat_pump_activation = 2100
//! heater_deactivation = 4300
//! polling_period_ms = 1000
//!
//! [mcu]
//! serial = "/dev/ttyUSB0"
//!
//! [telemetry]
//! serial = "/dev/ttyUSB1"
//! baud = 9600
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::app::board::QUICKSTART_MODEL;
use crate::app::{DistributorKind, Port};
use crate::vegimeter::{ENGINE_ENTRY_POINT, ENGINE_PORT, ENGINE_THREAD, MAPPING_NAME};

/// Highest temperature a DS18B20 reports, centi-degrees Celsius.
pub const MAX_THRESHOLD: i32 = 12500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub pins: PinConfig,
    #[serde(default)]
    pub mcu: McuConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MappingConfig {
    #[serde(default = "default_mapping_name")]
    pub name: String,
    #[serde(default)]
    pub distributor: Option<DistributorKind>,
    #[serde(default = "default_threads")]
    pub threads: Vec<ThreadConfig>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            name: default_mapping_name(),
            distributor: None,
            threads: default_threads(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ThreadConfig {
    pub label: String,
    pub entry_point: String,
    pub port: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BoardConfig {
    #[serde(default = "default_board_model")]
    pub model: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            model: default_board_model(),
        }
    }
}

/// Control thresholds, all temperatures in centi-degrees Celsius.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct EngineConfig {
    /// Per soil probe; the heat pump runs while the soil average is below it.
    #[serde(default = "default_heat_pump_activation")]
    pub heat_pump_activation: i32,
    /// Per water probe; the heater stops once the water average exceeds it.
    #[serde(default = "default_heater_deactivation")]
    pub heater_deactivation: i32,
    #[serde(default = "default_polling_period_ms")]
    pub polling_period_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heat_pump_activation: default_heat_pump_activation(),
            heater_deactivation: default_heater_deactivation(),
            polling_period_ms: default_polling_period_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PinConfig {
    pub air: u8,
    pub water_a: u8,
    pub water_b: u8,
    pub soil_a: u8,
    pub soil_b: u8,
    pub soil_c: u8,
    pub soil_d: u8,
    pub heater: u8,
    pub pump: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            air: 0,
            water_a: 1,
            soil_a: 2,
            soil_b: 3,
            soil_c: 4,
            soil_d: 5,
            heater: 6,
            pump: 7,
            water_b: 10,
        }
    }
}

impl PinConfig {
    pub fn sensors(&self) -> [(&'static str, u8); 7] {
        [
            ("air", self.air),
            ("water_a", self.water_a),
            ("water_b", self.water_b),
            ("soil_a", self.soil_a),
            ("soil_b", self.soil_b),
            ("soil_c", self.soil_c),
            ("soil_d", self.soil_d),
        ]
    }

    pub fn outputs(&self) -> [(&'static str, u8); 2] {
        [("heater", self.heater), ("pump", self.pump)]
    }
}

/// Serial link to the MCU firmware that owns the 1-Wire bus and the outputs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct McuConfig {
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default = "default_mcu_baud")]
    pub baud: u32,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for McuConfig {
    fn default() -> Self {
        Self {
            serial: None,
            baud: default_mcu_baud(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

/// XBee telemetry link. Without a serial device, reports go to the log.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default = "default_telemetry_baud")]
    pub baud: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            serial: None,
            baud: default_telemetry_baud(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SimulatorConfig {
    /// Centi-degrees Celsius
    #[serde(default = "default_ambient")]
    pub ambient: i32,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Peak sensor noise, centi-degrees Celsius
    #[serde(default = "default_noise")]
    pub noise: i32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ambient: default_ambient(),
            seed: default_seed(),
            noise: default_noise(),
        }
    }
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if self.engine.polling_period_ms == 0 {
            return invalid("engine.polling_period_ms must be > 0".to_string());
        }
        for (name, value) in [
            ("heat_pump_activation", self.engine.heat_pump_activation),
            ("heater_deactivation", self.engine.heater_deactivation),
        ] {
            if value <= 0 || value > MAX_THRESHOLD {
                return invalid(format!(
                    "engine.{} = {} must be in 1..={}",
                    name, value, MAX_THRESHOLD
                ));
            }
        }

        let mut used = HashSet::new();
        for (name, pin) in self.pins.outputs() {
            if pin >= 32 {
                return invalid(format!("pins.{} = {} is out of range (P0..P31)", name, pin));
            }
            if !used.insert(pin) {
                return invalid(format!("pins.{} = {} is already used by another output", name, pin));
            }
        }
        for (name, pin) in self.pins.sensors() {
            if pin >= 32 {
                return invalid(format!("pins.{} = {} is out of range (P0..P31)", name, pin));
            }
            if used.contains(&pin) {
                return invalid(format!("pins.{} = {} collides with an output pin", name, pin));
            }
        }

        for thread in &self.mapping.threads {
            Port::new(thread.port)
                .map_err(|e| ConfigError::Invalid(format!("thread '{}': {}", thread.label, e)))?;
        }

        Ok(())
    }
}

fn default_mapping_name() -> String { MAPPING_NAME.to_string() }
fn default_threads() -> Vec<ThreadConfig> {
    vec![ThreadConfig {
        label: ENGINE_THREAD.to_string(),
        entry_point: ENGINE_ENTRY_POINT.to_string(),
        port: ENGINE_PORT,
    }]
}
fn default_board_model() -> String { QUICKSTART_MODEL.to_string() }
fn default_heat_pump_activation() -> i32 { 2100 }
fn default_heater_deactivation() -> i32 { 4300 }
fn default_polling_period_ms() -> u64 { 1000 }
fn default_mcu_baud() -> u32 { 115200 }
fn default_response_timeout_ms() -> u64 { 500 }
fn default_telemetry_baud() -> u32 { 9600 }
fn default_ambient() -> i32 { 1800 }
fn default_seed() -> u64 { 2013 }
fn default_noise() -> i32 { 25 }

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => match Config::from_toml_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to load config '{}': {}", path.display(), e);
                Err(e)
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_firmware_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.mapping.name, "vegimeter2");
        assert_eq!(config.mapping.threads[0].label, ENGINE_THREAD);
        assert_eq!(config.mapping.threads[0].entry_point, ENGINE_ENTRY_POINT);
        assert_eq!(config.mapping.threads[0].port, ENGINE_PORT);
        assert_eq!(config.engine.heat_pump_activation, 2100);
        assert_eq!(config.engine.heater_deactivation, 4300);
        assert_eq!(config.engine.polling_period_ms, 1000);
        assert_eq!(config.pins.water_b, 10);
        assert_eq!(config.telemetry.baud, 9600);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [engine]
            polling_period_ms = 250

            [pins]
            heater = 12
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.polling_period_ms, 250);
        assert_eq!(config.engine.heat_pump_activation, 2100);
        assert_eq!(config.pins.heater, 12);
        assert_eq!(config.pins.pump, 7);
    }

    #[test]
    fn output_collisions_are_invalid() {
        let err = Config::from_toml_str("[pins]\npump = 6\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = Config::from_toml_str("[pins]\nheater = 10\n").unwrap_err();
        assert!(err.to_string().contains("water_b"));
    }

    #[test]
    fn out_of_range_values_are_invalid() {
        assert!(Config::from_toml_str("[pins]\nair = 32\n").is_err());
        assert!(Config::from_toml_str("[engine]\npolling_period_ms = 0\n").is_err());
        let err = Config::from_toml_str(
            "[[mapping.threads]]\nlabel = \"X\"\nentry_point = \"x\"\nport = 300\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn thresholds_are_bounded_by_probe_range() {
        let err = Config::from_toml_str("[engine]\nheat_pump_activation = 600000000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("heat_pump_activation"));
        assert!(Config::from_toml_str("[engine]\nheater_deactivation = 12501\n").is_err());
        assert!(Config::from_toml_str("[engine]\nheater_deactivation = 12500\n").is_ok());
    }

    #[test]
    fn distributor_is_parsed() {
        let config = Config::from_toml_str("[mapping]\ndistributor = \"dummy\"\n").unwrap();
        assert_eq!(config.mapping.distributor, Some(DistributorKind::Dummy));
        assert_eq!(config.mapping.threads.len(), 1);
    }
}
