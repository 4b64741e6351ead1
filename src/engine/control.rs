// src/engine/control.rs - Heat pump decision and report text
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::hardware::{CentiCelsius, Level};

/// One poll cycle worth of probe temperatures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readings {
    pub air: CentiCelsius,
    /// Soil probes A, B, C, D
    pub soil: [CentiCelsius; 4],
    pub water_a: CentiCelsius,
    pub water_b: CentiCelsius,
}

impl Readings {
    pub fn soil_total(&self) -> CentiCelsius {
        self.soil.iter().sum()
    }

    pub fn water_total(&self) -> CentiCelsius {
        self.water_a + self.water_b
    }

    /// One water probe reads more than twice the other.
    pub fn water_probes_disagree(&self) -> bool {
        (self.water_a >> 1) > self.water_b || (self.water_b >> 1) > self.water_a
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Per soil probe
    pub heat_pump_activation: CentiCelsius,
    /// Per water probe
    pub heater_deactivation: CentiCelsius,
}

impl From<&EngineConfig> for Thresholds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            heat_pump_activation: config.heat_pump_activation,
            heater_deactivation: config.heater_deactivation,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub heat_pump_active: bool,
    pub heater: Level,
    pub pump: Level,
}

impl Decision {
    pub const ALL_OFF: Decision = Decision {
        heat_pump_active: false,
        heater: Level::Low,
        pump: Level::Low,
    };
}

/// Sums are compared against the per-probe thresholds scaled by probe count.
/// The comparison is done in `i64` so no threshold can overflow it.
pub fn decide(readings: &Readings, thresholds: &Thresholds) -> Decision {
    let soil_total: i64 = readings.soil.iter().copied().map(i64::from).sum();
    if soil_total >= i64::from(thresholds.heat_pump_activation) * 4 {
        return Decision::ALL_OFF;
    }

    let water_total = i64::from(readings.water_a) + i64::from(readings.water_b);
    let water_too_hot = water_total > i64::from(thresholds.heater_deactivation) * 2;
    let heater_off = water_too_hot || readings.water_probes_disagree();
    Decision {
        heat_pump_active: true,
        heater: Level::from(!heater_off),
        pump: Level::High,
    }
}

pub fn air_report(readings: &Readings) -> String {
    format!("\nAir temperature: {}\n", readings.air)
}

pub fn soil_report(readings: &Readings) -> String {
    let [a, b, c, d] = readings.soil;
    format!(
        "Soil A,B,C,D,+: {},{},{},{},{}\n",
        a,
        b,
        c,
        d,
        readings.soil_total()
    )
}

pub fn water_report(readings: &Readings) -> String {
    format!(
        "Water A,B,+: {},{},{}\n",
        readings.water_a,
        readings.water_b,
        readings.water_total()
    )
}

pub fn decision_report(decision: &Decision) -> String {
    if !decision.heat_pump_active {
        return "Heat pump deactivated\n".to_string();
    }
    let heater = if decision.heater.is_high() { "Heater on.\n" } else { "Heater off.\n" };
    format!("{}Pump on.\n", heater)
}
