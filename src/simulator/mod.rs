//! Simulated greenhouse board.
//!
//! A small lumped thermal model: the heater warms the water loop, the pump
//! carries water heat into the soil, and everything leaks toward ambient.
//! Probe readings go through the same DS18B20 scratchpad path as real
//! hardware, so CRC and conversion code run in simulation too.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulatorConfig;
use crate::engine::EnginePins;
use crate::hardware::{BoardIo, CentiCelsius, HardwareError, Level, Pin, PinRegister, ds18b20};

/// Degrees per second the heater adds to the water loop at full power.
const HEATER_RATE: f64 = 0.05;
const WATER_LOSS: f64 = 0.001;
const PUMP_COUPLING: f64 = 0.002;
const SOIL_LOSS: f64 = 0.0005;
const AIR_RELAX: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    /// Probe does not answer; reads time out.
    Disconnected,
    /// Scratchpad arrives with a corrupted byte.
    Corrupted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Probe {
    Air,
    Soil(usize),
    WaterA,
    WaterB,
}

/// Temperatures in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    pub air: f64,
    pub soil: [f64; 4],
    pub water_a: f64,
    pub water_b: f64,
}

pub struct SimulatedGreenhouse {
    pins: EnginePins,
    register: PinRegister,
    ambient: f64,
    climate: Climate,
    noise: i32,
    rng: StdRng,
    faults: HashMap<Pin, SensorFault>,
    elapsed: f64,
    realtime: Option<(f64, Instant)>,
    reads: u64,
}

impl SimulatedGreenhouse {
    pub fn new(pins: EnginePins, config: &SimulatorConfig) -> Self {
        let ambient = config.ambient as f64 / 100.0;
        tracing::info!("Simulated greenhouse at {:.2}C ambient (seed {})", ambient, config.seed);
        Self {
            pins,
            register: PinRegister::new(),
            ambient,
            climate: Climate {
                air: ambient,
                soil: [ambient - 0.2, ambient, ambient + 0.1, ambient - 0.1],
                water_a: ambient,
                water_b: ambient - 0.3,
            },
            noise: config.noise.max(0),
            rng: StdRng::seed_from_u64(config.seed),
            faults: HashMap::new(),
            elapsed: 0.0,
            realtime: None,
            reads: 0,
        }
    }

    /// Advance physics by wall-clock time on every board access,
    /// `scale` simulated seconds per real second.
    pub fn with_realtime(mut self, scale: f64) -> Self {
        self.realtime = Some((scale, Instant::now()));
        self
    }

    pub fn set_climate(&mut self, climate: Climate) {
        self.climate = climate;
    }

    pub fn climate(&self) -> Climate {
        self.climate
    }

    pub fn inject_fault(&mut self, pin: Pin, fault: SensorFault) {
        tracing::warn!("Injecting {:?} on {}", fault, pin);
        self.faults.insert(pin, fault);
    }

    pub fn clear_fault(&mut self, pin: Pin) {
        self.faults.remove(&pin);
    }

    pub fn heater(&self) -> Level {
        self.register.level(self.pins.heater)
    }

    pub fn pump(&self) -> Level {
        self.register.level(self.pins.pump)
    }

    pub fn register(&self) -> &PinRegister {
        &self.register
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Step the thermal model forward by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        let heater_on = self.heater().is_high();
        let pump_on = self.pump().is_high();
        let ambient = self.ambient;
        let c = &mut self.climate;

        let heat = if heater_on { HEATER_RATE * dt } else { 0.0 };
        c.water_a += heat + (ambient - c.water_a) * WATER_LOSS * dt;
        // the second probe sits further down the loop
        c.water_b += heat * 0.9 + (ambient - c.water_b) * WATER_LOSS * dt;

        let water = (c.water_a + c.water_b) / 2.0;
        for soil in c.soil.iter_mut() {
            if pump_on {
                *soil += (water - *soil) * PUMP_COUPLING * dt;
            }
            *soil += (ambient - *soil) * SOIL_LOSS * dt;
        }
        c.air += (ambient - c.air) * AIR_RELAX * dt;

        self.elapsed += dt;
    }

    fn sync_realtime(&mut self) {
        if let Some((scale, last)) = self.realtime {
            let now = Instant::now();
            self.advance((now - last).as_secs_f64() * scale);
            self.realtime = Some((scale, now));
        }
    }

    fn probe(&self, pin: Pin) -> Option<Probe> {
        let p = &self.pins;
        if pin == p.air {
            Some(Probe::Air)
        } else if pin == p.water_a {
            Some(Probe::WaterA)
        } else if pin == p.water_b {
            Some(Probe::WaterB)
        } else {
            p.soil.iter().position(|s| *s == pin).map(Probe::Soil)
        }
    }

    fn true_temperature(&self, probe: Probe) -> f64 {
        match probe {
            Probe::Air => self.climate.air,
            Probe::Soil(i) => self.climate.soil[i],
            Probe::WaterA => self.climate.water_a,
            Probe::WaterB => self.climate.water_b,
        }
    }

    fn scratchpad(&mut self, pin: Pin) -> Result<[u8; ds18b20::SCRATCHPAD_LEN], HardwareError> {
        let probe = self
            .probe(pin)
            .ok_or_else(|| HardwareError::Protocol(format!("no probe on {}", pin)))?;
        let jitter: CentiCelsius = self.rng.random_range(-self.noise..=self.noise);
        let centi = (self.true_temperature(probe) * 100.0).round() as CentiCelsius + jitter;
        let mut scratchpad = ds18b20::encode_scratchpad(centi);

        match self.faults.get(&pin) {
            Some(SensorFault::Disconnected) => return Err(HardwareError::Timeout),
            Some(SensorFault::Corrupted) => scratchpad[1] ^= 0x40,
            None => {}
        }
        Ok(scratchpad)
    }
}

#[async_trait]
impl BoardIo for SimulatedGreenhouse {
    async fn read_temperature(&mut self, pin: Pin) -> Result<CentiCelsius, HardwareError> {
        self.sync_realtime();
        self.reads += 1;
        let scratchpad = self.scratchpad(pin)?;
        ds18b20::decode_scratchpad(&scratchpad)
    }

    async fn write_output(&mut self, pin: Pin, level: Level) -> Result<(), HardwareError> {
        self.sync_realtime();
        self.register.set_output(pin);
        self.register.write(pin, level);
        tracing::trace!("{} -> {:?}", pin, level);
        Ok(())
    }
}
