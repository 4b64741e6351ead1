// src/hardware/mod.rs - Board I/O seam shared by the MCU link and the simulator
pub mod ds18b20;
pub mod pins;
pub mod serial;

pub use pins::{Level, Pin, PinRegister};
pub use serial::{CommandStats, McuLink};

use async_trait::async_trait;
use thiserror::Error;

/// Temperatures are carried as hundredths of a degree Celsius.
pub type CentiCelsius = i32;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("Serial port error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not connected to hardware")]
    NotConnected,
    #[error("Timeout waiting for response")]
    Timeout,
    #[error("Unexpected MCU response: {0}")]
    Protocol(String),
    #[error("Scratchpad CRC mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Crc { expected: u8, actual: u8 },
    #[error("Invalid pin P{0}")]
    InvalidPin(u8),
}

/// What the engine needs from a board: probe temperatures and digital outputs.
#[async_trait]
pub trait BoardIo: Send {
    async fn read_temperature(&mut self, pin: Pin) -> Result<CentiCelsius, HardwareError>;
    async fn write_output(&mut self, pin: Pin, level: Level) -> Result<(), HardwareError>;
}

#[async_trait]
impl<T: BoardIo + ?Sized> BoardIo for Box<T> {
    async fn read_temperature(&mut self, pin: Pin) -> Result<CentiCelsius, HardwareError> {
        (**self).read_temperature(pin).await
    }

    async fn write_output(&mut self, pin: Pin, level: Level) -> Result<(), HardwareError> {
        (**self).write_output(pin, level).await
    }
}
