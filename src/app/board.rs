//! Board abstraction for the supported Propeller targets

use serde::Serialize;

use super::AppError;

pub const QUICKSTART_MODEL: &str = "P8X32A_QuickStartBoard";
pub const DEMO_BOARD_MODEL: &str = "P8X32A_DemoBoard";

/// Processor handle obtained from a [`Board`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Processor {
    /// Part number, e.g. `P8X32A`
    pub model: String,
    /// Number of independent cores (cogs on the Propeller)
    pub cores: u8,
    pub clock_hz: u32,
    /// General purpose I/O pins, P0..P(n-1)
    pub io_pins: u8,
}

impl Processor {
    pub fn p8x32a() -> Self {
        Self {
            model: "P8X32A".to_string(),
            cores: 8,
            clock_hz: 80_000_000,
            io_pins: 32,
        }
    }

    /// Clock cycles in one millisecond at the configured frequency.
    pub fn cycles_per_ms(&self) -> u32 {
        self.clock_hz / 1000
    }
}

/// Represents a physical microcontroller target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    pub name: String,
    processor: Processor,
}

impl Board {
    /// The default target: a Parallax P8X32A QuickStart board.
    pub fn new() -> Self {
        Self {
            name: QUICKSTART_MODEL.to_string(),
            processor: Processor::p8x32a(),
        }
    }

    pub fn from_model(model: &str) -> Result<Self, AppError> {
        match model {
            QUICKSTART_MODEL | "quickstart" => Ok(Self::new()),
            DEMO_BOARD_MODEL | "demoboard" => Ok(Self {
                name: DEMO_BOARD_MODEL.to_string(),
                processor: Processor::p8x32a(),
            }),
            other => Err(AppError::UnknownBoard(other.to_string())),
        }
    }

    pub fn get_processor(&self) -> Processor {
        self.processor.clone()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}
