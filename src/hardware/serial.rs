// src/hardware/serial.rs - Line protocol to the board's MCU firmware
//
//   host -> mcu                  mcu -> host
//   reset                        ok
//   temp <pin>                   temp <pin> <scratchpad hex>
//   out <pin> <0|1>              ok
//   (anything)                   error <message>
use std::time::Duration;

use async_trait::async_trait;
use serial2_tokio::SerialPort;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use super::{BoardIo, CentiCelsius, HardwareError, Level, Pin, ds18b20};

/// Stale lines dropped while resynchronising before giving up.
const MAX_STALE_LINES: usize = 64;

/// Statistics for MCU command processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandStats {
    pub total_commands: u64,
    pub failed_commands: u64,
    pub last_command: Option<String>,
}

/// Talks to the MCU over any byte stream; a serial port in production.
///
/// A reply that misses the response timeout may still arrive later. The link
/// is then out of sync, and the next command first drops incoming lines until
/// the MCU has been quiet for one response timeout.
#[derive(Debug)]
pub struct McuLink<T> {
    stream: BufReader<T>,
    response_timeout: Duration,
    stats: CommandStats,
    // partial line kept across timed-out reads
    pending: Vec<u8>,
    out_of_sync: bool,
}

impl McuLink<SerialPort> {
    pub fn open(path: &str, baud: u32, response_timeout: Duration) -> Result<Self, HardwareError> {
        tracing::info!("Connecting to MCU: {} at {} baud", path, baud);
        let port = SerialPort::open(path, baud)?;
        tracing::info!("Connected to MCU successfully");
        Ok(Self::new(port, response_timeout))
    }
}

impl<T> McuLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: T, response_timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            response_timeout,
            stats: CommandStats::default(),
            pending: Vec::new(),
            out_of_sync: false,
        }
    }

    pub async fn send_command(&mut self, command: &str) -> Result<String, HardwareError> {
        self.stats.total_commands += 1;
        self.stats.last_command = Some(command.to_string());
        let result = self.exchange(command).await;
        if result.is_err() {
            self.stats.failed_commands += 1;
        }
        result
    }

    async fn exchange(&mut self, command: &str) -> Result<String, HardwareError> {
        if self.out_of_sync {
            self.resync().await?;
        }

        tracing::debug!("MCU <- {}", command);
        let line = format!("{}\n", command);
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await?;

        let limit = self.response_timeout;
        let response = match timeout(limit, self.next_line()).await {
            Ok(response) => response?,
            Err(_) => {
                tracing::warn!("MCU did not answer '{}' within {:?}", command, limit);
                self.out_of_sync = true;
                return Err(HardwareError::Timeout);
            }
        };
        tracing::debug!("MCU -> {}", response);

        if let Some(message) = response.strip_prefix("error") {
            return Err(HardwareError::Protocol(message.trim().to_string()));
        }
        Ok(response)
    }

    /// Next non-empty line. `read_until` keeps partial input in `pending`,
    /// so a read cut short by the timeout loses nothing.
    async fn next_line(&mut self) -> Result<String, HardwareError> {
        loop {
            if self.stream.read_until(b'\n', &mut self.pending).await? == 0 {
                return Err(HardwareError::NotConnected);
            }
            if self.pending.last() != Some(&b'\n') {
                continue;
            }
            let line = String::from_utf8_lossy(&self.pending).trim().to_string();
            self.pending.clear();
            if !line.is_empty() {
                return Ok(line);
            }
        }
    }

    /// Drop late replies until the MCU has been quiet for a full timeout.
    async fn resync(&mut self) -> Result<(), HardwareError> {
        let limit = self.response_timeout;
        for _ in 0..MAX_STALE_LINES {
            match timeout(limit, self.next_line()).await {
                Ok(Ok(stale)) => tracing::warn!("Dropping stale MCU reply: {}", stale),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    self.pending.clear();
                    self.out_of_sync = false;
                    tracing::debug!("MCU link back in sync");
                    return Ok(());
                }
            }
        }
        Err(HardwareError::Protocol("MCU keeps sending unsolicited lines".to_string()))
    }

    /// Put the firmware into a known state. Outputs go low on reset.
    pub async fn reset(&mut self) -> Result<(), HardwareError> {
        let response = self.send_command("reset").await?;
        expect_ok(&response)
    }

    pub fn stats(&self) -> &CommandStats {
        &self.stats
    }
}

fn expect_ok(response: &str) -> Result<(), HardwareError> {
    if response.split_whitespace().next() == Some("ok") {
        Ok(())
    } else {
        Err(HardwareError::Protocol(response.to_string()))
    }
}

fn parse_temp_response(pin: Pin, response: &str) -> Result<CentiCelsius, HardwareError> {
    let mut parts = response.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("temp"), Some(p), Some(hex), None) if p == pin.number().to_string() => {
            let scratchpad = ds18b20::parse_hex(hex)?;
            ds18b20::decode_scratchpad(&scratchpad)
        }
        _ => Err(HardwareError::Protocol(response.to_string())),
    }
}

#[async_trait]
impl<T> BoardIo for McuLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_temperature(&mut self, pin: Pin) -> Result<CentiCelsius, HardwareError> {
        let response = self.send_command(&format!("temp {}", pin.number())).await?;
        parse_temp_response(pin, &response)
    }

    async fn write_output(&mut self, pin: Pin, level: Level) -> Result<(), HardwareError> {
        let bit = if level.is_high() { 1 } else { 0 };
        let response = self.send_command(&format!("out {} {}", pin.number(), bit)).await?;
        expect_ok(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(n: u8) -> Pin {
        Pin::new(n).unwrap()
    }

    #[test]
    fn temp_response_must_echo_the_pin() {
        let hex = ds18b20::to_hex(&ds18b20::encode_scratchpad(2000));
        assert_eq!(parse_temp_response(pin(3), &format!("temp 3 {}", hex)).unwrap(), 2000);
        assert!(matches!(
            parse_temp_response(pin(4), &format!("temp 3 {}", hex)),
            Err(HardwareError::Protocol(_))
        ));
        assert!(parse_temp_response(pin(3), "temp 3").is_err());
        assert!(parse_temp_response(pin(3), &format!("temp 3 {} extra", hex)).is_err());
    }

    #[test]
    fn ok_must_be_a_whole_token() {
        assert!(expect_ok("ok").is_ok());
        assert!(expect_ok("ok out 6").is_ok());
        assert!(expect_ok("nope").is_err());
        assert!(expect_ok("okay").is_err());
        assert!(expect_ok("ok_garbage").is_err());
    }
}
