//! Report sinks for the engine's per-cycle text output.
//!
//! In the field the report goes out over an XBee radio attached to a serial
//! port (9600 baud). The engine only ever sees the [`Telemetry`] trait.

use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[async_trait]
pub trait Telemetry: Send {
    /// Send `text` verbatim. Callers include their own newlines.
    async fn send_line(&mut self, text: &str) -> std::io::Result<()>;
}

#[async_trait]
impl<T: Telemetry + ?Sized> Telemetry for Box<T> {
    async fn send_line(&mut self, text: &str) -> std::io::Result<()> {
        (**self).send_line(text).await
    }
}

/// Unbuffered writer for a serial radio link.
pub struct SerialTelemetry<W> {
    writer: W,
}

impl SerialTelemetry<SerialPort> {
    pub async fn open(path: &str, baud: u32) -> std::io::Result<Self> {
        let port = SerialPort::open(path, baud)?;
        let mut telemetry = Self::new(port);
        telemetry.send_line("XBee initialized.\n").await?;
        tracing::info!("Telemetry link open on {} at {} baud", path, baud);
        Ok(telemetry)
    }
}

impl<W: AsyncWrite + Unpin + Send> SerialTelemetry<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Telemetry for SerialTelemetry<W> {
    async fn send_line(&mut self, text: &str) -> std::io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await
    }
}

/// Emits reports through `tracing` when no radio is attached.
#[derive(Debug, Default)]
pub struct LogTelemetry;

#[async_trait]
impl Telemetry for LogTelemetry {
    async fn send_line(&mut self, text: &str) -> std::io::Result<()> {
        for line in text.lines().filter(|l| !l.is_empty()) {
            tracing::info!(target: "vegimeter::telemetry", "{}", line);
        }
        Ok(())
    }
}

/// Keeps everything in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferTelemetry {
    buffer: Arc<Mutex<String>>,
}

impl BufferTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Non-empty lines sent so far.
    pub fn lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
    }
}

#[async_trait]
impl Telemetry for BufferTelemetry {
    async fn send_line(&mut self, text: &str) -> std::io::Result<()> {
        self.buffer
            .lock()
            .map_err(|_| std::io::Error::other("telemetry buffer poisoned"))?
            .push_str(text);
        Ok(())
    }
}
