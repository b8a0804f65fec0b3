//! Serial Transportation.
use std::{
    io::{Read, Write},
    time::Duration,
};

use anyhow::{Context, Result};
use serialport::{ClearBuffer, SerialPort};

use super::Transport;
use crate::constants::{DEFAULT_BAUDRATE, DEFAULT_TIMEOUT};

/// Serial line settings of the programmer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    pub baud_rate: u32,
    /// Per-byte read timeout
    pub timeout: Duration,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        SerialConfig {
            port: port.into(),
            baud_rate: DEFAULT_BAUDRATE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct SerialTransport {
    serial_port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(port: &str) -> Result<Self> {
        Self::open_with_config(&SerialConfig::new(port))
    }

    pub fn open_with_config(config: &SerialConfig) -> Result<Self> {
        log::info!(
            "Opening serial port: \"{}\" @ {} baud",
            config.port,
            config.baud_rate
        );
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.timeout)
            .open()
            .with_context(|| format!("open {}", config.port))?;
        Ok(SerialTransport { serial_port: port })
    }
}

impl Transport for SerialTransport {
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.serial_port.write_all(&[byte])?;
        self.serial_port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.serial_port
            .read_exact(&mut buf)
            .context("waiting for programmer")?;
        Ok(buf[0])
    }

    fn flush_buffers(&mut self) -> Result<()> {
        self.serial_port.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        self.serial_port.flush()?;
        // the descriptor is released on drop
        Ok(())
    }
}
