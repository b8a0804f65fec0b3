//! Abstract Device transport interface.
use anyhow::Result;

use crate::constants::{signals, TERMINATOR};
use crate::protocol::{strip_footer, Command};

pub use self::dummy::DummyProgrammer;
pub use self::serial::{SerialConfig, SerialTransport};

mod dummy;
mod serial;

/// Abstraction of the transport layer.
///
/// Implementors provide byte-exact blocking I/O, the EZDL link protocol is
/// layered on top by the provided methods.
pub trait Transport {
    fn write_byte(&mut self, byte: u8) -> Result<()>;
    /// Blocks until one byte arrives, timeout is an error.
    fn read_byte(&mut self) -> Result<u8>;
    /// Discards pending input and output.
    fn flush_buffers(&mut self) -> Result<()>;
    fn close(self) -> Result<()>
    where
        Self: Sized;

    /// Reads up to and including `terminator`.
    fn read_until(&mut self, terminator: u8) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        loop {
            let byte = self.read_byte()?;
            buf.push(byte);
            if byte == terminator {
                return Ok(buf);
            }
        }
    }

    /// Writes one byte and checks its acknowledgement: the byte itself, or
    /// XOFF when `action_check` is set. A mismatch is only logged.
    fn send_byte(&mut self, byte: u8, action_check: bool) -> Result<()> {
        self.write_byte(byte)?;
        let ack = self.read_byte()?;
        let expected = if action_check { signals::XOFF } else { byte };
        if ack != expected {
            log::error!("send != response: 0x{:02x} != 0x{:02x}", expected, ack);
        }
        Ok(())
    }

    /// Waits for XON before a payload byte. A different byte is only logged.
    fn wait_allow_byte(&mut self) -> Result<()> {
        let byte = self.read_byte()?;
        if byte != signals::XON {
            log::error!("In waiting allow: 0x{:02x} != 0x{:02x}", byte, signals::XON);
        }
        Ok(())
    }

    /// Runs one command exchange and returns the response text, footer removed.
    fn transfer(
        &mut self,
        cmd: Command,
        payload: Option<&[u8]>,
        action_check: bool,
    ) -> Result<String> {
        self.flush_buffers()?;

        log::debug!("=> {}", cmd);
        self.send_byte(cmd.opcode(), false)?;

        if let Some(payload) = payload {
            log::debug!("=> {} payload bytes", payload.len());
            for &byte in payload {
                self.wait_allow_byte()?;
                self.send_byte(byte, action_check)?;
            }
        }

        let raw = self.read_until(TERMINATOR)?;
        let resp = String::from_utf8(raw)?;
        log::debug!("<= {:?}", resp);
        Ok(strip_footer(&resp).to_string())
    }
}
