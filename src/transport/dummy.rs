//! In-memory EZDL programmer emulator.
//!
//! Speaks the exact wire protocol of the real programmer (opcode echo, XON
//! pacing, XOFF acknowledgement, footer) over an emulated AT89C5x flash, so the
//! whole stack can run without hardware. Clones share the same chip, which lets
//! a test inspect or tamper with flash while a session owns the transport.
use std::{cell::RefCell, collections::VecDeque, fmt::Write as _, rc::Rc};

use anyhow::Result;

use super::Transport;
use crate::constants::{signals, ERASED_CELL, FOOTER};
use crate::device::{Mcu, ProgVoltage};
use crate::protocol::Command;

const TITLE: &str = "EZDL AT89C5x programmer v1.2";

#[derive(Debug)]
struct DummyChip {
    /// `<MCU>-<VOLTAGE>` as reported after `found`
    found: String,
    memory: Vec<u8>,
    cursor: usize,
    locked: bool,
    responsive: bool,
    fail_close: bool,
    /// Bytes still accepted before the link drops, `None` is unlimited
    write_budget: Option<usize>,
    garbled_dump: bool,
    bytes_received: usize,
}

#[derive(Debug, Clone, Default)]
enum RxState {
    #[default]
    Idle,
    Counter(Vec<u8>),
    Firmware {
        offset: usize,
    },
}

#[derive(Debug, Clone)]
pub struct DummyProgrammer {
    chip: Rc<RefCell<DummyChip>>,
    output: VecDeque<u8>,
    state: RxState,
}

impl DummyProgrammer {
    /// A programmer with an erased `mcu` in the socket.
    pub fn new(mcu: Mcu) -> Self {
        Self::with_chip(
            format!("{}-{}", mcu.wire_name(), ProgVoltage::Low.wire_name()),
            mcu.memory_size(),
        )
    }

    /// A programmer with an empty socket.
    pub fn empty() -> Self {
        Self::with_chip("NONE", 0)
    }

    /// A programmer reporting an arbitrary chip identification.
    pub fn with_chip(found: impl Into<String>, memory_size: usize) -> Self {
        DummyProgrammer {
            chip: Rc::new(RefCell::new(DummyChip {
                found: found.into(),
                memory: vec![ERASED_CELL; memory_size],
                cursor: 0,
                locked: false,
                responsive: true,
                fail_close: false,
                write_budget: None,
                garbled_dump: false,
                bytes_received: 0,
            })),
            output: VecDeque::new(),
            state: RxState::Idle,
        }
    }

    /// Copy of the emulated flash.
    pub fn memory(&self) -> Vec<u8> {
        self.chip.borrow().memory.clone()
    }

    /// Out-of-range offsets are ignored.
    pub fn set_memory_byte(&self, offset: usize, value: u8) {
        match self.chip.borrow_mut().memory.get_mut(offset) {
            Some(cell) => *cell = value,
            None => log::warn!("dummy programmer: offset {} is outside flash", offset),
        }
    }

    pub fn cursor(&self) -> usize {
        self.chip.borrow().cursor
    }

    pub fn is_locked(&self) -> bool {
        self.chip.borrow().locked
    }

    /// Total bytes the host has sent to this programmer.
    pub fn bytes_received(&self) -> usize {
        self.chip.borrow().bytes_received
    }

    /// An unresponsive programmer swallows input and never answers.
    pub fn set_responsive(&self, responsive: bool) {
        self.chip.borrow_mut().responsive = responsive;
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.chip.borrow_mut().fail_close = fail;
    }

    /// Accepts `count` more bytes, then every write fails as if the cable
    /// was pulled.
    pub fn fail_after(&self, count: usize) {
        self.chip.borrow_mut().write_budget = Some(count);
    }

    /// Makes READ_FIRMWARE answer with text that is not a hex dump.
    pub fn set_garbled_dump(&self, garbled: bool) {
        self.chip.borrow_mut().garbled_dump = garbled;
    }

    fn reply(&mut self, text: &str) {
        self.output.extend(text.as_bytes());
        self.output.extend(FOOTER.as_bytes());
    }

    fn execute(&mut self, cmd: Command) {
        let text = {
            let mut chip = self.chip.borrow_mut();
            let cursor = chip.cursor.min(chip.memory.len());
            match cmd {
                Command::GetTitle => format!("\n\r {}", TITLE),
                Command::GetInfo => {
                    let non_blank = chip.memory.iter().filter(|&&b| b != ERASED_CELL).count();
                    format!(
                        "\n\r chip found {} nonblank {} counter {}",
                        chip.found, non_blank, chip.cursor
                    )
                }
                Command::GetPgmParams => {
                    let non_blank = chip.memory.iter().filter(|&&b| b != ERASED_CELL).count();
                    let postfix = chip
                        .found
                        .get(3..5)
                        .and_then(|s| s.parse::<u8>().ok())
                        .unwrap_or(0);
                    format!("{},{},{}", postfix, non_blank, chip.cursor)
                }
                Command::GetChecksum => {
                    let sum = chip.memory[..cursor]
                        .iter()
                        .fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
                    format!("\n\r CHKSUM = {:04X}", sum)
                }
                Command::GetHelp => {
                    let mut help = String::from("\n\r commands:");
                    for cmd in Command::ALL {
                        let _ = write!(help, "\n\r {:?} 0x{:02x}", cmd, cmd.opcode());
                    }
                    help
                }
                Command::EraseFlash => {
                    chip.memory.fill(ERASED_CELL);
                    chip.locked = false;
                    String::from("\n\r erased")
                }
                Command::LockFlash => {
                    chip.locked = true;
                    String::from("\n\r locked")
                }
                Command::ReadFirmware if chip.garbled_dump => String::from("\n\r 0F-XX-noise"),
                Command::ReadFirmware => hex::encode_upper(&chip.memory[..cursor]),
                Command::SetCounter => {
                    drop(chip);
                    self.state = RxState::Counter(Vec::new());
                    self.output.push_back(signals::XON);
                    return;
                }
                Command::LoadFirmware => {
                    if cursor == 0 {
                        String::new()
                    } else {
                        drop(chip);
                        self.state = RxState::Firmware { offset: 0 };
                        self.output.push_back(signals::XON);
                        return;
                    }
                }
            }
        };
        self.reply(&text);
    }
}

impl Transport for DummyProgrammer {
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        {
            let mut chip = self.chip.borrow_mut();
            match chip.write_budget {
                Some(0) => anyhow::bail!("dummy programmer: write failed"),
                Some(ref mut left) => *left -= 1,
                None => {}
            }
            chip.bytes_received += 1;
            if !chip.responsive {
                return Ok(());
            }
        }

        match std::mem::take(&mut self.state) {
            RxState::Idle => {
                self.output.push_back(byte);
                match Command::from_opcode(byte) {
                    Some(cmd) => self.execute(cmd),
                    None => self.reply("\n\r unknown command"),
                }
            }
            RxState::Counter(mut digits) => {
                self.output.push_back(signals::XOFF);
                if byte == b'\n' {
                    let cursor = std::str::from_utf8(&digits)
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0);
                    self.chip.borrow_mut().cursor = cursor;
                    self.reply("");
                } else {
                    digits.push(byte);
                    self.state = RxState::Counter(digits);
                    self.output.push_back(signals::XON);
                }
            }
            RxState::Firmware { offset } => {
                self.output.push_back(signals::XOFF);
                let end = {
                    let mut chip = self.chip.borrow_mut();
                    if let Some(cell) = chip.memory.get_mut(offset) {
                        *cell = byte;
                    }
                    chip.cursor.min(chip.memory.len())
                };
                if offset + 1 >= end {
                    self.reply("");
                } else {
                    self.state = RxState::Firmware { offset: offset + 1 };
                    self.output.push_back(signals::XON);
                }
            }
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        self.output
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("dummy programmer: read timed out"))
    }

    fn flush_buffers(&mut self) -> Result<()> {
        self.output.clear();
        Ok(())
    }

    fn close(self) -> Result<()> {
        if self.chip.borrow().fail_close {
            anyhow::bail!("dummy programmer: close failed");
        }
        Ok(())
    }
}
