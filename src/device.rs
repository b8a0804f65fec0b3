//! MCU definitions and the records reported by the programmer.
use std::{fmt, str::FromStr};

use anyhow::Result;

/// Supported MCU models, as named by the programmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mcu {
    At89c51,
    At89c52,
    At89c55,
}

impl Mcu {
    /// Total size of the code flash, in bytes.
    pub const fn memory_size(&self) -> usize {
        match self {
            Mcu::At89c51 => 4096,
            Mcu::At89c52 => 8192,
            Mcu::At89c55 => 20480,
        }
    }

    /// Name as it appears on the wire, without the `AT` prefix.
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Mcu::At89c51 => "89C51",
            Mcu::At89c52 => "89C52",
            Mcu::At89c55 => "89C55",
        }
    }
}

impl FromStr for Mcu {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "89C51" => Ok(Mcu::At89c51),
            "89C52" => Ok(Mcu::At89c52),
            "89C55" => Ok(Mcu::At89c55),
            _ => anyhow::bail!("unknown MCU {:?}", s),
        }
    }
}

impl fmt::Display for Mcu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AT{}", self.wire_name())
    }
}

/// Programming voltage the chip expects on VPP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgVoltage {
    /// 5V
    Low,
    /// 12V
    High,
}

impl ProgVoltage {
    pub const fn wire_name(&self) -> &'static str {
        match self {
            ProgVoltage::Low => "5V",
            ProgVoltage::High => "12V",
        }
    }
}

impl FromStr for ProgVoltage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "5V" => Ok(ProgVoltage::Low),
            "12V" => Ok(ProgVoltage::High),
            _ => anyhow::bail!("unknown programming voltage {:?}", s),
        }
    }
}

impl fmt::Display for ProgVoltage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Chip currently sitting in the ZIF socket, as reported by `GET_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipInfo {
    pub mcu: Mcu,
    pub prog_voltage: ProgVoltage,
    /// Number of programmed (non-0xFF) bytes
    pub non_blank_bytes: u32,
    pub byte_cursor: u32,
}

impl fmt::Display for ChipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chip: {} (Flash: {}KiB), programming voltage: {}, non blank bytes: {}",
            self.mcu,
            self.mcu.memory_size() / 1024,
            self.prog_voltage,
            self.non_blank_bytes
        )
    }
}

/// Programming parameters, as reported by `GET_PGM_PARAMS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgrammerParams {
    pub mcu_postfix: i32,
    pub non_blank_bytes: u32,
    pub byte_cursor: u32,
}

impl fmt::Display for ProgrammerParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "postfix={}, non blank bytes={}, cursor={}",
            self.mcu_postfix, self.non_blank_bytes, self.byte_cursor
        )
    }
}
