//! The EZDL command set and the text responses of the programmer

use std::fmt;

use crate::constants::{commands, FOOTER, MAX_COUNTER_DIGITS, TERMINATOR};
use crate::device::{ChipInfo, Mcu, ProgVoltage, ProgrammerParams};
use crate::error::{Error, Result};

/// EZDL Command, a single opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Programmer banner and firmware version.
    GetTitle,
    /// Detect the chip in the socket.
    /// Reply: `... found <MCU>-<VOLTAGE> ... nonblank <N> ... counter <N> ...`
    GetInfo,
    /// Reply: `<postfix>,<nonblank>,<cursor>`
    GetPgmParams,
    /// Reply: `... CHKSUM <sep> <hex> ...`
    GetChecksum,
    GetHelp,
    EraseFlash,
    /// Streams `cursor` bytes into flash, each acknowledged with XOFF.
    LoadFirmware,
    /// Dumps `cursor` bytes of flash as hex text.
    ReadFirmware,
    LockFlash,
    /// Payload is the ASCII decimal cursor terminated by `\n`.
    SetCounter,
}

impl Command {
    pub const ALL: [Command; 10] = [
        Command::GetTitle,
        Command::GetInfo,
        Command::GetPgmParams,
        Command::GetChecksum,
        Command::GetHelp,
        Command::EraseFlash,
        Command::LoadFirmware,
        Command::ReadFirmware,
        Command::LockFlash,
        Command::SetCounter,
    ];

    pub const fn opcode(self) -> u8 {
        match self {
            Command::GetTitle => commands::GET_TITLE,
            Command::GetInfo => commands::GET_INFO,
            Command::GetPgmParams => commands::GET_PGM_PARAMS,
            Command::GetChecksum => commands::GET_CHECKSUM,
            Command::GetHelp => commands::GET_HELP,
            Command::EraseFlash => commands::ERASE_FLASH,
            Command::LoadFirmware => commands::LOAD_FIRMWARE,
            Command::ReadFirmware => commands::READ_FIRMWARE,
            Command::LockFlash => commands::LOCK_FLASH,
            Command::SetCounter => commands::SET_COUNTER,
        }
    }

    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.opcode() == opcode)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02x})", self, self.opcode())
    }
}

/// Removes the status trailer the programmer appends after an exchange.
pub fn strip_footer(response: &str) -> &str {
    response.strip_suffix(FOOTER).unwrap_or(response)
}

/// Drops prompt characters and collapses whitespace runs to single spaces.
pub fn parse_title(response: &str) -> String {
    response
        .replace(TERMINATOR as char, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn token_after<'a>(tokens: &[&'a str], label: &str) -> Option<&'a str> {
    let idx = tokens.iter().position(|&t| t == label)?;
    tokens.get(idx + 1).copied()
}

fn parse_labelled<T: std::str::FromStr>(tokens: &[&str], label: &str) -> Option<T> {
    token_after(tokens, label)?.parse().ok()
}

/// Parses the reply to `GET_INFO`.
///
/// An unrecognized MCU or programming voltage fails closed with
/// [`Error::UnknownChip`]: programming with a guessed voltage can destroy the chip.
pub fn parse_info(response: &str) -> Result<ChipInfo> {
    let tokens: Vec<&str> = response.split_whitespace().collect();

    let Some(found) = token_after(&tokens, "found") else {
        log::error!("No chip marker in info message: {:?}", response);
        return Err(Error::InfoMessageParseFailed);
    };

    let properties: Vec<&str> = found.split('-').collect();
    let (mcu, voltage) = match properties[..] {
        [_] => {
            log::debug!("No chip in socket: {:?}", found);
            return Err(Error::ChipNotFound);
        }
        [mcu, voltage] => (mcu, voltage),
        _ => {
            log::error!("Malformed chip properties: {:?}", found);
            return Err(Error::UnknownChip);
        }
    };

    let mcu = mcu.parse::<Mcu>().inspect_err(|e| {
        log::warn!("{}, immediately remove the controller from the ZIF socket, there is a risk of damage", e)
    });
    let prog_voltage = voltage.parse::<ProgVoltage>().inspect_err(|e| {
        log::warn!("{}, immediately remove the controller from the ZIF socket, there is a risk of damage", e)
    });

    let non_blank_bytes = parse_labelled(&tokens, "nonblank");
    let byte_cursor = parse_labelled(&tokens, "counter");

    let (Ok(mcu), Ok(prog_voltage)) = (mcu, prog_voltage) else {
        return Err(Error::UnknownChip);
    };
    match (non_blank_bytes, byte_cursor) {
        (Some(non_blank_bytes), Some(byte_cursor)) => Ok(ChipInfo {
            mcu,
            prog_voltage,
            non_blank_bytes,
            byte_cursor,
        }),
        _ => {
            log::error!("Missing nonblank/counter fields in info message: {:?}", response);
            Err(Error::InfoMessageParseFailed)
        }
    }
}

/// Parses the reply to `GET_PGM_PARAMS`.
pub fn parse_pgm_params(response: &str) -> Result<ProgrammerParams> {
    let fields: Vec<&str> = response
        .split_whitespace()
        .next()
        .map(|t| t.split(',').collect())
        .unwrap_or_default();

    let parsed = match fields[..] {
        [postfix, non_blank, cursor] => (|| {
            Some(ProgrammerParams {
                mcu_postfix: postfix.parse().ok()?,
                non_blank_bytes: non_blank.parse().ok()?,
                byte_cursor: cursor.parse().ok()?,
            })
        })(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        log::error!("Malformed pgm message: {:?}", response);
        Error::PgmMessageParseFailed
    })
}

/// Parses the reply to `GET_CHECKSUM`, the second token after the `CHKSUM` label.
pub fn parse_checksum(response: &str) -> Result<u32> {
    let tokens: Vec<&str> = response.split_whitespace().collect();
    let value = tokens
        .iter()
        .position(|&t| t == "CHKSUM")
        .and_then(|idx| tokens.get(idx + 2))
        .and_then(|raw| {
            let digits = raw
                .strip_prefix("0x")
                .or_else(|| raw.strip_prefix("0X"))
                .unwrap_or(raw);
            u32::from_str_radix(digits, 16).ok()
        });
    value.ok_or_else(|| {
        log::error!("Malformed checksum message: {:?}", response);
        Error::ChecksumProcessingError
    })
}

/// Encodes a byte cursor as the `SET_COUNTER` payload: ASCII decimal and `\n`.
pub fn encode_counter(count: i64) -> Result<Vec<u8>> {
    if count < 0 {
        log::error!("Invalid counter value: {}, negative value", count);
        return Err(Error::CounterEncodingFailed);
    }
    let encoded = format!("{}\n", count);
    if encoded.len() > MAX_COUNTER_DIGITS + 1 {
        log::error!(
            "Too big counter value: {}, no more than {} digits expected",
            count,
            MAX_COUNTER_DIGITS
        );
        return Err(Error::CounterEncodingFailed);
    }
    Ok(encoded.into_bytes())
}

/// Decodes the hex dump sent in reply to `READ_FIRMWARE`.
pub fn decode_firmware(response: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = response.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(digits)?)
}
