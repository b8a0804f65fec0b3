use std::time::Duration;

/// Line speed of the programmer, fixed by its firmware.
pub const DEFAULT_BAUDRATE: u32 = 9600;
/// Per-byte read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Every response ends with the prompt character.
pub const TERMINATOR: u8 = b'>';
/// Status trailer appended after a completed exchange.
pub const FOOTER: &str = "\n\r ok\n\r >";

/// Value read back from an unprogrammed flash cell.
pub const ERASED_CELL: u8 = 0xFF;

/// The byte cursor is sent as ASCII decimal, at most this many digits.
pub const MAX_COUNTER_DIGITS: usize = 5;

pub mod commands {
    pub const GET_TITLE: u8 = b'\n';
    pub const GET_INFO: u8 = b'g';
    pub const GET_PGM_PARAMS: u8 = b'p';
    pub const GET_CHECKSUM: u8 = b'c';
    pub const GET_HELP: u8 = b'?';

    pub const ERASE_FLASH: u8 = b'e';
    pub const LOAD_FIRMWARE: u8 = b'w';
    pub const READ_FIRMWARE: u8 = b'r';
    pub const LOCK_FLASH: u8 = b'l';

    pub const SET_COUNTER: u8 = b's';
}

/// Software flow control signals.
pub mod signals {
    /// Programmer is ready for the next payload byte.
    pub const XON: u8 = 0x11;
    /// Programmer accepted a payload byte.
    pub const XOFF: u8 = 0x13;
}
