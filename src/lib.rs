//! EZDL programmer protocol implementation, for AT89C5x MCUs.

pub mod constants;
pub mod device;
pub mod error;
pub mod flashing;
pub mod format;
pub mod protocol;
pub mod transport;

pub use self::device::{ChipInfo, Mcu, ProgVoltage, ProgrammerParams};
pub use self::error::{Error, Result};
pub use self::flashing::{Connected, Flashing};
pub use self::protocol::Command;
pub use self::transport::Transport;
