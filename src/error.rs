//! Error kinds reported by programmer operations.

use thiserror::Error;

/// Result type for programmer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kind of a programmer operation.
///
/// Each kind carries one fixed message. Details of the underlying transport
/// or parse failure are logged where the failure is converted, never carried
/// across the operation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Error {
    #[error("Connecting to flasher programmer failed, replug your device.")]
    ConnectionError,
    #[error("Disconnecting finished with error.")]
    DisconnectionError,
    #[error("Programmer is not connected.")]
    ProgrammerDisconnected,
    #[error("Argument expected but not passed.")]
    EmptyArgument,
    #[error("Error processing input argument.")]
    ArgumentParseError,
    #[error("File does not exist.")]
    FileNotExist,
    #[error("Error processing hex file, check your binary file.")]
    HexProcessingError,
    #[error("Saving hex file failed.")]
    SavingFileError,
    #[error("Set byte cursor finished with error.")]
    SetCursorFailed,
    #[error("Erasing chip memory failed.")]
    ErasingFailed,
    #[error("Writing hex file to chip memory failed.")]
    WritingFailed,
    #[error("Reading chip memory failed.")]
    ReadingFailed,
    #[error("Locking chip memory failed.")]
    LockingFailed,
    #[error("Error processing checksum message.")]
    ChecksumProcessingError,
    #[error("Error getting checksum from chip.")]
    GettingChecksumFailed,
    #[error("Error getting pgm data from chip.")]
    GettingPgmDataFailed,
    #[error("Error getting chip information.")]
    GettingInfoDataFailed,
    #[error("Error getting programmer information.")]
    GettingTitleFailed,
    #[error("Generating counter message for programmer failed, invalid counter value.")]
    CounterEncodingFailed,
    #[error("Error parsing PGM message from programmer.")]
    PgmMessageParseFailed,
    #[error("Error parsing chip information message from programmer.")]
    InfoMessageParseFailed,
    #[error("Failed to recognize the chip.")]
    UnknownChip,
    #[error("Chip not found.")]
    ChipNotFound,
    #[error("Chip memory does not match the image.")]
    VerificationFailed,
}
