//! Programmer session and chip flashing logic.

use std::path::Path;

use crate::device::{ChipInfo, ProgrammerParams};
use crate::error::{Error, Result};
use crate::format;
use crate::protocol::{self, Command};
use crate::transport::{SerialTransport, Transport};

/// Opens a transport for a device path.
pub type Opener<T> = Box<dyn FnMut(&str) -> anyhow::Result<T>>;

/// Outcome of a successful [`Flashing::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connected {
    /// A new session was opened, the programmer answered with its title.
    Established { title: String },
    AlreadyConnected,
}

/// Preconditions checked, in order, before an operation touches the programmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    /// The link is open and the programmer answers a title request.
    Connected,
    /// A chip is detected in the socket.
    ChipPresent,
}

const LINK: &[Guard] = &[Guard::Connected];
const CHIP: &[Guard] = &[Guard::Connected, Guard::ChipPresent];

struct Link<T> {
    transport: T,
    path: String,
}

/// Session with one EZDL programmer.
///
/// The session is either disconnected or owns exactly one open transport.
/// Any failed operation closes the link, the caller has to reconnect.
pub struct Flashing<T: Transport> {
    opener: Opener<T>,
    link: Option<Link<T>>,
}

impl Flashing<SerialTransport> {
    /// Session over a serial port with the default line settings.
    pub fn new() -> Self {
        Self::with_opener(SerialTransport::open)
    }
}

impl Default for Flashing<SerialTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Flashing<T> {
    pub fn with_opener(opener: impl FnMut(&str) -> anyhow::Result<T> + 'static) -> Self {
        Flashing {
            opener: Box::new(opener),
            link: None,
        }
    }

    pub fn connect(&mut self, path: &str) -> Result<Connected> {
        if self.is_connected() {
            log::info!("Programmer is already connected");
            return Ok(Connected::AlreadyConnected);
        }
        // a stale link that stopped answering is replaced
        self.drop_link();

        let transport = (self.opener)(path).map_err(|e| {
            log::error!("Open programmer on {} failed: {:#}", path, e);
            Error::ConnectionError
        })?;
        self.link = Some(Link {
            transport,
            path: path.to_string(),
        });
        log::info!("Opened programmer on {}", path);

        // the handshake is the title query itself, its failure kind is kept
        let title = self.guarded(&[], Self::query_title)?;
        Ok(Connected::Established { title })
    }

    /// Closes the link. The session is disconnected afterwards even if closing fails.
    pub fn disconnect(&mut self) -> Result<()> {
        let Some(link) = self.link.take() else {
            log::info!("Programmer is already disconnected");
            return Ok(());
        };
        link.transport.close().map_err(|e| {
            log::error!("Disconnect programmer on {} failed: {:#}", link.path, e);
            Error::DisconnectionError
        })?;
        log::info!("Disconnected from {}", link.path);
        Ok(())
    }

    /// Checks the link by round-tripping a title request, never cached.
    pub fn is_connected(&mut self) -> bool {
        self.link.is_some() && self.query_title().is_ok()
    }

    /// Device path of the live session.
    pub fn device(&mut self) -> Option<String> {
        if self.is_connected() {
            self.link.as_ref().map(|link| link.path.clone())
        } else {
            None
        }
    }

    pub fn get_title(&mut self) -> Result<String> {
        self.guarded(LINK, Self::query_title)
    }

    pub fn get_help(&mut self) -> Result<String> {
        self.guarded(LINK, |this| {
            this.transfer(Command::GetHelp, None, false, Error::GettingTitleFailed)
        })
    }

    pub fn get_info(&mut self) -> Result<ChipInfo> {
        self.guarded(LINK, Self::query_info)
    }

    pub fn get_pgm_params(&mut self) -> Result<ProgrammerParams> {
        self.guarded(CHIP, |this| {
            let resp =
                this.transfer(Command::GetPgmParams, None, false, Error::GettingPgmDataFailed)?;
            protocol::parse_pgm_params(&resp)
        })
    }

    pub fn get_checksum(&mut self) -> Result<u32> {
        self.guarded(CHIP, |this| {
            let resp =
                this.transfer(Command::GetChecksum, None, false, Error::GettingChecksumFailed)?;
            protocol::parse_checksum(&resp)
        })
    }

    pub fn set_cursor(&mut self, position: usize) -> Result<()> {
        self.guarded(CHIP, |this| this.write_cursor(position))
    }

    pub fn erase(&mut self) -> Result<()> {
        self.guarded(CHIP, Self::erase_flash)
    }

    pub fn lock(&mut self) -> Result<()> {
        self.guarded(CHIP, |this| {
            let resp = this.transfer(Command::LockFlash, None, false, Error::LockingFailed)?;
            log::debug!("Lock response: {:?}", resp);
            log::info!("Code Flash Locked");
            Ok(())
        })
    }

    /// Erases the chip, programs the HEX file at `path` and verifies it.
    pub fn write<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.guarded(CHIP, |this| {
            let image = format::load_hex(path)?;
            this.write_image(&image)
        })
    }

    /// Reads the whole chip into a HEX file at `path`.
    pub fn read<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.read_to_file(path.as_ref(), None)
    }

    /// Reads the first `len` bytes of the chip into a HEX file at `path`.
    pub fn read_len<P: AsRef<Path>>(&mut self, path: P, len: usize) -> Result<()> {
        self.read_to_file(path.as_ref(), Some(len))
    }

    /// Reads `len` bytes, or the whole chip, into memory.
    pub fn read_memory(&mut self, len: Option<usize>) -> Result<Vec<u8>> {
        self.guarded(CHIP, |this| this.read_flash(len))
    }

    /// Compares chip memory against the HEX file at `path`.
    pub fn verify<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.guarded(CHIP, |this| {
            let image = format::load_hex(path)?;
            this.verify_flash(&image)
        })
    }

    pub fn verify_image(&mut self, image: &[u8]) -> Result<()> {
        self.guarded(CHIP, |this| this.verify_flash(image))
    }

    fn read_to_file(&mut self, path: &Path, len: Option<usize>) -> Result<()> {
        self.guarded(CHIP, |this| {
            if path.as_os_str().is_empty() {
                return Err(Error::EmptyArgument);
            }
            let data = this.read_flash(len)?;
            format::save_hex(path, &data)
        })
    }

    /// Runs `op` behind `guards`.
    ///
    /// Without a link nothing is sent. Once a link exists, any failure of a guard
    /// or of `op` tears the session down before the error is returned.
    fn guarded<R>(
        &mut self,
        guards: &[Guard],
        op: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        if self.link.is_none() {
            return Err(Error::ProgrammerDisconnected);
        }
        let result = guards
            .iter()
            .try_for_each(|&guard| self.check(guard))
            .and_then(|()| op(self));
        if let Err(err) = &result {
            log::error!("Operation failed: {}, disconnecting", err);
            let _ = self.disconnect();
        }
        result
    }

    fn check(&mut self, guard: Guard) -> Result<()> {
        match guard {
            Guard::Connected => self
                .query_title()
                .map(drop)
                .map_err(|_| Error::ProgrammerDisconnected),
            Guard::ChipPresent => self.query_info().map(drop),
        }
    }

    /// One exchange on the open link, transport failures become `on_error`.
    fn transfer(
        &mut self,
        cmd: Command,
        payload: Option<&[u8]>,
        action_check: bool,
        on_error: Error,
    ) -> Result<String> {
        let link = self.link.as_mut().ok_or(Error::ProgrammerDisconnected)?;
        link.transport
            .transfer(cmd, payload, action_check)
            .map_err(|e| {
                log::error!("{} failed: {:#}", cmd, e);
                on_error
            })
    }

    fn query_title(&mut self) -> Result<String> {
        let resp = self.transfer(Command::GetTitle, None, false, Error::GettingTitleFailed)?;
        Ok(protocol::parse_title(&resp))
    }

    fn query_info(&mut self) -> Result<ChipInfo> {
        let resp = self.transfer(Command::GetInfo, None, false, Error::GettingInfoDataFailed)?;
        let info = protocol::parse_info(&resp)?;
        log::debug!("found chip: {}", info);
        Ok(info)
    }

    fn write_cursor(&mut self, position: usize) -> Result<()> {
        let counter = i64::try_from(position)
            .map_err(|_| Error::CounterEncodingFailed)
            .and_then(protocol::encode_counter)?;
        let resp = self.transfer(
            Command::SetCounter,
            Some(counter.as_slice()),
            true,
            Error::SetCursorFailed,
        )?;
        log::debug!("Set counter {} response: {:?}", position, resp);
        Ok(())
    }

    fn erase_flash(&mut self) -> Result<()> {
        let resp = self.transfer(Command::EraseFlash, None, false, Error::ErasingFailed)?;
        log::debug!("Erase response: {:?}", resp);
        log::info!("Code Flash Erased");
        Ok(())
    }

    fn write_image(&mut self, image: &[u8]) -> Result<()> {
        let info = self.query_info()?;
        if image.len() > info.mcu.memory_size() {
            log::error!(
                "Image of {} bytes does not fit {} ({} bytes)",
                image.len(),
                info.mcu,
                info.mcu.memory_size()
            );
            return Err(Error::WritingFailed);
        }

        log::info!("Firmware size: {}", image.len());
        self.write_cursor(image.len())?;
        self.erase_flash()?;

        log::info!("Writing {} bytes", image.len());
        let resp = self.transfer(Command::LoadFirmware, Some(image), true, Error::WritingFailed)?;
        log::debug!("Write response: {:?}", resp);

        self.verify_flash(image)
    }

    fn read_flash(&mut self, len: Option<usize>) -> Result<Vec<u8>> {
        let info = self.query_info()?;
        let len = len.unwrap_or_else(|| info.mcu.memory_size());
        self.write_cursor(len)?;

        let resp = self.transfer(Command::ReadFirmware, None, false, Error::ReadingFailed)?;
        let data = protocol::decode_firmware(&resp).map_err(|e| {
            log::error!("Read binary string from chip failed: {:#}", e);
            Error::ReadingFailed
        })?;
        if data.len() != len {
            log::warn!("Requested {} bytes, chip returned {}", len, data.len());
        }
        log::info!("Read {} bytes from {}", data.len(), info.mcu);
        Ok(data)
    }

    fn verify_flash(&mut self, image: &[u8]) -> Result<()> {
        let data = self.read_flash(Some(image.len()))?;
        if data != image {
            match data.iter().zip(image).position(|(a, b)| a != b) {
                Some(offset) => log::error!(
                    "Verify failed at 0x{:04x}: chip 0x{:02x} != image 0x{:02x}",
                    offset,
                    data[offset],
                    image[offset]
                ),
                None => log::error!(
                    "Verify failed: chip returned {} bytes, image has {}",
                    data.len(),
                    image.len()
                ),
            }
            return Err(Error::VerificationFailed);
        }
        log::info!("Verified {} bytes", image.len());
        Ok(())
    }

    fn drop_link(&mut self) {
        if self.link.is_some() {
            let _ = self.disconnect();
        }
    }
}
