//! Intel HEX firmware files
use std::path::Path;

use anyhow::Result;
use ihex::Record;

use crate::constants::ERASED_CELL;
use crate::error::Error;

/// Bytes per data record when saving.
const RECORD_LEN: usize = 16;
/// 8051 code memory is addressed with 16 bits.
const MAX_IMAGE_SIZE: usize = 0x1_0000;

/// Loads an Intel HEX file as a memory image starting at address 0.
pub fn load_hex<P: AsRef<Path>>(path: P) -> crate::Result<Vec<u8>> {
    let p = path.as_ref();
    if p.as_os_str().is_empty() {
        return Err(Error::EmptyArgument);
    }
    match p.try_exists() {
        Ok(true) => (),
        Ok(false) => {
            log::error!("{} does not exist", p.display());
            return Err(Error::FileNotExist);
        }
        Err(e) => {
            log::error!("Error checking {}: {}", p.display(), e);
            return Err(Error::ArgumentParseError);
        }
    }

    let image = std::fs::read_to_string(p)
        .map_err(anyhow::Error::from)
        .and_then(|data| read_ihex(&data))
        .map_err(|e| {
            log::error!("Processing hex data failed: {:#}", e);
            Error::HexProcessingError
        })?;
    log::info!("Read {} as IntelHex, {} bytes", p.display(), image.len());
    Ok(image)
}

/// Saves a memory image as Intel HEX, omitting erased (0xFF) cells.
pub fn save_hex<P: AsRef<Path>>(path: P, image: &[u8]) -> crate::Result<()> {
    let p = path.as_ref();
    if p.as_os_str().is_empty() {
        return Err(Error::EmptyArgument);
    }
    let data = write_ihex(image).map_err(|e| {
        log::error!("Processing hex data failed: {:#}", e);
        Error::HexProcessingError
    })?;
    std::fs::write(p, data).map_err(|e| {
        log::error!("Saving hex file {} failed: {}", p.display(), e);
        Error::SavingFileError
    })?;
    log::info!("Saved {} bytes image to {}", image.len(), p.display());
    Ok(())
}

pub fn read_ihex(data: &str) -> Result<Vec<u8>> {
    let mut base_address = 0;

    let mut records = vec![];
    for record in ihex::Reader::new(data) {
        let record = record?;
        use Record::*;
        match record {
            Data { offset, value } => {
                let offset = base_address + offset as u32;

                records.push((offset, value));
            }
            EndOfFile => (),
            ExtendedSegmentAddress(address) => {
                base_address = (address as u32) * 16;
            }
            StartSegmentAddress { .. } => (),
            ExtendedLinearAddress(address) => {
                base_address = (address as u32) << 16;
            }
            StartLinearAddress(_) => (),
        };
    }
    merge_sections(records)
}

/// Lays sections out from address 0, gaps are left erased.
fn merge_sections(mut sections: Vec<(u32, Vec<u8>)>) -> Result<Vec<u8>> {
    sections.sort(); // order by start address

    let end_address = sections
        .iter()
        .map(|(addr, sect)| *addr as usize + sect.len())
        .max()
        .ok_or_else(|| anyhow::format_err!("no data records"))?;
    anyhow::ensure!(
        end_address <= MAX_IMAGE_SIZE,
        "image ends at 0x{:x}, beyond the 64KiB code space",
        end_address
    );

    let mut binary = vec![ERASED_CELL; end_address];
    let mut last_end = 0;
    for (addr, sect) in sections {
        let start = addr as usize;
        if start < last_end {
            log::warn!("overlapping data at 0x{:04x}", start);
        }
        binary[start..start + sect.len()].copy_from_slice(&sect);
        last_end = last_end.max(start + sect.len());
    }
    Ok(binary)
}

/// Renders `image` as sparse Intel HEX: only runs of non-erased bytes get a record.
pub fn write_ihex(image: &[u8]) -> Result<String> {
    let mut records = vec![];
    let mut segment = 0u16;
    let mut offset = 0;

    while offset < image.len() {
        if image[offset] == ERASED_CELL {
            offset += 1;
            continue;
        }
        let address = u32::try_from(offset)?;
        let upper = (address >> 16) as u16;
        if upper != segment {
            records.push(Record::ExtendedLinearAddress(upper));
            segment = upper;
        }
        // a record never crosses a 64KiB boundary
        let limit = (offset + RECORD_LEN)
            .min(image.len())
            .min((upper as usize + 1) << 16);
        let end = image[offset..limit]
            .iter()
            .position(|&b| b == ERASED_CELL)
            .map_or(limit, |n| offset + n);
        records.push(Record::Data {
            offset: address as u16,
            value: image[offset..end].to_vec(),
        });
        offset = end;
    }
    records.push(Record::EndOfFile);

    Ok(ihex::create_object_file_representation(&records)?)
}
