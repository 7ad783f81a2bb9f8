//! Non-volatile storage collaborator.

use thiserror::Error;

use crate::FLASH_PAGE;

/// A storage transfer the host driver could not complete. Persistence
/// failures are reported and absorbed; the pipeline keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("storage transfer failed")]
pub struct StorageError;

/// Byte-addressed non-volatile storage provided by the host.
///
/// Reads are addressed; writes are sequential from wherever the host's
/// write cursor stands. Either direction moves at most [`FLASH_PAGE`]
/// bytes per call.
pub trait FlashStorage {
    fn flash_read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), StorageError>;
    fn flash_write(&mut self, data: &[u8]) -> Result<(), StorageError>;
}

/// Read `buf.len()` bytes starting at offset 0 in page-sized transfers.
pub fn read_paged<S: FlashStorage + ?Sized>(
    storage: &mut S,
    buf: &mut [u8],
) -> Result<(), StorageError> {
    let len = buf.len();
    let mut offset = 0;
    while offset < len {
        let end = (offset + FLASH_PAGE).min(len);
        storage.flash_read(offset as u32, &mut buf[offset..end])?;
        offset = end;
    }
    Ok(())
}

/// Write `data` in page-sized transfers.
pub fn write_paged<S: FlashStorage + ?Sized>(
    storage: &mut S,
    data: &[u8],
) -> Result<(), StorageError> {
    let len = data.len();
    let mut offset = 0;
    while offset < len {
        let end = (offset + FLASH_PAGE).min(len);
        storage.flash_write(&data[offset..end])?;
        offset = end;
    }
    Ok(())
}
