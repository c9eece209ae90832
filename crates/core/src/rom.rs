//! Cartridge image staging.

use crate::error::SessionError;
use std::sync::Arc;

/// CRC-32 (IEEE) over a ROM image, used as the title identity.
pub fn rom_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// An immutable cartridge image plus its content checksum.
///
/// The bytes are reference counted so an engine can keep a view of the image
/// without copying it; nothing ever mutates them after staging.
#[derive(Debug, Clone)]
pub struct RomImage {
    data: Arc<[u8]>,
    checksum: u32,
}

impl RomImage {
    /// Stage a ROM and compute its checksum.
    pub fn new(data: Vec<u8>) -> Result<Self, SessionError> {
        let checksum = rom_checksum(&data);
        Self::with_checksum(data, checksum)
    }

    /// Stage a ROM whose checksum was already computed by the caller
    /// (e.g. the ROM library that catalogued it).
    pub fn with_checksum(data: Vec<u8>, checksum: u32) -> Result<Self, SessionError> {
        if data.is_empty() {
            return Err(SessionError::LoadFailure("ROM image is empty".to_string()));
        }
        Ok(Self {
            data: data.into(),
            checksum,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the bytes, for engines that keep the image around.
    pub fn shared(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
