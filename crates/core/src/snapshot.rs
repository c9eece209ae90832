//! Save state container.
//!
//! Every blob handed out by [`Session::serialize`](crate::Session::serialize)
//! is an engine payload wrapped in a fixed little-endian header:
//!
//! ```text
//! [0..8]   magic "EMUSNAP\0"
//! [8..10]  container version
//! [10..14] engine tag
//! [14..16] engine state version
//! [16..20] title checksum (ROM CRC-32)
//! [20..24] payload length
//! [24..28] payload CRC-32
//! [28..]   payload
//! ```
//!
//! The header is what lets a session refuse a state from another title,
//! another engine or another format revision before the engine touches it.

use crate::error::RejectReason;

pub const MAGIC: &[u8; 8] = b"EMUSNAP\0";
pub const CONTAINER_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 28;

/// Identity a blob must carry to be accepted by a loaded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub engine_tag: [u8; 4],
    pub state_version: u16,
    pub title_checksum: u32,
}

/// Wrap an engine payload into a self-describing blob.
pub fn encode(header: &SnapshotHeader, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    out.extend_from_slice(&header.engine_tag);
    out.extend_from_slice(&header.state_version.to_le_bytes());
    out.extend_from_slice(&header.title_checksum.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn u16_at(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn u32_at(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Read the header of a blob without validating it against anything.
pub fn peek(blob: &[u8]) -> Result<SnapshotHeader, RejectReason> {
    if blob.len() < HEADER_SIZE {
        return Err(RejectReason::Truncated { len: blob.len() });
    }
    if &blob[0..8] != MAGIC {
        return Err(RejectReason::BadMagic);
    }
    let mut engine_tag = [0u8; 4];
    engine_tag.copy_from_slice(&blob[10..14]);
    Ok(SnapshotHeader {
        engine_tag,
        state_version: u16_at(blob, 14),
        title_checksum: u32_at(blob, 16),
    })
}

/// Validate a blob against the expected identity and return its payload.
///
/// Checks run cheapest first; nothing is returned unless every check passes.
pub fn decode<'a>(blob: &'a [u8], expected: &SnapshotHeader) -> Result<&'a [u8], RejectReason> {
    let found = peek(blob)?;

    let container = u16_at(blob, 8);
    if container != CONTAINER_VERSION {
        return Err(RejectReason::ContainerVersion {
            found: container,
            expected: CONTAINER_VERSION,
        });
    }
    if found.engine_tag != expected.engine_tag {
        return Err(RejectReason::EngineMismatch {
            found: found.engine_tag,
            expected: expected.engine_tag,
        });
    }
    if found.state_version != expected.state_version {
        return Err(RejectReason::VersionMismatch {
            found: found.state_version,
            expected: expected.state_version,
        });
    }
    if found.title_checksum != expected.title_checksum {
        return Err(RejectReason::TitleMismatch {
            found: found.title_checksum,
            expected: expected.title_checksum,
        });
    }

    let declared = u32_at(blob, 20) as usize;
    let payload = &blob[HEADER_SIZE..];
    if declared != payload.len() {
        return Err(RejectReason::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }
    if crc32fast::hash(payload) != u32_at(blob, 24) {
        return Err(RejectReason::Corrupted);
    }
    Ok(payload)
}
