//! Error taxonomy for session operations.
//!
//! Engines report [`EngineError`]; the [`Session`](crate::Session) maps each
//! engine failure onto the [`SessionError`] category of the operation that
//! produced it, so callers only ever match on one enum.

use thiserror::Error;

/// Optional capability a loaded title may lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Snapshot,
    PersistentMemory,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Snapshot => write!(f, "save states"),
            Capability::PersistentMemory => write!(f, "battery-backed memory"),
        }
    }
}

/// Why a snapshot blob was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("blob is truncated ({len} bytes)")]
    Truncated { len: usize },
    #[error("bad magic")]
    BadMagic,
    #[error("unsupported container version {found} (expected {expected})")]
    ContainerVersion { found: u16, expected: u16 },
    #[error("state was written by engine {found:?}, loaded engine is {expected:?}")]
    EngineMismatch { found: [u8; 4], expected: [u8; 4] },
    #[error("state version {found} does not match engine version {expected}")]
    VersionMismatch { found: u16, expected: u16 },
    #[error("state belongs to a different title ({found:08X}, loaded {expected:08X})")]
    TitleMismatch { found: u32, expected: u32 },
    #[error("payload length {declared} does not match {actual} bytes present")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("payload checksum mismatch")]
    Corrupted,
    #[error("payload is malformed: {0}")]
    Malformed(String),
}

/// Errors returned by [`Session`](crate::Session) operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load ROM: {0}")]
    LoadFailure(String),
    #[error("no ROM is loaded")]
    NotLoaded,
    #[error("a ROM is already loaded; unload it first")]
    AlreadyLoaded,
    #[error("loaded title does not support {0}")]
    Unsupported(Capability),
    #[error("save state rejected: {0}")]
    SnapshotRejected(RejectReason),
    #[error("failed to create save state: {0}")]
    SnapshotFailed(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors reported by an [`EmulatorEngine`](crate::EmulatorEngine) implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Rejected(String),
    #[error("unknown option {0:?}")]
    InvalidOption(String),
    #[error("invalid value {value:?} for option {key:?}")]
    InvalidValue { key: String, value: String },
    #[error("expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("state encode failed: {0}")]
    Encode(String),
    #[error("state decode failed: {0}")]
    Decode(String),
}

impl EngineError {
    /// Map a failure from `create` onto the load category.
    pub(crate) fn into_load_failure(self) -> SessionError {
        SessionError::LoadFailure(self.to_string())
    }

    /// Map a failure from an argument-taking call (options, input, SRAM).
    pub(crate) fn into_invalid_argument(self) -> SessionError {
        SessionError::InvalidArgument(self.to_string())
    }

    /// Map a failure from `save_state`.
    pub(crate) fn into_snapshot_failed(self) -> SessionError {
        SessionError::SnapshotFailed(self.to_string())
    }

    /// Map a failure from `load_state`.
    pub(crate) fn into_snapshot_rejected(self) -> SessionError {
        SessionError::SnapshotRejected(RejectReason::Malformed(self.to_string()))
    }
}
