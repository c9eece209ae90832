//! Display timing region codes.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// Broadcast timing variant a title runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// 60 Hz timing
    Ntsc,
    /// 50 Hz timing
    Pal,
}

impl Region {
    /// Integer code meaning "detect from the ROM header".
    pub const AUTO_CODE: i32 = 0;

    /// Decode an integer region code as used across the host boundary.
    ///
    /// `0` asks for auto-detection and decodes to `None`.
    pub fn from_code(code: i32) -> Result<Option<Region>, SessionError> {
        match code {
            Self::AUTO_CODE => Ok(None),
            1 => Ok(Some(Region::Ntsc)),
            2 => Ok(Some(Region::Pal)),
            other => Err(SessionError::InvalidArgument(format!(
                "unknown region code {other}"
            ))),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Region::Ntsc => 1,
            Region::Pal => 2,
        }
    }

    /// Parse a region name ("auto", "ntsc", "pal"), case-insensitive.
    pub fn parse(name: &str) -> Result<Option<Region>, SessionError> {
        match name.to_ascii_lowercase().as_str() {
            "auto" => Ok(None),
            "ntsc" => Ok(Some(Region::Ntsc)),
            "pal" => Ok(Some(Region::Pal)),
            other => Err(SessionError::InvalidArgument(format!(
                "unknown region {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Ntsc => write!(f, "NTSC"),
            Region::Pal => write!(f, "PAL"),
        }
    }
}
