//! Core session primitives and traits.
//!
//! An [`EngineFactory`] turns a staged [`RomImage`] into a boxed
//! [`EmulatorEngine`]; a [`Session`] owns at most one engine at a time and is
//! the only thing a host loop talks to.

pub mod error;
pub mod logging;
pub mod region;
pub mod rom;
pub mod session;
pub mod shared;
pub mod snapshot;
pub mod system_info;

pub mod types {
    use serde::{Deserialize, Serialize};

    /// Bytes per pixel of the packed RGBA8888 format every engine emits.
    pub const BYTES_PER_PIXEL: usize = 4;

    /// One rendered video frame, handed to the caller by value.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct FrameBuffer {
        pub width: u32,
        /// Bytes per row
        pub stride: usize,
        /// Rows holding valid pixels; the buffer may be taller.
        pub active_height: usize,
        pub pixels: Vec<u8>,
    }

    impl FrameBuffer {
        /// A zeroed buffer with room for `rows` rows.
        pub fn new(width: u32, rows: usize) -> Self {
            let stride = width as usize * BYTES_PER_PIXEL;
            Self {
                width,
                stride,
                active_height: rows,
                pixels: vec![0; stride * rows],
            }
        }

        /// Allocated rows
        pub fn rows(&self) -> usize {
            if self.stride == 0 {
                0
            } else {
                self.pixels.len() / self.stride
            }
        }

        /// The valid part of the buffer, clamped to what is allocated.
        pub fn active_pixels(&self) -> &[u8] {
            let end = self.stride.saturating_mul(self.active_height);
            &self.pixels[..end.min(self.pixels.len())]
        }

        pub fn row(&self, y: usize) -> Option<&[u8]> {
            if y >= self.active_height {
                return None;
            }
            self.pixels.get(y * self.stride..(y + 1) * self.stride)
        }
    }

    pub type AudioSample = i16;

    /// Interleaved PCM produced by one frame step.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AudioBuffer {
        pub sample_rate: u32,
        pub channels: u16,
        pub samples: Vec<AudioSample>,
    }

    impl AudioBuffer {
        pub fn new(sample_rate: u32, channels: u16) -> Self {
            Self {
                sample_rate,
                channels,
                samples: Vec::new(),
            }
        }

        /// Sample frames (one sample per channel each)
        pub fn frames(&self) -> usize {
            if self.channels == 0 {
                0
            } else {
                self.samples.len() / self.channels as usize
            }
        }
    }

    /// Output of a single frame step.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct FrameOutput {
        pub video: FrameBuffer,
        pub audio: AudioBuffer,
    }
}

pub use error::{Capability, EngineError, RejectReason, SessionError};
pub use region::Region;
pub use rom::{rom_checksum, RomImage};
pub use session::Session;
pub use shared::SharedSession;
pub use system_info::SystemInfo;

/// One loaded title on one emulated machine.
///
/// Implementations are driven exclusively through a [`Session`], which checks
/// preconditions (loaded, capability present, player index in range) before
/// calling in, so engines can assume them.
pub trait EmulatorEngine: Send {
    /// Frames per second the host loop should aim for
    fn target_frame_rate(&self) -> u32;

    fn region(&self) -> Region;

    /// Number of controller ports; valid player indices are `0..max_players()`.
    fn max_players(&self) -> usize;

    fn supports_snapshot(&self) -> bool {
        false
    }

    fn supports_persistent_memory(&self) -> bool {
        false
    }

    /// Soft reset; battery memory survives.
    fn reset(&mut self);

    fn set_option(&mut self, key: &str, value: &str) -> Result<(), EngineError>;

    /// Queue controller state for the next frame step.
    fn set_input(&mut self, player: usize, buttons: u32) -> Result<(), EngineError>;

    /// Advance exactly one frame.
    fn run_frame(&mut self) -> types::FrameOutput;

    /// Four bytes identifying the engine in save state headers
    fn state_tag(&self) -> [u8; 4];

    /// Revision of the payload layout produced by `save_state`
    fn state_version(&self) -> u16;

    fn save_state(&self) -> Result<Vec<u8>, EngineError> {
        Err(EngineError::Encode("save states not supported".to_string()))
    }

    /// Restore a payload produced by `save_state`. Must leave the engine
    /// untouched when it returns an error.
    fn load_state(&mut self, _payload: &[u8]) -> Result<(), EngineError> {
        Err(EngineError::Decode("save states not supported".to_string()))
    }

    /// Copy of battery memory, `None` when the title has none.
    fn persistent_memory(&self) -> Option<Vec<u8>> {
        None
    }

    fn set_persistent_memory(&mut self, data: &[u8]) -> Result<(), EngineError> {
        Err(EngineError::SizeMismatch {
            expected: 0,
            actual: data.len(),
        })
    }
}

/// Builds engines for one system.
pub trait EngineFactory: Send {
    /// Process-wide metadata, decoded once.
    fn system_info(&self) -> &'static SystemInfo;

    /// Classify a ROM's display timing from its contents.
    fn detect_region(&self, rom: &[u8]) -> Region;

    /// Validate the image and initialise machine state for it.
    fn create(&self, rom: &RomImage, region: Region)
        -> Result<Box<dyn EmulatorEngine>, EngineError>;
}
