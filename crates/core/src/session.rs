//! The live emulation context a host loop drives.
//!
//! A [`Session`] wraps one [`EngineFactory`] and holds at most one loaded
//! title. Every stateful call checks, in order: a title is loaded, the needed
//! capability is present, the arguments are in range. Only then does the
//! engine see the call, so a rejected call never mutates anything.

use crate::error::{Capability, SessionError};
use crate::logging::{log, LogCategory, LogLevel};
use crate::region::Region;
use crate::rom::RomImage;
use crate::snapshot::{self, SnapshotHeader};
use crate::system_info::SystemInfo;
use crate::types::{AudioBuffer, FrameBuffer};
use crate::{EmulatorEngine, EngineFactory};

struct Loaded {
    rom: RomImage,
    region: Region,
    engine: Box<dyn EmulatorEngine>,
}

impl Loaded {
    fn snapshot_header(&self) -> SnapshotHeader {
        SnapshotHeader {
            engine_tag: self.engine.state_tag(),
            state_version: self.engine.state_version(),
            title_checksum: self.rom.checksum(),
        }
    }
}

pub struct Session {
    factory: Box<dyn EngineFactory>,
    loaded: Option<Loaded>,
}

impl Session {
    pub fn new<F: EngineFactory + 'static>(factory: F) -> Self {
        Self {
            factory: Box::new(factory),
            loaded: None,
        }
    }

    pub fn system_info(&self) -> &'static SystemInfo {
        self.factory.system_info()
    }

    /// Load a title. With `region == None` the region is detected from the
    /// image. Fails with `AlreadyLoaded` while another title is live.
    pub fn load(&mut self, rom: RomImage, region: Option<Region>) -> Result<(), SessionError> {
        if self.loaded.is_some() {
            return Err(SessionError::AlreadyLoaded);
        }

        let region = match region {
            Some(r) => r,
            None => {
                let detected = self.factory.detect_region(rom.data());
                log(LogCategory::Cartridge, LogLevel::Info, || {
                    format!("auto-detected region {}", detected)
                });
                detected
            }
        };

        let engine = self.factory.create(&rom, region).map_err(|e| {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!("engine rejected ROM {:08X}: {}", rom.checksum(), e)
            });
            e.into_load_failure()
        })?;

        log(LogCategory::Session, LogLevel::Info, || {
            format!(
                "loaded {} bytes (crc {:08X}), region {}, {} fps, snapshots: {}, sram: {}",
                rom.len(),
                rom.checksum(),
                region,
                engine.target_frame_rate(),
                engine.supports_snapshot(),
                engine.supports_persistent_memory()
            )
        });

        self.loaded = Some(Loaded {
            rom,
            region,
            engine,
        });
        Ok(())
    }

    /// Load using an integer region code (`0` = auto-detect).
    pub fn load_with_code(&mut self, rom: RomImage, region_code: i32) -> Result<(), SessionError> {
        let region = Region::from_code(region_code)?;
        self.load(rom, region)
    }

    /// Drop the engine and the ROM. Idempotent.
    pub fn unload(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            log(LogCategory::Session, LogLevel::Info, || {
                format!("unloaded ROM {:08X}", loaded.rom.checksum())
            });
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn live(&self) -> Result<&Loaded, SessionError> {
        self.loaded.as_ref().ok_or(SessionError::NotLoaded)
    }

    fn live_mut(&mut self) -> Result<&mut Loaded, SessionError> {
        self.loaded.as_mut().ok_or(SessionError::NotLoaded)
    }

    pub fn region(&self) -> Option<Region> {
        self.loaded.as_ref().map(|l| l.region)
    }

    pub fn rom_checksum(&self) -> Option<u32> {
        self.loaded.as_ref().map(|l| l.rom.checksum())
    }

    pub fn target_frame_rate(&self) -> Option<u32> {
        self.loaded.as_ref().map(|l| l.engine.target_frame_rate())
    }

    pub fn max_players(&self) -> Option<usize> {
        self.loaded.as_ref().map(|l| l.engine.max_players())
    }

    /// False when nothing is loaded.
    pub fn supports_snapshot(&self) -> bool {
        self.loaded
            .as_ref()
            .is_some_and(|l| l.engine.supports_snapshot())
    }

    /// False when nothing is loaded.
    pub fn supports_persistent_memory(&self) -> bool {
        self.loaded
            .as_ref()
            .is_some_and(|l| l.engine.supports_persistent_memory())
    }

    pub fn reset(&mut self) -> Result<(), SessionError> {
        let loaded = self.live_mut()?;
        loaded.engine.reset();
        log(LogCategory::Session, LogLevel::Info, || "soft reset".to_string());
        Ok(())
    }

    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        let loaded = self.live_mut()?;
        loaded
            .engine
            .set_option(key, value)
            .map_err(|e| e.into_invalid_argument())?;
        log(LogCategory::Session, LogLevel::Debug, || {
            format!("option {} = {}", key, value)
        });
        Ok(())
    }

    /// Queue controller state for `player` (0-based) for the next frame.
    pub fn set_input(&mut self, player: usize, buttons: u32) -> Result<(), SessionError> {
        let loaded = self.live_mut()?;
        let max = loaded.engine.max_players();
        if player >= max {
            return Err(SessionError::InvalidArgument(format!(
                "player index {} out of range (0..{})",
                player, max
            )));
        }
        loaded
            .engine
            .set_input(player, buttons)
            .map_err(|e| e.into_invalid_argument())?;
        log(LogCategory::Input, LogLevel::Trace, || {
            format!("player {} buttons {:04X}", player, buttons)
        });
        Ok(())
    }

    /// Advance one frame and hand back freshly allocated video and audio.
    pub fn run_frame(&mut self) -> Result<(FrameBuffer, AudioBuffer), SessionError> {
        let loaded = self.live_mut()?;
        let out = loaded.engine.run_frame();
        log(LogCategory::Frame, LogLevel::Trace, || {
            format!(
                "frame: {} rows, {} audio frames",
                out.video.active_height,
                out.audio.frames()
            )
        });
        Ok((out.video, out.audio))
    }

    /// Capture the complete machine state as a versioned blob.
    pub fn serialize(&self) -> Result<Vec<u8>, SessionError> {
        let loaded = self.live()?;
        if !loaded.engine.supports_snapshot() {
            return Err(SessionError::Unsupported(Capability::Snapshot));
        }

        let payload = loaded
            .engine
            .save_state()
            .map_err(|e| e.into_snapshot_failed())?;
        let blob = snapshot::encode(&loaded.snapshot_header(), &payload);
        log(LogCategory::Snapshot, LogLevel::Debug, || {
            format!("state captured: {} bytes", blob.len())
        });
        Ok(blob)
    }

    /// Restore a blob produced by [`serialize`](Self::serialize) for the same
    /// title and engine revision. On any error the session is unchanged.
    pub fn deserialize(&mut self, blob: &[u8]) -> Result<(), SessionError> {
        let loaded = self.live_mut()?;
        if !loaded.engine.supports_snapshot() {
            return Err(SessionError::Unsupported(Capability::Snapshot));
        }

        let payload = snapshot::decode(blob, &loaded.snapshot_header()).map_err(|reason| {
            log(LogCategory::Snapshot, LogLevel::Warn, || {
                format!("state rejected: {}", reason)
            });
            SessionError::SnapshotRejected(reason)
        })?;
        loaded
            .engine
            .load_state(payload)
            .map_err(|e| e.into_snapshot_rejected())?;

        log(LogCategory::Snapshot, LogLevel::Debug, || {
            format!("state restored: {} bytes", blob.len())
        });
        Ok(())
    }

    /// Copy of battery-backed memory.
    pub fn persistent_memory(&self) -> Result<Vec<u8>, SessionError> {
        let loaded = self.live()?;
        if !loaded.engine.supports_persistent_memory() {
            return Err(SessionError::Unsupported(Capability::PersistentMemory));
        }
        loaded
            .engine
            .persistent_memory()
            .ok_or(SessionError::Unsupported(Capability::PersistentMemory))
    }

    /// Overwrite battery-backed memory. The length must match exactly.
    pub fn set_persistent_memory(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let loaded = self.live_mut()?;
        if !loaded.engine.supports_persistent_memory() {
            return Err(SessionError::Unsupported(Capability::PersistentMemory));
        }
        loaded
            .engine
            .set_persistent_memory(data)
            .map_err(|e| e.into_invalid_argument())?;
        log(LogCategory::Sram, LogLevel::Debug, || {
            format!("battery memory restored: {} bytes", data.len())
        });
        Ok(())
    }
}
