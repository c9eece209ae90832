//! Thread-safe handle for hosts that step frames on a dedicated thread.
//!
//! Each method holds the lock for exactly one session operation, so a frame
//! step can never interleave with a save state or battery memory transfer.

use crate::error::SessionError;
use crate::rom::RomImage;
use crate::session::Session;
use crate::types::{AudioBuffer, FrameBuffer};
use crate::Region;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<Session>>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        // Session methods validate before mutating, so a panic elsewhere
        // cannot leave it half-updated; keep serving.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run several operations under one lock acquisition.
    pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn load(&self, rom: RomImage, region: Option<Region>) -> Result<(), SessionError> {
        self.lock().load(rom, region)
    }

    pub fn unload(&self) {
        self.lock().unload()
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().is_loaded()
    }

    pub fn target_frame_rate(&self) -> Option<u32> {
        self.lock().target_frame_rate()
    }

    pub fn set_input(&self, player: usize, buttons: u32) -> Result<(), SessionError> {
        self.lock().set_input(player, buttons)
    }

    pub fn set_option(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.lock().set_option(key, value)
    }

    pub fn run_frame(&self) -> Result<(FrameBuffer, AudioBuffer), SessionError> {
        self.lock().run_frame()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SessionError> {
        self.lock().serialize()
    }

    pub fn deserialize(&self, blob: &[u8]) -> Result<(), SessionError> {
        self.lock().deserialize(blob)
    }

    pub fn persistent_memory(&self) -> Result<Vec<u8>, SessionError> {
        self.lock().persistent_memory()
    }

    pub fn set_persistent_memory(&self, data: &[u8]) -> Result<(), SessionError> {
        self.lock().set_persistent_memory(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system_info::SystemInfo;
    use crate::types::FrameOutput;
    use crate::{EmulatorEngine, EngineError, EngineFactory};
    use std::sync::OnceLock;
    use std::thread;

    struct Ticker {
        ticks: u64,
    }

    impl EmulatorEngine for Ticker {
        fn target_frame_rate(&self) -> u32 {
            50
        }
        fn region(&self) -> Region {
            Region::Pal
        }
        fn max_players(&self) -> usize {
            1
        }
        fn supports_snapshot(&self) -> bool {
            true
        }
        fn reset(&mut self) {
            self.ticks = 0;
        }
        fn set_option(&mut self, key: &str, _value: &str) -> Result<(), EngineError> {
            Err(EngineError::InvalidOption(key.to_string()))
        }
        fn set_input(&mut self, _player: usize, _buttons: u32) -> Result<(), EngineError> {
            Ok(())
        }
        fn run_frame(&mut self) -> FrameOutput {
            self.ticks += 1;
            FrameOutput {
                video: FrameBuffer::new(1, 1),
                audio: AudioBuffer::new(8000, 1),
            }
        }
        fn state_tag(&self) -> [u8; 4] {
            *b"TICK"
        }
        fn state_version(&self) -> u16 {
            1
        }
        fn save_state(&self) -> Result<Vec<u8>, EngineError> {
            Ok(self.ticks.to_le_bytes().to_vec())
        }
    }

    struct TickerFactory;

    impl EngineFactory for TickerFactory {
        fn system_info(&self) -> &'static SystemInfo {
            static INFO: OnceLock<SystemInfo> = OnceLock::new();
            INFO.get_or_init(|| SystemInfo {
                name: "ticker".to_string(),
                console_name: "Ticker".to_string(),
                version: "0".to_string(),
                extensions: Vec::new(),
                screen_width: 1,
                max_screen_height: 1,
                pixel_aspect_ratio: 1.0,
                sample_rate: 8000,
                players: 1,
                buttons: Vec::new(),
                options: Vec::new(),
            })
        }
        fn detect_region(&self, _rom: &[u8]) -> Region {
            Region::Pal
        }
        fn create(
            &self,
            _rom: &RomImage,
            _region: Region,
        ) -> Result<Box<dyn EmulatorEngine>, EngineError> {
            Ok(Box::new(Ticker { ticks: 0 }))
        }
    }

    #[test]
    fn test_frames_from_many_threads_are_all_counted() {
        let shared = SharedSession::new(Session::new(TickerFactory));
        shared
            .load(RomImage::new(vec![0; 16]).unwrap(), None)
            .unwrap();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let s = shared.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        s.run_frame().unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let blob = shared.serialize().unwrap();
        let payload = &blob[crate::snapshot::HEADER_SIZE..];
        assert_eq!(u64::from_le_bytes(payload.try_into().unwrap()), 100);
    }

    #[test]
    fn test_with_groups_operations() {
        let shared = SharedSession::new(Session::new(TickerFactory));
        let rate = shared.with(|s| {
            s.load(RomImage::new(vec![1]).unwrap(), None)?;
            Ok::<_, SessionError>(s.target_frame_rate())
        });
        assert_eq!(rate.unwrap(), Some(50));

        shared.unload();
        assert!(!shared.is_loaded());
        assert!(matches!(shared.run_frame(), Err(SessionError::NotLoaded)));
    }
}
