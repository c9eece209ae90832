//! [`EmulatorEngine`] and [`EngineFactory`] implementations.

use crate::controller::{PadState, Port};
use crate::header::{self, RomHeader, MAX_ROM_SIZE};
use crate::machine::{FrameEnv, Machine};
use crate::options::MdOptions;
use crate::sram::BatteryRam;
use crate::timing::RegionTiming;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::types::FrameOutput;
use emu_core::{EmulatorEngine, EngineError, EngineFactory, Region, RomImage, SystemInfo};
use std::sync::Arc;

pub const STATE_TAG: [u8; 4] = *b"MD68";
pub const STATE_VERSION: u16 = 1;
pub const MAX_PLAYERS: usize = 2;

/// One cartridge running on a Mega Drive.
pub struct MdEngine {
    rom: Arc<[u8]>,
    header: RomHeader,
    region: Region,
    timing: RegionTiming,
    options: MdOptions,
    ports: [Port; MAX_PLAYERS],
    sram: Option<BatteryRam>,
    machine: Machine,
}

impl MdEngine {
    pub fn new(rom: &RomImage, region: Region) -> Result<Self, EngineError> {
        let header =
            RomHeader::parse(rom.data()).map_err(|e| EngineError::Rejected(e.to_string()))?;

        let data: Arc<[u8]> = if rom.len() > MAX_ROM_SIZE {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "ROM is {} bytes, truncating to {} bytes",
                    rom.len(),
                    MAX_ROM_SIZE
                )
            });
            Arc::from(&rom.data()[..MAX_ROM_SIZE])
        } else {
            rom.shared()
        };

        let sram = header.sram.map(BatteryRam::new);
        let options = MdOptions::default();
        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!(
                "{:?} ({:?}, {:?} timing), SRAM: {}",
                header.title(),
                header.console_region,
                region,
                sram.as_ref()
                    .map_or("none".to_string(), |s| format!("{} bytes", s.len()))
            )
        });

        Ok(Self {
            machine: Machine::power_on(sram.is_some()),
            rom: data,
            header,
            region,
            timing: RegionTiming::for_region(region),
            ports: [
                Port::new(true, options.six_button),
                Port::new(options.p2_connected, options.six_button),
            ],
            options,
            sram,
        })
    }

    pub fn header(&self) -> &RomHeader {
        &self.header
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn options(&self) -> MdOptions {
        self.options
    }

    fn sync_ports(&mut self) {
        for port in &mut self.ports {
            port.six_button = self.options.six_button;
        }
        self.ports[1].connected = self.options.p2_connected;
    }
}

impl EmulatorEngine for MdEngine {
    fn target_frame_rate(&self) -> u32 {
        self.timing.frame_rate
    }

    fn region(&self) -> Region {
        self.region
    }

    fn max_players(&self) -> usize {
        MAX_PLAYERS
    }

    fn supports_snapshot(&self) -> bool {
        true
    }

    fn supports_persistent_memory(&self) -> bool {
        self.sram.is_some()
    }

    fn reset(&mut self) {
        self.machine = Machine::power_on(self.sram.is_some());
    }

    fn set_option(&mut self, key: &str, value: &str) -> Result<(), EngineError> {
        self.options.apply(key, value)?;
        self.sync_ports();
        Ok(())
    }

    fn set_input(&mut self, player: usize, buttons: u32) -> Result<(), EngineError> {
        let pad = PadState::from_mask(buttons)?;
        let port = self
            .ports
            .get_mut(player)
            .ok_or_else(|| EngineError::Rejected(format!("no controller port {}", player)))?;
        port.queue(pad);
        Ok(())
    }

    fn run_frame(&mut self) -> FrameOutput {
        let pads = [self.ports[0].latch(), self.ports[1].latch()];
        self.machine.step_frame(FrameEnv {
            rom: &self.rom[..],
            timing: self.timing,
            pads,
            sram: self.sram.as_mut(),
            interlace: self.options.interlace,
            low_pass: self.options.low_pass_filter,
        })
    }

    fn state_tag(&self) -> [u8; 4] {
        STATE_TAG
    }

    fn state_version(&self) -> u16 {
        STATE_VERSION
    }

    fn save_state(&self) -> Result<Vec<u8>, EngineError> {
        self.machine.encode()
    }

    fn load_state(&mut self, payload: &[u8]) -> Result<(), EngineError> {
        self.machine = Machine::decode(payload)?;
        Ok(())
    }

    fn persistent_memory(&self) -> Option<Vec<u8>> {
        self.sram.as_ref().map(|s| s.as_slice().to_vec())
    }

    fn set_persistent_memory(&mut self, data: &[u8]) -> Result<(), EngineError> {
        match self.sram.as_mut() {
            Some(sram) => sram.load(data),
            None => Err(EngineError::SizeMismatch {
                expected: 0,
                actual: data.len(),
            }),
        }
    }
}

/// Creates [`MdEngine`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct MdFactory;

impl EngineFactory for MdFactory {
    fn system_info(&self) -> &'static SystemInfo {
        crate::system_info()
    }

    fn detect_region(&self, rom: &[u8]) -> Region {
        header::detect_region(rom)
    }

    fn create(&self, rom: &RomImage, region: Region) -> Result<Box<dyn EmulatorEngine>, EngineError> {
        Ok(Box::new(MdEngine::new(rom, region)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::buttons;

    fn cartridge(with_sram: bool) -> RomImage {
        let mut rom: Vec<u8> = (0..0x4000u32).map(|i| (i ^ (i >> 5)) as u8).collect();
        rom[0x100..0x110].copy_from_slice(b"SEGA MEGA DRIVE ");
        rom[0x120..0x180].fill(b' ');
        rom[0x150..0x15A].copy_from_slice(b"TEST CART ");
        rom[0x1B0..0x1BC].fill(b' ');
        rom[0x1F0..0x1F3].copy_from_slice(b"U  ");
        if with_sram {
            rom[0x1B0..0x1B4].copy_from_slice(&[b'R', b'A', 0xF8, 0x20]);
            rom[0x1B4..0x1B8].copy_from_slice(&0x20_0000u32.to_be_bytes());
            rom[0x1B8..0x1BC].copy_from_slice(&0x20_01FFu32.to_be_bytes());
        }
        header::fix_checksum(&mut rom);
        RomImage::new(rom).unwrap()
    }

    #[test]
    fn test_create_rejects_non_cartridge() {
        let rom = RomImage::new(vec![0u8; 0x400]).unwrap();
        assert!(matches!(
            MdEngine::new(&rom, Region::Ntsc),
            Err(EngineError::Rejected(_))
        ));
        let tiny = RomImage::new(vec![1u8; 16]).unwrap();
        assert!(MdEngine::new(&tiny, Region::Ntsc).is_err());
    }

    #[test]
    fn test_header_and_capabilities() {
        let engine = MdEngine::new(&cartridge(true), Region::Ntsc).unwrap();
        assert_eq!(engine.header().title(), "TEST CART");
        assert!(engine.header().checksum_ok());
        assert!(engine.supports_persistent_memory());
        assert_eq!(engine.persistent_memory().unwrap().len(), 0x200);

        let plain = MdEngine::new(&cartridge(false), Region::Ntsc).unwrap();
        assert!(!plain.supports_persistent_memory());
        assert!(plain.persistent_memory().is_none());
        assert!(plain.supports_snapshot());
    }

    #[test]
    fn test_frame_rate_follows_region() {
        let rom = cartridge(false);
        assert_eq!(MdEngine::new(&rom, Region::Ntsc).unwrap().target_frame_rate(), 60);
        assert_eq!(MdEngine::new(&rom, Region::Pal).unwrap().target_frame_rate(), 50);
    }

    #[test]
    fn test_oversized_rom_is_truncated() {
        let mut rom = vec![0u8; MAX_ROM_SIZE + 0x100];
        rom[0x100..0x110].copy_from_slice(b"SEGA GENESIS    ");
        let engine = MdEngine::new(&RomImage::new(rom).unwrap(), Region::Ntsc).unwrap();
        assert_eq!(engine.rom.len(), MAX_ROM_SIZE);
    }

    #[test]
    fn test_input_is_latched_per_frame() {
        let mut engine = MdEngine::new(&cartridge(false), Region::Ntsc).unwrap();
        engine.set_input(0, u32::from(buttons::RIGHT)).unwrap();
        engine.set_input(0, 0).unwrap();
        engine.run_frame();
        // Only the last queued state counts
        assert_eq!(engine.machine().scroll(), (1, 0));

        engine.set_input(0, u32::from(buttons::RIGHT)).unwrap();
        engine.run_frame();
        assert_eq!(engine.machine().scroll(), (4, 0));
    }

    #[test]
    fn test_bad_input_rejected() {
        let mut engine = MdEngine::new(&cartridge(false), Region::Ntsc).unwrap();
        assert!(engine.set_input(0, 0x1000).is_err());
        assert!(engine.set_input(2, 0).is_err());
    }

    #[test]
    fn test_disconnected_player_two_is_ignored() {
        let mut engine = MdEngine::new(&cartridge(false), Region::Ntsc).unwrap();
        assert!(!engine.options.p2_connected);
        engine.set_input(1, u32::from(buttons::RIGHT)).unwrap();
        engine.run_frame();
        assert_eq!(engine.machine().scroll(), (1, 0));

        engine.set_option("p2_connected", "true").unwrap();
        engine.run_frame();
        assert_eq!(engine.machine().scroll(), (4, 0));
    }

    #[test]
    fn test_reset_keeps_sram() {
        let mut engine = MdEngine::new(&cartridge(true), Region::Ntsc).unwrap();
        engine.set_persistent_memory(&[0xAB; 0x200]).unwrap();
        engine.run_frame();
        engine.reset();
        assert_eq!(engine.machine().frame(), 0);
        assert_eq!(engine.persistent_memory().unwrap(), vec![0xAB; 0x200]);
    }

    #[test]
    fn test_factory() {
        let factory = MdFactory;
        assert_eq!(factory.system_info().players, MAX_PLAYERS);
        let rom = cartridge(false);
        assert_eq!(factory.detect_region(rom.data()), Region::Ntsc);
        let engine = factory.create(&rom, Region::Pal).unwrap();
        assert_eq!(engine.region(), Region::Pal);
        assert_eq!(engine.state_tag(), STATE_TAG);
    }
}
