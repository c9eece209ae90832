//! Frame sequencer and the serializable machine state.
//!
//! The sequencer walks every scanline of a frame. Visible lines draw the
//! background plane, the first blanked line runs the V-blank handler, and
//! every line contributes its share of the frame's audio samples.

use crate::audio::{LowPass, Psg, CHANNELS, SAMPLE_RATE};
use crate::controller::{buttons, PadState};
use crate::sram::BatteryRam;
use crate::timing::RegionTiming;
use crate::video::{self, Palette, PlaneRenderer, PATTERN_BASE};
use bincode::Options;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::types::{AudioBuffer, FrameOutput};
use emu_core::EngineError;
use serde::{Deserialize, Serialize};

pub const WORK_RAM_SIZE: usize = 0x10000;

/// Bytes per input history entry in work RAM
const HISTORY_RECORD: usize = 8;
/// Bytes per save record in battery RAM
pub const SAVE_RECORD: usize = 16;

/// Upper bound for a decoded payload; work RAM dominates.
const MAX_PAYLOAD: u64 = 1 << 20;

const PLANE_WIDTH: i32 = 512;
const PLANE_HEIGHT: i32 = 256;

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_PAYLOAD)
}

/// Everything a frame step reads besides the machine itself.
pub struct FrameEnv<'a> {
    pub rom: &'a [u8],
    pub timing: RegionTiming,
    pub pads: [PadState; 2],
    pub sram: Option<&'a mut BatteryRam>,
    pub interlace: bool,
    pub low_pass: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    frame: u64,
    work_ram: Vec<u8>,
    scroll_x: u16,
    scroll_y: u16,
    palette_bank: u8,
    pads: [PadState; 2],
    previous_pads: [PadState; 2],
    psg: Psg,
    filter: LowPass,
    sram_enabled: bool,
    sram_writable: bool,
    saves_written: u32,
}

impl Machine {
    pub fn power_on(has_sram: bool) -> Self {
        Self {
            frame: 0,
            work_ram: vec![0; WORK_RAM_SIZE],
            scroll_x: 0,
            scroll_y: 0,
            palette_bank: 0,
            pads: [PadState::RELEASED; 2],
            previous_pads: [PadState::RELEASED; 2],
            psg: Psg::new(),
            filter: LowPass::default(),
            sram_enabled: has_sram,
            sram_writable: has_sram,
            saves_written: 0,
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn work_ram(&self) -> &[u8] {
        &self.work_ram
    }

    pub fn scroll(&self) -> (u16, u16) {
        (self.scroll_x, self.scroll_y)
    }

    pub fn palette_bank(&self) -> u8 {
        self.palette_bank
    }

    pub fn saves_written(&self) -> u32 {
        self.saves_written
    }

    pub fn step_frame(&mut self, mut env: FrameEnv<'_>) -> FrameOutput {
        let timing = env.timing;
        self.previous_pads = self.pads;
        self.pads = env.pads;
        self.program_sound(env.rom);

        let palette = Palette::from_cartridge(env.rom, self.palette_bank);
        let renderer = PlaneRenderer::new(env.rom);
        let line_repeat = if env.interlace { 2 } else { 1 };
        let mut frame = video::new_frame(timing.active_lines * line_repeat);
        let stride = frame.stride;

        let mut audio = AudioBuffer::new(SAMPLE_RATE, CHANNELS);
        audio
            .samples
            .reserve(timing.samples_per_frame(SAMPLE_RATE) * usize::from(CHANNELS));

        for line in 0..timing.scanlines {
            if line < timing.active_lines {
                let first = line * line_repeat;
                let row = &mut frame.pixels[first * stride..(first + 1) * stride];
                renderer.render_line(row, line, self.scroll_x, self.scroll_y, &palette);
                if env.interlace {
                    frame
                        .pixels
                        .copy_within(first * stride..(first + 1) * stride, (first + 1) * stride);
                }
            } else if line == timing.active_lines {
                self.vblank(env.sram.as_deref_mut());
            }
            let count = timing.samples_for_line(line, SAMPLE_RATE);
            self.psg.render(&mut audio.samples, count, timing.psg_clock_hz);
        }

        if env.low_pass {
            self.filter.apply(&mut audio.samples);
        }
        self.frame = self.frame.wrapping_add(1);

        FrameOutput {
            video: frame,
            audio,
        }
    }

    /// Sound driver tick, run once per frame before drawing.
    fn program_sound(&mut self, rom: &[u8]) {
        let body = rom.get(PATTERN_BASE..).filter(|b| !b.is_empty()).unwrap_or(rom);
        let note = if body.is_empty() {
            0
        } else {
            body[(self.frame / 8) as usize % body.len()] & 0x7F
        };
        let melody = 0x100 + u16::from(note) * 2;
        self.psg.set_tone(0, melody);
        self.psg.set_attenuation(0, 8);
        self.psg.set_tone(2, melody * 2);
        self.psg.set_attenuation(2, 11);

        let pad = self.pads[0];
        let chord = if pad.pressed(buttons::A) {
            0x0FE
        } else if pad.pressed(buttons::B) {
            0x0C9
        } else if pad.pressed(buttons::C) {
            0x0A9
        } else {
            0
        };
        if chord != 0 {
            self.psg.set_tone(1, chord);
            self.psg.set_attenuation(1, 4);
        } else {
            self.psg.set_attenuation(1, 0x0F);
        }

        if pad.dx() != 0 || pad.dy() != 0 {
            self.psg.set_noise(true, 2);
            self.psg.set_attenuation(3, 12);
        } else {
            self.psg.set_attenuation(3, 0x0F);
        }
    }

    fn vblank(&mut self, sram: Option<&mut BatteryRam>) {
        let [p1, p2] = self.pads;
        let [prev1, _] = self.previous_pads;

        // The plane drifts one pixel per frame; either pad pushes it further.
        let dx = 1 + (p1.dx() + p2.dx()) * 2;
        let dy = (p1.dy() + p2.dy()) * 2;
        self.scroll_x = (i32::from(self.scroll_x) + dx).rem_euclid(PLANE_WIDTH) as u16;
        self.scroll_y = (i32::from(self.scroll_y) + dy).rem_euclid(PLANE_HEIGHT) as u16;

        if p1.newly_pressed(prev1, buttons::A) {
            self.palette_bank = (self.palette_bank + 1) & 3;
        }
        if p1.newly_pressed(prev1, buttons::B) {
            self.palette_bank = self.palette_bank.wrapping_sub(1) & 3;
        }

        let slot = (self.frame as usize % (WORK_RAM_SIZE / HISTORY_RECORD)) * HISTORY_RECORD;
        let record = &mut self.work_ram[slot..slot + HISTORY_RECORD];
        record[0..4].copy_from_slice(&(self.frame as u32).to_le_bytes());
        record[4..6].copy_from_slice(&p1.bits().to_le_bytes());
        record[6..8].copy_from_slice(&p2.bits().to_le_bytes());

        if p1.newly_pressed(prev1, buttons::START) {
            if let Some(ram) = sram {
                self.write_save_record(ram);
            }
        }
    }

    fn write_save_record(&mut self, ram: &mut BatteryRam) {
        if !(self.sram_enabled && self.sram_writable) || ram.is_empty() {
            return;
        }
        let mut record = [0u8; SAVE_RECORD];
        record[0..2].copy_from_slice(b"SV");
        record[2..4].copy_from_slice(&(self.saves_written as u16).to_be_bytes());
        record[4..8].copy_from_slice(&(self.frame as u32).to_be_bytes());
        record[8..10].copy_from_slice(&self.scroll_x.to_be_bytes());
        record[10..12].copy_from_slice(&self.scroll_y.to_be_bytes());
        record[12] = self.palette_bank;
        record[13..15].copy_from_slice(&self.pads[0].bits().to_be_bytes());
        record[15] = record[..15].iter().fold(0, |acc, b| acc ^ b);

        let offset = (self.saves_written as usize * SAVE_RECORD) % ram.len();
        ram.write_wrapping(offset, &record);
        self.saves_written = self.saves_written.wrapping_add(1);
        log(LogCategory::Sram, LogLevel::Debug, || {
            format!("save record {} written at {:#06X}", self.saves_written, offset)
        });
    }

    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        codec()
            .serialize(self)
            .map_err(|e| EngineError::Encode(e.to_string()))
    }

    /// Decode and sanity check a payload from [`Machine::encode`].
    pub fn decode(payload: &[u8]) -> Result<Self, EngineError> {
        let machine: Machine = codec()
            .deserialize(payload)
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        if machine.work_ram.len() != WORK_RAM_SIZE {
            return Err(EngineError::Decode(format!(
                "work RAM is {} bytes",
                machine.work_ram.len()
            )));
        }
        if machine.palette_bank > 3
            || i32::from(machine.scroll_x) >= PLANE_WIDTH
            || i32::from(machine.scroll_y) >= PLANE_HEIGHT
        {
            return Err(EngineError::Decode("video registers out of range".to_string()));
        }
        let pads_ok = machine
            .pads
            .iter()
            .chain(machine.previous_pads.iter())
            .all(|p| p.bits() & !buttons::ALL == 0);
        if !pads_ok {
            return Err(EngineError::Decode("pad state has unknown buttons".to_string()));
        }
        machine.psg.validate()?;
        Ok(machine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::SramDecl;
    use crate::timing::{NTSC, PAL};

    fn rom() -> Vec<u8> {
        (0..0x2000u32).map(|i| (i * 7 + i / 13) as u8).collect()
    }

    fn env<'a>(rom: &'a [u8], pads: [PadState; 2], sram: Option<&'a mut BatteryRam>) -> FrameEnv<'a> {
        FrameEnv {
            rom,
            timing: NTSC,
            pads,
            sram,
            interlace: false,
            low_pass: true,
        }
    }

    fn pad(bits: u16) -> PadState {
        PadState::from_mask(u32::from(bits)).unwrap()
    }

    #[test]
    fn test_frame_shape() {
        let rom = rom();
        let mut m = Machine::power_on(false);
        let out = m.step_frame(env(&rom, [PadState::RELEASED; 2], None));
        assert_eq!(out.video.active_height, 224);
        assert_eq!(out.video.stride, 1280);
        assert_eq!(out.audio.frames(), 800);
        assert_eq!(m.frame(), 1);

        let mut pal = env(&rom, [PadState::RELEASED; 2], None);
        pal.timing = PAL;
        pal.interlace = true;
        let out = m.step_frame(pal);
        assert_eq!(out.video.active_height, 480);
        assert_eq!(out.audio.frames(), 960);
        assert_eq!(out.video.row(0), out.video.row(1));
    }

    #[test]
    fn test_deterministic() {
        let rom = rom();
        let mut a = Machine::power_on(false);
        let mut b = a.clone();
        for i in 0..10u16 {
            let pads = [pad(i & 0xFF), pad((i * 3) & 0xFF)];
            let fa = a.step_frame(env(&rom, pads, None));
            let fb = b.step_frame(env(&rom, pads, None));
            assert_eq!(fa, fb);
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_pad_scrolls_plane() {
        let rom = rom();
        let mut m = Machine::power_on(false);
        m.step_frame(env(&rom, [PadState::RELEASED; 2], None));
        assert_eq!(m.scroll(), (1, 0));

        m.step_frame(env(&rom, [pad(buttons::RIGHT | buttons::UP), PadState::RELEASED], None));
        assert_eq!(m.scroll(), (4, 254));

        m.step_frame(env(&rom, [pad(buttons::LEFT), pad(buttons::LEFT)], None));
        assert_eq!(m.scroll(), (1, 254));
    }

    #[test]
    fn test_palette_bank_on_press_edge() {
        let rom = rom();
        let mut m = Machine::power_on(false);
        let a = [pad(buttons::A), PadState::RELEASED];
        m.step_frame(env(&rom, a, None));
        m.step_frame(env(&rom, a, None));
        assert_eq!(m.palette_bank(), 1);

        m.step_frame(env(&rom, [pad(buttons::B), PadState::RELEASED], None));
        assert_eq!(m.palette_bank(), 0);
        m.step_frame(env(&rom, [PadState::RELEASED; 2], None));
        m.step_frame(env(&rom, [pad(buttons::B), PadState::RELEASED], None));
        assert_eq!(m.palette_bank(), 3);
    }

    #[test]
    fn test_input_history_in_work_ram() {
        let rom = rom();
        let mut m = Machine::power_on(false);
        m.step_frame(env(&rom, [pad(0x12), pad(0x34)], None));
        assert_eq!(&m.work_ram()[0..8], &[0, 0, 0, 0, 0x12, 0, 0x34, 0]);
    }

    #[test]
    fn test_start_writes_save_record() {
        let rom = rom();
        let mut ram = BatteryRam::new(SramDecl {
            start: 0x20_0001,
            end: 0x20_3FFF,
        });
        let mut m = Machine::power_on(true);
        let start = [pad(buttons::START), PadState::RELEASED];

        m.step_frame(env(&rom, start, Some(&mut ram)));
        // Held, not a new press
        m.step_frame(env(&rom, start, Some(&mut ram)));
        assert_eq!(m.saves_written(), 1);
        assert_eq!(&ram.as_slice()[0..2], b"SV");
        let record = &ram.as_slice()[..SAVE_RECORD];
        assert_eq!(record[15], record[..15].iter().fold(0, |a, b| a ^ b));

        m.step_frame(env(&rom, [PadState::RELEASED; 2], Some(&mut ram)));
        m.step_frame(env(&rom, start, Some(&mut ram)));
        assert_eq!(m.saves_written(), 2);
        assert_eq!(&ram.as_slice()[16..18], b"SV");
    }

    #[test]
    fn test_no_save_without_sram() {
        let rom = rom();
        let mut m = Machine::power_on(false);
        m.step_frame(env(&rom, [pad(buttons::START), PadState::RELEASED], None));
        assert_eq!(m.saves_written(), 0);
    }

    #[test]
    fn test_encode_decode() {
        let rom = rom();
        let mut m = Machine::power_on(true);
        for _ in 0..3 {
            m.step_frame(env(&rom, [pad(buttons::A | buttons::RIGHT), PadState::RELEASED], None));
        }
        let payload = m.encode().unwrap();
        assert_eq!(Machine::decode(&payload).unwrap(), m);

        assert!(Machine::decode(&payload[..payload.len() - 1]).is_err());
        assert!(Machine::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_rejects_out_of_range_registers() {
        let mut m = Machine::power_on(false);
        m.palette_bank = 9;
        let payload = m.encode().unwrap();
        assert!(matches!(Machine::decode(&payload), Err(EngineError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_bad_psg_state() {
        let rom = rom();
        let mut m = Machine::power_on(false);
        m.step_frame(env(&rom, [PadState::RELEASED; 2], None));
        let mut payload = m.encode().unwrap();
        // clock_remainder is the PSG's last field, ahead of the filter,
        // the two flags and the save counter.
        let at = payload.len() - (8 + 2 + 4) - 4;
        payload[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(Machine::decode(&payload), Err(EngineError::Decode(_))));
    }

    #[test]
    fn test_counters_wrap() {
        let rom = rom();
        let mut ram = BatteryRam::new(SramDecl {
            start: 0x20_0001,
            end: 0x20_3FFF,
        });
        let mut m = Machine::power_on(true);
        m.frame = u64::MAX;
        m.saves_written = u32::MAX;
        m.step_frame(env(&rom, [pad(buttons::START), PadState::RELEASED], Some(&mut ram)));
        assert_eq!(m.frame(), 0);
        assert_eq!(m.saves_written(), 0);
        assert!(Machine::decode(&m.encode().unwrap()).is_ok());
    }
}
