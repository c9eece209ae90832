//! Sound output: an SN76489-compatible PSG and the output low-pass stage.
//!
//! Everything here is integer arithmetic so that a frame's samples depend
//! only on machine state.

use emu_core::EngineError;
use serde::{Deserialize, Serialize};

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u16 = 2;

/// Linear amplitude per 4-bit attenuation step (2 dB each, 15 = off).
/// Four channels at full volume stay inside `i16`.
const VOLUME_TABLE: [i32; 16] = [
    8191, 6506, 5168, 4105, 3261, 2590, 2057, 1634, 1298, 1031, 819, 651, 517, 411, 326, 0,
];

/// Sega PSG: three square wave tone channels and one noise channel, driven
/// through the chip's latch/data byte protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Psg {
    tone_period: [u16; 3],
    tone_counter: [u16; 3],
    tone_output: [bool; 3],
    noise_control: u8,
    /// 16-bit LFSR (Sega variant)
    noise_lfsr: u16,
    noise_counter: u16,
    noise_output: bool,
    /// Attenuation, 0 = loudest, 15 = silent
    attenuation: [u8; 4],
    latched: u8,
    /// Input clock ticks owed to the next sample, in units of 1/sample_rate
    clock_remainder: u32,
}

impl Default for Psg {
    fn default() -> Self {
        Self::new()
    }
}

impl Psg {
    pub fn new() -> Self {
        Self {
            tone_period: [0; 3],
            tone_counter: [0; 3],
            tone_output: [false; 3],
            noise_control: 0,
            noise_lfsr: 0x8000,
            noise_counter: 0,
            noise_output: false,
            attenuation: [0x0F; 4],
            latched: 0,
            clock_remainder: 0,
        }
    }

    /// Write one byte to the chip.
    pub fn write(&mut self, data: u8) {
        if data & 0x80 != 0 {
            let channel = (data >> 5) & 0x03;
            self.latched = channel;
            if data & 0x10 != 0 {
                self.attenuation[usize::from(channel)] = data & 0x0F;
            } else if channel == 3 {
                self.noise_control = data & 0x07;
                self.noise_lfsr = 0x8000;
            } else {
                let ch = usize::from(channel);
                self.tone_period[ch] = (self.tone_period[ch] & 0x3F0) | u16::from(data & 0x0F);
            }
        } else if self.latched < 3 {
            let ch = usize::from(self.latched);
            self.tone_period[ch] = (self.tone_period[ch] & 0x00F) | (u16::from(data & 0x3F) << 4);
        }
    }

    /// Program a tone channel's 10-bit period.
    pub fn set_tone(&mut self, channel: u8, period: u16) {
        let channel = channel & 0x03;
        self.write(0x80 | (channel << 5) | (period & 0x0F) as u8);
        self.write(((period >> 4) & 0x3F) as u8);
    }

    pub fn set_attenuation(&mut self, channel: u8, attenuation: u8) {
        self.write(0x90 | ((channel & 0x03) << 5) | (attenuation & 0x0F));
    }

    /// Select noise mode: `white` chooses the tapped LFSR, `rate` 0-3.
    pub fn set_noise(&mut self, white: bool, rate: u8) {
        let control = (u8::from(white) << 2) | (rate & 0x03);
        if control != self.noise_control {
            self.write(0xE0 | control);
        }
    }

    /// Range check for state restored from a payload.
    pub fn validate(&self) -> Result<(), EngineError> {
        let ok = self.clock_remainder < SAMPLE_RATE
            && self.tone_period.iter().all(|&p| p <= 0x3FF)
            && self.tone_counter.iter().all(|&c| c <= 0x3FF)
            && self.noise_control <= 0x07
            && self.attenuation.iter().all(|&a| a <= 0x0F)
            && self.latched <= 3;
        if ok {
            Ok(())
        } else {
            Err(EngineError::Decode("PSG registers out of range".to_string()))
        }
    }

    fn clock_once(&mut self) {
        for i in 0..3 {
            if self.tone_counter[i] > 0 {
                self.tone_counter[i] -= 1;
            } else {
                self.tone_counter[i] = self.tone_period[i];
                if self.tone_period[i] > 0 {
                    self.tone_output[i] = !self.tone_output[i];
                }
            }
        }

        if self.noise_counter > 0 {
            self.noise_counter -= 1;
        } else {
            self.noise_counter = match self.noise_control & 0x03 {
                0 => 0x10,
                1 => 0x20,
                2 => 0x40,
                _ => self.tone_period[2],
            };
            let feedback = if self.noise_control & 0x04 != 0 {
                (self.noise_lfsr ^ (self.noise_lfsr >> 3)) & 1 != 0
            } else {
                self.noise_lfsr & 1 != 0
            };
            self.noise_lfsr >>= 1;
            if feedback {
                self.noise_lfsr |= 0x8000;
            }
            self.noise_output = self.noise_lfsr & 1 != 0;
        }
    }

    fn mix(&self) -> i32 {
        let level = |on: bool, att: u8| {
            let amp = VOLUME_TABLE[usize::from(att & 0x0F)];
            if on {
                amp
            } else {
                -amp
            }
        };
        let tones: i32 = (0..3)
            .map(|i| level(self.tone_output[i], self.attenuation[i]))
            .sum();
        tones + level(self.noise_output, self.attenuation[3])
    }

    /// Advance the chip by one output sample period and return the mix.
    pub fn next_sample(&mut self, clock_hz: u32, sample_rate: u32) -> i16 {
        self.clock_remainder += clock_hz;
        while self.clock_remainder >= sample_rate {
            self.clock_once();
            self.clock_remainder -= sample_rate;
        }
        self.mix().clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
    }

    /// Append `frames` stereo sample frames to `out`.
    pub fn render(&mut self, out: &mut Vec<i16>, frames: usize, clock_hz: u32) {
        for _ in 0..frames {
            let s = self.next_sample(clock_hz, SAMPLE_RATE);
            out.push(s);
            out.push(s);
        }
    }
}

/// Filter coefficient for a first-order RC low-pass at 2840 Hz sampled at
/// 48 kHz: `1 / (1 + rate / (2 * pi * cutoff))`, in Q16.
const LPF_ALPHA_Q16: i64 = 17_761;
/// Fraction bits carried in the filter state
const STATE_SHIFT: u32 = 8;

/// Output smoothing. State carries over between frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowPass {
    left: i32,
    right: i32,
}

impl LowPass {
    fn step(state: &mut i32, input: i16) -> i16 {
        let target = i64::from(input) << STATE_SHIFT;
        let current = i64::from(*state);
        let next = current + (((target - current) * LPF_ALPHA_Q16) >> 16);
        *state = next as i32;
        let rounded = (next + (1 << (STATE_SHIFT - 1))) >> STATE_SHIFT;
        rounded.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
    }

    /// Filter interleaved stereo samples in place.
    pub fn apply(&mut self, samples: &mut [i16]) {
        for frame in samples.chunks_exact_mut(2) {
            frame[0] = Self::step(&mut self.left, frame[0]);
            frame[1] = Self::step(&mut self.right, frame[1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::NTSC;

    #[test]
    fn test_psg_starts_silent() {
        let mut psg = Psg::new();
        let mut out = Vec::new();
        psg.render(&mut out, 100, NTSC.psg_clock_hz);
        assert_eq!(out.len(), 200);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_register_protocol() {
        let mut psg = Psg::new();
        psg.set_tone(0, 0x1A4);
        assert_eq!(psg.tone_period[0], 0x1A4);

        psg.set_attenuation(1, 5);
        assert_eq!(psg.attenuation[1], 5);

        psg.set_noise(true, 3);
        assert_eq!(psg.noise_control, 0x07);
    }

    #[test]
    fn test_tone_produces_square_wave() {
        let mut psg = Psg::new();
        psg.set_tone(0, 0x0FE);
        psg.set_attenuation(0, 0);
        let mut out = Vec::new();
        psg.render(&mut out, 800, NTSC.psg_clock_hz);
        assert!(out.iter().any(|&s| s == 8191));
        assert!(out.iter().any(|&s| s == -8191));
    }

    #[test]
    fn test_validate() {
        let mut psg = Psg::new();
        psg.set_tone(2, 0x3FF);
        psg.render(&mut Vec::new(), 10, NTSC.psg_clock_hz);
        assert!(psg.validate().is_ok());

        let mut bad = psg.clone();
        bad.clock_remainder = u32::MAX;
        assert!(matches!(bad.validate(), Err(EngineError::Decode(_))));

        let mut bad = psg.clone();
        bad.tone_counter[1] = 0x400;
        assert!(bad.validate().is_err());

        let mut bad = psg;
        bad.latched = 4;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_lowpass_converges_and_persists() {
        let mut filter = LowPass::default();
        let mut block = vec![10_000i16; 2];
        filter.apply(&mut block);
        // First step moves about 27% of the way
        assert!(block[0] > 2_500 && block[0] < 2_800);
        assert_eq!(block[0], block[1]);

        let mut long = vec![10_000i16; 400];
        filter.apply(&mut long);
        assert!((long[398] - 10_000).abs() <= 1);

        // A fresh filter and the warmed one disagree on identical input
        let mut fresh = LowPass::default();
        let mut a = vec![0i16; 2];
        let mut b = vec![0i16; 2];
        fresh.apply(&mut a);
        filter.apply(&mut b);
        assert_ne!(a, b);
    }
}
