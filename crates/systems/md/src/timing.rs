//! Per-region frame timing.

use emu_core::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionTiming {
    pub frame_rate: u32,
    pub scanlines: usize,
    /// Visible lines in V28 (NTSC) or V30 (PAL) mode
    pub active_lines: usize,
    /// Sound chip input clock (Z80 clock / 16)
    pub psg_clock_hz: u32,
}

pub const NTSC: RegionTiming = RegionTiming {
    frame_rate: 60,
    scanlines: 262,
    active_lines: 224,
    psg_clock_hz: 3_579_545 / 16,
};

pub const PAL: RegionTiming = RegionTiming {
    frame_rate: 50,
    scanlines: 313,
    active_lines: 240,
    psg_clock_hz: 3_546_893 / 16,
};

impl RegionTiming {
    pub fn for_region(region: Region) -> Self {
        match region {
            Region::Ntsc => NTSC,
            Region::Pal => PAL,
        }
    }

    /// Stereo sample frames emitted per video frame.
    pub fn samples_per_frame(&self, sample_rate: u32) -> usize {
        (sample_rate / self.frame_rate) as usize
    }

    /// Sample frames to emit while `line` is drawn. Spreads the frame's
    /// samples over the scanlines so the per-frame total is exact.
    pub fn samples_for_line(&self, line: usize, sample_rate: u32) -> usize {
        let total = self.samples_per_frame(sample_rate);
        let end = (line + 1) * total / self.scanlines;
        let start = line * total / self.scanlines;
        end - start
    }
}
