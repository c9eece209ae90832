//! Background plane renderer.
//!
//! Draws one 64x32-tile plane (512x256 pixels, wrapping) using Mega Drive
//! pattern format: 8x8 tiles, 4 bits per pixel packed high nibble first, 32
//! bytes per tile. Patterns are fetched straight from cartridge data.

use emu_core::types::{FrameBuffer, BYTES_PER_PIXEL};

pub const SCREEN_WIDTH: u32 = 320;
pub const MAX_SCREEN_HEIGHT: usize = 480;

const PLANE_WIDTH: usize = 512;
const PLANE_HEIGHT: usize = 256;
const PLANE_COLUMNS: usize = PLANE_WIDTH / 8;
const TILE_BYTES: usize = 32;

/// Cartridge offset of the first pattern. The header area is skipped.
pub const PATTERN_BASE: usize = 0x200;

/// Decode a 9-bit CRAM word (`----BBB-GGG-RRR-`) to RGBA.
pub fn decode_color(word: u16) -> [u8; 4] {
    let scale = |v: u16| ((v & 7) * 255 / 7) as u8;
    [scale(word >> 1), scale(word >> 5), scale(word >> 9), 0xFF]
}

/// 16 colour line; entry 0 is the backdrop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    cram: [u16; 16],
}

impl Palette {
    /// Read palette `bank` (0-3) from the CRAM image that follows the
    /// pattern base.
    pub fn from_cartridge(rom: &[u8], bank: u8) -> Self {
        let mut cram = [0u16; 16];
        if rom.is_empty() {
            return Self { cram };
        }
        let base = PATTERN_BASE + usize::from(bank & 3) * 32;
        for (i, entry) in cram.iter_mut().enumerate() {
            let hi = rom[(base + i * 2) % rom.len()];
            let lo = rom[(base + i * 2 + 1) % rom.len()];
            *entry = u16::from_be_bytes([hi, lo]) & 0x0EEE;
        }
        // Never let the whole line collapse to a single colour.
        if cram.iter().all(|&c| c == cram[0]) {
            for (i, entry) in cram.iter_mut().enumerate() {
                *entry ^= (i as u16 * 0x0222) & 0x0EEE;
            }
        }
        Self { cram }
    }

    pub fn color(&self, index: u8) -> [u8; 4] {
        decode_color(self.cram[usize::from(index & 0x0F)])
    }
}

pub struct PlaneRenderer<'a> {
    patterns: &'a [u8],
    tile_count: usize,
}

impl<'a> PlaneRenderer<'a> {
    pub fn new(rom: &'a [u8]) -> Self {
        let patterns = if rom.len() > PATTERN_BASE {
            &rom[PATTERN_BASE..]
        } else {
            rom
        };
        Self {
            patterns,
            tile_count: (patterns.len() / TILE_BYTES).max(1),
        }
    }

    fn pixel(&self, px: usize, py: usize) -> u8 {
        if self.patterns.is_empty() {
            return 0;
        }
        let tile = ((py / 8) * PLANE_COLUMNS + px / 8) % self.tile_count;
        let offset = tile * TILE_BYTES + (py % 8) * 4 + (px % 8) / 2;
        let byte = self.patterns[offset % self.patterns.len()];
        if px % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0F
        }
    }

    /// Render screen line `line` into `row` (one RGBA row of the frame).
    pub fn render_line(
        &self,
        row: &mut [u8],
        line: usize,
        scroll_x: u16,
        scroll_y: u16,
        palette: &Palette,
    ) {
        let py = (line + usize::from(scroll_y)) % PLANE_HEIGHT;
        for (x, out) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let px = (x + usize::from(scroll_x)) % PLANE_WIDTH;
            out.copy_from_slice(&palette.color(self.pixel(px, py)));
        }
    }
}

/// Frame buffer sized for the largest mode, with `active` rows valid.
pub fn new_frame(active: usize) -> FrameBuffer {
    let mut frame = FrameBuffer::new(SCREEN_WIDTH, MAX_SCREEN_HEIGHT);
    frame.active_height = active.min(MAX_SCREEN_HEIGHT);
    frame
}
