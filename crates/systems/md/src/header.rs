//! Cartridge header ($100-$1FF) parsing.
//!
//! Layout of the fields used here:
//! - $100-$10F: system type ("SEGA MEGA DRIVE" / "SEGA GENESIS")
//! - $120-$14F: domestic title
//! - $150-$17F: overseas title
//! - $18E-$18F: checksum (big-endian)
//! - $1B0-$1BB: external RAM declaration ("RA", type, start, end)
//! - $1F0-$1F2: region support

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::Region;
use thiserror::Error;

pub const HEADER_END: usize = 0x200;
pub const MAX_ROM_SIZE: usize = 0x40_0000;

const SRAM_WINDOW_START: u32 = 0x20_0000;
const SRAM_WINDOW_END: u32 = 0x3F_FFFF;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("ROM too short to contain a cartridge header ({0} bytes)")]
    TooShort(usize),
    #[error("unrecognized system type: {0:?}")]
    SystemType(String),
}

/// Hardware region identity (what the version register reports).
/// Separate from display timing: Japan and USA are both NTSC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleRegion {
    Japan,
    Usa,
    Europe,
}

impl ConsoleRegion {
    pub fn display_region(self) -> Region {
        match self {
            ConsoleRegion::Europe => Region::Pal,
            ConsoleRegion::Japan | ConsoleRegion::Usa => Region::Ntsc,
        }
    }
}

/// Battery RAM window declared by the cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SramDecl {
    pub start: u32,
    pub end: u32,
}

impl SramDecl {
    pub fn size(&self) -> usize {
        (self.end - self.start + 1) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomHeader {
    pub system_type: String,
    pub domestic_title: String,
    pub overseas_title: String,
    pub declared_checksum: u16,
    pub computed_checksum: u16,
    pub console_region: ConsoleRegion,
    pub sram: Option<SramDecl>,
}

impl RomHeader {
    pub fn parse(rom: &[u8]) -> Result<Self, HeaderError> {
        if rom.len() < HEADER_END {
            return Err(HeaderError::TooShort(rom.len()));
        }

        let system_type = header_text(&rom[0x100..0x110]);
        if !matches!(system_type.as_str(), "SEGA MEGA DRIVE" | "SEGA GENESIS") {
            return Err(HeaderError::SystemType(system_type));
        }

        let header = Self {
            system_type,
            domestic_title: header_text(&rom[0x120..0x150]),
            overseas_title: header_text(&rom[0x150..0x180]),
            declared_checksum: u16::from_be_bytes([rom[0x18E], rom[0x18F]]),
            computed_checksum: compute_checksum(rom),
            console_region: detect_console_region(rom),
            sram: parse_sram(rom),
        };

        if !header.checksum_ok() {
            // Plenty of released carts ship with a wrong checksum; not fatal.
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "checksum mismatch: header={:04X} computed={:04X}",
                    header.declared_checksum, header.computed_checksum
                )
            });
        }
        Ok(header)
    }

    pub fn checksum_ok(&self) -> bool {
        self.declared_checksum == self.computed_checksum
    }

    /// Overseas title, falling back to the domestic one.
    pub fn title(&self) -> &str {
        if self.overseas_title.is_empty() {
            &self.domestic_title
        } else {
            &self.overseas_title
        }
    }
}

/// Header strings are space padded ASCII; collapse the padding.
fn header_text(bytes: &[u8]) -> String {
    let text: String = bytes
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { ' ' })
        .collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 16-bit sum of big-endian words from $200 to the end of the image. An odd
/// trailing byte counts as a high byte.
pub fn compute_checksum(rom: &[u8]) -> u16 {
    if rom.len() <= HEADER_END {
        return 0;
    }
    let body = &rom[HEADER_END..];
    let mut words = body.chunks_exact(2);
    let mut sum = words.by_ref().fold(0u16, |acc, w| {
        acc.wrapping_add(u16::from_be_bytes([w[0], w[1]]))
    });
    if let [last] = words.remainder() {
        sum = sum.wrapping_add(u16::from(*last) << 8);
    }
    sum
}

/// Write the computed checksum into the header.
pub fn fix_checksum(rom: &mut [u8]) {
    if rom.len() < HEADER_END {
        return;
    }
    let sum = compute_checksum(rom).to_be_bytes();
    rom[0x18E..0x190].copy_from_slice(&sum);
}

fn parse_sram(rom: &[u8]) -> Option<SramDecl> {
    if &rom[0x1B0..0x1B2] != b"RA" {
        return None;
    }
    let start = u32::from_be_bytes([rom[0x1B4], rom[0x1B5], rom[0x1B6], rom[0x1B7]]);
    let end = u32::from_be_bytes([rom[0x1B8], rom[0x1B9], rom[0x1BA], rom[0x1BB]]);
    if start < SRAM_WINDOW_START || end < start || end > SRAM_WINDOW_END {
        log(LogCategory::Cartridge, LogLevel::Warn, || {
            format!("ignoring SRAM declaration {:06X}-{:06X}", start, end)
        });
        return None;
    }
    Some(SramDecl { start, end })
}

/// Region support field at $1F0-$1F2.
///
/// Character codes ('J', 'U', 'E') are checked first. Otherwise the first
/// non-space byte is read as a hex digit: bit 0 Japan, bit 2 Americas,
/// bit 3 Europe. Multi-region carts prefer USA, then Japan, then Europe.
pub fn detect_console_region(rom: &[u8]) -> ConsoleRegion {
    if rom.len() < HEADER_END {
        return ConsoleRegion::Usa;
    }
    let field = &rom[0x1F0..0x1F3];
    let mut japan = field.contains(&b'J');
    let mut usa = field.contains(&b'U');
    let mut europe = field.contains(&b'E');

    if !(japan || usa || europe) {
        let digit = field
            .iter()
            .find(|&&b| b != b' ')
            .and_then(|&b| (b as char).to_digit(16).filter(|_| !b.is_ascii_lowercase()));
        if let Some(bits) = digit {
            japan = bits & 0x1 != 0;
            usa = bits & 0x4 != 0;
            europe = bits & 0x8 != 0;
        }
    }

    if usa {
        ConsoleRegion::Usa
    } else if japan {
        ConsoleRegion::Japan
    } else if europe {
        ConsoleRegion::Europe
    } else {
        ConsoleRegion::Usa
    }
}

/// Display timing region implied by the header.
pub fn detect_region(rom: &[u8]) -> Region {
    detect_console_region(rom).display_region()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x400];
        rom[0x100..0x110].copy_from_slice(b"SEGA MEGA DRIVE ");
        rom[0x1F0..0x1F3].copy_from_slice(b"   ");
        rom
    }

    fn with_region(field: &[u8; 3]) -> Vec<u8> {
        let mut rom = blank_rom();
        rom[0x1F0..0x1F3].copy_from_slice(field);
        rom
    }

    #[test]
    fn test_system_type_validation() {
        let rom = blank_rom();
        assert!(RomHeader::parse(&rom).is_ok());

        let mut genesis = blank_rom();
        genesis[0x100..0x110].copy_from_slice(b"SEGA GENESIS    ");
        assert!(RomHeader::parse(&genesis).is_ok());

        let mut other = blank_rom();
        other[0x100..0x110].copy_from_slice(b"SEGA SATURN     ");
        assert_eq!(
            RomHeader::parse(&other),
            Err(HeaderError::SystemType("SEGA SATURN".to_string()))
        );

        assert_eq!(
            RomHeader::parse(&rom[..0x1FF]),
            Err(HeaderError::TooShort(0x1FF))
        );
    }

    #[test]
    fn test_checksum() {
        let mut rom = blank_rom();
        rom[0x200] = 0x12;
        rom[0x201] = 0x34;
        rom[0x202] = 0x00;
        rom[0x203] = 0x01;
        assert_eq!(compute_checksum(&rom), 0x1235);

        // Odd trailing byte is the high byte of a final word
        rom.push(0x01);
        assert_eq!(compute_checksum(&rom), 0x1335);

        fix_checksum(&mut rom);
        assert!(RomHeader::parse(&rom).unwrap().checksum_ok());
    }

    #[test]
    fn test_titles_collapse_padding() {
        let mut rom = blank_rom();
        rom[0x120..0x12E].copy_from_slice(b"SONIC  THE    ");
        rom[0x150..0x160].copy_from_slice(b"SONIC THE HEDGEH");
        let header = RomHeader::parse(&rom).unwrap();
        assert_eq!(header.domestic_title, "SONIC THE");
        assert_eq!(header.title(), "SONIC THE HEDGEH");
    }

    #[test]
    fn test_region_character_codes() {
        assert_eq!(detect_console_region(&with_region(b"J  ")), ConsoleRegion::Japan);
        assert_eq!(detect_console_region(&with_region(b"E  ")), ConsoleRegion::Europe);
        assert_eq!(detect_console_region(&with_region(b"JUE")), ConsoleRegion::Usa);
        assert_eq!(detect_console_region(&with_region(b"JE ")), ConsoleRegion::Japan);
        assert_eq!(detect_region(&with_region(b"E  ")), Region::Pal);
        assert_eq!(detect_region(&with_region(b"JUE")), Region::Ntsc);
    }

    #[test]
    fn test_region_hex_digit() {
        assert_eq!(detect_console_region(&with_region(b"8  ")), ConsoleRegion::Europe);
        assert_eq!(detect_console_region(&with_region(b" 1 ")), ConsoleRegion::Japan);
        assert_eq!(detect_console_region(&with_region(b"F  ")), ConsoleRegion::Usa);
        assert_eq!(detect_console_region(&with_region(b"9  ")), ConsoleRegion::Japan);
    }

    #[test]
    fn test_region_defaults_to_usa() {
        assert_eq!(detect_console_region(&with_region(b"   ")), ConsoleRegion::Usa);
        assert_eq!(detect_console_region(&with_region(b"x  ")), ConsoleRegion::Usa);
        assert_eq!(detect_console_region(&[0u8; 16]), ConsoleRegion::Usa);
    }

    #[test]
    fn test_sram_declaration() {
        let mut rom = blank_rom();
        assert_eq!(RomHeader::parse(&rom).unwrap().sram, None);

        rom[0x1B0..0x1B4].copy_from_slice(&[b'R', b'A', 0xF8, 0x20]);
        rom[0x1B4..0x1B8].copy_from_slice(&0x20_0001u32.to_be_bytes());
        rom[0x1B8..0x1BC].copy_from_slice(&0x20_3FFFu32.to_be_bytes());
        let sram = RomHeader::parse(&rom).unwrap().sram.unwrap();
        assert_eq!(sram.start, 0x20_0001);
        assert_eq!(sram.size(), 0x3FFF);

        // Outside the cartridge RAM window
        rom[0x1B4..0x1B8].copy_from_slice(&0x10_0000u32.to_be_bytes());
        assert_eq!(RomHeader::parse(&rom).unwrap().sram, None);
    }
}
