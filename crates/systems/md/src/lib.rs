//! Sega Mega Drive / Genesis engine
//!
//! Implements the session engine traits from `emu_core` for Mega Drive
//! cartridges.
//!
//! # Architecture
//!
//! - **Header**: system type, titles, checksum, region and SRAM declaration
//!   are read from `$100`-`$1FF`
//! - **Timing**: NTSC 60 Hz / 262 lines, PAL 50 Hz / 313 lines
//! - **Video**: 320 pixel wide RGBA frames, 224 (V28) or 240 (V30) active
//!   lines, optionally line doubled
//! - **Audio**: SN76489-compatible PSG at 48 kHz stereo, then an RC low-pass
//! - **Input**: two 3/6-button pads, latched once per frame
//! - **SRAM**: battery RAM sized from the header, independent of save states
//!
//! The CPUs and the VDP/FM chips are not emulated. A scanline frame
//! sequencer stands in for them: it draws the cartridge's pattern data as a
//! scrolling plane, drives the PSG, keeps an input history in work RAM and
//! writes save records to SRAM when Start is pressed. It is deterministic,
//! so everything the session layer guarantees can be exercised end to end.

mod audio;
mod controller;
mod engine;
pub mod header;
mod machine;
mod options;
mod sram;
mod timing;
mod video;

use emu_core::SystemInfo;
use std::sync::OnceLock;

pub use controller::buttons;
pub use engine::{MdEngine, MdFactory, MAX_PLAYERS, STATE_TAG, STATE_VERSION};
pub use machine::Machine;
pub use options::MdOptions;

const SYSTEM_INFO_JSON: &str = include_str!("system_info.json");

/// Static metadata for this engine, decoded on first use.
pub fn system_info() -> &'static SystemInfo {
    static INFO: OnceLock<SystemInfo> = OnceLock::new();
    INFO.get_or_init(|| {
        SystemInfo::from_json(SYSTEM_INFO_JSON).expect("embedded system_info.json is valid")
    })
}
