//! Control pads and port latching.

use emu_core::EngineError;
use serde::{Deserialize, Serialize};

/// Button bits accepted by `set_input`.
pub mod buttons {
    pub const UP: u16 = 1 << 0;
    pub const DOWN: u16 = 1 << 1;
    pub const LEFT: u16 = 1 << 2;
    pub const RIGHT: u16 = 1 << 3;
    pub const A: u16 = 1 << 4;
    pub const B: u16 = 1 << 5;
    pub const C: u16 = 1 << 6;
    pub const START: u16 = 1 << 7;
    pub const X: u16 = 1 << 8;
    pub const Y: u16 = 1 << 9;
    pub const Z: u16 = 1 << 10;
    pub const MODE: u16 = 1 << 11;

    /// Buttons present on a three-button pad
    pub const THREE_BUTTON: u16 = 0x00FF;
    pub const ALL: u16 = 0x0FFF;
}

/// Pressed buttons, one bit per button (1 = pressed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadState(u16);

impl PadState {
    pub const RELEASED: PadState = PadState(0);

    pub fn from_mask(mask: u32) -> Result<Self, EngineError> {
        if mask & !u32::from(buttons::ALL) != 0 {
            return Err(EngineError::Rejected(format!(
                "button mask {:#X} has bits above Mode",
                mask
            )));
        }
        Ok(PadState(mask as u16))
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn pressed(self, button: u16) -> bool {
        self.0 & button != 0
    }

    /// Buttons down now that were up in `previous`.
    pub fn newly_pressed(self, previous: PadState, button: u16) -> bool {
        self.pressed(button) && !previous.pressed(button)
    }

    /// Horizontal d-pad direction: -1, 0 or 1.
    pub fn dx(self) -> i32 {
        i32::from(self.pressed(buttons::RIGHT)) - i32::from(self.pressed(buttons::LEFT))
    }

    /// Vertical d-pad direction: -1, 0 or 1.
    pub fn dy(self) -> i32 {
        i32::from(self.pressed(buttons::DOWN)) - i32::from(self.pressed(buttons::UP))
    }
}

/// One controller port. Holds the state queued by the host until the next
/// frame latches it.
#[derive(Debug, Clone)]
pub struct Port {
    pub connected: bool,
    pub six_button: bool,
    queued: PadState,
}

impl Port {
    pub fn new(connected: bool, six_button: bool) -> Self {
        Self {
            connected,
            six_button,
            queued: PadState::RELEASED,
        }
    }

    pub fn queue(&mut self, pad: PadState) {
        self.queued = pad;
    }

    /// State the machine sees for the coming frame.
    pub fn latch(&self) -> PadState {
        if !self.connected {
            return PadState::RELEASED;
        }
        if self.six_button {
            self.queued
        } else {
            PadState(self.queued.0 & buttons::THREE_BUTTON)
        }
    }
}
