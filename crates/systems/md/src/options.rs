//! Runtime options accepted through `set_option`.

use emu_core::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MdOptions {
    pub six_button: bool,
    pub p2_connected: bool,
    pub low_pass_filter: bool,
    pub interlace: bool,
}

impl Default for MdOptions {
    fn default() -> Self {
        Self {
            six_button: true,
            p2_connected: false,
            low_pass_filter: true,
            interlace: false,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, EngineError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(EngineError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl MdOptions {
    /// Apply one option. Leaves `self` unchanged on error.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), EngineError> {
        match key {
            "six_button" => self.six_button = parse_bool(key, value)?,
            "p2_connected" => self.p2_connected = parse_bool(key, value)?,
            "low_pass_filter" => self.low_pass_filter = parse_bool(key, value)?,
            "interlace" => {
                self.interlace = match value {
                    "off" => false,
                    "double" => true,
                    _ => {
                        return Err(EngineError::InvalidValue {
                            key: key.to_string(),
                            value: value.to_string(),
                        })
                    }
                }
            }
            _ => return Err(EngineError::InvalidOption(key.to_string())),
        }
        Ok(())
    }
}
