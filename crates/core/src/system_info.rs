//! Read-only metadata an engine publishes about itself.
//!
//! Engines embed this as a JSON document and decode it once per process
//! (see [`SystemInfo::from_json`]); hosts use it to configure their UI,
//! input mapping and audio output.

use serde::{Deserialize, Serialize};

/// A controller button and the bit it occupies in an input mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonInfo {
    pub name: String,
    /// Bit index in the mask passed to `set_input`
    pub id: u8,
    #[serde(default)]
    pub default_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Bool,
    Choice,
}

/// A runtime option accepted by `set_option`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreOptionInfo {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub kind: OptionKind,
    pub default: String,
    /// Accepted values for `Choice` options
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub name: String,
    pub console_name: String,
    pub version: String,
    pub extensions: Vec<String>,
    pub screen_width: u32,
    pub max_screen_height: u32,
    pub pixel_aspect_ratio: f32,
    pub sample_rate: u32,
    pub players: usize,
    pub buttons: Vec<ButtonInfo>,
    #[serde(default)]
    pub options: Vec<CoreOptionInfo>,
}

impl SystemInfo {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn option(&self, key: &str) -> Option<&CoreOptionInfo> {
        self.options.iter().find(|o| o.key == key)
    }

    pub fn button(&self, name: &str) -> Option<&ButtonInfo> {
        self.buttons
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
    }

    /// Mask with every declared button bit set.
    pub fn button_mask(&self) -> u32 {
        self.buttons.iter().fold(0, |mask, b| mask | (1 << b.id))
    }
}
