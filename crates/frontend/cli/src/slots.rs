use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum number of save slots per game
pub const MAX_SAVE_SLOTS: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveSlot {
    /// Base64 of the session snapshot
    pub data: String,
    pub timestamp: u64,
    #[serde(default)]
    pub rom_hash: Option<String>,
}

/// Save slots of one title, stored as `<saves_dir>/<sha256>/states.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GameSaves {
    pub slots: HashMap<u8, SaveSlot>,
}

pub fn rom_hash(rom_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rom_data);
    format!("{:x}", hasher.finalize())
}

/// `saves/` next to the executable.
pub fn default_saves_dir() -> PathBuf {
    let mut path = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    path.push("saves");
    path
}

fn check_slot(slot: u8) -> Result<()> {
    if !(1..=MAX_SAVE_SLOTS).contains(&slot) {
        bail!("slot must be between 1 and {}", MAX_SAVE_SLOTS);
    }
    Ok(())
}

impl GameSaves {
    pub fn game_save_path(saves_dir: &Path, rom_hash: &str) -> PathBuf {
        saves_dir.join(rom_hash).join("states.json")
    }

    /// Load a title's slots; a missing or unreadable file means no slots.
    pub fn load(saves_dir: &Path, rom_hash: &str) -> Self {
        let path = Self::game_save_path(saves_dir, rom_hash);
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(saves) => saves,
                Err(e) => {
                    log::warn!("failed to parse {}: {}. Using empty saves.", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, saves_dir: &Path, rom_hash: &str) -> Result<()> {
        let path = Self::game_save_path(saves_dir, rom_hash);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Store `data` in `slot` and write the file.
    pub fn save_slot(
        &mut self,
        saves_dir: &Path,
        slot: u8,
        data: &[u8],
        rom_hash: &str,
    ) -> Result<()> {
        check_slot(slot)?;
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs();
        self.slots.insert(
            slot,
            SaveSlot {
                data: BASE64.encode(data),
                timestamp,
                rom_hash: Some(rom_hash.to_string()),
            },
        );
        self.save(saves_dir, rom_hash)
    }

    /// Snapshot bytes from `slot`. Refuses slots written for another ROM.
    pub fn load_slot(&self, slot: u8, current_rom_hash: &str) -> Result<Vec<u8>> {
        check_slot(slot)?;
        let save_slot = self
            .slots
            .get(&slot)
            .ok_or_else(|| anyhow!("no save data in slot {}", slot))?;
        if let Some(saved_hash) = &save_slot.rom_hash {
            if saved_hash != current_rom_hash {
                bail!("ROM hash mismatch: slot {} was saved with a different ROM", slot);
            }
        }
        Ok(BASE64.decode(&save_slot.data)?)
    }

    pub fn has_slot(&self, slot: u8) -> bool {
        self.slots.contains_key(&slot)
    }
}
