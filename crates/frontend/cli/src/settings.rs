use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Defaults read from the `--config` JSON file. Command line flags win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// `auto`, `ntsc` or `pal`
    #[serde(default)]
    pub region: Option<String>,
    /// Engine options applied before any `--option` flag
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub saves_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Settings {
    /// Load settings, falling back to defaults when the file is missing or
    /// unreadable.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!(
                        "failed to parse {}: {}. Using defaults.",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
