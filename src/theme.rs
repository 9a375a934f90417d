use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage::{JsonFile, StoreError};

const THEME_FILE: &str = "theme.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    Blue,
}

#[derive(Debug, Clone)]
pub struct ThemeStore {
    file: JsonFile,
}

impl ThemeStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(base_path, THEME_FILE),
        }
    }

    /// Stored preference, or the default when nothing usable is stored
    pub fn load(&self) -> Theme {
        self.file.load().unwrap_or_default()
    }

    pub fn save(&self, theme: Theme) -> Result<(), StoreError> {
        self.file.save(&theme)
    }
}
