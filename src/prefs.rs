use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::AppError;
use crate::models::Persona;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// User preferences surviving across runs: theme, active persona, and the
/// speech-output toggle. Read once at startup, written on change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub theme: Theme,
    pub persona: Persona,
    pub speak_responses: bool,
}

/// JSON-file persistence for `Preferences`. Loading never fails: a missing
/// or unreadable file yields defaults.
#[derive(Debug, Clone)]
pub struct PreferencesStore {
    path: Option<PathBuf>,
}

impl PreferencesStore {
    /// In-memory only; nothing is written. Used by tests and embedders that
    /// bring their own persistence.
    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Platform config dir, e.g. `~/.config/grim-chat/preferences.json`.
    pub fn default_location() -> Self {
        Self {
            path: dirs::config_dir().map(|dir| dir.join("grim-chat").join("preferences.json")),
        }
    }

    pub fn load(&self) -> Preferences {
        let Some(path) = &self.path else {
            return Preferences::default();
        };
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("unreadable preferences file, using defaults: {e}");
                Preferences::default()
            }),
            Err(_) => Preferences::default(),
        }
    }

    /// Write via a temp file in the same directory, then rename into place.
    pub fn save(&self, prefs: &Preferences) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(prefs)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
