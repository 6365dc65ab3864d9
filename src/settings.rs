//! Persisted user preferences (`config.json`).
//!
//! The file is a flat JSON object with upper-case keys. Every key is read on
//! its own, so a damaged or unknown value only resets that one setting.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::appearance::{AppearanceMode, ColorTheme};
use crate::error::Result;
use crate::i18n::Language;

/// Quality selector meaning "let yt-dlp pick", passed without `-f`.
pub const BEST_QUALITY: &str = "best";

/// yt-dlp format selectors offered in the quality picker.
pub const QUALITY_PRESETS: [&str; 4] = [
    BEST_QUALITY,
    "bestvideo[height<=1080]+bestaudio/best[height<=1080]",
    "bestvideo[height<=720]+bestaudio/best[height<=720]",
    "bestaudio",
];

/// User preferences restored at startup and written on exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    #[serde(rename = "LANG")]
    pub language: Language,
    #[serde(rename = "THEME")]
    pub theme: ColorTheme,
    #[serde(rename = "APPEARANCE_MODE")]
    pub appearance: AppearanceMode,
    #[serde(rename = "QUALITY")]
    pub quality: String,
    #[serde(rename = "AUDIO_ONLY")]
    pub audio_only: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: Language::default(),
            theme: ColorTheme::default(),
            appearance: AppearanceMode::default(),
            quality: BEST_QUALITY.to_owned(),
            audio_only: false,
        }
    }
}

impl Settings {
    /// Reads settings from `path`, never failing: problems are logged and
    /// the affected values fall back to their defaults.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "could not read settings");
                return Self::default();
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Self::from_map(&map),
            Ok(_) => {
                tracing::warn!(path = %path.display(), "settings file is not a JSON object");
                Self::default()
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "loading settings failed");
                Self::default()
            }
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        Self {
            language: field(map, "LANG", defaults.language),
            theme: field(map, "THEME", defaults.theme),
            appearance: field(map, "APPEARANCE_MODE", defaults.appearance),
            quality: field(map, "QUALITY", defaults.quality),
            audio_only: field(map, "AUDIO_ONLY", defaults.audio_only),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, buf)?;
        tracing::debug!(path = %path.display(), "settings saved");
        Ok(())
    }
}

fn field<T: DeserializeOwned>(map: &Map<String, Value>, key: &str, default: T) -> T {
    let Some(value) = map.get(key) else {
        return default;
    };
    serde_json::from_value(value.clone()).unwrap_or_else(|err| {
        tracing::warn!(key, %err, "ignoring invalid setting");
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("config.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.language, Language::Ru);
        assert_eq!(settings.quality, "best");
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let settings = Settings {
            language: Language::En,
            theme: ColorTheme::Green,
            appearance: AppearanceMode::Dark,
            quality: QUALITY_PRESETS[2].to_owned(),
            audio_only: true,
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);
    }

    #[test]
    fn writes_upper_case_keys_with_four_space_indent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        Settings::default().save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"LANG\": \"RU\""), "{text}");
        assert!(text.contains("\"APPEARANCE_MODE\": \"System\""));
        assert!(text.contains("\"AUDIO_ONLY\": false"));
    }

    #[test]
    fn bad_values_only_reset_their_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"LANG": "DE", "THEME": "dark-blue", "QUALITY": "bestaudio", "AUDIO_ONLY": "yes"}"#,
        )
        .unwrap();
        let settings = Settings::load(&path);
        assert_eq!(settings.language, Language::Ru);
        assert_eq!(settings.theme, ColorTheme::DarkBlue);
        assert_eq!(settings.quality, "bestaudio");
        assert!(!settings.audio_only);
    }

    #[test]
    fn garbage_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
        std::fs::write(&path, "[1, 2]").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }
}
