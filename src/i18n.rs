//! Translated UI strings, embedded as JSON tables.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};

#[derive(RustEmbed)]
#[folder = "assets/i18n/"]
struct Tables;

/// UI language as stored under `LANG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    #[default]
    Ru,
    En,
}

impl Language {
    pub const ALL: [Self; 2] = [Self::Ru, Self::En];

    pub fn code(self) -> &'static str {
        match self {
            Self::Ru => "RU",
            Self::En => "EN",
        }
    }

    fn table_file(self) -> &'static str {
        match self {
            Self::Ru => "ru.json",
            Self::En => "en.json",
        }
    }
}

type Table = HashMap<String, String>;

static TABLES: Lazy<HashMap<Language, Table>> = Lazy::new(|| {
    Language::ALL
        .into_iter()
        .map(|lang| (lang, load_table(lang)))
        .collect()
});

fn load_table(lang: Language) -> Table {
    let Some(file) = Tables::get(lang.table_file()) else {
        tracing::warn!(lang = lang.code(), "translation table not embedded");
        return Table::new();
    };
    serde_json::from_slice(&file.data).unwrap_or_else(|err| {
        tracing::warn!(lang = lang.code(), %err, "translation table is not valid JSON");
        Table::new()
    })
}

/// Looks up `key`, falling back to English and then to the key itself.
pub fn tr(lang: Language, key: &str) -> String {
    TABLES
        .get(&lang)
        .and_then(|table| table.get(key))
        .or_else(|| TABLES.get(&Language::En).and_then(|table| table.get(key)))
        .cloned()
        .unwrap_or_else(|| key.to_owned())
}

/// Like [`tr`], replacing each `{name}` placeholder with its value.
pub fn tr_args(lang: Language, key: &str, args: &[(&str, &str)]) -> String {
    args.iter().fold(tr(lang, key), |text, (name, value)| {
        text.replace(&format!("{{{name}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_share_keys() {
        let ru = &TABLES[&Language::Ru];
        let en = &TABLES[&Language::En];
        assert!(!en.is_empty());
        let mut missing: Vec<_> = en.keys().filter(|k| !ru.contains_key(*k)).collect();
        missing.extend(ru.keys().filter(|k| !en.contains_key(*k)));
        assert!(missing.is_empty(), "keys not in both tables: {missing:?}");
    }

    #[test]
    fn translates_and_falls_back() {
        assert_eq!(tr(Language::En, "stop"), "Stop");
        assert_eq!(tr(Language::Ru, "stop"), "Остановить");
        assert_eq!(tr(Language::Ru, "no_such_key"), "no_such_key");
    }

    #[test]
    fn substitutes_placeholders() {
        let text = tr_args(Language::En, "log_video_start", &[("url", "https://a.b/c")]);
        assert_eq!(text, "Starting video download: https://a.b/c");
    }

    #[test]
    fn language_codes_round_trip() {
        assert_eq!(serde_json::to_string(&Language::En).unwrap(), "\"EN\"");
        let ru: Language = serde_json::from_str("\"RU\"").unwrap();
        assert_eq!(ru, Language::Ru);
    }
}
