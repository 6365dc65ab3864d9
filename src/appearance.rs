//! Light/dark mode and accent colour handling.

use eframe::egui::{self, Color32, Visuals};
use serde::{Deserialize, Serialize};

/// Window appearance as stored under `APPEARANCE_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AppearanceMode {
    #[default]
    System,
    Dark,
    Light,
}

impl AppearanceMode {
    pub const ALL: [Self; 3] = [Self::System, Self::Dark, Self::Light];

    pub fn label(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::Dark => "Dark",
            Self::Light => "Light",
        }
    }

    /// Whether dark visuals should be used, given what the OS reports.
    pub fn is_dark(self, system_dark: Option<bool>) -> bool {
        match self {
            Self::System => system_dark.unwrap_or(true),
            Self::Dark => true,
            Self::Light => false,
        }
    }
}

/// Accent colour family as stored under `THEME`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorTheme {
    #[default]
    Blue,
    DarkBlue,
    Green,
}

impl ColorTheme {
    pub const ALL: [Self; 3] = [Self::Blue, Self::DarkBlue, Self::Green];

    pub fn label(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::DarkBlue => "dark-blue",
            Self::Green => "green",
        }
    }

    pub fn accent(self) -> Color32 {
        match self {
            Self::Blue => Color32::from_rgb(0x1F, 0x6A, 0xA5),
            Self::DarkBlue => Color32::from_rgb(0x1F, 0x53, 0x8D),
            Self::Green => Color32::from_rgb(0x2C, 0xC9, 0x85),
        }
    }
}

/// Builds the visuals for a mode/theme pair.
pub fn visuals(mode: AppearanceMode, theme: ColorTheme, system_dark: Option<bool>) -> Visuals {
    let mut visuals = if mode.is_dark(system_dark) {
        Visuals::dark()
    } else {
        Visuals::light()
    };
    let accent = theme.accent();
    visuals.selection.bg_fill = accent;
    visuals.hyperlink_color = accent;
    visuals.widgets.active.bg_fill = accent;
    visuals
}

/// Installs the visuals unless they are already current. eframe resets them
/// when the OS theme changes, so this runs every frame.
pub fn apply(ctx: &egui::Context, mode: AppearanceMode, theme: ColorTheme, system_dark: Option<bool>) {
    let wanted = visuals(mode, theme, system_dark);
    if ctx.style().visuals != wanted {
        ctx.set_visuals(wanted);
    }
}
