//! SimpleDLP: desktop front end for yt-dlp, streamlink, and ffmpeg

// Window, widgets, and dialogs
mod app;
// Dark/light mode and accent colors
mod appearance;
// First-run installation of helper binaries
mod bootstrap;
// Argument lists for the external programs
mod command;
// Timestamped log kept for "Save log"
mod download_log;
// Crate-wide error type
mod error;
// Embedded translation tables
mod i18n;
// Application directory layout
mod paths;
// Progress line parsing utilities
mod progress;
// Persistent user preferences
mod settings;
// Single-job process runner
mod supervisor;

use app::SimpleDlpApp;
use paths::AppPaths;

// eframe/egui for GUI application framework
use eframe::egui;
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

// Global Tokio runtime stored in a OnceCell; lives until the process exits
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Program entry point: initializes logging and the runtime, then launches the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("simpledlp=info")),
        )
        .init();

    let rt = Arc::new(Runtime::new()?);
    let runtime = RUNTIME.get_or_init(|| rt).handle().clone();

    let paths = AppPaths::discover();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("SimpleDLP")
            .with_inner_size([820.0, 700.0])
            .with_min_inner_size([640.0, 560.0]),
        ..Default::default()
    };
    eframe::run_native(
        "SimpleDLP",
        options,
        Box::new(move |cc| Box::new(SimpleDlpApp::new(cc, runtime, paths))),
    )?;
    Ok(())
}
