//! The SimpleDLP window: inputs, buttons, output pane, and dialogs.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use eframe::egui::{self, Color32, RichText};
use eframe::{App, Frame};
use rfd::FileDialog;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::appearance::{self, AppearanceMode, ColorTheme};
use crate::bootstrap::{self, Bootstrap, BootstrapStep};
use crate::command::{self, JobKind, Pipeline, VideoRequest};
use crate::download_log::DownloadLog;
use crate::error::Error;
use crate::i18n::{Language, tr, tr_args};
use crate::paths::{AppPaths, ToolPaths};
use crate::settings::{QUALITY_PRESETS, Settings};
use crate::supervisor::{JobEvent, JobOutcome, StopResult, Supervisor};

const STOP_RED: Color32 = Color32::from_rgb(0xD3, 0x2F, 0x2F);
const BUTTON_HEIGHT: f32 = 30.0;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogLevel {
    Info,
    Error,
}

/// A message box drawn over the window until dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub level: DialogLevel,
    pub title: String,
    pub body: String,
}

impl Dialog {
    fn new(lang: Language, level: DialogLevel, title_key: &str, body: String) -> Self {
        Self { level, title: tr(lang, title_key), body }
    }
}

/// Log lines and optional dialog produced by some event.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub lines: Vec<String>,
    pub dialog: Option<Dialog>,
}

/// What the user sees once a job ends.
pub fn finish_report(lang: Language, kind: JobKind, outcome: &JobOutcome) -> Report {
    let mut report = Report::default();
    let exit_line = |code: Option<i32>| {
        let code = code.map_or_else(|| "?".to_owned(), |c| c.to_string());
        tr_args(lang, "log_exit_code", &[("code", code.as_str())])
    };

    match outcome {
        JobOutcome::Stopped => {}
        JobOutcome::SpawnFailed(error) => {
            report.lines.push(tr_args(lang, "log_spawn_failed", &[("error", error.as_str())]));
            if kind == JobKind::Video {
                report.dialog = Some(Dialog::new(
                    lang,
                    DialogLevel::Error,
                    "dlg_download_failed_title",
                    tr(lang, "dlg_download_failed_body"),
                ));
            }
        }
        JobOutcome::Succeeded | JobOutcome::Failed { .. } => {
            let failed_code = match outcome {
                JobOutcome::Failed { code } => Some(*code),
                _ => None,
            };
            if let Some(code) = failed_code {
                report.lines.push(exit_line(code));
            }
            let ok = failed_code.is_none();
            match kind {
                JobKind::Video if ok => {
                    report.lines.push(tr(lang, "log_video_ok"));
                    report.dialog = Some(Dialog::new(
                        lang,
                        DialogLevel::Info,
                        "dlg_download_done_title",
                        tr(lang, "dlg_download_done_body"),
                    ));
                }
                JobKind::Video => {
                    report.lines.push(tr(lang, "log_video_failed"));
                    report.dialog = Some(Dialog::new(
                        lang,
                        DialogLevel::Error,
                        "dlg_download_failed_title",
                        tr(lang, "dlg_download_failed_body"),
                    ));
                }
                JobKind::Stream => {
                    report.lines.push(tr(lang, "log_stream_finished"));
                    report.dialog = Some(Dialog::new(
                        lang,
                        DialogLevel::Info,
                        "dlg_stream_done_title",
                        tr(lang, "dlg_stream_done_body"),
                    ));
                }
                JobKind::Formats if !ok => report.lines.push(tr(lang, "log_formats_failed")),
                JobKind::Formats => {}
                JobKind::UpdateTools if ok => report.lines.push(tr(lang, "log_update_done")),
                JobKind::UpdateTools => report.lines.push(tr(lang, "log_update_failed")),
            }
        }
    }
    report
}

/// What the user sees when tools needed for `kind` are missing.
pub fn missing_tools_report(lang: Language, kind: JobKind, missing: &[String]) -> Report {
    let line_key = match kind {
        JobKind::Stream => "log_missing_stream",
        JobKind::Video | JobKind::Formats | JobKind::UpdateTools => "log_missing_video",
    };
    Report {
        lines: vec![tr(lang, line_key)],
        dialog: Some(Dialog::new(
            lang,
            DialogLevel::Error,
            "dlg_dependency_title",
            tr_args(lang, "dlg_dependency_body", &[("files", missing.join(", ").as_str())]),
        )),
    }
}

pub fn bootstrap_line(lang: Language, step: &BootstrapStep) -> String {
    match step {
        BootstrapStep::Fetching { file } => tr_args(lang, "log_bootstrap_fetch", &[("file", file.as_str())]),
        BootstrapStep::Installed { file } => tr_args(lang, "log_bootstrap_done", &[("file", file.as_str())]),
        BootstrapStep::Failed { file, error } => {
            tr_args(lang, "log_bootstrap_failed", &[("file", file.as_str()), ("error", error.as_str())])
        }
    }
}

fn manual_download_dialog(lang: Language) -> Dialog {
    Dialog::new(
        lang,
        DialogLevel::Info,
        "dlg_manual_title",
        tr_args(
            lang,
            "dlg_manual_body",
            &[
                ("ytdlp_url", bootstrap::YTDLP_MANUAL_URL),
                ("ffmpeg_url", bootstrap::FFMPEG_MANUAL_URL),
            ],
        ),
    )
}

/// Button presses collected while drawing, handled after the frame's UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    BrowseCookies,
    ShowFormats,
    RecordStream,
    DownloadVideo,
    OpenFolder,
    UpdateTools,
    Stop,
    SaveLog,
}

/// Application state for the GUI
pub struct SimpleDlpApp {
    paths: AppPaths,
    tools: ToolPaths,
    settings: Settings,
    stream_url: String,
    video_url: String,
    cookies_path: String,
    /// Lines in the output pane
    output: Vec<String>,
    log: DownloadLog,
    /// Last reported download progress, cleared when the job ends
    progress: Option<f32>,
    supervisor: Supervisor,
    job_tx: UnboundedSender<JobEvent>,
    job_rx: UnboundedReceiver<JobEvent>,
    bootstrap_rx: UnboundedReceiver<BootstrapStep>,
    dialogs: VecDeque<Dialog>,
}

impl SimpleDlpApp {
    pub fn new(cc: &eframe::CreationContext<'_>, runtime: Handle, paths: AppPaths) -> Self {
        Self::with_context(cc.egui_ctx.clone(), runtime, paths)
    }

    fn with_context(egui_ctx: egui::Context, runtime: Handle, paths: AppPaths) -> Self {
        let settings = Settings::load(&paths.config_file);
        tracing::info!(base = %paths.base.display(), lang = settings.language.code(), "starting");

        let tools = paths.tools();
        let (job_tx, job_rx) = unbounded_channel();
        let (bootstrap_tx, bootstrap_rx) = unbounded_channel();

        let mut app = Self {
            supervisor: Supervisor::new(runtime.clone()),
            paths,
            tools,
            settings,
            stream_url: String::new(),
            video_url: String::new(),
            cookies_path: String::new(),
            output: Vec::new(),
            log: DownloadLog::default(),
            progress: None,
            job_tx,
            job_rx,
            bootstrap_rx,
            dialogs: VecDeque::new(),
        };

        match bootstrap::plan(&app.tools) {
            Bootstrap::Ready => {}
            Bootstrap::ManualDownload { missing } => {
                tracing::warn!(?missing, "helper binaries must be installed by hand");
                app.dialogs.push_back(manual_download_dialog(app.settings.language));
            }
            Bootstrap::AutoDownload { missing } => {
                tracing::info!(?missing, "installing helper binaries");
                let (paths, tools, ctx) = (app.paths.clone(), app.tools.clone(), egui_ctx);
                runtime.spawn(async move {
                    bootstrap::ensure_tools(&paths, &tools, |step| {
                        let _ = bootstrap_tx.send(step);
                        ctx.request_repaint();
                    })
                    .await;
                });
            }
        }
        app
    }

    fn lang(&self) -> Language {
        self.settings.language
    }

    /// Appends to both the output pane and the saved log.
    fn say(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.log.push(text.clone());
        self.output.push(text);
    }

    fn apply_report(&mut self, report: Report) {
        for line in report.lines {
            self.say(line);
        }
        if let Some(dialog) = report.dialog {
            self.dialogs.push_back(dialog);
        }
    }

    fn poll_events(&mut self) {
        while let Ok(step) = self.bootstrap_rx.try_recv() {
            let line = bootstrap_line(self.lang(), &step);
            self.say(line);
        }
        while let Ok(event) = self.job_rx.try_recv() {
            match event {
                JobEvent::Output(line) => self.say(line),
                JobEvent::Progress(fraction) => self.progress = Some(fraction),
                JobEvent::Finished { kind, outcome } => {
                    self.progress = None;
                    let report = finish_report(self.lang(), kind, &outcome);
                    self.apply_report(report);
                }
            }
        }
    }

    /// Checks the tools for `kind`, reporting what is missing.
    fn tools_ready(&mut self, kind: JobKind) -> bool {
        match self.tools.require(kind) {
            Ok(()) => true,
            Err(Error::MissingTools(missing)) => {
                tracing::warn!(?kind, ?missing, "missing dependencies");
                let report = missing_tools_report(self.lang(), kind, &missing);
                self.apply_report(report);
                false
            }
            Err(err) => {
                self.say(err.to_string());
                false
            }
        }
    }

    fn launch(&mut self, pipeline: Pipeline) -> bool {
        self.say(tr_args(self.lang(), "log_command", &[("cmd", pipeline.to_string().as_str())]));
        match self.supervisor.launch(pipeline, self.job_tx.clone()) {
            Ok(()) => true,
            Err(Error::Busy) => {
                self.say(tr(self.lang(), "log_busy"));
                false
            }
            Err(err) => {
                self.say(err.to_string());
                false
            }
        }
    }

    fn ensure_dir(&mut self, dir: &Path) -> bool {
        match std::fs::create_dir_all(dir) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), %err, "could not create directory");
                self.say(err.to_string());
                false
            }
        }
    }

    fn record_stream(&mut self) {
        if !self.tools_ready(JobKind::Stream) {
            return;
        }
        let url = self.stream_url.trim().to_owned();
        if url.is_empty() {
            self.say(tr(self.lang(), "log_enter_stream_url"));
            return;
        }
        let vods_dir = self.paths.vods_dir.clone();
        if !self.ensure_dir(&vods_dir) {
            return;
        }
        let output = command::stream_output_path(&vods_dir, Local::now());
        match command::stream_capture(&self.tools, &output, &url) {
            Ok(pipeline) => {
                self.say(tr_args(self.lang(), "log_stream_start", &[("url", url.as_str())]));
                if self.launch(pipeline) {
                    self.say(tr(self.lang(), "log_stream_started"));
                }
            }
            Err(err) => self.say(err.to_string()),
        }
    }

    fn download_video(&mut self) {
        if !self.tools_ready(JobKind::Video) {
            return;
        }
        let request = VideoRequest {
            url: self.video_url.clone(),
            quality: self.settings.quality.clone(),
            audio_only: self.settings.audio_only,
            cookies: self.cookies_path.clone(),
        };
        let videos_dir = self.paths.videos_dir.clone();
        match command::video_download(&self.tools, &videos_dir, &request) {
            Ok(pipeline) => {
                if !self.ensure_dir(&videos_dir) {
                    return;
                }
                let url = request.url.trim().to_owned();
                self.say(tr_args(self.lang(), "log_video_start", &[("url", url.as_str())]));
                self.launch(pipeline);
            }
            Err(Error::EmptyUrl) => self.say(tr(self.lang(), "log_enter_video_url")),
            Err(err) => self.say(err.to_string()),
        }
    }

    fn show_formats(&mut self) {
        if !self.tools_ready(JobKind::Formats) {
            return;
        }
        match command::list_formats(&self.tools, &self.video_url, &self.cookies_path) {
            Ok(pipeline) => {
                let url = self.video_url.trim().to_owned();
                self.say(tr_args(self.lang(), "log_formats_start", &[("url", url.as_str())]));
                self.launch(pipeline);
            }
            Err(Error::EmptyUrl) => self.say(tr(self.lang(), "log_enter_video_url")),
            Err(err) => self.say(err.to_string()),
        }
    }

    fn update_tools(&mut self) {
        if !self.tools_ready(JobKind::UpdateTools) {
            return;
        }
        self.say(tr(self.lang(), "log_update_start"));
        let pipeline = command::update_tools(&self.tools);
        self.launch(pipeline);
    }

    fn stop(&mut self) {
        let key = match self.supervisor.stop() {
            StopResult::Stopping => "log_stopped",
            StopResult::NothingRunning => "log_nothing_running",
        };
        self.progress = None;
        self.say(tr(self.lang(), key));
    }

    fn browse_cookies(&mut self) {
        let picked = FileDialog::new()
            .add_filter("Text files", &["txt"])
            .add_filter("All files", &["*"])
            .pick_file();
        if let Some(path) = picked {
            self.cookies_path = path.display().to_string();
        }
    }

    fn save_log(&mut self) {
        let Some(path) = FileDialog::new().add_filter("Text files", &["txt"]).save_file() else {
            return;
        };
        let path = with_txt_extension(path);
        match self.log.save_to(&path) {
            Ok(()) => self.say(tr(self.lang(), "log_saved")),
            Err(err) => {
                let line = tr_args(self.lang(), "log_save_failed", &[("error", err.to_string().as_str())]);
                self.say(line);
            }
        }
    }

    fn open_folder(&mut self) {
        let dir = self.paths.videos_dir.clone();
        if !self.ensure_dir(&dir) {
            return;
        }
        if let Err(err) = open_in_file_manager(&dir) {
            let line = tr_args(self.lang(), "log_open_folder_failed", &[("error", err.to_string().as_str())]);
            self.say(line);
        }
    }

    /// An open dialog blocks every other control.
    fn is_modal(&self) -> bool {
        !self.dialogs.is_empty()
    }

    fn perform(&mut self, action: Action) {
        if self.is_modal() {
            tracing::debug!(?action, "ignored while a dialog is open");
            return;
        }
        tracing::debug!(?action, "ui action");
        match action {
            Action::BrowseCookies => self.browse_cookies(),
            Action::ShowFormats => self.show_formats(),
            Action::RecordStream => self.record_stream(),
            Action::DownloadVideo => self.download_video(),
            Action::OpenFolder => self.open_folder(),
            Action::UpdateTools => self.update_tools(),
            Action::Stop => self.stop(),
            Action::SaveLog => self.save_log(),
        }
    }

    fn header(&mut self, ui: &mut egui::Ui) {
        let lang = self.lang();
        ui.vertical_centered(|ui| {
            ui.add_space(12.0);
            ui.label(RichText::new(tr(lang, "title")).size(32.0).strong());
            ui.add_space(6.0);
        });
        ui.horizontal(|ui| {
            ui.label(tr(lang, "appearance"));
            egui::ComboBox::from_id_source("appearance")
                .selected_text(self.settings.appearance.label())
                .show_ui(ui, |ui| {
                    for mode in AppearanceMode::ALL {
                        ui.selectable_value(&mut self.settings.appearance, mode, mode.label());
                    }
                });
            ui.label(tr(lang, "theme"));
            egui::ComboBox::from_id_source("theme")
                .selected_text(self.settings.theme.label())
                .show_ui(ui, |ui| {
                    for theme in ColorTheme::ALL {
                        ui.selectable_value(&mut self.settings.theme, theme, theme.label());
                    }
                });
            ui.label(tr(lang, "language"));
            egui::ComboBox::from_id_source("language")
                .selected_text(self.settings.language.code())
                .show_ui(ui, |ui| {
                    for language in Language::ALL {
                        ui.selectable_value(&mut self.settings.language, language, language.code());
                    }
                });
        });
        ui.add_space(6.0);
    }

    fn inputs(&mut self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        let lang = self.lang();
        egui::Grid::new("inputs")
            .num_columns(3)
            .spacing([10.0, 10.0])
            .show(ui, |ui| {
                let field_width = (ui.available_width() - 140.0).max(200.0);

                ui.label(tr(lang, "stream_url"));
                ui.add(
                    egui::TextEdit::singleline(&mut self.stream_url)
                        .hint_text("https://...")
                        .desired_width(field_width),
                );
                ui.end_row();

                ui.label(tr(lang, "video_url"));
                ui.add(
                    egui::TextEdit::singleline(&mut self.video_url)
                        .hint_text("https://...")
                        .desired_width(field_width),
                );
                ui.end_row();

                ui.label(tr(lang, "cookies_file"));
                ui.add(
                    egui::TextEdit::singleline(&mut self.cookies_path)
                        .hint_text("C:/path/to/cookies.txt")
                        .desired_width(field_width),
                );
                if ui.button(tr(lang, "browse")).clicked() {
                    actions.push(Action::BrowseCookies);
                }
                ui.end_row();

                ui.label(tr(lang, "quality"));
                egui::ComboBox::from_id_source("quality")
                    .selected_text(self.settings.quality.clone())
                    .width(field_width)
                    .show_ui(ui, |ui| {
                        for preset in QUALITY_PRESETS {
                            ui.selectable_value(&mut self.settings.quality, preset.to_owned(), preset);
                        }
                    });
                if ui.button(tr(lang, "show_formats")).clicked() {
                    actions.push(Action::ShowFormats);
                }
                ui.end_row();

                ui.label("");
                ui.checkbox(&mut self.settings.audio_only, tr(lang, "audio_only"));
                ui.end_row();
            });
    }

    fn buttons(&self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        let lang = self.lang();
        let busy = self.supervisor.is_busy();

        ui.columns(4, |cols| {
            let row = [
                (Action::RecordStream, "record_stream", !busy),
                (Action::DownloadVideo, "download_video", !busy),
                (Action::OpenFolder, "open_folder", true),
                (Action::UpdateTools, "update_tools", !busy),
            ];
            for (col, (action, key, enabled)) in cols.iter_mut().zip(row) {
                if wide_button(col, enabled, egui::Button::new(tr(lang, key))) {
                    actions.push(action);
                }
            }
        });

        let stop = egui::Button::new(RichText::new(tr(lang, "stop")).color(Color32::WHITE)).fill(STOP_RED);
        if wide_button(ui, busy, stop) {
            actions.push(Action::Stop);
        }
        if wide_button(ui, true, egui::Button::new(tr(lang, "save_log"))) {
            actions.push(Action::SaveLog);
        }
    }

    fn output_pane(&self, ui: &mut egui::Ui) {
        if let Some(fraction) = self.progress {
            ui.add(egui::ProgressBar::new(fraction).show_percentage());
        }
        egui::Frame::group(ui.style()).show(ui, |ui| output_lines(ui, &self.output));
    }

    fn show_dialog(&mut self, ctx: &egui::Context) {
        let Some(dialog) = self.dialogs.front() else {
            return;
        };
        let ok = tr(self.lang(), "ok");
        let mut dismissed = false;
        egui::Window::new(dialog.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                let body = RichText::new(dialog.body.as_str());
                let body = match dialog.level {
                    DialogLevel::Info => body,
                    DialogLevel::Error => body.color(STOP_RED),
                };
                ui.label(body);
                ui.add_space(8.0);
                ui.vertical_centered(|ui| {
                    if ui.button(ok).clicked() {
                        dismissed = true;
                    }
                });
            });
        if dismissed {
            self.dialogs.pop_front();
        }
    }
}

/// Draws only the rows scrolled into view.
fn output_lines(ui: &mut egui::Ui, lines: &[String]) {
    let row_height = ui.text_style_height(&egui::TextStyle::Monospace);
    egui::ScrollArea::both()
        .auto_shrink([false; 2])
        .stick_to_bottom(true)
        .show_rows(ui, row_height, lines.len(), |ui, rows| {
            for line in &lines[rows] {
                ui.add(egui::Label::new(RichText::new(line).monospace()).wrap(false));
            }
        });
}

fn wide_button(ui: &mut egui::Ui, enabled: bool, button: egui::Button<'_>) -> bool {
    let width = ui.available_width();
    ui.add_enabled(enabled, button.min_size(egui::vec2(width, BUTTON_HEIGHT)))
        .clicked()
}

/// Adds `.txt` when the save dialog returned a bare name.
fn with_txt_extension(path: PathBuf) -> PathBuf {
    if path.extension().is_some() {
        path
    } else {
        path.with_extension("txt")
    }
}

fn open_in_file_manager(dir: &Path) -> std::io::Result<()> {
    let opener = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    std::process::Command::new(opener).arg(dir).spawn()?;
    Ok(())
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for SimpleDlpApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut Frame) {
        self.poll_events();

        let system_dark = frame.info().system_theme.map(|theme| theme == eframe::Theme::Dark);
        appearance::apply(ctx, self.settings.appearance, self.settings.theme, system_dark);

        let mut actions = Vec::new();
        let enabled = !self.is_modal();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_enabled_ui(enabled, |ui| self.header(ui));
        });

        egui::TopBottomPanel::bottom("contacts").show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.label(RichText::new(tr(self.lang(), "contacts")).size(13.0).color(Color32::from_gray(0x88)));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(enabled, |ui| {
                self.inputs(ui, &mut actions);
                ui.add_space(8.0);
                self.buttons(ui, &mut actions);
            });
            ui.add_space(8.0);
            self.output_pane(ui);
        });

        self.show_dialog(ctx);

        for action in actions {
            self.perform(action);
        }

        // Periodic repaint so process output shows up without input events
        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.supervisor.shutdown(SHUTDOWN_TIMEOUT);
        if let Err(err) = self.settings.save(&self.paths.config_file) {
            tracing::warn!(%err, "saving settings failed");
        }
    }
}
