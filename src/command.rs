//! Builds the argument lists for yt-dlp, streamlink, and ffmpeg.
//!
//! Nothing here goes through a shell: URLs and paths travel as separate
//! arguments, so quotes or `&` in user input stay inert.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{Error, Result};
use crate::paths::ToolPaths;
use crate::progress::progress_template;
use crate::settings::BEST_QUALITY;

/// What a pipeline does, used for dependency checks and result handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Video,
    Stream,
    Formats,
    UpdateTools,
}

/// One program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Arguments as lossy strings, for assertions and display.
    pub fn arg_strings(&self) -> Vec<String> {
        self.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program.to_string_lossy()))?;
        for arg in self.arg_strings() {
            write!(f, " {}", quote(&arg))?;
        }
        Ok(())
    }
}

// Display only; never fed to a shell.
fn quote(text: &str) -> String {
    if !text.is_empty() && !text.contains([' ', '\t', '"', '\'', '|', '&', ';']) {
        return text.to_owned();
    }
    format!("\"{}\"", text.replace('"', "\\\""))
}

/// Stages whose stdout feeds the next stage's stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub kind: JobKind,
    pub stages: Vec<Invocation>,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}

/// What the user asked for in the video section.
#[derive(Debug, Clone, Default)]
pub struct VideoRequest {
    pub url: String,
    pub quality: String,
    pub audio_only: bool,
    pub cookies: String,
}

fn required_url(url: &str) -> Result<&str> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::EmptyUrl);
    }
    Ok(url)
}

fn cookies_args(cookies: &str) -> Vec<String> {
    match cookies.trim() {
        "" => Vec::new(),
        path => vec!["--cookies".to_owned(), path.to_owned()],
    }
}

/// yt-dlp invocation that downloads into `videos_dir`.
pub fn video_download(tools: &ToolPaths, videos_dir: &Path, request: &VideoRequest) -> Result<Pipeline> {
    let url = required_url(&request.url)?;
    let quality = request.quality.trim();

    let mut ytdlp = Invocation::new(&tools.ytdlp)
        .args(cookies_args(&request.cookies))
        .arg("--ffmpeg-location")
        .arg(tools.ffmpeg_dir());

    ytdlp = if request.audio_only {
        ytdlp.args(["-f", "bestaudio", "-x", "--audio-format", "mp3"])
    } else {
        if !quality.is_empty() && quality != BEST_QUALITY {
            ytdlp = ytdlp.args(["-f", quality]);
        }
        ytdlp.args(["--merge-output-format", "mp4"])
    };

    let ytdlp = ytdlp
        .arg("--newline")
        .arg("--progress-template")
        .arg(progress_template())
        .arg("-o")
        .arg(videos_dir.join("%(title)s.%(ext)s"))
        .arg(url);

    Ok(Pipeline { kind: JobKind::Video, stages: vec![ytdlp] })
}

/// `streamlink ... -O | ffmpeg -i - -c copy <output>`
pub fn stream_capture(tools: &ToolPaths, output: &Path, url: &str) -> Result<Pipeline> {
    let url = required_url(url)?;
    let streamlink = Invocation::new(&tools.streamlink)
        .args(["--hls-live-restart", url, "best", "-O"]);
    let ffmpeg = Invocation::new(&tools.ffmpeg)
        .args(["-i", "-", "-c", "copy"])
        .arg(output);
    Ok(Pipeline { kind: JobKind::Stream, stages: vec![streamlink, ffmpeg] })
}

/// Recording file for a stream started at `at`.
pub fn stream_output_path(vods_dir: &Path, at: DateTime<Local>) -> PathBuf {
    vods_dir.join(format!("stream_{}.mp4", at.format("%Y%m%d_%H%M%S")))
}

/// `yt-dlp -F <url>`: prints the available formats into the log.
pub fn list_formats(tools: &ToolPaths, url: &str, cookies: &str) -> Result<Pipeline> {
    let url = required_url(url)?;
    let ytdlp = Invocation::new(&tools.ytdlp)
        .args(cookies_args(cookies))
        .args(["-F", url]);
    Ok(Pipeline { kind: JobKind::Formats, stages: vec![ytdlp] })
}

/// `yt-dlp -U`: self-update of the downloader.
pub fn update_tools(tools: &ToolPaths) -> Pipeline {
    Pipeline {
        kind: JobKind::UpdateTools,
        stages: vec![Invocation::new(&tools.ytdlp).arg("-U")],
    }
}
