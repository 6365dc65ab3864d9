//! Where the application keeps its helper binaries, downloads, and settings.

use std::path::{Path, PathBuf};

use crate::command::JobKind;
use crate::error::{Error, Result};

/// Environment variable that relocates the application directory.
pub const HOME_ENV: &str = "SIMPLEDLP_HOME";

const EXE_SUFFIX: &str = if cfg!(target_os = "windows") { ".exe" } else { "" };

/// Directory layout rooted next to the executable.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base: PathBuf,
    /// Helper binaries (yt-dlp, ffmpeg)
    pub bin_dir: PathBuf,
    /// Finished video downloads
    pub videos_dir: PathBuf,
    /// Recorded live streams
    pub vods_dir: PathBuf,
    pub config_file: PathBuf,
}

impl AppPaths {
    pub fn from_base(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            bin_dir: base.join("bin"),
            videos_dir: base.join("videos"),
            vods_dir: base.join("vods"),
            config_file: base.join("config.json"),
            base,
        }
    }

    /// Resolves the base directory from `SIMPLEDLP_HOME`, then the
    /// executable's directory, then the working directory.
    pub fn discover() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Self::from_base(home);
        }
        let base = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_base(base)
    }

    pub fn tools(&self) -> ToolPaths {
        ToolPaths {
            ytdlp: self.bin_dir.join(format!("yt-dlp{EXE_SUFFIX}")),
            ffmpeg: self.bin_dir.join(format!("ffmpeg{EXE_SUFFIX}")),
            streamlink: which::which("streamlink").unwrap_or_else(|_| PathBuf::from("streamlink")),
        }
    }
}

/// Locations of the three external programs.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
    pub streamlink: PathBuf,
}

impl ToolPaths {
    /// Directory handed to yt-dlp as `--ffmpeg-location`.
    pub fn ffmpeg_dir(&self) -> &Path {
        self.ffmpeg.parent().unwrap_or_else(|| Path::new("."))
    }

    /// File names of the tools `kind` needs that cannot be found.
    pub fn missing_for(&self, kind: JobKind) -> Vec<String> {
        let required = match kind {
            JobKind::Stream => [&self.ffmpeg, &self.streamlink],
            JobKind::Video | JobKind::Formats | JobKind::UpdateTools => [&self.ytdlp, &self.ffmpeg],
        };
        required
            .into_iter()
            .filter(|path| !is_available(path))
            .map(|path| file_name(path))
            .collect()
    }

    /// Fails with [`Error::MissingTools`] unless everything `kind` needs is present.
    pub fn require(&self, kind: JobKind) -> Result<()> {
        let missing = self.missing_for(kind);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingTools(missing))
        }
    }

    /// Helper binaries that live in `bin/` and are missing there.
    pub fn missing_bundled(&self) -> Vec<String> {
        [&self.ytdlp, &self.ffmpeg]
            .into_iter()
            .filter(|path| !path.exists())
            .map(|path| file_name(path))
            .collect()
    }
}

// A bare program name counts as available when it resolves on PATH.
fn is_available(path: &Path) -> bool {
    if path.components().count() == 1 && !path.exists() {
        return which::which(path).is_ok();
    }
    path.exists()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools_in(dir: &Path) -> ToolPaths {
        ToolPaths {
            ytdlp: dir.join("yt-dlp"),
            ffmpeg: dir.join("ffmpeg"),
            streamlink: dir.join("streamlink"),
        }
    }

    #[test]
    fn layout_hangs_off_base() {
        let paths = AppPaths::from_base("/opt/simpledlp");
        assert_eq!(paths.bin_dir, PathBuf::from("/opt/simpledlp/bin"));
        assert_eq!(paths.videos_dir, PathBuf::from("/opt/simpledlp/videos"));
        assert_eq!(paths.vods_dir, PathBuf::from("/opt/simpledlp/vods"));
        assert_eq!(paths.config_file, PathBuf::from("/opt/simpledlp/config.json"));
    }

    #[test]
    fn reports_missing_tools_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tools_in(dir.path());
        std::fs::write(&tools.ffmpeg, b"").unwrap();

        assert_eq!(tools.missing_for(JobKind::Video), vec!["yt-dlp".to_string()]);
        assert_eq!(tools.missing_for(JobKind::Stream), vec!["streamlink".to_string()]);
        assert_eq!(tools.missing_bundled(), vec!["yt-dlp".to_string()]);

        assert!(matches!(
            tools.require(JobKind::Formats),
            Err(Error::MissingTools(ref names)) if names == &["yt-dlp".to_string()]
        ));

        std::fs::write(&tools.ytdlp, b"").unwrap();
        assert!(tools.missing_for(JobKind::Video).is_empty());
        assert!(tools.require(JobKind::Video).is_ok());
        assert!(tools.missing_bundled().is_empty());
    }

    #[test]
    fn ffmpeg_dir_is_bin() {
        let tools = tools_in(Path::new("/x/bin"));
        assert_eq!(tools.ffmpeg_dir(), Path::new("/x/bin"));
    }
}
