//! First-run installation of yt-dlp and ffmpeg into `bin/`.
//!
//! On Linux the binaries are fetched from fixed URLs. Elsewhere the user is
//! asked to download them by hand. Downloads are not checksum-verified.

use std::fs::File;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::paths::{AppPaths, ToolPaths};

pub const YTDLP_URL: &str = "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp";
pub const FFMPEG_ARCHIVE_URL: &str =
    "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-amd64-static.tar.xz";

/// Links shown in the manual-download notice.
pub const YTDLP_MANUAL_URL: &str =
    "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe";
pub const FFMPEG_MANUAL_URL: &str = "https://www.gyan.dev/ffmpeg/builds/";

/// What startup has to do about the helper binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bootstrap {
    Ready,
    /// The user must fetch these files themselves.
    ManualDownload { missing: Vec<String> },
    AutoDownload { missing: Vec<String> },
}

pub fn plan(tools: &ToolPaths) -> Bootstrap {
    let missing = tools.missing_bundled();
    if missing.is_empty() {
        Bootstrap::Ready
    } else if cfg!(target_os = "linux") {
        Bootstrap::AutoDownload { missing }
    } else {
        Bootstrap::ManualDownload { missing }
    }
}

/// Progress of the automatic installation, one message per step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStep {
    Fetching { file: String },
    Installed { file: String },
    Failed { file: String, error: String },
}

/// Where the Linux builds are fetched from.
#[derive(Debug, Clone)]
struct Sources {
    ytdlp: String,
    ffmpeg_archive: String,
}

impl Default for Sources {
    fn default() -> Self {
        Self { ytdlp: YTDLP_URL.to_owned(), ffmpeg_archive: FFMPEG_ARCHIVE_URL.to_owned() }
    }
}

/// Downloads whichever of yt-dlp and ffmpeg is missing. A failure on one
/// tool is reported and the other is still attempted.
pub async fn ensure_tools(paths: &AppPaths, tools: &ToolPaths, notify: impl FnMut(BootstrapStep)) {
    install_missing(&reqwest::Client::new(), &Sources::default(), paths, tools, notify).await;
}

async fn install_missing(
    client: &reqwest::Client,
    sources: &Sources,
    paths: &AppPaths,
    tools: &ToolPaths,
    mut notify: impl FnMut(BootstrapStep),
) {
    if !tools.ytdlp.exists() {
        let file = file_label(&tools.ytdlp);
        notify(BootstrapStep::Fetching { file: file.clone() });
        notify(report(file, install_ytdlp(client, &sources.ytdlp, &paths.bin_dir, &tools.ytdlp).await));
    }

    if !tools.ffmpeg.exists() {
        let file = file_label(&tools.ffmpeg);
        notify(BootstrapStep::Fetching { file: file.clone() });
        let installed = install_ffmpeg(client, &sources.ffmpeg_archive, &paths.bin_dir, &tools.ffmpeg).await;
        notify(report(file, installed));
    }
}

fn report(file: String, result: Result<()>) -> BootstrapStep {
    match result {
        Ok(()) => BootstrapStep::Installed { file },
        Err(err) => {
            tracing::warn!(%file, %err, "tool installation failed");
            BootstrapStep::Failed { file, error: err.to_string() }
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn install_ytdlp(client: &reqwest::Client, url: &str, bin_dir: &Path, target: &Path) -> Result<()> {
    tokio::fs::create_dir_all(bin_dir).await?;
    download(client, url, target).await?;
    make_executable(target)?;
    Ok(())
}

async fn install_ffmpeg(client: &reqwest::Client, url: &str, bin_dir: &Path, target: &Path) -> Result<()> {
    tokio::fs::create_dir_all(bin_dir).await?;
    let archive = bin_dir.join("ffmpeg.tar.xz");
    download(client, url, &archive).await?;

    let (archive_owned, target_owned) = (archive.clone(), target.to_path_buf());
    let extracted = tokio::task::spawn_blocking(move || extract_binary(&archive_owned, "ffmpeg", &target_owned))
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()));

    if let Err(err) = tokio::fs::remove_file(&archive).await {
        tracing::debug!(path = %archive.display(), %err, "could not remove archive");
    }
    extracted??;
    make_executable(target)?;
    Ok(())
}

/// `<path>.part`, where a file lives until it is complete.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Streams `url` into `dest`. The body goes to `dest.part` first and is
/// renamed only once complete, so `dest` never holds a partial file.
async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let partial = partial_path(dest);
    let result = fetch_into(client, url, &partial).await;
    match result {
        Ok(written) => {
            tokio::fs::rename(&partial, dest).await?;
            tracing::info!(url, bytes = written, "download complete");
            Ok(())
        }
        Err(err) => {
            if let Err(rm_err) = tokio::fs::remove_file(&partial).await {
                if rm_err.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %partial.display(), err = %rm_err, "could not remove partial download");
                }
            }
            Err(err)
        }
    }
}

async fn fetch_into(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    tracing::info!(url, dest = %dest.display(), "downloading");
    let mut response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(Error::Http { url: url.to_owned(), status: response.status().as_u16() });
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Copies the first regular file in the `.tar.xz` at `archive` whose path
/// ends in `/<name>` to `target`.
pub fn extract_binary(archive: &Path, name: &str, target: &Path) -> Result<PathBuf> {
    let suffix = format!("/{name}");
    let decoder = xz2::read::XzDecoder::new(File::open(archive)?);
    let mut tarball = tar::Archive::new(decoder);

    for entry in tarball.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let matches = entry
            .path()?
            .to_str()
            .is_some_and(|p| p.ends_with(&suffix));
        if matches {
            let partial = partial_path(target);
            if let Err(err) = entry.unpack(&partial) {
                let _ = std::fs::remove_file(&partial);
                return Err(err.into());
            }
            std::fs::rename(&partial, target)?;
            tracing::info!(path = %target.display(), "extracted {name}");
            return Ok(target.to_path_buf());
        }
    }

    Err(Error::ArchiveEntryMissing { name: name.to_owned(), archive: archive.to_path_buf() })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
        std::fs::write(path, archive_bytes(entries)).unwrap();
    }

    fn archive_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn http_ok(body: &[u8]) -> Vec<u8> {
        let mut response =
            format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len())
                .into_bytes();
        response.extend_from_slice(body);
        response
    }

    const NOT_FOUND: &[u8] = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    /// Answers each request with the canned response for its path, 404 otherwise.
    async fn serve(routes: Vec<(&'static str, Vec<u8>)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).into_owned();
                let path = request.split_whitespace().nth(1).unwrap_or("/");
                let response = routes
                    .iter()
                    .find(|(route, _)| *route == path)
                    .map_or(NOT_FOUND, |(_, response)| response.as_slice());
                let _ = socket.write_all(response).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn http_error_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve(Vec::new()).await;
        let dest = dir.path().join("yt-dlp");

        let err = download(&client(), &format!("{base}/yt-dlp"), &dest).await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 404, .. }), "{err}");
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn truncated_body_is_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let truncated = b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\nConnection: close\r\n\r\n#!/bin/sh\necho".to_vec();
        let base = serve(vec![("/yt-dlp", truncated)]).await;
        let paths = AppPaths::from_base(dir.path());
        let tools = paths.tools();

        let result = install_ytdlp(&client(), &format!("{base}/yt-dlp"), &paths.bin_dir, &tools.ytdlp).await;
        assert!(result.is_err());
        assert!(!tools.ytdlp.exists());
        assert!(!partial_path(&tools.ytdlp).exists());
        assert!(tools.missing_bundled().contains(&"yt-dlp".to_string()));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_other_tool() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_bytes(&[("ffmpeg-7.0-amd64-static/ffmpeg", &b"ffmpeg-binary"[..])]);
        let base = serve(vec![("/ffmpeg.tar.xz", http_ok(&archive))]).await;
        let sources = Sources { ytdlp: format!("{base}/missing"), ffmpeg_archive: format!("{base}/ffmpeg.tar.xz") };
        let paths = AppPaths::from_base(dir.path());
        let tools = paths.tools();

        let mut steps = Vec::new();
        install_missing(&client(), &sources, &paths, &tools, |step| steps.push(step)).await;

        let ytdlp = file_label(&tools.ytdlp);
        let ffmpeg = file_label(&tools.ffmpeg);
        assert_eq!(steps.len(), 4, "{steps:?}");
        assert_eq!(steps[0], BootstrapStep::Fetching { file: ytdlp.clone() });
        assert!(matches!(&steps[1], BootstrapStep::Failed { file, error } if *file == ytdlp && error.contains("404")));
        assert_eq!(steps[2], BootstrapStep::Fetching { file: ffmpeg.clone() });
        assert_eq!(steps[3], BootstrapStep::Installed { file: ffmpeg });

        assert_eq!(std::fs::read(&tools.ffmpeg).unwrap(), b"ffmpeg-binary");
        assert!(!paths.bin_dir.join("ffmpeg.tar.xz").exists());
        assert_eq!(tools.missing_bundled(), vec![ytdlp]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn installed_ytdlp_is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let base = serve(vec![("/yt-dlp", http_ok(b"#!/bin/sh\necho yt-dlp\n"))]).await;
        let paths = AppPaths::from_base(dir.path());
        let tools = paths.tools();

        install_ytdlp(&client(), &format!("{base}/yt-dlp"), &paths.bin_dir, &tools.ytdlp)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&tools.ytdlp).unwrap(), b"#!/bin/sh\necho yt-dlp\n");
        let mode = std::fs::metadata(&tools.ytdlp).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(!partial_path(&tools.ytdlp).exists());
    }

    #[test]
    fn extracts_nested_binary() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("ffmpeg.tar.xz");
        write_archive(
            &archive,
            &[
                ("ffmpeg-7.0-amd64-static/readme.txt", &b"docs"[..]),
                ("ffmpeg-7.0-amd64-static/ffprobe", &b"ffprobe-binary"[..]),
                ("ffmpeg-7.0-amd64-static/ffmpeg", &b"ffmpeg-binary"[..]),
            ],
        );
        let target = dir.path().join("bin-ffmpeg");
        let out = extract_binary(&archive, "ffmpeg", &target).unwrap();
        assert_eq!(out, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"ffmpeg-binary");
    }

    #[test]
    fn archive_without_binary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("ffmpeg.tar.xz");
        write_archive(&archive, &[("pkg/ffmpeg-docs.txt", &b"x"[..]), ("pkg/ffprobe", &b"y"[..])]);
        let err = extract_binary(&archive, "ffmpeg", &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::ArchiveEntryMissing { ref name, .. } if name == "ffmpeg"));
    }

    #[test]
    fn plan_depends_on_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let tools = AppPaths::from_base(dir.path()).tools();
        match plan(&tools) {
            Bootstrap::AutoDownload { missing } | Bootstrap::ManualDownload { missing } => {
                assert_eq!(missing.len(), 2);
            }
            Bootstrap::Ready => panic!("nothing is installed yet"),
        }

        std::fs::create_dir_all(tools.ffmpeg.parent().unwrap()).unwrap();
        std::fs::write(&tools.ytdlp, b"").unwrap();
        std::fs::write(&tools.ffmpeg, b"").unwrap();
        assert_eq!(plan(&tools), Bootstrap::Ready);
    }

    #[cfg(unix)]
    #[test]
    fn marks_binaries_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yt-dlp");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        make_executable(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
