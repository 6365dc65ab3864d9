//! Runs one external pipeline at a time and streams its output back.
//!
//! The supervisor owns the single "currently running job" slot. A second
//! launch while the slot is taken fails with [`Error::Busy`]. Stopping is a
//! forceful kill of every stage's process tree.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command::{Invocation, JobKind, Pipeline};
use crate::error::{Error, Result};
use crate::progress::parse_progress;

/// How long to wait for output pumps after the processes are gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded,
    /// Non-zero exit; `code` is `None` when killed by a signal.
    Failed { code: Option<i32> },
    Stopped,
    SpawnFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Output(String),
    /// Fraction in `0.0..=1.0`
    Progress(f32),
    Finished { kind: JobKind, outcome: JobOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopResult {
    Stopping,
    NothingRunning,
}

struct ActiveJob {
    kind: JobKind,
    cancel: CancellationToken,
}

type Slot = Arc<Mutex<Option<ActiveJob>>>;

fn lock(slot: &Mutex<Option<ActiveJob>>) -> MutexGuard<'_, Option<ActiveJob>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct Supervisor {
    runtime: Handle,
    active: Slot,
}

impl Supervisor {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime, active: Arc::new(Mutex::new(None)) }
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Starts `pipeline` in the background. Events, ending with exactly one
    /// [`JobEvent::Finished`], are sent on `events`.
    pub fn launch(&self, pipeline: Pipeline, events: UnboundedSender<JobEvent>) -> Result<()> {
        let cancel = CancellationToken::new();
        {
            let mut slot = lock(&self.active);
            if slot.is_some() {
                return Err(Error::Busy);
            }
            *slot = Some(ActiveJob { kind: pipeline.kind, cancel: cancel.clone() });
        }

        tracing::info!(kind = ?pipeline.kind, command = %pipeline, "launching");
        let active = Arc::clone(&self.active);
        self.runtime.spawn(async move {
            let kind = pipeline.kind;
            let outcome = run_pipeline(&pipeline, &cancel, &events).await;
            tracing::info!(?kind, ?outcome, "job finished");
            lock(&active).take();
            let _ = events.send(JobEvent::Finished { kind, outcome });
        });
        Ok(())
    }

    /// Requests a forceful stop of the running job.
    pub fn stop(&self) -> StopResult {
        match lock(&self.active).as_ref() {
            Some(job) => {
                tracing::info!(kind = ?job.kind, "stop requested");
                job.cancel.cancel();
                StopResult::Stopping
            }
            None => StopResult::NothingRunning,
        }
    }

    /// Stops the running job and blocks until it is reaped or `timeout`
    /// passes. Call from outside the runtime, e.g. on window close.
    pub fn shutdown(&self, timeout: Duration) {
        if self.stop() == StopResult::NothingRunning {
            return;
        }
        let deadline = Instant::now() + timeout;
        while self.is_busy() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        if self.is_busy() {
            tracing::warn!("job still running at shutdown");
        }
    }
}

async fn run_pipeline(
    pipeline: &Pipeline,
    cancel: &CancellationToken,
    events: &UnboundedSender<JobEvent>,
) -> JobOutcome {
    if pipeline.stages.is_empty() {
        return JobOutcome::SpawnFailed("empty pipeline".to_owned());
    }
    let (mut children, pumps) = match spawn_stages(&pipeline.stages, events) {
        Ok(spawned) => spawned,
        Err(err) => {
            tracing::warn!(%err, "spawn failed");
            return JobOutcome::SpawnFailed(err.to_string());
        }
    };

    let waited = tokio::select! {
        () = cancel.cancelled() => None,
        status = wait_all(&mut children) => Some(status),
    };

    let outcome = match waited {
        None => {
            kill_all(&mut children).await;
            JobOutcome::Stopped
        }
        Some(Ok(status)) if status.success() => JobOutcome::Succeeded,
        Some(Ok(status)) => JobOutcome::Failed { code: status.code() },
        Some(Err(err)) => {
            tracing::warn!(%err, "waiting for process failed");
            kill_all(&mut children).await;
            JobOutcome::Failed { code: None }
        }
    };

    for handle in pumps {
        if tokio::time::timeout(DRAIN_TIMEOUT, handle).await.is_err() {
            tracing::debug!("output pump still open after exit");
        }
    }
    outcome
}

fn spawn_stages(
    stages: &[Invocation],
    events: &UnboundedSender<JobEvent>,
) -> io::Result<(Vec<Child>, Vec<JoinHandle<()>>)> {
    let mut children = Vec::with_capacity(stages.len());
    let mut pumps = Vec::new();
    let mut upstream: Option<Stdio> = None;

    for (i, stage) in stages.iter().enumerate() {
        let last = i + 1 == stages.len();
        let mut cmd = Command::new(&stage.program);
        cmd.args(&stage.args)
            .stdin(upstream.take().unwrap_or_else(Stdio::null))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        // Children spawned so far are killed on drop if this fails.
        let mut child = cmd.spawn()?;
        tracing::debug!(program = %stage.program.display(), pid = ?child.id(), "spawned");

        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, events.clone())));
        }
        if let Some(stdout) = child.stdout.take() {
            if last {
                pumps.push(tokio::spawn(pump(stdout, events.clone())));
            } else {
                upstream = Some(stdout.try_into()?);
            }
        }
        children.push(child);
    }
    Ok((children, pumps))
}

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Waits for every stage, reporting the exit status of the last one.
async fn wait_all(children: &mut [Child]) -> io::Result<ExitStatus> {
    let mut last_status = None;
    for child in children.iter_mut().rev() {
        let status = child.wait().await?;
        last_status.get_or_insert(status);
    }
    last_status.ok_or_else(|| io::Error::other("no processes to wait for"))
}

async fn kill_all(children: &mut [Child]) {
    for child in children.iter_mut() {
        if let Some(pid) = child.id() {
            kill_tree(pid).await;
        }
        if let Err(err) = child.kill().await {
            tracing::debug!(%err, "kill after tree kill");
        }
    }
}

/// Each stage leads its own process group, so the group id is its pid.
#[cfg(unix)]
async fn kill_tree(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(err) => tracing::warn!(pid, %err, "killpg failed"),
    }
}

#[cfg(windows)]
async fn kill_tree(pid: u32) {
    let result = Command::new("taskkill")
        .args(["/F", "/T", "/PID"])
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .status()
        .await;
    if let Err(err) = result {
        tracing::warn!(pid, %err, "taskkill failed");
    }
}

#[cfg(not(any(unix, windows)))]
async fn kill_tree(_pid: u32) {}

/// Longest line held back while waiting for a terminator.
const MAX_LINE: usize = 64 * 1024;

/// Forwards output line by line. yt-dlp and ffmpeg redraw with `\r`, so a
/// carriage return ends a line as soon as it arrives.
async fn pump<R: AsyncRead + Unpin>(reader: R, events: UnboundedSender<JobEvent>) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        let (used, complete) = match reader.fill_buf().await {
            Ok([]) => break,
            Ok(available) => match available.iter().position(|b| matches!(b, b'\r' | b'\n')) {
                Some(end) => {
                    line.extend_from_slice(&available[..end]);
                    (end + 1, true)
                }
                None => {
                    line.extend_from_slice(available);
                    (available.len(), line.len() >= MAX_LINE)
                }
            },
            Err(err) => {
                tracing::debug!(%err, "output pipe closed");
                break;
            }
        };
        reader.consume(used);
        if complete {
            if !emit(&line, &events) {
                return;
            }
            line.clear();
        }
    }
    emit(&line, &events);
}

/// Sends one raw line; `false` once the receiver is gone.
fn emit(raw: &[u8], events: &UnboundedSender<JobEvent>) -> bool {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end();
    if line.is_empty() {
        return true;
    }
    let event = match parse_progress(line) {
        Some(fraction) => JobEvent::Progress(fraction),
        None => JobEvent::Output(line.to_owned()),
    };
    events.send(event).is_ok()
}
