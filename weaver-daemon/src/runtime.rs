use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use weaver_apply::{ApplyError, CycleOutcome, UpdateCoordinator};
use weaver_core::WeaverConfig;

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, DEBOUNCE_WINDOW};
use crate::protocol::{DaemonRequest, DaemonResponse};

type SharedCoordinator = Arc<Mutex<UpdateCoordinator>>;
type SharedStats = Arc<RwLock<DaemonStats>>;

struct CycleJob {
    document: PathBuf,
    source: &'static str,
    respond_to: oneshot::Sender<Result<CycleSummary, String>>,
}

/// What one queued cycle did, as reported to socket clients and the log.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub source: String,
    pub document: String,
    /// `"skipped"` or `"completed"`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub files_written: usize,
    pub files_failed: usize,
    pub files_unstaged: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_status: Option<String>,
    pub duration_ms: u128,
}

impl CycleSummary {
    fn from_outcome(
        document: &Path,
        source: &'static str,
        outcome: &CycleOutcome,
        duration: Duration,
    ) -> Self {
        let mut summary = Self {
            source: source.to_string(),
            document: document.display().to_string(),
            status: "skipped".to_string(),
            skip_reason: None,
            branch: None,
            files_written: 0,
            files_failed: 0,
            files_unstaged: 0,
            merge_status: None,
            duration_ms: duration.as_millis(),
        };
        match outcome {
            CycleOutcome::Skipped(reason) => summary.skip_reason = Some(reason.to_string()),
            CycleOutcome::Completed(cycle) => {
                summary.status = "completed".to_string();
                summary.branch = Some(cycle.branch_name.clone());
                summary.files_written = cycle.updated_paths().count();
                summary.files_failed = cycle.failures().count();
                summary.files_unstaged = cycle.unstaged().count();
                summary.merge_status = Some(cycle.merge.status_label().to_string());
            }
        }
        summary
    }
}

/// Counters exposed by the `status` command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DaemonStats {
    pub received: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub last_cycle_at_unix: u64,
    pub last_branch: Option<String>,
    pub last_merge_status: Option<String>,
    pub last_error: Option<String>,
}

impl DaemonStats {
    fn record(&mut self, result: &Result<CycleSummary, String>, at_unix: u64) {
        self.last_cycle_at_unix = at_unix;
        match result {
            Ok(summary) if summary.status == "completed" => {
                self.completed += 1;
                self.last_branch = summary.branch.clone();
                self.last_merge_status = summary.merge_status.clone();
            }
            Ok(_) => self.skipped += 1,
            Err(err) => {
                self.failed += 1;
                self.last_error = Some(err.clone());
            }
        }
    }
}

/// Install logging, start a tokio runtime and block until the daemon exits.
pub fn start_blocking(config: WeaverConfig) -> Result<(), DaemonError> {
    crate::logging::init(&config.logs_folder)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon: watcher + cycle processor + socket server + signal handler.
pub async fn run(config: WeaverConfig) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&config)?;

    let coordinator: SharedCoordinator = Arc::new(Mutex::new(UpdateCoordinator::new(
        config.clone(),
    )?));
    let stats: SharedStats = Arc::new(RwLock::new(DaemonStats::default()));
    let config = Arc::new(config);
    let started_at_unix = unix_seconds_now();

    tracing::info!(
        root = %config.project_root.display(),
        monitored = %config.monitored_file.display(),
        primary = %config.primary_branch,
        "weaver daemon starting",
    );

    let (cycle_tx, cycle_rx) = mpsc::channel::<CycleJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let monitored = config.monitored_file.clone();
        let cycle_tx = cycle_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(monitored, cycle_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let coordinator = coordinator.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            let result =
                cycle_processor_task(coordinator, stats, cycle_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let stats = stats.clone();
        let cycle_tx = cycle_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                config,
                stats,
                cycle_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };
    drop(cycle_tx);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, processor_result, socket_result, signal_result) = tokio::join!(
        watcher_handle,
        processor_handle,
        socket_handle,
        signal_handle
    );

    handle_join("watcher", watcher_result)?;
    handle_join("cycle_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("weaver daemon stopped");
    Ok(())
}

async fn watcher_task(
    monitored: PathBuf,
    cycle_tx: mpsc::Sender<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (watch_dir, document) = resolve_watch_target(&monitored)?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
    tracing::info!(path = %document.display(), "watching instruction document");

    let mut debounce = Debouncer::new(DEBOUNCE_WINDOW);

    loop {
        let deadline = debounce.deadline();
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if is_relevant_event_kind(&event.kind)
                    && event.paths.iter().any(|p| p == &document)
                {
                    debounce.record(Instant::now());
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if !debounce.fire(Instant::now()) {
                    continue;
                }

                // Read at fire time; our own clearing write lands here too.
                if !document_has_content(&document) {
                    tracing::debug!(path = %document.display(), "document is blank; nothing to dispatch");
                    continue;
                }

                match enqueue_cycle(&cycle_tx, document.clone(), "watcher").await {
                    Ok(summary) => {
                        tracing::info!(
                            status = %summary.status,
                            branch = summary.branch.as_deref().unwrap_or("-"),
                            written = summary.files_written,
                            failed = summary.files_failed,
                            unstaged = summary.files_unstaged,
                            duration_ms = summary.duration_ms,
                            "watcher-triggered cycle finished",
                        );
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "watcher-triggered cycle failed");
                    }
                }
            }
        }
    }

    Ok(())
}

async fn cycle_processor_task(
    coordinator: SharedCoordinator,
    stats: SharedStats,
    mut cycle_rx: mpsc::Receiver<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = cycle_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();
                stats.write().await.received += 1;

                let coordinator = coordinator.clone();
                let document = job.document.clone();
                let joined =
                    tokio::task::spawn_blocking(move || run_cycle(&coordinator, &document)).await;

                let outcome = match joined {
                    Ok(Ok(outcome)) => Ok(CycleSummary::from_outcome(
                        &job.document,
                        job.source,
                        &outcome,
                        started.elapsed(),
                    )),
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(err) => Err(format!("cycle task join error: {err}")),
                };
                if let Err(err) = &outcome {
                    tracing::error!(
                        document = %job.document.display(),
                        source = job.source,
                        error = %err,
                        "update cycle failed",
                    );
                }

                stats.write().await.record(&outcome, unix_seconds_now());
                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

fn run_cycle(
    coordinator: &Mutex<UpdateCoordinator>,
    document: &Path,
) -> Result<CycleOutcome, ApplyError> {
    let mut guard = coordinator.lock().unwrap_or_else(PoisonError::into_inner);
    guard.handle(document)
}

async fn socket_server_task(
    config: Arc<WeaverConfig>,
    stats: SharedStats,
    cycle_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&config.project_root);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening for daemon commands");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let config = config.clone();
                let stats = stats.clone();
                let cycle_tx = cycle_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        config,
                        stats,
                        cycle_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    config: Arc<WeaverConfig>,
    stats: SharedStats,
    cycle_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => {
                DaemonResponse::ok(build_status_payload(&config, &stats, started_at_unix).await)
            }
            "apply" => {
                match enqueue_cycle(&cycle_tx, config.monitored_file.clone(), "socket").await {
                    Ok(summary) => DaemonResponse::ok(json!(summary)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    config: &WeaverConfig,
    stats: &RwLock<DaemonStats>,
    started_at_unix: u64,
) -> Value {
    let snapshot = stats.read().await.clone();
    json!({
        "running": true,
        "pid": std::process::id(),
        "started_at_unix": started_at_unix,
        "project_root": config.project_root.display().to_string(),
        "monitored_file": config.monitored_file.display().to_string(),
        "primary_branch": config.primary_branch,
        "socket": socket_path(&config.project_root).display().to_string(),
        "cycles": snapshot,
    })
}

async fn enqueue_cycle(
    cycle_tx: &mpsc::Sender<CycleJob>,
    document: PathBuf,
    source: &'static str,
) -> Result<CycleSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    cycle_tx
        .send(CycleJob {
            document,
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle response"))?;
    outcome.map_err(DaemonError::Protocol)
}

/// Canonical directory to watch and the document path as events report it.
fn resolve_watch_target(monitored: &Path) -> Result<(PathBuf, PathBuf), DaemonError> {
    let (Some(parent), Some(name)) = (monitored.parent(), monitored.file_name()) else {
        return Err(DaemonError::Protocol(format!(
            "monitored file has no parent directory: {}",
            monitored.display()
        )));
    };
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    // Events arrive with real paths (e.g. /private/var/... on macOS).
    let parent = fs::canonicalize(parent).map_err(|e| io_err(parent, e))?;
    let document = parent.join(name);
    Ok((parent, document))
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// False for a missing, unreadable or whitespace-only document.
fn document_has_content(path: &Path) -> bool {
    fs::read_to_string(path)
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

/// Trailing-edge debounce for the instruction document.
///
/// Every relevant event pushes the deadline out to `now + window`; the
/// watcher dispatches once the deadline passes with no further events. An
/// edit that lands right after a dispatch (including one made while that
/// cycle is still running) arms a fresh deadline instead of being dropped.
#[derive(Debug)]
struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    fn record(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once per quiet period, when `now` has reached the deadline.
    fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

fn ensure_runtime_dirs(config: &WeaverConfig) -> Result<(), DaemonError> {
    for dir in [config.weaver_dir(), config.logs_folder.clone()] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
