use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use repohandle_core::{Config, PushEvent, TrackedFile};
use repohandle_gitee::GiteeClient;
use repohandle_sync::{
    ChangeCache, FileOutcome, ManifestSource, PassOptions, PassReport, ProviderClient, Reconciler,
    SigIndex, SyncError,
};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Long-lived collaborators shared by every pass the daemon runs.
pub struct DaemonContext {
    config: Config,
    provider: Arc<dyn ProviderClient>,
    source: Arc<dyn ManifestSource>,
    cache: ChangeCache,
    sigs: SigIndex,
}

impl DaemonContext {
    pub fn new(
        config: Config,
        provider: Arc<dyn ProviderClient>,
        source: Arc<dyn ManifestSource>,
        cache: ChangeCache,
    ) -> Self {
        Self {
            config,
            provider,
            source,
            cache,
            sigs: SigIndex::new(),
        }
    }

    /// Gitee-backed context; the same client serves repositories and manifests.
    pub fn from_config(home: &Path, config: Config) -> Result<Self, DaemonError> {
        let client = Arc::new(GiteeClient::from_config(&config.provider)?);
        let cache = ChangeCache::new(config.cache_path_at(home));
        Ok(Self::new(config, client.clone(), client, cache))
    }

    /// Configured files joined with their cached hashes.
    pub fn tracked_files(&self) -> Vec<TrackedFile> {
        self.reconciler(false).tracked_files(&self.config.files)
    }

    fn reconciler(&self, dry_run: bool) -> Reconciler<'_> {
        Reconciler::new(
            self.provider.as_ref(),
            self.source.as_ref(),
            &self.cache,
            &self.sigs,
            PassOptions::from_config(&self.config, dry_run),
        )
    }

    fn run_job(&self, job: &PassJob) -> Result<PassReport, SyncError> {
        let files = &self.config.files;
        match job {
            PassJob::Startup => {
                if let Err(err) = self.cache.init() {
                    tracing::warn!(error = %err, "change cache init failed");
                }
                let reconciler = self.reconciler(false);
                if let Err(err) = reconciler.warm_sig_index(files) {
                    tracing::warn!(error = %err, "sig index warm-up failed");
                }
                reconciler.handle_all(files)
            }
            PassJob::Push(event) => self.reconciler(false).handle_push(event, files),
            PassJob::Full { dry_run } => self.reconciler(*dry_run).handle_all(files),
        }
    }
}

#[derive(Debug, Clone)]
enum PassJob {
    /// Warm the sig index, then run a full pass.
    Startup,
    Push(PushEvent),
    Full { dry_run: bool },
}

impl PassJob {
    fn label(&self) -> String {
        match self {
            PassJob::Startup => "startup".to_string(),
            PassJob::Push(event) => format!(
                "push {}/{}",
                event.repository.namespace, event.repository.name
            ),
            PassJob::Full { dry_run: true } => "sync (dry-run)".to_string(),
            PassJob::Full { dry_run: false } => "sync".to_string(),
        }
    }
}

/// Counts running pass tasks so shutdown can wait for them.
///
/// Once closed, no new task is admitted.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    inner: Arc<InFlightInner>,
}

#[derive(Debug, Default)]
struct InFlightInner {
    count: AtomicUsize,
    closed: AtomicBool,
    idle: Notify,
}

impl InFlight {
    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Admit one task; `None` after [`close`](Self::close).
    fn try_enter(&self) -> Option<InFlightGuard> {
        // Count first: a `drained()` racing with `close()` then sees this
        // task, and the guard drop below wakes it again if we back out.
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
        };
        if self.inner.closed.load(Ordering::SeqCst) {
            return None;
        }
        Some(guard)
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Resolves once no task is in flight.
    pub async fn drained(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlightGuard {
    inner: Arc<InFlightInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub trigger: String,
    pub dry_run: bool,
    pub files: usize,
    pub unchanged: usize,
    pub applied: usize,
    pub failed: usize,
    pub reevaluated: usize,
    pub finished_at_unix: u64,
    pub duration_ms: u128,
}

impl PassSummary {
    fn from_report(trigger: String, report: &PassReport, duration: Duration) -> Self {
        Self {
            trigger,
            dry_run: report.dry_run,
            files: report.files.len(),
            unchanged: report
                .files
                .iter()
                .filter(|f| f.outcome == FileOutcome::Unchanged)
                .count(),
            applied: report.applied(),
            failed: report.failed(),
            reevaluated: report.reevaluated.len(),
            finished_at_unix: unix_seconds_now(),
            duration_ms: duration.as_millis(),
        }
    }
}

struct DaemonState {
    started_at_unix: u64,
    in_flight: InFlight,
    last_pass: RwLock<Option<PassSummary>>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, config: Config) -> Result<(), DaemonError> {
    init_tracing();
    let context = DaemonContext::from_config(home, config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), Arc::new(context)))
}

/// Run the daemon until `stop` or ctrl-c, then wait for in-flight passes.
pub async fn run(home: PathBuf, context: Arc<DaemonContext>) -> Result<(), DaemonError> {
    let state = Arc::new(DaemonState {
        started_at_unix: unix_seconds_now(),
        in_flight: InFlight::default(),
        last_pass: RwLock::new(None),
    });
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket = socket_path(&home);
    if let Some(dir) = socket.parent() {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    prepare_socket_for_bind(&socket)?;
    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(
        socket = %socket.display(),
        files = context.config.files.len(),
        "daemon listening",
    );

    if let Err(err) = spawn_pass(&context, &state, PassJob::Startup) {
        tracing::warn!(error = %err, "startup pass not started");
    }

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let home = home.clone();
        let context = Arc::clone(&context);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let result = socket_server_task(
                listener,
                home,
                context,
                state,
                shutdown.clone(),
                shutdown_rx,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
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

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);

    // Handlers of connections accepted earlier may still be running.
    state.in_flight.close();
    let pending = state.in_flight.count();
    if pending > 0 {
        tracing::info!(pending, "waiting for in-flight passes");
    }
    state.in_flight.drained().await;
    tracing::info!("daemon stopped");

    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

type PassHandle = JoinHandle<Result<(PassSummary, PassReport), DaemonError>>;

/// Run `job` on the blocking pool, counted in flight until it finishes.
///
/// Fails with [`DaemonError::ShuttingDown`] once shutdown has begun.
fn spawn_pass(
    context: &Arc<DaemonContext>,
    state: &Arc<DaemonState>,
    job: PassJob,
) -> Result<PassHandle, DaemonError> {
    let guard = state
        .in_flight
        .try_enter()
        .ok_or(DaemonError::ShuttingDown)?;
    let context = Arc::clone(context);
    let state = Arc::clone(state);
    Ok(tokio::spawn(async move {
        let _guard = guard;
        let trigger = job.label();
        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || context.run_job(&job))
            .await
            .map_err(|err| DaemonError::Protocol(format!("pass task join error: {err}")))?;
        match result {
            Ok(report) => {
                let summary = PassSummary::from_report(trigger, &report, started.elapsed());
                tracing::info!(
                    trigger = %summary.trigger,
                    files = summary.files,
                    applied = summary.applied,
                    failed = summary.failed,
                    duration_ms = summary.duration_ms,
                    "pass completed",
                );
                *state.last_pass.write().await = Some(summary.clone());
                Ok((summary, report))
            }
            Err(err) => {
                tracing::error!(trigger = %trigger, error = %err, "pass failed");
                Err(err.into())
            }
        }
    }))
}

async fn socket_server_task(
    listener: UnixListener,
    home: PathBuf,
    context: Arc<DaemonContext>,
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let context = Arc::clone(&context);
                let state = Arc::clone(&state);
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        handle_socket_client(stream, home, context, state, shutdown_tx).await
                    {
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
    home: PathBuf,
    context: Arc<DaemonContext>,
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
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

        let stop = request.cmd == "stop";
        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&home, &context, &state).await),
            "push" => match request.event {
                Some(event) => match spawn_pass(&context, &state, PassJob::Push(event)) {
                    Ok(_) => DaemonResponse::ok(json!({ "accepted": true })),
                    Err(err) => DaemonResponse::error(err.to_string()),
                },
                None => DaemonResponse::error("push request carries no event"),
            },
            "sync" => {
                let job = PassJob::Full {
                    dry_run: request.dry_run,
                };
                match spawn_pass(&context, &state, job) {
                    Ok(handle) => match handle.await {
                        Ok(Ok((summary, report))) => {
                            DaemonResponse::ok(json!({ "summary": summary, "report": report }))
                        }
                        Ok(Err(err)) => DaemonResponse::error(err.to_string()),
                        Err(err) => {
                            DaemonResponse::error(format!("pass task join failure: {err}"))
                        }
                    },
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "stop" => {
                state.in_flight.close();
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({
                    "stopping": true,
                    "in_flight": state.in_flight.count(),
                }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    home: &Path,
    context: &Arc<DaemonContext>,
    state: &DaemonState,
) -> Value {
    let last_pass = state.last_pass.read().await.clone();

    let tracked = {
        let context = Arc::clone(context);
        tokio::task::spawn_blocking(move || context.tracked_files())
            .await
            .unwrap_or_default()
    };
    let files: Vec<Value> = tracked
        .iter()
        .map(|file| {
            json!({
                "file": file.to_string(),
                "kind": file.kind,
                "hash": file.hash,
            })
        })
        .collect();

    json!({
        "running": true,
        "started_at_unix": state.started_at_unix,
        "in_flight": state.in_flight.count(),
        "last_pass": last_pass,
        "sig_index_size": context.sigs.len(),
        "files": files,
        "socket": socket_path(home).display().to_string(),
        "cache": context.cache.path().display().to_string(),
    })
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

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use repohandle_core::{
        BranchState, NewRepository, ProviderRepository, PushCommit, PushRepository,
        RepositorySettings,
    };
    use repohandle_sync::provider::content_digest;
    use repohandle_sync::{DirManifestSource, ProviderError};
    use tempfile::TempDir;

    use crate::protocol::{request_push, request_status, request_stop, request_sync};

    const MANIFEST_V1: &str = "community: openeuler\nrepositories:\n  - name: foo\n";
    const MANIFEST_V2: &str =
        "community: openeuler\nrepositories:\n  - name: foo\n  - name: bar\n";

    /// Provider whose repositories exist once created; branch calls succeed.
    #[derive(Default)]
    struct MemoryProvider {
        repos: Mutex<HashMap<String, ProviderRepository>>,
    }

    impl MemoryProvider {
        fn has(&self, name: &str) -> bool {
            self.repos.lock().unwrap().contains_key(name)
        }
    }

    impl ProviderClient for MemoryProvider {
        fn find_repository(
            &self,
            _owner: &str,
            name: &str,
        ) -> Result<Option<ProviderRepository>, ProviderError> {
            Ok(self.repos.lock().unwrap().get(name).cloned())
        }

        fn create_repository(
            &self,
            owner: &str,
            repo: &NewRepository,
        ) -> Result<ProviderRepository, ProviderError> {
            let created = ProviderRepository {
                name: repo.name.clone(),
                namespace: owner.to_string(),
                private: repo.private,
                can_comment: false,
                default_branch: "master".to_string(),
            };
            self.repos
                .lock()
                .unwrap()
                .insert(repo.name.clone(), created.clone());
            Ok(created)
        }

        fn rename_repository(&self, _: &str, _: &str, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        fn list_branches(&self, _: &str, _: &str) -> Result<Vec<BranchState>, ProviderError> {
            Ok(vec![])
        }

        fn protect_branch(&self, _: &str, _: &str, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        fn unprotect_branch(&self, _: &str, _: &str, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        fn update_settings(
            &self,
            _: &str,
            _: &str,
            _: &RepositorySettings,
        ) -> Result<(), ProviderError> {
            Ok(())
        }

        fn create_branch(&self, _: &str, _: &str, _: &str, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    struct Fixture {
        home: TempDir,
        file: TrackedFile,
        source: DirManifestSource,
        provider: Arc<MemoryProvider>,
        context: Arc<DaemonContext>,
    }

    fn fixture() -> Fixture {
        let home = TempDir::new().expect("home");
        let file = TrackedFile::new("openeuler", "community", "repository/openeuler.yaml", "");
        let source = DirManifestSource::new(home.path().join("tree"));
        write_manifest(&source, &file, MANIFEST_V1);

        let config = Config {
            files: vec![file.clone()],
            ..Config::default()
        };
        let cache = ChangeCache::new(config.cache_path_at(home.path()));
        let provider = Arc::new(MemoryProvider::default());
        let context = Arc::new(DaemonContext::new(
            config,
            provider.clone(),
            Arc::new(source.clone()),
            cache,
        ));
        Fixture {
            home,
            file,
            source,
            provider,
            context,
        }
    }

    fn write_manifest(source: &DirManifestSource, file: &TrackedFile, body: &str) {
        let path = source.path_of(file);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, body).expect("write manifest");
    }

    fn push_event() -> PushEvent {
        PushEvent {
            git_ref: Some("refs/heads/master".to_string()),
            repository: PushRepository {
                namespace: "openeuler".to_string(),
                name: "community".to_string(),
            },
            commits: vec![PushCommit {
                added: vec![],
                modified: vec!["repository/openeuler.yaml".to_string()],
            }],
        }
    }

    async fn blocking<T, F>(f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        tokio::task::spawn_blocking(f).await.expect("blocking task")
    }

    async fn wait_for_first_pass(home: PathBuf) {
        for _ in 0..100 {
            let h = home.clone();
            if let Ok(status) = blocking(move || request_status(&h)).await {
                if status["last_pass"].is_object() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("startup pass never completed");
    }

    #[tokio::test]
    async fn drained_returns_immediately_when_idle() {
        let in_flight = InFlight::default();
        tokio::time::timeout(Duration::from_millis(100), in_flight.drained())
            .await
            .expect("idle tracker is drained");
    }

    #[tokio::test]
    async fn drained_waits_for_every_task() {
        let in_flight = InFlight::default();
        let first = in_flight.try_enter().expect("open");
        let second = in_flight.try_enter().expect("open");
        assert_eq!(in_flight.count(), 2);

        let waiter = {
            let in_flight = in_flight.clone();
            tokio::spawn(async move { in_flight.drained().await })
        };
        drop(first);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished(), "one task still running");

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drained after last task")
            .expect("join");
        assert_eq!(in_flight.count(), 0);
    }

    #[tokio::test]
    async fn closed_tracker_admits_nothing_and_stays_drained() {
        let in_flight = InFlight::default();
        let running = in_flight.try_enter().expect("open");
        in_flight.close();

        assert!(in_flight.is_closed());
        assert!(in_flight.try_enter().is_none());
        assert_eq!(in_flight.count(), 1, "refused entry is not counted");

        drop(running);
        tokio::time::timeout(Duration::from_millis(100), in_flight.drained())
            .await
            .expect("drained");
    }

    #[test]
    fn job_labels_name_the_trigger() {
        assert_eq!(PassJob::Startup.label(), "startup");
        assert_eq!(
            PassJob::Push(push_event()).label(),
            "push openeuler/community"
        );
        assert_eq!(PassJob::Full { dry_run: true }.label(), "sync (dry-run)");
    }

    #[test]
    fn stale_socket_file_is_removed() {
        let dir = TempDir::new().expect("dir");
        let socket = dir.path().join("daemon.sock");
        fs::write(&socket, b"").expect("stale file");
        prepare_socket_for_bind(&socket).expect("prepare");
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn status_payload_before_any_pass() {
        let fx = fixture();
        let state = DaemonState {
            started_at_unix: 1_000_000,
            in_flight: InFlight::default(),
            last_pass: RwLock::new(None),
        };

        let payload = build_status_payload(fx.home.path(), &fx.context, &state).await;

        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["in_flight"], json!(0));
        assert!(payload["last_pass"].is_null());
        let files = payload["files"].as_array().expect("files array");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["file"], json!(fx.file.to_string()));
        assert_eq!(files[0]["hash"], json!(""));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn startup_pass_then_sync_over_socket() {
        let fx = fixture();
        let home = fx.home.path().to_path_buf();
        let daemon = tokio::spawn(run(home.clone(), Arc::clone(&fx.context)));

        wait_for_first_pass(home.clone()).await;
        assert!(fx.provider.has("foo"), "startup pass reconciled the manifest");

        let h = home.clone();
        let synced = blocking(move || request_sync(&h, true)).await.expect("sync");
        assert_eq!(synced["summary"]["trigger"], json!("sync (dry-run)"));
        assert_eq!(synced["summary"]["unchanged"], json!(1));

        let h = home.clone();
        blocking(move || request_stop(&h)).await.expect("stop");
        tokio::time::timeout(Duration::from_secs(10), daemon)
            .await
            .expect("daemon exits")
            .expect("join")
            .expect("clean shutdown");
        assert!(!socket_path(&home).exists(), "socket removed on exit");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_drains_accepted_push() {
        let fx = fixture();
        let home = fx.home.path().to_path_buf();
        let daemon = tokio::spawn(run(home.clone(), Arc::clone(&fx.context)));
        wait_for_first_pass(home.clone()).await;

        write_manifest(&fx.source, &fx.file, MANIFEST_V2);
        let h = home.clone();
        let accepted = blocking(move || request_push(&h, push_event()))
            .await
            .expect("push");
        assert_eq!(accepted, json!({ "accepted": true }));
        let h = home.clone();
        blocking(move || request_stop(&h)).await.expect("stop");

        tokio::time::timeout(Duration::from_secs(10), daemon)
            .await
            .expect("daemon exits")
            .expect("join")
            .expect("clean shutdown");

        assert!(fx.provider.has("bar"), "push task finished before exit");
        assert_eq!(
            fx.context.cache.lookup(&fx.file).expect("cache readable"),
            Some(content_digest(MANIFEST_V2.as_bytes()))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_daemon_refuses_live_socket() {
        let fx = fixture();
        let home = fx.home.path().to_path_buf();
        let daemon = tokio::spawn(run(home.clone(), Arc::clone(&fx.context)));
        wait_for_first_pass(home.clone()).await;

        let err = run(home.clone(), Arc::clone(&fx.context))
            .await
            .expect_err("socket already in use");
        assert!(matches!(err, DaemonError::Protocol(_)), "got: {err}");

        let h = home.clone();
        blocking(move || request_stop(&h)).await.expect("stop");
        tokio::time::timeout(Duration::from_secs(10), daemon)
            .await
            .expect("daemon exits")
            .expect("join")
            .expect("clean shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn open_connection_cannot_push_after_stop() {
        use std::io::{BufRead, BufReader, Write};

        let fx = fixture();
        let home = fx.home.path().to_path_buf();
        let daemon = tokio::spawn(run(home.clone(), Arc::clone(&fx.context)));
        wait_for_first_pass(home.clone()).await;

        let socket = socket_path(&home);
        let early = blocking(move || StdUnixStream::connect(socket).expect("connect"))
            .await;
        // Let the accept loop hand the connection to its handler.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let h = home.clone();
        blocking(move || request_stop(&h)).await.expect("stop");
        tokio::time::timeout(Duration::from_secs(10), daemon)
            .await
            .expect("daemon exits")
            .expect("join")
            .expect("clean shutdown");

        write_manifest(&fx.source, &fx.file, MANIFEST_V2);
        let response = blocking(move || {
            let mut stream = early;
            let request = serde_json::to_string(&DaemonRequest::push(push_event()))
                .expect("encode");
            stream.write_all(request.as_bytes()).expect("write");
            stream.write_all(b"\n").expect("write");
            let mut line = String::new();
            BufReader::new(stream).read_line(&mut line).expect("read");
            serde_json::from_str::<DaemonResponse>(line.trim_end()).expect("response")
        })
        .await;

        assert!(!response.ok, "push after stop must be refused");
        assert!(
            response
                .error
                .as_deref()
                .unwrap_or_default()
                .contains("shutting down"),
            "got: {response:?}"
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!fx.provider.has("bar"), "no pass ran after drain");
    }
}
