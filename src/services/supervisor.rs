//! haproxy supervisor
//!
//! Runs the initial reconciliation, starts haproxy, then owns a single event
//! loop over three sources:
//! - the poll timer, which reconciles and reloads haproxy on change
//! - the shutdown signal, which kills haproxy and ends the run successfully
//! - haproxy exiting on its own, which ends the run as a failure
//!
//! Whichever fires first decides the outcome, so there is no shared
//! "shutdown requested" flag to race on. A reconciliation in progress is
//! raced against the other two and dropped if either fires; its write is
//! truncate-then-fill, so a dropped one leaves at worst a stale or partial
//! file that haproxy was never told to reload.

use std::future::Future;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::domain::{ExitOutcome, SupervisorState};
use crate::error::SyncResult;
use crate::infra::{ManagedProcess, MembershipSource, ProcessLauncher};
use crate::services::reconcile::{Reconciler, Reconciliation};
use crate::state::AppliedConfig;

pub struct Supervisor<S, L> {
    reconciler: Reconciler<S>,
    launcher: L,
    poll_interval: Duration,
    state: SupervisorState,
}

impl<S, L> Supervisor<S, L>
where
    S: MembershipSource,
    L: ProcessLauncher,
{
    pub fn new(config: SyncConfig, source: S, launcher: L) -> Self {
        let store = AppliedConfig::new(config.config_path);
        Self {
            reconciler: Reconciler::new(source, store, config.ports),
            launcher,
            poll_interval: config.poll_interval,
            state: SupervisorState::Initializing,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    fn transition(&mut self, next: SupervisorState) {
        debug!(from = self.state.as_str(), to = next.as_str(), "Supervisor state change");
        self.state = next;
    }

    /// Supervise haproxy until `shutdown` resolves or haproxy exits
    ///
    /// Errors from the initial reconciliation or launch abort before haproxy
    /// is started. Errors in the loop stop haproxy and are returned.
    pub async fn run<F>(&mut self, shutdown: F) -> SyncResult<ExitOutcome>
    where
        F: Future<Output = ()>,
    {
        let initial = self.reconciler.reconcile().await?;
        debug!(?initial, "Initial reconciliation done");

        let mut process = self
            .launcher
            .launch(self.reconciler.config_path())
            .await?;
        info!(pid = process.id(), "haproxy started");
        self.transition(SupervisorState::Running);

        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => return self.shut_down(&mut process).await,
                status = process.wait() => return self.exited(status),
                _ = ticker.tick() => {}
            }

            // Discovery has no timeout; keep watching shutdown and haproxy meanwhile
            let reconciled = tokio::select! {
                result = self.reconciler.reconcile() => result,
                _ = &mut shutdown => return self.shut_down(&mut process).await,
                status = process.wait() => return self.exited(status),
            };

            if let Err(e) = Self::apply(reconciled, &mut process) {
                self.abort(&mut process).await;
                return Err(e);
            }
        }
    }

    /// Reload haproxy if the reconciliation wrote a new config
    fn apply(reconciled: SyncResult<Reconciliation>, process: &mut L::Process) -> SyncResult<()> {
        match reconciled? {
            Reconciliation::Applied { hosts } => {
                info!(host_count = hosts, pid = process.id(), "reconfiguring haproxy");
                process.reload()
            }
            Reconciliation::Unchanged => Ok(()),
        }
    }

    async fn shut_down(&mut self, process: &mut L::Process) -> SyncResult<ExitOutcome> {
        self.transition(SupervisorState::ShuttingDown);
        info!("shutting down");
        let stopped = process.terminate().await;
        self.transition(SupervisorState::Terminated);
        stopped?;
        Ok(ExitOutcome::Graceful)
    }

    fn exited(&mut self, status: SyncResult<ExitStatus>) -> SyncResult<ExitOutcome> {
        self.transition(SupervisorState::Terminated);
        let status = status?;
        error!(%status, "haproxy exited");
        Ok(ExitOutcome::ProcessExited(status))
    }

    /// Stop haproxy after a fatal loop error
    async fn abort(&mut self, process: &mut L::Process) {
        self.transition(SupervisorState::ShuttingDown);
        if let Err(e) = process.terminate().await {
            warn!(error = %e, "Failed to stop haproxy after error");
        }
        self.transition(SupervisorState::Terminated);
    }
}

/// Resolves on SIGINT or SIGTERM
///
/// SIGKILL cannot be observed. If a handler cannot be installed that source is
/// ignored and an error logged.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::services::reconcile::tests::ScriptedSource;
    use std::os::unix::process::ExitStatusExt;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout};

    #[derive(Default)]
    struct ProcessLog {
        launches: AtomicUsize,
        reloads: AtomicUsize,
        terminated: AtomicBool,
        launched_with: Mutex<Option<PathBuf>>,
        /// Config file contents seen at each reload
        configs_at_reload: Mutex<Vec<String>>,
    }

    struct FakeProcess {
        log: Arc<ProcessLog>,
        config_path: PathBuf,
        exit: Option<oneshot::Receiver<i32>>,
    }

    #[async_trait::async_trait]
    impl ManagedProcess for FakeProcess {
        fn id(&self) -> u32 {
            4242
        }

        fn reload(&mut self) -> SyncResult<()> {
            let config = std::fs::read_to_string(&self.config_path).unwrap();
            self.log.configs_at_reload.lock().unwrap().push(config);
            self.log.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn terminate(&mut self) -> SyncResult<()> {
            self.log.terminated.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn wait(&mut self) -> SyncResult<ExitStatus> {
            if let Some(rx) = self.exit.as_mut() {
                if let Ok(code) = rx.await {
                    return Ok(ExitStatus::from_raw(code << 8));
                }
                self.exit = None;
            }
            std::future::pending().await
        }
    }

    struct FakeLauncher {
        log: Arc<ProcessLog>,
        exit: Mutex<Option<oneshot::Receiver<i32>>>,
        fail: bool,
    }

    impl FakeLauncher {
        fn new() -> (Self, oneshot::Sender<i32>) {
            let (tx, rx) = oneshot::channel();
            let launcher = Self {
                log: Arc::new(ProcessLog::default()),
                exit: Mutex::new(Some(rx)),
                fail: false,
            };
            (launcher, tx)
        }
    }

    #[async_trait::async_trait]
    impl ProcessLauncher for FakeLauncher {
        type Process = FakeProcess;

        async fn launch(&self, config_path: &Path) -> SyncResult<FakeProcess> {
            if self.fail {
                return Err(SyncError::Spawn {
                    program: "haproxy".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                });
            }
            self.log.launches.fetch_add(1, Ordering::SeqCst);
            *self.log.launched_with.lock().unwrap() = Some(config_path.to_path_buf());
            Ok(FakeProcess {
                log: self.log.clone(),
                config_path: config_path.to_path_buf(),
                exit: self.exit.lock().unwrap().take(),
            })
        }
    }

    fn config(dir: &tempfile::TempDir, poll_interval: Duration) -> SyncConfig {
        SyncConfig {
            config_path: dir.path().join("haproxy.cfg"),
            poll_interval,
            ..SyncConfig::new("http://discovery.invalid/registry")
        }
    }

    async fn run_with_timeout<S: MembershipSource, F: Future<Output = ()>>(
        supervisor: &mut Supervisor<S, FakeLauncher>,
        shutdown: F,
    ) -> SyncResult<ExitOutcome> {
        timeout(Duration::from_secs(10), supervisor.run(shutdown))
            .await
            .expect("supervisor did not finish")
    }

    #[tokio::test]
    async fn test_shutdown_request_is_graceful() {
        let dir = tempfile::tempdir().unwrap();
        let (launcher, _exit_tx) = FakeLauncher::new();
        let log = launcher.log.clone();
        let source = ScriptedSource::new(vec![Some(vec!["a"])]);
        let mut supervisor =
            Supervisor::new(config(&dir, Duration::from_secs(3600)), source, launcher);

        let outcome = run_with_timeout(&mut supervisor, async {}).await.unwrap();

        assert_eq!(outcome, ExitOutcome::Graceful);
        assert!(log.terminated.load(Ordering::SeqCst));
        assert_eq!(supervisor.state(), SupervisorState::Terminated);
        assert_eq!(log.launches.load(Ordering::SeqCst), 1);
        assert_eq!(
            log.launched_with.lock().unwrap().as_deref(),
            Some(dir.path().join("haproxy.cfg").as_path())
        );
    }

    #[tokio::test]
    async fn test_unexpected_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (launcher, exit_tx) = FakeLauncher::new();
        let log = launcher.log.clone();
        let source = ScriptedSource::new(vec![Some(vec!["a"])]);
        let mut supervisor =
            Supervisor::new(config(&dir, Duration::from_secs(3600)), source, launcher);

        exit_tx.send(1).unwrap();
        let outcome = run_with_timeout(&mut supervisor, std::future::pending())
            .await
            .unwrap();

        match outcome {
            ExitOutcome::ProcessExited(status) => assert_eq!(status.code(), Some(1)),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!outcome.is_success());
        assert!(!log.terminated.load(Ordering::SeqCst));
        assert_eq!(supervisor.state(), SupervisorState::Terminated);
    }

    #[tokio::test]
    async fn test_initial_failure_never_starts_process() {
        let dir = tempfile::tempdir().unwrap();
        let (launcher, _exit_tx) = FakeLauncher::new();
        let log = launcher.log.clone();
        let source = ScriptedSource::new(vec![None]);
        let mut supervisor =
            Supervisor::new(config(&dir, Duration::from_secs(3600)), source, launcher);

        let err = run_with_timeout(&mut supervisor, std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::DiscoveryDecode { .. }));
        assert_eq!(log.launches.load(Ordering::SeqCst), 0);
        assert_eq!(supervisor.state(), SupervisorState::Initializing);
        assert!(!dir.path().join("haproxy.cfg").exists());
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (mut launcher, _exit_tx) = FakeLauncher::new();
        launcher.fail = true;
        let source = ScriptedSource::new(vec![Some(vec!["a"])]);
        let mut supervisor =
            Supervisor::new(config(&dir, Duration::from_secs(3600)), source, launcher);

        let err = run_with_timeout(&mut supervisor, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Spawn { .. }));
        assert_eq!(supervisor.state(), SupervisorState::Initializing);
    }

    #[tokio::test]
    async fn test_membership_change_writes_then_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let (launcher, _exit_tx) = FakeLauncher::new();
        let log = launcher.log.clone();
        let source = ScriptedSource::new(vec![Some(vec!["a"]), Some(vec!["a", "b"])]);
        let mut supervisor =
            Supervisor::new(config(&dir, Duration::from_millis(20)), source, launcher);

        let watch = log.clone();
        let shutdown = async move {
            while watch.reloads.load(Ordering::SeqCst) == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        };
        let outcome = run_with_timeout(&mut supervisor, shutdown).await.unwrap();

        assert_eq!(outcome, ExitOutcome::Graceful);
        assert_eq!(log.reloads.load(Ordering::SeqCst), 1);
        let configs = log.configs_at_reload.lock().unwrap();
        assert!(configs[0].contains("server server-1 b:2380"));
    }

    #[tokio::test]
    async fn test_unchanged_membership_never_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let (launcher, _exit_tx) = FakeLauncher::new();
        let log = launcher.log.clone();
        let source = ScriptedSource::new(vec![Some(vec!["a", "b"]), Some(vec!["b", "a"])]);
        let mut supervisor =
            Supervisor::new(config(&dir, Duration::from_millis(10)), source, launcher);

        let outcome = run_with_timeout(&mut supervisor, sleep(Duration::from_millis(120)))
            .await
            .unwrap();

        assert_eq!(outcome, ExitOutcome::Graceful);
        assert_eq!(log.reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_loop_error_stops_process() {
        let dir = tempfile::tempdir().unwrap();
        let (launcher, _exit_tx) = FakeLauncher::new();
        let log = launcher.log.clone();
        let source = ScriptedSource::new(vec![Some(vec!["a"]), None]);
        let mut supervisor =
            Supervisor::new(config(&dir, Duration::from_millis(10)), source, launcher);

        let err = run_with_timeout(&mut supervisor, std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::DiscoveryDecode { .. }));
        assert!(log.terminated.load(Ordering::SeqCst));
        assert_eq!(supervisor.state(), SupervisorState::Terminated);
        assert_eq!(log.reloads.load(Ordering::SeqCst), 0);
    }

    /// Resolves once, then every later call hangs like a stuck discovery GET
    struct StallingSource {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MembershipSource for StallingSource {
        async fn resolve(&self) -> SyncResult<crate::domain::HostSet> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(crate::domain::HostSet::from(vec!["a"]));
            }
            std::future::pending().await
        }
    }

    fn stalling_source() -> StallingSource {
        StallingSource {
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_shutdown_during_stuck_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let (launcher, _exit_tx) = FakeLauncher::new();
        let log = launcher.log.clone();
        let mut supervisor =
            Supervisor::new(config(&dir, Duration::from_millis(10)), stalling_source(), launcher);

        let outcome = timeout(
            Duration::from_secs(2),
            supervisor.run(sleep(Duration::from_millis(100))),
        )
        .await
        .expect("shutdown ignored while discovery was stuck")
        .unwrap();

        assert_eq!(outcome, ExitOutcome::Graceful);
        assert!(log.terminated.load(Ordering::SeqCst));
        assert_eq!(supervisor.state(), SupervisorState::Terminated);
    }

    #[tokio::test]
    async fn test_process_exit_during_stuck_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let (launcher, exit_tx) = FakeLauncher::new();
        let log = launcher.log.clone();
        let mut supervisor =
            Supervisor::new(config(&dir, Duration::from_millis(10)), stalling_source(), launcher);

        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            let _ = exit_tx.send(2);
        });

        let outcome = timeout(Duration::from_secs(2), supervisor.run(std::future::pending()))
            .await
            .expect("haproxy exit missed while discovery was stuck")
            .unwrap();

        match outcome {
            ExitOutcome::ProcessExited(status) => assert_eq!(status.code(), Some(2)),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!log.terminated.load(Ordering::SeqCst));
    }

    /// Removes the config directory before reporting a new membership
    struct VanishingDirSource {
        dir: PathBuf,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MembershipSource for VanishingDirSource {
        async fn resolve(&self) -> SyncResult<crate::domain::HostSet> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(crate::domain::HostSet::from(vec!["a"]));
            }
            let _ = std::fs::remove_dir_all(&self.dir);
            Ok(crate::domain::HostSet::from(vec!["a", "b"]))
        }
    }

    #[tokio::test]
    async fn test_failed_write_never_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let etc = dir.path().join("etc");
        std::fs::create_dir(&etc).unwrap();

        let (launcher, _exit_tx) = FakeLauncher::new();
        let log = launcher.log.clone();
        let source = VanishingDirSource {
            dir: etc.clone(),
            calls: AtomicUsize::new(0),
        };
        let config = SyncConfig {
            config_path: etc.join("haproxy.cfg"),
            poll_interval: Duration::from_millis(10),
            ..SyncConfig::new("http://discovery.invalid/registry")
        };
        let mut supervisor = Supervisor::new(config, source, launcher);

        let err = run_with_timeout(&mut supervisor, std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::ConfigWrite { .. }));
        assert_eq!(log.reloads.load(Ordering::SeqCst), 0);
        assert!(log.terminated.load(Ordering::SeqCst));
    }
}
