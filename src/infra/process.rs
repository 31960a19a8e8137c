//! haproxy process control
//!
//! One `haproxy -f <config>` instance per agent run. The supervisor only ever
//! talks to it through [`ManagedProcess`]: reload, terminate, wait.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::info;

use crate::error::{SyncError, SyncResult};

/// A running supervised process
#[async_trait]
pub trait ManagedProcess: Send {
    /// OS process id
    fn id(&self) -> u32;

    /// Ask the process to re-read its config (SIGHUP)
    fn reload(&mut self) -> SyncResult<()>;

    /// Kill the process and reap it
    async fn terminate(&mut self) -> SyncResult<()>;

    /// Wait for the process to exit. Cancel safe.
    async fn wait(&mut self) -> SyncResult<ExitStatus>;
}

/// Starts the supervised process against a config file
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    type Process: ManagedProcess;

    async fn launch(&self, config_path: &Path) -> SyncResult<Self::Process>;
}

/// Launches haproxy with the agent's stdio
#[derive(Clone, Debug)]
pub struct HaproxyLauncher {
    program: String,
}

impl HaproxyLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ProcessLauncher for HaproxyLauncher {
    type Process = HaproxyProcess;

    async fn launch(&self, config_path: &Path) -> SyncResult<HaproxyProcess> {
        info!(
            program = %self.program,
            config = %config_path.display(),
            "Starting haproxy"
        );

        let child = Command::new(&self.program)
            .arg("-f")
            .arg(config_path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SyncError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        HaproxyProcess::from_child(child, &self.program)
    }
}

/// Running haproxy instance
#[derive(Debug)]
pub struct HaproxyProcess {
    child: Child,
    pid: u32,
}

impl HaproxyProcess {
    fn from_child(child: Child, program: &str) -> SyncResult<Self> {
        let pid = child.id().ok_or_else(|| SyncError::Spawn {
            program: program.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::Other,
                "process exited before reporting a pid",
            ),
        })?;
        Ok(Self { child, pid })
    }

    fn signal(&self, signal: Signal) -> SyncResult<()> {
        kill(Pid::from_raw(self.pid as i32), signal).map_err(|source| SyncError::Signal {
            pid: self.pid,
            signal: signal.as_str(),
            source,
        })
    }
}

#[async_trait]
impl ManagedProcess for HaproxyProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn reload(&mut self) -> SyncResult<()> {
        self.signal(Signal::SIGHUP)
    }

    async fn terminate(&mut self) -> SyncResult<()> {
        // SIGKILL, then reap
        self.child.kill().await.map_err(SyncError::Terminate)
    }

    async fn wait(&mut self) -> SyncResult<ExitStatus> {
        self.child.wait().await.map_err(SyncError::Wait)
    }
}
