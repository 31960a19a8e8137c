//! Supervisor lifecycle model

use std::process::{ExitCode, ExitStatus};

/// Supervisor lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    /// Initial reconciliation, haproxy not started yet
    Initializing,
    /// haproxy running, periodic reconciliation active
    Running,
    /// Termination requested, haproxy being stopped
    ShuttingDown,
    Terminated,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Initializing => "initializing",
            SupervisorState::Running => "running",
            SupervisorState::ShuttingDown => "shutting_down",
            SupervisorState::Terminated => "terminated",
        }
    }
}

impl Default for SupervisorState {
    fn default() -> Self {
        SupervisorState::Initializing
    }
}

/// How a supervised run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Shutdown was requested and haproxy was stopped
    Graceful,
    /// haproxy exited without a shutdown request
    ProcessExited(ExitStatus),
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Graceful)
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}
