//! Request-scoped state handed to every hook handler.

use crate::config::ControlConfig;
use crate::docker::cli::{CommandRunner, DockerCli, ExecMode, TokioCommandRunner};
use crate::hook::progress::ProgressReporter;
use std::fmt;
use std::sync::Arc;

/// Everything a handler may depend on besides its typed input.
///
/// The execution mode lives here rather than in a global so that a decision
/// made by one step (for example falling back to WSL2) is seen by every later
/// step of the same invocation and by nothing else.
#[derive(Clone)]
pub struct HookContext {
    pub settings: Arc<ControlConfig>,
    pub progress: ProgressReporter,
    pub exec_mode: ExecMode,
    pub runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("exec_mode", &self.exec_mode)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl HookContext {
    /// Context for a real process: platform exec mode, stderr progress,
    /// `tokio::process` runner
    pub fn new(settings: ControlConfig) -> Self {
        Self {
            settings: Arc::new(settings),
            progress: ProgressReporter::stderr(),
            exec_mode: ExecMode::detect(),
            runner: Arc::new(TokioCommandRunner),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_exec_mode(mut self, mode: ExecMode) -> Self {
        self.exec_mode = mode;
        self
    }

    /// Docker command builder for the current mode
    pub fn docker(&self) -> DockerCli {
        DockerCli::new(self.exec_mode, &self.settings.docker)
    }
}
