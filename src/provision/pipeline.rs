//! # Provisioning Pipeline
//!
//! Ordered, weighted steps run strictly one after another. Each step reports
//! the percentage at which it begins; the pipeline emits that percentage when
//! the step starts and `100` once every step has finished.
//!
//! The first failing step aborts the run and its error is surfaced unchanged.
//! Completed steps are not rolled back: every step re-checks its own
//! preconditions, so running the pipeline again skips what is already done.

use crate::docker::cli::{CommandRunner, DockerCli, ExecMode};
use crate::error::{ProtocolError, Result};
use crate::hook::context::HookContext;
use crate::hook::progress::ProgressReporter;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// What a step did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed(String),
    /// Preconditions already satisfied, nothing done
    Skipped(String),
}

impl StepOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, StepOutcome::Skipped(_))
    }
}

/// State shared by the steps of one pipeline run
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    hook: HookContext,
    instance_dir: PathBuf,
    outputs: BTreeMap<String, Value>,
}

impl ProvisionContext {
    pub fn new(hook: HookContext, instance_dir: impl Into<PathBuf>) -> Self {
        Self {
            hook,
            instance_dir: instance_dir.into(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn instance_dir(&self) -> &Path {
        &self.instance_dir
    }

    pub fn hook(&self) -> &HookContext {
        &self.hook
    }

    pub fn exec_mode(&self) -> ExecMode {
        self.hook.exec_mode
    }

    /// Switch the execution mode for every later step of this run
    pub fn set_exec_mode(&mut self, mode: ExecMode) {
        self.hook.exec_mode = mode;
    }

    pub fn docker(&self) -> DockerCli {
        self.hook.docker()
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        self.hook.runner.clone()
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.hook.progress
    }

    /// Store a value for later steps or for the final result
    pub fn record(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.outputs.insert(key.into(), value.into());
    }

    pub fn output(&self, key: &str) -> Option<&Value> {
        self.outputs.get(key)
    }

    pub fn outputs(&self) -> &BTreeMap<String, Value> {
        &self.outputs
    }

    /// Hand the (possibly updated) hook context back to the caller
    pub fn into_hook(self) -> HookContext {
        self.hook
    }
}

#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &str;

    /// Percentage reported when the step starts
    fn progress_weight(&self) -> u8;

    /// Whether running the step twice is safe
    fn idempotent(&self) -> bool {
        true
    }

    /// Progress message shown when the step starts
    fn start_message(&self) -> String {
        format!("{}...", self.name())
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<StepOutcome>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub steps: Vec<StepRecord>,
}

impl PipelineReport {
    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter(|r| r.outcome.is_skipped())
            .map(|r| r.step.as_str())
    }
}

/// The step that stopped the pipeline, with its error as-is
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    pub step: String,
    pub error: ProtocolError,
    /// Steps that finished before the failure
    pub completed: Vec<StepRecord>,
}

#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn PipelineStep>>,
    completion_message: Option<String>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn with_completion_message(mut self, message: impl Into<String>) -> Self {
        self.completion_message = Some(message.into());
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    #[instrument(skip_all, fields(steps = self.steps.len(), dir = %ctx.instance_dir.display()))]
    pub async fn run(&self, ctx: &mut ProvisionContext) -> std::result::Result<PipelineReport, PipelineFailure> {
        let mut report = PipelineReport::default();

        for step in &self.steps {
            ctx.progress().report(step.progress_weight(), step.start_message());

            match step.run(ctx).await {
                Ok(outcome) => {
                    info!(step = step.name(), ?outcome, "Step finished");
                    report.steps.push(StepRecord {
                        step: step.name().to_string(),
                        outcome,
                    });
                }
                Err(error) => {
                    warn!(step = step.name(), %error, "Step failed, aborting pipeline");
                    return Err(PipelineFailure {
                        step: step.name().to_string(),
                        error,
                        completed: report.steps,
                    });
                }
            }
        }

        let message = self
            .completion_message
            .clone()
            .unwrap_or_else(|| "Provisioning complete".to_string());
        ctx.progress().report(100, message);
        Ok(report)
    }
}
