//! # Provisioning
//!
//! Weighted, resumable pipelines that prepare an instance: engine check,
//! server files, generated configuration.

pub mod assets;
pub mod pipeline;
pub mod steps;

pub use pipeline::{Pipeline, PipelineFailure, PipelineReport, PipelineStep, ProvisionContext, StepOutcome, StepRecord};
pub use steps::{AcceptEula, AssetInstall, AssetSource, ComposeGeneration, EngineReadiness, WriteServerProperties};
