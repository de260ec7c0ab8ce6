//! # Docker Extension Hooks
//!
//! Runs game server instances as docker compose projects. Each instance
//! directory holds its own `docker-compose.yml`; every operation shells out to
//! the docker CLI through the context's runner and execution mode.
//!
//! Results follow the extension convention: `handled` says whether this
//! extension acted on the instance at all.

use crate::docker::cli::{CommandOutput, CommandRunner, DockerCli};
use crate::docker::compose::{generate_compose_yaml, DockerSection, ExtensionData, InstanceData};
use crate::error::{ProtocolError, Result};
use crate::hook::context::HookContext;
use crate::hook::dispatcher::Dispatcher;
use crate::hook::result::HookKind;
use crate::provision::pipeline::{Pipeline, ProvisionContext, StepRecord};
use crate::provision::steps::{AssetInstall, AssetSource, ComposeGeneration, EngineReadiness};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Every docker extension operation, sealed
pub fn docker_dispatcher() -> Dispatcher {
    Dispatcher::builder(HookKind::Extension)
        .register("start", start)
        .register("stop", stop)
        .register("cleanup", cleanup)
        .register("status", status)
        .register("container_stats", container_stats)
        .register("shutdown_all", shutdown_all)
        .register("enrich_server_info", enrich_server_info)
        .register("get_logs", get_logs)
        .register("pre_create", pre_create)
        .register("provision", provision)
        .register("regenerate_compose", regenerate_compose)
        .build()
}

fn handler_error(message: impl Into<String>) -> ProtocolError {
    ProtocolError::HandlerError(message.into())
}

/// `{"handled": true, "success": true, ...}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Handled {
    pub handled: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
}

impl Handled {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            handled: true,
            success: true,
            message: Some(message.into()),
            stdout: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceDirInput {
    pub instance_dir: PathBuf,
}

/// One row of `docker compose ps --format json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ComposeContainer {
    #[serde(rename = "Name", alias = "Names", default)]
    pub name: String,
    #[serde(rename = "State", default)]
    pub state: String,
}

impl ComposeContainer {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Parse `compose ps` output: JSON lines, or one JSON array on older compose
pub fn parse_compose_ps(stdout: &str) -> Vec<ComposeContainer> {
    let trimmed = stdout.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).unwrap_or_default();
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

/// Fields of `docker stats --format '{{json .}}'` we report
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DockerStats {
    #[serde(rename = "MemUsage", default)]
    pub mem_usage: String,
    #[serde(rename = "MemPerc", default)]
    pub mem_perc: String,
    #[serde(rename = "CPUPerc", default)]
    pub cpu_perc: String,
}

/// `"12.50%"` is 12.5; anything unparseable is 0
pub fn parse_percent(text: &str) -> f64 {
    text.trim().trim_end_matches('%').trim().parse().unwrap_or(0.0)
}

/// What a running container's process list says about the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Starting,
    Stopped,
}

async fn compose_ps(ctx: &HookContext, docker: &DockerCli, dir: &Path) -> Option<Vec<ComposeContainer>> {
    let cmd = docker.compose(dir, ["ps", "--format", "json", "-a"], docker.query_timeout());
    let output = ctx.runner.run(&cmd).await;
    if !output.success {
        debug!(error = output.error_text(), "compose ps failed");
        return None;
    }
    Some(parse_compose_ps(&output.stdout))
}

/// First configured pattern found in `docker top <container>`, if any
async fn find_server_process(
    runner: &dyn CommandRunner,
    docker: &DockerCli,
    container: &str,
    patterns: &[String],
) -> Option<String> {
    let output = runner
        .run(&docker.docker(["top", container], docker.query_timeout()))
        .await;
    if !output.success {
        return None;
    }
    // first line is the column header
    output.stdout.lines().skip(1).find_map(|line| {
        let line = line.to_lowercase();
        patterns
            .iter()
            .find(|p| line.contains(&p.to_lowercase()))
            .cloned()
    })
}

async fn container_stats_for(runner: &dyn CommandRunner, docker: &DockerCli, container: &str) -> Result<DockerStats> {
    let cmd = docker.docker(
        ["stats", "--no-stream", "--format", "{{json .}}", container],
        docker.query_timeout(),
    );
    let output = runner.run(&cmd).await;
    if !output.success {
        return Err(handler_error(format!("docker stats failed: {}", output.error_text())));
    }
    serde_json::from_str(output.stdout.trim())
        .map_err(|_| handler_error(format!("Invalid stats JSON: {}", output.stdout.trim())))
}

fn require_success(output: CommandOutput, action: &str) -> Result<CommandOutput> {
    if output.success {
        Ok(output)
    } else {
        Err(handler_error(format!("{action} failed: {}", output.error_text())))
    }
}

/// `compose up -d`
#[instrument(skip_all, fields(dir = %input.instance_dir.display()))]
pub async fn start(ctx: HookContext, input: InstanceDirInput) -> Result<Handled> {
    let docker = ctx.docker();
    let compose_path = docker.compose_path(&input.instance_dir);
    if !compose_path.is_file() {
        return Err(handler_error(format!(
            "No {} found in {}",
            docker.compose_file(),
            input.instance_dir.display()
        )));
    }

    let cmd = docker.compose(&input.instance_dir, ["up", "-d"], docker.long_timeout());
    let output = require_success(ctx.runner.run(&cmd).await, "Docker Compose up")?;
    Ok(Handled {
        stdout: Some(output.stdout),
        ..Handled::ok("Docker Compose containers started")
    })
}

/// `compose stop`
#[instrument(skip_all, fields(dir = %input.instance_dir.display()))]
pub async fn stop(ctx: HookContext, input: InstanceDirInput) -> Result<Handled> {
    let docker = ctx.docker();
    let cmd = docker.compose(&input.instance_dir, ["stop"], docker.long_timeout());
    require_success(ctx.runner.run(&cmd).await, "Docker Compose stop")?;
    Ok(Handled::ok("Docker Compose containers stopped"))
}

/// `compose down`; a failed teardown does not block deleting the instance
#[instrument(skip_all, fields(dir = %input.instance_dir.display()))]
pub async fn cleanup(ctx: HookContext, input: InstanceDirInput) -> Result<Handled> {
    let docker = ctx.docker();
    let cmd = docker.compose(&input.instance_dir, ["down"], docker.long_timeout());
    let output = ctx.runner.run(&cmd).await;
    if !output.success {
        warn!(error = output.error_text(), "compose down failed, continuing");
    }
    Ok(Handled::ok("Docker Compose down completed"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusInput {
    pub instance_dir: PathBuf,
    #[serde(default)]
    pub process_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusOutput {
    pub handled: bool,
    pub running: bool,
    pub server_process_running: bool,
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_process: Option<String>,
    pub status: ContainerStatus,
}

impl StatusOutput {
    fn stopped(container_name: Option<String>) -> Self {
        Self {
            handled: true,
            running: false,
            server_process_running: false,
            container_name,
            matched_process: None,
            status: ContainerStatus::Stopped,
        }
    }
}

/// Container state from `compose ps`, then the server process from `docker top`.
///
/// A running container whose process list matches none of the patterns is
/// still `starting`. Without patterns a running container counts as running.
pub async fn status(ctx: HookContext, input: StatusInput) -> Result<StatusOutput> {
    let docker = ctx.docker();
    let Some(containers) = compose_ps(&ctx, &docker, &input.instance_dir).await else {
        return Ok(StatusOutput::stopped(None));
    };

    let container_name = containers.first().map(|c| c.name.clone()).filter(|n| !n.is_empty());
    if !containers.iter().any(ComposeContainer::is_running) {
        return Ok(StatusOutput::stopped(container_name));
    }

    let (server_process_running, matched_process) = match (&container_name, input.process_patterns.is_empty()) {
        (Some(name), false) => {
            let matched = find_server_process(ctx.runner.as_ref(), &docker, name, &input.process_patterns).await;
            (matched.is_some(), matched)
        }
        _ => (true, None),
    };

    Ok(StatusOutput {
        handled: true,
        running: true,
        server_process_running,
        container_name,
        matched_process,
        status: if server_process_running {
            ContainerStatus::Running
        } else {
            ContainerStatus::Starting
        },
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsOutput {
    pub handled: bool,
    pub success: bool,
    pub container_name: String,
    pub docker_memory_usage: String,
    pub docker_memory_percent: f64,
    pub docker_cpu_percent: f64,
}

/// `docker stats --no-stream` for the instance's container
pub async fn container_stats(ctx: HookContext, input: InstanceDirInput) -> Result<StatsOutput> {
    let docker = ctx.docker();
    let container_name = compose_ps(&ctx, &docker, &input.instance_dir)
        .await
        .and_then(|containers| containers.into_iter().next())
        .map(|c| c.name)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| handler_error("Container name not found"))?;

    let stats = container_stats_for(ctx.runner.as_ref(), &docker, &container_name).await?;
    Ok(StatsOutput {
        handled: true,
        success: true,
        docker_memory_percent: parse_percent(&stats.mem_perc),
        docker_cpu_percent: parse_percent(&stats.cpu_perc),
        docker_memory_usage: stats.mem_usage,
        container_name,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShutdownInstance {
    pub instance_id: String,
    pub instance_dir: Option<PathBuf>,
    pub extension_data: ExtensionData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShutdownInput {
    pub instances: Vec<ShutdownInstance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownResult {
    pub instance_id: String,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownOutput {
    pub handled: bool,
    pub success: bool,
    pub results: Vec<ShutdownResult>,
}

/// `compose down` for every docker-enabled instance, one after another
#[instrument(skip_all, fields(instances = input.instances.len()))]
pub async fn shutdown_all(ctx: HookContext, input: ShutdownInput) -> Result<ShutdownOutput> {
    let docker = ctx.docker();
    let mut results = Vec::new();

    for instance in &input.instances {
        if !instance.extension_data.docker_enabled {
            continue;
        }
        let Some(dir) = instance.instance_dir.as_deref() else {
            continue;
        };
        if !docker.compose_path(dir).is_file() {
            continue;
        }

        let output = ctx
            .runner
            .run(&docker.compose(dir, ["down"], docker.long_timeout()))
            .await;
        if !output.success {
            warn!(instance = %instance.instance_id, error = output.error_text(), "compose down failed");
        }
        results.push(ShutdownResult {
            instance_id: instance.instance_id.clone(),
            success: output.success,
        });
    }

    Ok(ShutdownOutput {
        handled: true,
        success: true,
        results,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnrichInput {
    pub instance_dir: Option<PathBuf>,
    pub process_patterns: Vec<String>,
    pub extension_data: ExtensionData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichOutput {
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ContainerStatus>,
    pub docker_enabled: bool,
    pub docker_cpu_limit: Option<Value>,
    pub docker_memory_limit: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
}

impl EnrichOutput {
    fn base(handled: bool, status: Option<ContainerStatus>, ext: ExtensionData) -> Self {
        Self {
            handled,
            status,
            docker_enabled: ext.docker_enabled,
            docker_cpu_limit: ext.docker_cpu_limit,
            docker_memory_limit: ext.docker_memory_limit,
            memory_usage: None,
            memory_percent: None,
            cpu_percent: None,
        }
    }
}

/// Docker state and resource usage merged into the daemon's server list.
/// Instances without a compose file are not docker instances: `handled` is false.
pub async fn enrich_server_info(ctx: HookContext, input: EnrichInput) -> Result<EnrichOutput> {
    let docker = ctx.docker();
    let Some(dir) = input
        .instance_dir
        .as_deref()
        .filter(|dir| docker.compose_path(dir).is_file())
    else {
        return Ok(EnrichOutput::base(false, None, input.extension_data));
    };

    let containers = compose_ps(&ctx, &docker, dir).await.unwrap_or_default();
    if !containers.iter().any(ComposeContainer::is_running) {
        return Ok(EnrichOutput::base(
            true,
            Some(ContainerStatus::Stopped),
            input.extension_data,
        ));
    }

    let container_name = containers.first().map(|c| c.name.clone()).filter(|n| !n.is_empty());
    let mut status = ContainerStatus::Running;
    if let Some(name) = &container_name {
        if !input.process_patterns.is_empty()
            && find_server_process(ctx.runner.as_ref(), &docker, name, &input.process_patterns)
                .await
                .is_none()
        {
            status = ContainerStatus::Starting;
        }
    }

    let mut output = EnrichOutput::base(true, Some(status), input.extension_data);
    if let Some(name) = &container_name {
        match container_stats_for(ctx.runner.as_ref(), &docker, name).await {
            Ok(stats) => {
                output.memory_percent = Some(parse_percent(&stats.mem_perc));
                output.cpu_percent = Some(parse_percent(&stats.cpu_perc));
                output.memory_usage = Some(stats.mem_usage);
            }
            Err(e) => debug!(error = %e, "Stats unavailable"),
        }
    }
    Ok(output)
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsInput {
    pub instance_dir: PathBuf,
    #[serde(default = "default_log_lines")]
    pub lines: u32,
}

fn default_log_lines() -> u32 {
    100
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogsOutput {
    pub handled: bool,
    pub success: bool,
    pub logs: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `compose logs --tail N`
pub async fn get_logs(ctx: HookContext, input: LogsInput) -> Result<LogsOutput> {
    let docker = ctx.docker();
    let cmd = docker.compose(
        &input.instance_dir,
        ["logs".to_string(), "--tail".to_string(), input.lines.to_string()],
        docker.query_timeout(),
    );
    let output = ctx.runner.run(&cmd).await;
    let message = (!output.success).then(|| output.error_text().to_string());
    Ok(LogsOutput {
        handled: true,
        success: output.success,
        logs: output.stdout,
        message,
    })
}

/// Nothing to prepare before an instance exists
pub async fn pre_create(_ctx: HookContext, _input: IgnoredAny) -> Result<Handled> {
    Ok(Handled {
        handled: false,
        success: true,
        ..Handled::default()
    })
}

/// The module's manifest sections used for provisioning
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub docker: DockerSection,
    pub install: Value,
}

impl ModuleConfig {
    /// The install source, if the module declares one
    pub fn asset_source(&self) -> Result<Option<AssetSource>> {
        if self.install.get("method").is_none() {
            return Ok(None);
        }
        serde_json::from_value(self.install.clone())
            .map(Some)
            .map_err(|e| ProtocolError::ConfigError(format!("Unsupported install config: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionInput {
    pub instance_dir: PathBuf,
    #[serde(default)]
    pub module_config: ModuleConfig,
    /// Nested instance record; the top level is used when absent
    #[serde(default)]
    pub instance: Option<InstanceData>,
    #[serde(flatten)]
    pub top_level: InstanceData,
}

impl ProvisionInput {
    pub fn instance_data(&self) -> InstanceData {
        self.instance.clone().unwrap_or_else(|| self.top_level.clone())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionOutput {
    pub handled: bool,
    pub success: bool,
    pub message: String,
    pub exec_mode: crate::docker::cli::ExecMode,
    pub steps: Vec<StepRecord>,
}

/// Engine check, server files, compose file.
///
/// Server files go to `<instance_dir>/server`. Every step checks its own
/// preconditions, so a failed run can simply be repeated.
#[instrument(skip_all, fields(dir = %input.instance_dir.display()))]
pub async fn provision(ctx: HookContext, input: ProvisionInput) -> Result<ProvisionOutput> {
    let mut pipeline = Pipeline::new().step(EngineReadiness::new());
    if let Some(source) = input.module_config.asset_source()? {
        pipeline = pipeline.step(AssetInstall::new(source, input.instance_dir.join("server")));
    }
    let pipeline = pipeline
        .step(ComposeGeneration::new(
            input.module_config.docker.clone(),
            input.instance_data(),
        ))
        .with_completion_message("docker-compose.yml generated");

    let mut run = ProvisionContext::new(ctx, &input.instance_dir);
    let report = pipeline.run(&mut run).await.map_err(|failure| {
        warn!(step = %failure.step, "Provisioning aborted");
        failure.error
    })?;

    Ok(ProvisionOutput {
        handled: true,
        success: true,
        message: "Docker provisioning complete".to_string(),
        exec_mode: run.exec_mode(),
        steps: report.steps,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegenerateInput {
    pub instance_dir: PathBuf,
    #[serde(default)]
    pub module_config: ModuleConfig,
    #[serde(default)]
    pub instance: Option<InstanceData>,
    #[serde(flatten)]
    pub top_level: InstanceData,
}

/// Rewrite `docker-compose.yml` after the instance settings changed
pub async fn regenerate_compose(ctx: HookContext, input: RegenerateInput) -> Result<Handled> {
    let instance = input.instance.unwrap_or(input.top_level);
    let yaml = generate_compose_yaml(&input.module_config.docker, &instance)?;
    let path = ctx.docker().compose_path(&input.instance_dir);
    tokio::fs::create_dir_all(&input.instance_dir).await?;
    tokio::fs::write(&path, yaml).await?;
    Ok(Handled::ok("docker-compose.yml regenerated"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use crate::docker::cli::{CommandSpec, ExecMode};
    use crate::hook::progress::ProgressReporter;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Answers by the first rule whose needle occurs in the command line
    struct Scripted {
        rules: Vec<(&'static str, CommandOutput)>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(rules: Vec<(&'static str, CommandOutput)>) -> Arc<Self> {
            Arc::new(Self {
                rules,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for Scripted {
        async fn run(&self, command: &CommandSpec) -> CommandOutput {
            let line = command.display();
            self.seen.lock().unwrap().push(line.clone());
            self.rules
                .iter()
                .find(|(needle, _)| line.contains(needle))
                .map(|(_, out)| out.clone())
                .unwrap_or_else(|| CommandOutput::failed("unexpected command"))
        }
    }

    fn ctx(runner: Arc<Scripted>) -> HookContext {
        HookContext::new(ControlConfig::default())
            .with_runner(runner)
            .with_progress(ProgressReporter::disabled())
            .with_exec_mode(ExecMode::Local)
    }

    const PS_RUNNING: &str = "{\"Name\":\"saba-palworld-01234567\",\"State\":\"running\"}\n";
    const TOP: &str = "UID PID PPID C STIME TTY TIME CMD\nroot 1 0 0 10:00 ? 00:00:01 /home/steam/PalServer.sh\n";
    const STATS: &str = "{\"MemUsage\":\"256MiB / 4GiB\",\"MemPerc\":\"6.25%\",\"CPUPerc\":\"12.50%\"}";

    #[test]
    fn test_parse_compose_ps_formats() {
        let lines = parse_compose_ps("{\"Name\":\"a\",\"State\":\"running\"}\nnot json\n{\"Names\":\"b\",\"State\":\"exited\"}\n");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].is_running());
        assert_eq!(lines[1].name, "b");

        let array = parse_compose_ps("[{\"Name\":\"c\",\"State\":\"running\"}]");
        assert_eq!(array[0].name, "c");
        assert!(parse_compose_ps("").is_empty());
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("12.50%"), 12.5);
        assert_eq!(parse_percent(" 0.3 % "), 0.3);
        assert_eq!(parse_percent("--"), 0.0);
    }

    #[tokio::test]
    async fn test_status_running_with_matching_process() {
        let runner = Scripted::new(vec![
            ("ps --format json", CommandOutput::ok(PS_RUNNING)),
            ("docker top", CommandOutput::ok(TOP)),
        ]);
        let input: StatusInput = serde_json::from_value(json!({
            "instance_dir": "/srv/i1",
            "process_patterns": ["palserver"]
        }))
        .unwrap();

        let out = status(ctx(runner.clone()), input).await.unwrap();
        assert_eq!(out.status, ContainerStatus::Running);
        assert_eq!(out.matched_process.as_deref(), Some("palserver"));
        assert_eq!(out.container_name.as_deref(), Some("saba-palworld-01234567"));
        assert_eq!(runner.seen()[1], "docker top saba-palworld-01234567");
    }

    #[tokio::test]
    async fn test_status_starting_without_process() {
        let runner = Scripted::new(vec![
            ("ps --format json", CommandOutput::ok(PS_RUNNING)),
            ("docker top", CommandOutput::ok("UID PID CMD\nroot 1 steamcmd\n")),
        ]);
        let input: StatusInput = serde_json::from_value(json!({
            "instance_dir": "/srv/i1",
            "process_patterns": ["PalServer"]
        }))
        .unwrap();
        let out = status(ctx(runner), input).await.unwrap();
        assert_eq!(out.status, ContainerStatus::Starting);
        assert!(out.running);
        assert!(!out.server_process_running);
    }

    #[tokio::test]
    async fn test_status_stopped_when_ps_fails() {
        let runner = Scripted::new(vec![]);
        let input: StatusInput = serde_json::from_value(json!({"instance_dir": "/srv/i1"})).unwrap();
        let out = status(ctx(runner), input).await.unwrap();
        assert_eq!(out, StatusOutput::stopped(None));
    }

    #[tokio::test]
    async fn test_container_stats() {
        let runner = Scripted::new(vec![
            ("ps --format json", CommandOutput::ok(PS_RUNNING)),
            ("docker stats", CommandOutput::ok(STATS)),
        ]);
        let input = InstanceDirInput { instance_dir: "/srv/i1".into() };
        let out = container_stats(ctx(runner), input).await.unwrap();
        assert_eq!(out.docker_memory_usage, "256MiB / 4GiB");
        assert_eq!(out.docker_memory_percent, 6.25);
        assert_eq!(out.docker_cpu_percent, 12.5);
    }

    #[tokio::test]
    async fn test_start_requires_compose_file() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Scripted::new(vec![("up -d", CommandOutput::ok("started"))]);
        let input = InstanceDirInput { instance_dir: dir.path().into() };

        let err = start(ctx(runner.clone()), input.clone()).await.unwrap_err();
        assert!(err.to_string().starts_with("No docker-compose.yml found"));
        assert!(runner.seen().is_empty());

        std::fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").unwrap();
        let out = start(ctx(runner), input).await.unwrap();
        assert_eq!(out.stdout.as_deref(), Some("started"));
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_failure() {
        let runner = Scripted::new(vec![("down", CommandOutput::failed("no such project"))]);
        let input = InstanceDirInput { instance_dir: "/srv/i1".into() };
        let out = cleanup(ctx(runner), input).await.unwrap();
        assert!(out.success);
    }

    #[tokio::test]
    async fn test_enrich_declines_without_compose_file() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Scripted::new(vec![]);
        let input: EnrichInput = serde_json::from_value(json!({
            "instance_dir": dir.path(),
            "extension_data": {"docker_enabled": true, "docker_memory_limit": "4g"}
        }))
        .unwrap();
        let out = enrich_server_info(ctx(runner.clone()), input).await.unwrap();
        assert!(!out.handled);
        assert!(out.docker_enabled);
        assert_eq!(out.docker_memory_limit, Some(json!("4g")));
        assert!(runner.seen().is_empty());
    }

    #[tokio::test]
    async fn test_enrich_running_with_stats() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").unwrap();
        let runner = Scripted::new(vec![
            ("ps --format json", CommandOutput::ok(PS_RUNNING)),
            ("docker stats", CommandOutput::ok(STATS)),
        ]);
        let input: EnrichInput = serde_json::from_value(json!({"instance_dir": dir.path()})).unwrap();
        let out = enrich_server_info(ctx(runner), input).await.unwrap();
        assert_eq!(out.status, Some(ContainerStatus::Running));
        assert_eq!(out.cpu_percent, Some(12.5));
    }

    #[tokio::test]
    async fn test_shutdown_all_only_docker_instances() {
        let with_compose = tempfile::tempdir().unwrap();
        std::fs::write(with_compose.path().join("docker-compose.yml"), "services: {}\n").unwrap();
        let runner = Scripted::new(vec![("down", CommandOutput::ok(""))]);

        let input: ShutdownInput = serde_json::from_value(json!({
            "instances": [
                {"instance_id": "a", "instance_dir": with_compose.path(), "extension_data": {"docker_enabled": true}},
                {"instance_id": "b", "instance_dir": with_compose.path(), "extension_data": {"docker_enabled": false}},
                {"instance_id": "c", "instance_dir": "/nonexistent", "extension_data": {"docker_enabled": true}}
            ]
        }))
        .unwrap();
        let out = shutdown_all(ctx(runner.clone()), input).await.unwrap();
        assert_eq!(out.results, vec![ShutdownResult { instance_id: "a".into(), success: true }]);
        assert_eq!(runner.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_provision_writes_compose_and_uses_nested_instance() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Scripted::new(vec![("docker info", CommandOutput::ok("Server Version: 27"))]);
        let input: ProvisionInput = serde_json::from_value(json!({
            "instance_dir": dir.path(),
            "instance_id": "ignored-top-level",
            "module_config": {"docker": {"image": "itzg/minecraft-server"}},
            "instance": {"id": "0123456789", "name": "Survival", "module_name": "minecraft"}
        }))
        .unwrap();

        let out = provision(ctx(runner), input).await.unwrap();
        assert_eq!(out.steps.len(), 2);
        let yaml = std::fs::read_to_string(dir.path().join("docker-compose.yml")).unwrap();
        assert!(yaml.contains("saba-minecraft-01234567"));
    }

    #[tokio::test]
    async fn test_provision_fails_without_engine() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Scripted::new(vec![("docker info", CommandOutput::failed("daemon down"))]);
        let input: ProvisionInput = serde_json::from_value(json!({
            "instance_dir": dir.path(),
            "module_config": {"docker": {"image": "x"}}
        }))
        .unwrap();

        let ctx = ctx(runner).with_exec_mode(ExecMode::Local);
        let err = provision(ctx, input).await.unwrap_err();
        assert!(err.to_string().contains("Docker is not available"));
        assert!(!dir.path().join("docker-compose.yml").exists());
    }

    #[test]
    fn test_module_install_source() {
        let config: ModuleConfig = serde_json::from_value(json!({
            "install": {"method": "steamcmd", "app_id": 2394010}
        }))
        .unwrap();
        assert!(matches!(config.asset_source().unwrap(), Some(AssetSource::SteamCmd(_))));
        assert!(ModuleConfig::default().asset_source().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_applies_wsl2_flag() {
        let runner = Scripted::new(vec![("ps --format json", CommandOutput::ok(""))]);
        let invocation = docker_dispatcher()
            .dispatch(
                Some("status"),
                r#"{"instance_dir": "/srv/i1", "wsl2_mode": true}"#,
                ctx(runner.clone()),
            )
            .await;
        assert_eq!(invocation.exit_code, 0);
        assert!(runner.seen()[0].starts_with("wsl -u root --"));
    }

    #[tokio::test]
    async fn test_logs_report_compose_failure() {
        let runner = Scripted::new(vec![(
            "logs --tail 20",
            CommandOutput::failed("no configuration file provided: not found"),
        )]);
        let input = LogsInput {
            instance_dir: PathBuf::from("/srv/i1"),
            lines: 20,
        };
        let out = get_logs(ctx(runner), input).await.unwrap();
        assert!(out.handled);
        assert!(!out.success);
        assert_eq!(out.logs, "");
        assert_eq!(out.message.as_deref(), Some("no configuration file provided: not found"));
    }

    #[tokio::test]
    async fn test_logs_success_has_no_message() {
        let runner = Scripted::new(vec![("logs --tail", CommandOutput::ok("mc-1  | Done (2.1s)!\n"))]);
        let input: LogsInput = serde_json::from_value(json!({"instance_dir": "/srv/i1"})).unwrap();
        let out = get_logs(ctx(runner), input).await.unwrap();
        assert!(out.success);
        assert!(out.logs.contains("Done"));
        assert_eq!(out.message, None);
        let value = serde_json::to_value(&out).unwrap();
        assert!(value.get("message").is_none());
    }
}
