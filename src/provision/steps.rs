//! Concrete provisioning steps.

use crate::docker::cli::ExecMode;
use crate::docker::compose::{generate_compose_yaml, DockerSection, InstanceData};
use crate::error::{ProtocolError, Result};
use crate::lifecycle::properties::{self, ServerProperties};
use crate::provision::assets::{self, SteamApp};
use crate::provision::pipeline::{PipelineStep, ProvisionContext, StepOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Makes sure a container engine answers `docker info`.
///
/// When the current mode fails and WSL2 fallback is enabled, the WSL2 engine
/// is checked and, if it answers, becomes the mode for the rest of the run.
#[derive(Debug, Clone)]
pub struct EngineReadiness {
    wsl2_fallback: bool,
}

impl Default for EngineReadiness {
    fn default() -> Self {
        Self {
            wsl2_fallback: cfg!(windows),
        }
    }
}

impl EngineReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wsl2_fallback(mut self, enabled: bool) -> Self {
        self.wsl2_fallback = enabled;
        self
    }
}

#[async_trait]
impl PipelineStep for EngineReadiness {
    fn name(&self) -> &str {
        "engine_readiness"
    }

    fn progress_weight(&self) -> u8 {
        0
    }

    fn start_message(&self) -> String {
        "Checking Docker Engine...".to_string()
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<StepOutcome> {
        let runner = ctx.runner();
        let docker = ctx.docker();
        let info = docker.docker(["info"], docker.query_timeout());
        let output = runner.run(&info).await;

        if output.success {
            ctx.record("exec_mode", mode_name(ctx.exec_mode()));
            return Ok(StepOutcome::Completed(format!(
                "Docker Engine ready ({})",
                mode_name(ctx.exec_mode())
            )));
        }

        if self.wsl2_fallback && ctx.exec_mode() == ExecMode::Local {
            debug!(error = output.error_text(), "Local engine unavailable, probing WSL2");
            ctx.set_exec_mode(ExecMode::Wsl2);
            let docker = ctx.docker();
            let wsl = runner.run(&docker.docker(["info"], docker.query_timeout())).await;
            if wsl.success {
                info!("Using WSL2 Docker Engine");
                ctx.record("exec_mode", mode_name(ExecMode::Wsl2));
                return Ok(StepOutcome::Completed("Docker Engine ready (wsl2)".to_string()));
            }
            ctx.set_exec_mode(ExecMode::Local);
        }

        Err(ProtocolError::CommandError(format!(
            "Docker is not available: {}",
            output.error_text()
        )))
    }
}

fn mode_name(mode: ExecMode) -> &'static str {
    match mode {
        ExecMode::Local => "local",
        ExecMode::Wsl2 => "wsl2",
    }
}

/// Where the server files come from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AssetSource {
    #[serde(rename = "steamcmd")]
    SteamCmd(SteamApp),
    Download {
        url: String,
        file_name: String,
        #[serde(default)]
        sha256: Option<String>,
    },
}

/// Installs the server files, skipping work that is already done
#[derive(Debug, Clone)]
pub struct AssetInstall {
    source: AssetSource,
    install_dir: PathBuf,
    http: reqwest::Client,
}

impl AssetInstall {
    pub fn new(source: AssetSource, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            install_dir: install_dir.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn install_steam_app(&self, ctx: &mut ProvisionContext, app: &SteamApp) -> Result<StepOutcome> {
        if assets::is_app_installed(&self.install_dir, app.app_id).await {
            return Ok(StepOutcome::Skipped(format!(
                "App {} already installed",
                app.app_id
            )));
        }

        tokio::fs::create_dir_all(&self.install_dir).await?;
        let settings = &ctx.hook().settings.docker;
        let command = assets::steamcmd_command(
            &settings.steamcmd_path,
            app,
            &self.install_dir,
            ctx.exec_mode(),
            settings.install_timeout,
        )?;

        let output = ctx.runner().run(&command).await;
        if !output.success {
            return Err(ProtocolError::CommandError(format!(
                "SteamCMD install failed: {}",
                output.error_text()
            )));
        }
        Ok(StepOutcome::Completed(format!("App {} installed", app.app_id)))
    }

    async fn download(
        &self,
        ctx: &mut ProvisionContext,
        url: &str,
        file_name: &str,
        sha256: Option<&str>,
    ) -> Result<StepOutcome> {
        let dest = self.install_dir.join(file_name);
        if assets::is_intact(&dest, sha256).await? {
            return Ok(StepOutcome::Skipped(format!("{file_name} already present")));
        }

        let timeout = ctx.hook().settings.docker.install_timeout;
        let digest = assets::download_verified(&self.http, url, &dest, sha256, timeout).await?;
        ctx.record("sha256", digest);
        Ok(StepOutcome::Completed(format!("Downloaded {file_name}")))
    }
}

#[async_trait]
impl PipelineStep for AssetInstall {
    fn name(&self) -> &str {
        "asset_install"
    }

    fn progress_weight(&self) -> u8 {
        40
    }

    fn start_message(&self) -> String {
        match &self.source {
            AssetSource::SteamCmd(app) => format!("Downloading server files (app {})...", app.app_id),
            AssetSource::Download { file_name, .. } => format!("Downloading {file_name}..."),
        }
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<StepOutcome> {
        match &self.source {
            AssetSource::SteamCmd(app) => self.install_steam_app(ctx, app).await,
            AssetSource::Download {
                url,
                file_name,
                sha256,
            } => self.download(ctx, url, file_name, sha256.as_deref()).await,
        }
    }
}

/// Writes `docker-compose.yml`, replacing whatever is there
#[derive(Debug, Clone)]
pub struct ComposeGeneration {
    docker: DockerSection,
    instance: InstanceData,
}

impl ComposeGeneration {
    pub fn new(docker: DockerSection, instance: InstanceData) -> Self {
        Self { docker, instance }
    }
}

#[async_trait]
impl PipelineStep for ComposeGeneration {
    fn name(&self) -> &str {
        "compose_generation"
    }

    fn progress_weight(&self) -> u8 {
        80
    }

    fn start_message(&self) -> String {
        "Generating docker-compose.yml...".to_string()
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<StepOutcome> {
        let yaml = generate_compose_yaml(&self.docker, &self.instance)?;
        let path = ctx.docker().compose_path(ctx.instance_dir());
        tokio::fs::create_dir_all(ctx.instance_dir()).await?;
        tokio::fs::write(&path, yaml).await?;
        ctx.record("compose_file", path.to_string_lossy().into_owned());
        Ok(StepOutcome::Completed(format!("Wrote {}", path.display())))
    }
}

/// Writes `eula=true` unless it is already accepted
#[derive(Debug, Clone, Default)]
pub struct AcceptEula;

#[async_trait]
impl PipelineStep for AcceptEula {
    fn name(&self) -> &str {
        "accept_eula"
    }

    fn progress_weight(&self) -> u8 {
        85
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<StepOutcome> {
        if properties::is_eula_accepted(ctx.instance_dir()) {
            return Ok(StepOutcome::Skipped("EULA already accepted".to_string()));
        }
        properties::accept_eula(ctx.instance_dir())?;
        Ok(StepOutcome::Completed("EULA accepted".to_string()))
    }
}

/// Applies property updates and makes sure RCON is enabled
#[derive(Debug, Clone, Default)]
pub struct WriteServerProperties {
    updates: BTreeMap<String, String>,
    rcon_port: Option<u16>,
}

impl WriteServerProperties {
    pub fn new(updates: BTreeMap<String, String>) -> Self {
        Self {
            updates,
            rcon_port: None,
        }
    }

    pub fn with_rcon(mut self, port: u16) -> Self {
        self.rcon_port = Some(port);
        self
    }
}

#[async_trait]
impl PipelineStep for WriteServerProperties {
    fn name(&self) -> &str {
        "server_properties"
    }

    fn progress_weight(&self) -> u8 {
        90
    }

    fn start_message(&self) -> String {
        "Writing server.properties...".to_string()
    }

    async fn run(&self, ctx: &mut ProvisionContext) -> Result<StepOutcome> {
        let mut props = ServerProperties::load(ctx.instance_dir())?;
        for (key, value) in &self.updates {
            props.set(key, value);
        }

        if let Some(port) = self.rcon_port {
            let rcon = props.ensure_rcon(port);
            ctx.record("rcon_port", rcon.port);
            ctx.record("rcon_password", rcon.password);
        }

        if !props.is_dirty() {
            return Ok(StepOutcome::Skipped("server.properties already up to date".to_string()));
        }
        props.save()?;
        if props.existed() {
            Ok(StepOutcome::Completed("server.properties updated".to_string()))
        } else {
            warn!(path = %props.path().display(), "Created server.properties");
            Ok(StepOutcome::Completed("server.properties created".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use crate::docker::cli::{CommandOutput, CommandRunner, CommandSpec};
    use crate::hook::context::HookContext;
    use crate::hook::progress::ProgressReporter;
    use std::sync::{Arc, Mutex};

    /// Answers `docker info` depending on the program used
    struct EngineCheck {
        local_ok: bool,
        wsl_ok: bool,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for EngineCheck {
        async fn run(&self, command: &CommandSpec) -> CommandOutput {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(command.display());
            }
            let ok = if command.program == "wsl" { self.wsl_ok } else { self.local_ok };
            if ok {
                CommandOutput::ok("Server Version: 27.0")
            } else {
                CommandOutput::failed("Cannot connect to the Docker daemon")
            }
        }
    }

    fn ctx_with(runner: Arc<dyn CommandRunner>, dir: &std::path::Path) -> ProvisionContext {
        let hook = HookContext::new(ControlConfig::default())
            .with_runner(runner)
            .with_progress(ProgressReporter::disabled())
            .with_exec_mode(ExecMode::Local);
        ProvisionContext::new(hook, dir)
    }

    #[tokio::test]
    async fn test_engine_ready_locally() {
        let runner = Arc::new(EngineCheck { local_ok: true, wsl_ok: false, seen: Mutex::new(vec![]) });
        let mut ctx = ctx_with(runner, std::path::Path::new("/tmp"));
        let outcome = EngineReadiness::new().run(&mut ctx).await.unwrap();
        assert_eq!(outcome, StepOutcome::Completed("Docker Engine ready (local)".into()));
        assert_eq!(ctx.exec_mode(), ExecMode::Local);
    }

    #[tokio::test]
    async fn test_engine_falls_back_to_wsl2_for_later_steps() {
        let runner = Arc::new(EngineCheck { local_ok: false, wsl_ok: true, seen: Mutex::new(vec![]) });
        let mut ctx = ctx_with(runner.clone(), std::path::Path::new("/tmp"));

        EngineReadiness::new().with_wsl2_fallback(true).run(&mut ctx).await.unwrap();
        assert_eq!(ctx.exec_mode(), ExecMode::Wsl2);
        assert_eq!(ctx.docker().mode(), ExecMode::Wsl2);

        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen[0], "docker info");
        assert_eq!(seen[1], "wsl -u root -- /opt/saba-chan/docker/docker info");
    }

    #[tokio::test]
    async fn test_engine_unavailable() {
        let runner = Arc::new(EngineCheck { local_ok: false, wsl_ok: false, seen: Mutex::new(vec![]) });
        let mut ctx = ctx_with(runner, std::path::Path::new("/tmp"));
        let err = EngineReadiness::new().with_wsl2_fallback(true).run(&mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "Command error: Docker is not available: Cannot connect to the Docker daemon");
        assert_eq!(ctx.exec_mode(), ExecMode::Local);
    }

    #[tokio::test]
    async fn test_compose_generation_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(EngineCheck { local_ok: true, wsl_ok: true, seen: Mutex::new(vec![]) });
        let mut ctx = ctx_with(runner, dir.path());
        let compose = dir.path().join("docker-compose.yml");
        std::fs::write(&compose, "stale: true\n").unwrap();

        let docker = DockerSection {
            image: "itzg/minecraft-server".into(),
            ..DockerSection::default()
        };
        let instance = InstanceData {
            instance_id: "abcdef0123".into(),
            module_name: "minecraft".into(),
            ..InstanceData::default()
        };
        ComposeGeneration::new(docker, instance).run(&mut ctx).await.unwrap();

        let written = std::fs::read_to_string(&compose).unwrap();
        assert!(!written.contains("stale"));
        assert!(written.contains("saba-minecraft-abcdef01"));
    }

    #[tokio::test]
    async fn test_steam_app_skipped_when_manifest_complete() {
        let dir = tempfile::tempdir().unwrap();
        let steamapps = dir.path().join("steamapps");
        std::fs::create_dir_all(&steamapps).unwrap();
        std::fs::write(
            steamapps.join("appmanifest_2394010.acf"),
            "\"AppState\"\n{\n\t\"StateFlags\"\t\t\"4\"\n}\n",
        )
        .unwrap();

        let runner = Arc::new(EngineCheck { local_ok: false, wsl_ok: false, seen: Mutex::new(vec![]) });
        let mut ctx = ctx_with(runner.clone(), dir.path());
        let step = AssetInstall::new(AssetSource::SteamCmd(SteamApp::new(2394010)), dir.path());

        assert!(step.run(&mut ctx).await.unwrap().is_skipped());
        assert!(runner.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_eula_step_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(EngineCheck { local_ok: true, wsl_ok: true, seen: Mutex::new(vec![]) });
        let mut ctx = ctx_with(runner, dir.path());

        assert!(!AcceptEula.run(&mut ctx).await.unwrap().is_skipped());
        assert!(AcceptEula.run(&mut ctx).await.unwrap().is_skipped());
    }

    #[test]
    fn test_asset_source_from_json() {
        let source: AssetSource = serde_json::from_value(serde_json::json!({
            "method": "download",
            "url": "https://example.com/server.jar",
            "file_name": "server.jar"
        }))
        .unwrap();
        assert!(matches!(source, AssetSource::Download { sha256: None, .. }));

        let source: AssetSource = serde_json::from_value(serde_json::json!({
            "method": "steamcmd",
            "app_id": 2394010
        }))
        .unwrap();
        assert_eq!(source, AssetSource::SteamCmd(SteamApp::new(2394010)));
    }
}
