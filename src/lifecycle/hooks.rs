//! # Game Server Lifecycle Hooks
//!
//! Operations for a Java game server process the parent daemon launches and
//! supervises. Every handler returns `{"success": bool, "message": ...}` plus
//! its own fields; errors become the same shape through the dispatcher.

use crate::error::{ProtocolError, Result};
use crate::hook::context::HookContext;
use crate::hook::dispatcher::Dispatcher;
use crate::hook::result::HookKind;
use crate::lifecycle::diagnose::{self, Severity};
use crate::lifecycle::java::{self, JavaInfo, MIN_JAVA_MAJOR};
use crate::lifecycle::process;
use crate::lifecycle::properties::{self, ServerProperties};
use crate::protocol::channel::{AcknowledgeOnly, FallbackChain, RconChannel, RestChannel};
use crate::protocol::rcon::{rcon_command, RconClient};
use crate::protocol::rest::RestClient;
use crate::protocol::slp::ServerListPing;
use crate::provision::pipeline::{Pipeline, ProvisionContext, StepRecord};
use crate::provision::steps::{AcceptEula, AssetInstall, AssetSource, WriteServerProperties};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument, warn};

const LOCALHOST: &str = "127.0.0.1";

/// Every lifecycle operation, sealed
pub fn lifecycle_dispatcher() -> Dispatcher {
    Dispatcher::builder(HookKind::Lifecycle)
        .register("validate", validate)
        .register("get_launch_command", get_launch_command)
        .register("status", status)
        .register("stop", stop)
        .register("command", command)
        .register("configure", configure)
        .register("read_properties", read_properties)
        .register("accept_eula", accept_eula)
        .register("install_server", install_server)
        .register("diagnose_log", diagnose::diagnose_log)
        .build()
}

fn default_host() -> String {
    LOCALHOST.to_string()
}

fn default_game_port() -> u16 {
    crate::config::DEFAULT_GAME_PORT
}

fn handler_error(message: impl Into<String>) -> ProtocolError {
    ProtocolError::HandlerError(message.into())
}

/// `{"success": true, "message": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// JVM arguments as a list or one whitespace-separated string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum JvmArgs {
    List(Vec<String>),
    Line(String),
}

impl Default for JvmArgs {
    fn default() -> Self {
        JvmArgs::List(Vec::new())
    }
}

impl JvmArgs {
    fn to_vec(&self) -> Vec<String> {
        match self {
            JvmArgs::List(args) => args.clone(),
            JvmArgs::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Where the server lives and how to run it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerInput {
    pub working_dir: Option<PathBuf>,
    #[serde(alias = "server_executable", alias = "executable_path")]
    pub server_jar: Option<PathBuf>,
    pub java_path: Option<String>,
    pub ram: Option<String>,
    pub jvm_args: JvmArgs,
    pub use_aikar_flags: bool,
    pub port: Option<u16>,
}

impl ServerInput {
    /// The server jar as an absolute path; relative paths resolve against
    /// the working directory
    pub fn resolved_jar(&self) -> Option<PathBuf> {
        let jar = self.server_jar.as_ref().filter(|p| !p.as_os_str().is_empty())?;
        let jar = match (&self.working_dir, jar.is_absolute()) {
            (Some(dir), false) => dir.join(jar),
            _ => jar.clone(),
        };
        if jar.is_absolute() {
            return Some(jar);
        }
        Some(
            std::env::current_dir()
                .map(|cwd| cwd.join(&jar))
                .unwrap_or(jar),
        )
    }

    /// Working directory, falling back to the jar's directory
    pub fn effective_dir(&self) -> Option<PathBuf> {
        self.working_dir
            .clone()
            .or_else(|| self.resolved_jar()?.parent().map(Path::to_path_buf))
    }
}

/// One problem found by `validate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
    pub solution: String,
}

impl Issue {
    fn critical(code: &'static str, message: impl Into<String>, solution: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Critical,
            message: message.into(),
            solution: solution.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateOutput {
    pub success: bool,
    pub issues: Vec<Issue>,
    pub java_info: Option<JavaInfo>,
    pub eula_accepted: bool,
}

/// Check java, the server jar, the working directory, the EULA and the port
#[instrument(skip_all)]
pub async fn validate(ctx: HookContext, input: ServerInput) -> Result<ValidateOutput> {
    let mut issues = Vec::new();

    let java_info = java::find_java(ctx.runner.as_ref(), input.java_path.as_deref()).await;
    match &java_info {
        None => issues.push(Issue::critical(
            "JAVA_NOT_FOUND",
            "Java was not found",
            format!("Install Java {MIN_JAVA_MAJOR} or newer, or set java_path"),
        )),
        Some(info) if info.major_version < MIN_JAVA_MAJOR => issues.push(Issue::critical(
            "JAVA_VERSION_TOO_OLD",
            format!(
                "Java {} is too old, {MIN_JAVA_MAJOR} or newer is required",
                info.major_version
            ),
            format!("Install Java {MIN_JAVA_MAJOR} or newer"),
        )),
        Some(_) => {}
    }

    match input.resolved_jar() {
        None => issues.push(Issue::critical(
            "NO_SERVER_JAR",
            "No server jar configured",
            "Set server_jar or install a server",
        )),
        Some(jar) if !jar.is_file() => issues.push(Issue::critical(
            "JAR_NOT_FOUND",
            format!("Server jar not found: {}", jar.display()),
            "Check the configured path or install a server",
        )),
        Some(_) => {}
    }

    if let Some(dir) = &input.working_dir {
        if !dir.is_dir() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                issues.push(Issue::critical(
                    "WORKING_DIR_ERROR",
                    format!("Cannot create working directory {}: {e}", dir.display()),
                    "Choose a writable directory",
                ));
            }
        }
    }

    let mut eula_accepted = false;
    if let Some(dir) = input.effective_dir() {
        eula_accepted = properties::is_eula_accepted(&dir);
        if !eula_accepted {
            issues.push(Issue::critical(
                "EULA_NOT_ACCEPTED",
                "The server EULA has not been accepted",
                "Run accept_eula after reading https://aka.ms/MinecraftEULA",
            ));
        }
    }

    let port = input.port.unwrap_or(crate::config::DEFAULT_GAME_PORT);
    if port_in_use(port).await {
        issues.push(Issue {
            code: "PORT_IN_USE",
            severity: Severity::Warning,
            message: format!("Port {port} is already in use"),
            solution: format!("Stop whatever listens on {port} or pick another port"),
        });
    }

    let success = !issues.iter().any(|i| i.severity == Severity::Critical);
    Ok(ValidateOutput {
        success,
        issues,
        java_info,
        eula_accepted,
    })
}

async fn port_in_use(port: u16) -> bool {
    matches!(
        tokio::time::timeout(
            Duration::from_secs(1),
            tokio::net::TcpStream::connect((LOCALHOST, port)),
        )
        .await,
        Ok(Ok(_))
    )
}

const AIKAR_FLAGS: &[&str] = &[
    "-XX:+UseG1GC",
    "-XX:+ParallelRefProcEnabled",
    "-XX:MaxGCPauseMillis=200",
    "-XX:+UnlockExperimentalVMOptions",
    "-XX:+DisableExplicitGC",
    "-XX:+AlwaysPreTouch",
    "-XX:G1NewSizePercent=30",
    "-XX:G1MaxNewSizePercent=40",
    "-XX:G1HeapRegionSize=8M",
    "-XX:G1ReservePercent=20",
    "-XX:G1HeapWastePercent=5",
    "-XX:G1MixedGCCountTarget=4",
    "-XX:InitiatingHeapOccupancyPercent=15",
    "-XX:G1MixedGCLiveThresholdPercent=90",
    "-XX:G1RSetUpdatingPauseTimePercent=5",
    "-XX:SurvivorRatio=32",
    "-XX:+PerfDisableSharedMem",
    "-XX:MaxTenuringThreshold=1",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct LaunchOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_required: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<&'static str>,
}

impl LaunchOutput {
    fn jar_missing(message: String, configured_path: Option<PathBuf>) -> Self {
        Self {
            action_required: Some("server_jar_not_found"),
            message: Some(message),
            configured_path,
            options: vec!["update_path", "install_new"],
            ..Self::default()
        }
    }
}

/// The command line the daemon should spawn
pub async fn get_launch_command(ctx: HookContext, input: ServerInput) -> Result<LaunchOutput> {
    let Some(jar) = input.resolved_jar() else {
        return Ok(LaunchOutput::jar_missing("No server jar configured".to_string(), None));
    };
    if !jar.is_file() {
        return Ok(LaunchOutput::jar_missing(
            format!("Server jar not found: {}", jar.display()),
            Some(jar),
        ));
    }

    let program = match java::find_java(ctx.runner.as_ref(), input.java_path.as_deref()).await {
        Some(info) => info.path,
        None => input.java_path.clone().unwrap_or_else(|| "java".to_string()),
    };

    let ram = input.ram.as_deref().unwrap_or("2G");
    let mut args = vec![format!("-Xmx{ram}"), format!("-Xms{ram}")];
    if input.use_aikar_flags {
        args.extend(AIKAR_FLAGS.iter().map(|f| f.to_string()));
    }
    args.extend(input.jvm_args.to_vec());
    args.push("-jar".to_string());
    args.push(jar.to_string_lossy().into_owned());
    args.push("nogui".to_string());

    let working_dir = input
        .working_dir
        .clone()
        .or_else(|| jar.parent().map(Path::to_path_buf));

    Ok(LaunchOutput {
        success: true,
        program: Some(program),
        args,
        working_dir,
        env_vars: Some(BTreeMap::new()),
        ..LaunchOutput::default()
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusInput {
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_game_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Running,
    Starting,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    pub success: bool,
    pub status: ServerState,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players_online: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players_max: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_list: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motd: Option<String>,
    pub message: String,
}

impl StatusOutput {
    fn offline(status: ServerState, pid: Option<u32>, message: &str) -> Self {
        Self {
            success: true,
            status,
            online: false,
            pid,
            players_online: None,
            players_max: None,
            player_list: None,
            version: None,
            protocol: None,
            motd: None,
            message: message.to_string(),
        }
    }
}

/// Running when the server answers a status ping, starting when only the
/// process is alive, stopped otherwise
pub async fn status(ctx: HookContext, input: StatusInput) -> Result<StatusOutput> {
    let ping = ServerListPing::from_config(input.host.as_str(), input.port, &ctx.settings.ping);
    if let Some(server) = ping.ping().await {
        return Ok(StatusOutput {
            success: true,
            status: ServerState::Running,
            online: true,
            pid: input.pid,
            players_online: Some(server.players.online),
            players_max: Some(server.players.max),
            player_list: Some(server.players.sample.iter().map(|p| p.name.clone()).collect()),
            motd: Some(server.motd()),
            version: Some(server.version.name),
            protocol: Some(server.version.protocol),
            message: "Server is online".to_string(),
        });
    }

    if let Some(pid) = input.pid {
        if process::is_alive(pid).await {
            return Ok(StatusOutput::offline(
                ServerState::Starting,
                Some(pid),
                "Process is running but the server does not answer yet",
            ));
        }
    }

    Ok(StatusOutput::offline(ServerState::Stopped, None, "No server process running"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopInput {
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_host")]
    pub rcon_host: String,
    #[serde(default)]
    pub rcon_port: Option<u16>,
    #[serde(default)]
    pub rcon_password: String,
}

/// Graceful `stop` over RCON, then signals.
///
/// After the RCON stop the pid is polled for the configured number of
/// attempts; a server that exits in that window is reported as stopped
/// gracefully, otherwise it gets SIGTERM (SIGKILL with `force`).
#[instrument(skip_all, fields(pid = ?input.pid, force = input.force))]
pub async fn stop(ctx: HookContext, input: StopInput) -> Result<Outcome> {
    let pid = input.pid.ok_or_else(|| handler_error("No pid provided"))?;

    if !input.force && !input.rcon_password.is_empty() {
        let rcon = &ctx.settings.rcon;
        let port = input.rcon_port.unwrap_or(rcon.port);
        match rcon_command(&input.rcon_host, port, &input.rcon_password, "stop", rcon.timeout).await {
            Ok(_) => {
                let lifecycle = &ctx.settings.lifecycle;
                for _ in 0..lifecycle.stop_poll_attempts {
                    tokio::time::sleep(lifecycle.stop_poll_interval).await;
                    if !process::is_alive(pid).await {
                        info!(pid, "Server stopped gracefully");
                        return Ok(Outcome::ok(format!("Server stopped gracefully (pid {pid})")));
                    }
                }
                warn!(pid, "Graceful stop timed out, signalling");
            }
            Err(e) => warn!(pid, error = %e, "RCON stop failed, falling back to signals"),
        }
    }

    process::terminate(pid, input.force).await?;
    Ok(Outcome::ok(format!(
        "Sent SIG{} to pid {pid}",
        process::signal_name(input.force)
    )))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandInput {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub rest_port: Option<u16>,
    #[serde(default = "default_rest_endpoint")]
    pub rest_endpoint: String,
    #[serde(default)]
    pub rest_https: bool,
    #[serde(default = "default_rest_username")]
    pub rest_username: String,
    #[serde(default)]
    pub rest_password: Option<String>,
    #[serde(default)]
    pub rcon_port: Option<u16>,
    #[serde(default)]
    pub rcon_password: Option<String>,
}

fn default_rest_endpoint() -> String {
    "/v1/api/command".to_string()
}

fn default_rest_username() -> String {
    "admin".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    pub command: String,
    pub channel: String,
    pub response: String,
    pub acknowledged_only: bool,
}

fn text_arg(args: &Map<String, Value>, key: &str, default: &str) -> String {
    match args.get(key) {
        None | Some(Value::Null) => default.to_string(),
        Some(value) => properties::property_value(value),
    }
}

fn int_arg(args: &Map<String, Value>, key: &str, default: i64) -> i64 {
    match args.get(key) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

/// Expand a named command with its arguments; unknown names pass through
pub fn format_command(name: &str, args: &Map<String, Value>) -> String {
    let arg = |key: &str, default: &str| text_arg(args, key, default);
    let formatted = match name {
        "say" => format!("say {}", arg("message", "")),
        "give" => format!(
            "give {} {} {}",
            arg("player", ""),
            arg("item", ""),
            int_arg(args, "amount", 1)
        ),
        "weather" => format!("weather {} {}", arg("type", "clear"), int_arg(args, "duration", 1000)),
        "difficulty" => format!("difficulty {}", arg("level", "normal")),
        "whitelist" => format!("whitelist {} {}", arg("action", "list"), arg("player", "")),
        "op" | "deop" | "pardon" => format!("{name} {}", arg("player", "")),
        "ban" | "kick" => format!("{name} {} {}", arg("player", ""), arg("reason", "")),
        "tp" => format!("tp {} {}", arg("player", ""), arg("target", "")),
        "time" => format!("time set {}", arg("value", "day")),
        "gamemode" => format!("gamemode {} {}", arg("mode", "survival"), arg("player", "")),
        _ => name.to_string(),
    };
    formatted.trim().to_string()
}

/// Deliver a console command over REST, then RCON, then acknowledge it
#[instrument(skip_all, fields(command = %input.command))]
pub async fn command(ctx: HookContext, input: CommandInput) -> Result<CommandResult> {
    if input.command.trim().is_empty() {
        return Err(handler_error("No command specified"));
    }
    let formatted = format_command(input.command.trim(), &input.args);
    let rcon = &ctx.settings.rcon;

    let mut chain = FallbackChain::new();
    if let Some(port) = input.rest_port {
        let mut client = RestClient::new(input.host.as_str(), port, input.rest_https).with_timeout(rcon.timeout);
        if let Some(password) = &input.rest_password {
            client = client.with_basic_auth(input.rest_username.as_str(), password.as_str());
        }
        chain = chain.with(RestChannel::new(client, input.rest_endpoint.as_str()));
    }
    if let Some(password) = input.rcon_password.as_deref().filter(|p| !p.is_empty()) {
        let port = input.rcon_port.unwrap_or(rcon.port);
        let client = RconClient::new(input.host.as_str(), port, password)
            .with_timeout(rcon.timeout)
            .with_max_payload(rcon.max_payload);
        chain = chain.with(RconChannel::new(client));
    }
    chain = chain.with(AcknowledgeOnly);

    let delivery = chain.execute(&formatted).await?;
    let message = if delivery.acknowledged_only {
        format!("Command accepted but not transmitted: {formatted}")
    } else {
        format!("{}: {formatted}", delivery.channel.to_uppercase())
    };
    Ok(CommandResult {
        success: true,
        message,
        command: formatted,
        channel: delivery.channel,
        response: delivery.response,
        acknowledged_only: delivery.acknowledged_only,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirInput {
    pub working_dir: Option<PathBuf>,
}

impl DirInput {
    fn require(&self) -> Result<&Path> {
        self.working_dir
            .as_deref()
            .filter(|d| !d.as_os_str().is_empty())
            .ok_or_else(|| handler_error("No working_dir specified"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigureInput {
    pub working_dir: Option<PathBuf>,
    pub settings: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigureOutput {
    pub success: bool,
    pub message: String,
    pub updated_keys: Vec<String>,
}

/// Apply friendly-named settings to server.properties
pub async fn configure(_ctx: HookContext, input: ConfigureInput) -> Result<ConfigureOutput> {
    let dir = DirInput {
        working_dir: input.working_dir,
    };
    let dir = dir.require()?;
    if input.settings.is_empty() {
        return Err(handler_error("No settings provided"));
    }

    let mut props = ServerProperties::load(dir)?;
    let mut updated_keys = Vec::with_capacity(input.settings.len());
    for (name, value) in &input.settings {
        let key = properties::property_key(name);
        props.set(key, properties::property_value(value));
        updated_keys.push(key.to_string());
    }
    if props.is_dirty() {
        props.save()?;
    }

    Ok(ConfigureOutput {
        success: true,
        message: "server.properties updated".to_string(),
        updated_keys,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertiesOutput {
    pub success: bool,
    pub exists: bool,
    pub properties: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub async fn read_properties(_ctx: HookContext, input: DirInput) -> Result<PropertiesOutput> {
    let props = ServerProperties::load(input.require()?)?;
    Ok(PropertiesOutput {
        success: true,
        exists: props.existed(),
        properties: props.to_map(),
        message: (!props.existed()).then(|| "server.properties not found, showing defaults".to_string()),
    })
}

pub async fn accept_eula(_ctx: HookContext, input: DirInput) -> Result<Outcome> {
    properties::accept_eula(input.require()?)?;
    Ok(Outcome::ok("EULA accepted"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallInput {
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default = "default_jar_name")]
    pub jar_name: String,
    #[serde(default)]
    pub accept_eula: bool,
    #[serde(default)]
    pub initial_settings: Map<String, Value>,
    #[serde(default)]
    pub rcon_port: Option<u16>,
}

fn default_jar_name() -> String {
    "server.jar".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutput {
    pub success: bool,
    pub message: String,
    pub install_path: PathBuf,
    pub jar_path: PathBuf,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rcon_port: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rcon_password: Option<Value>,
}

/// Download the server jar, accept the EULA when asked, write
/// server.properties with RCON enabled
#[instrument(skip_all, fields(dir = ?input.install_dir))]
pub async fn install_server(ctx: HookContext, input: InstallInput) -> Result<InstallOutput> {
    let install_dir = input
        .install_dir
        .clone()
        .filter(|d| !d.as_os_str().is_empty())
        .ok_or_else(|| handler_error("No install_dir specified"))?;
    if input.download_url.trim().is_empty() {
        return Err(handler_error("No download_url specified"));
    }

    let updates: BTreeMap<String, String> = input
        .initial_settings
        .iter()
        .map(|(k, v)| (properties::property_key(k).to_string(), properties::property_value(v)))
        .collect();
    let rcon_port = input.rcon_port.unwrap_or(ctx.settings.rcon.port);

    let source = AssetSource::Download {
        url: input.download_url.clone(),
        file_name: input.jar_name.clone(),
        sha256: input.sha256.clone(),
    };
    let mut pipeline = Pipeline::new().step(AssetInstall::new(source, &install_dir));
    if input.accept_eula {
        pipeline = pipeline.step(AcceptEula);
    }
    let pipeline = pipeline
        .step(WriteServerProperties::new(updates).with_rcon(rcon_port))
        .with_completion_message("Server installed");

    let mut run = ProvisionContext::new(ctx, &install_dir);
    let report = pipeline.run(&mut run).await.map_err(|failure| {
        warn!(step = %failure.step, "Install aborted");
        failure.error
    })?;

    Ok(InstallOutput {
        success: true,
        message: format!("Server installed to {}", install_dir.display()),
        jar_path: install_dir.join(&input.jar_name),
        install_path: install_dir,
        steps: report.steps,
        rcon_port: run.output("rcon_port").cloned(),
        rcon_password: run.output("rcon_password").cloned(),
    })
}
