//! # Docker CLI
//!
//! Command construction for the docker and compose CLIs plus the runner that
//! executes them.
//!
//! In [`ExecMode::Wsl2`] every command goes through `wsl -u root --` to the
//! standalone docker binaries installed inside the distro. Compose then runs
//! with the instance directory as its working directory, so `-f` names the bare
//! file; locally `-f` carries the full path.

use crate::config::DockerConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, instrument};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// How container commands reach the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    /// docker on the host
    Local,
    /// docker inside the WSL2 distro
    Wsl2,
}

impl ExecMode {
    /// Platform default: WSL2 on Windows, local everywhere else
    pub fn detect() -> Self {
        if cfg!(windows) {
            ExecMode::Wsl2
        } else {
            ExecMode::Local
        }
    }

    pub fn from_flag(wsl2: bool) -> Self {
        if wsl2 {
            ExecMode::Wsl2
        } else {
            ExecMode::Local
        }
    }

    pub fn is_wsl2(self) -> bool {
        self == ExecMode::Wsl2
    }
}

/// One external command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
        }
    }

    /// Build from a prefix such as `["wsl", "-u", "root", "--", ".../docker"]`
    pub fn from_argv(argv: Vec<String>, timeout: Duration) -> Self {
        let mut parts = argv.into_iter();
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
            cwd: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Full command line, for logs and error messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// stderr when present, else stdout
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Executes external commands; swapped for a fake in tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Never fails: spawn errors and timeouts come back as `success = false`
    async fn run(&self, command: &CommandSpec) -> CommandOutput;
}

/// Runs commands with `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    #[instrument(skip(self, command), fields(command = %command.display()))]
    async fn run(&self, command: &CommandSpec) -> CommandOutput {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let output = match tokio::time::timeout(command.timeout, cmd.output()).await {
            Err(_) => return CommandOutput::failed("Command timed out"),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return CommandOutput::failed(format!("Command not found: {}", command.program))
            }
            Ok(Err(e)) => return CommandOutput::failed(e.to_string()),
            Ok(Ok(output)) => output,
        };

        debug!(status = ?output.status.code(), "Command finished");
        CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Builds docker and compose invocations for one execution mode
#[derive(Debug, Clone)]
pub struct DockerCli {
    mode: ExecMode,
    wsl2_docker_dir: String,
    compose_file: String,
    portable_compose: Option<PathBuf>,
    query_timeout: Duration,
    long_timeout: Duration,
}

impl DockerCli {
    pub fn new(mode: ExecMode, config: &DockerConfig) -> Self {
        Self {
            mode,
            wsl2_docker_dir: config.wsl2_docker_dir.trim_end_matches('/').to_string(),
            compose_file: config.compose_file.clone(),
            portable_compose: find_portable_compose(),
            query_timeout: config.query_timeout,
            long_timeout: config.long_timeout,
        }
    }

    /// Override the portable `docker-compose` lookup
    pub fn with_portable_compose(mut self, path: Option<PathBuf>) -> Self {
        self.portable_compose = path;
        self
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn compose_file(&self) -> &str {
        &self.compose_file
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub fn long_timeout(&self) -> Duration {
        self.long_timeout
    }

    pub fn compose_path(&self, instance_dir: &Path) -> PathBuf {
        instance_dir.join(&self.compose_file)
    }

    fn wsl_prefix(&self) -> Vec<String> {
        vec![
            "wsl".to_string(),
            "-u".to_string(),
            "root".to_string(),
            "--".to_string(),
            format!("{}/docker", self.wsl2_docker_dir),
        ]
    }

    pub fn docker_prefix(&self) -> Vec<String> {
        match self.mode {
            ExecMode::Wsl2 => self.wsl_prefix(),
            ExecMode::Local => vec!["docker".to_string()],
        }
    }

    pub fn compose_prefix(&self) -> Vec<String> {
        match self.mode {
            ExecMode::Wsl2 => {
                let mut prefix = self.wsl_prefix();
                prefix.push("compose".to_string());
                prefix
            }
            ExecMode::Local => match &self.portable_compose {
                Some(path) => vec![path.to_string_lossy().into_owned()],
                None => vec!["docker".to_string(), "compose".to_string()],
            },
        }
    }

    /// `docker <args>`
    pub fn docker<I, S>(&self, args: I, timeout: Duration) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::from_argv(self.docker_prefix(), timeout).args(args)
    }

    /// `docker compose -f <file> <args>` run inside `instance_dir`
    pub fn compose<I, S>(&self, instance_dir: &Path, args: I, timeout: Duration) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let file = match self.mode {
            ExecMode::Wsl2 => self.compose_file.clone(),
            ExecMode::Local => self.compose_path(instance_dir).to_string_lossy().into_owned(),
        };
        CommandSpec::from_argv(self.compose_prefix(), timeout)
            .arg("-f")
            .arg(file)
            .args(args)
            .cwd(instance_dir)
    }
}

fn find_portable_compose() -> Option<PathBuf> {
    let name = if cfg!(windows) {
        "docker-compose.exe"
    } else {
        "docker-compose"
    };
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join("docker").join(name);
    candidate.is_file().then_some(candidate)
}

/// `saba-{module}-{first 8 chars of instance id}`
pub fn container_name(module_name: &str, instance_id: &str) -> String {
    let short: String = instance_id.chars().take(8).collect();
    format!("saba-{module_name}-{short}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(mode: ExecMode) -> DockerCli {
        DockerCli::new(mode, &DockerConfig::default()).with_portable_compose(None)
    }

    #[test]
    fn test_local_prefixes() {
        let cli = cli(ExecMode::Local);
        assert_eq!(cli.docker_prefix(), vec!["docker"]);
        assert_eq!(cli.compose_prefix(), vec!["docker", "compose"]);
    }

    #[test]
    fn test_wsl2_prefixes() {
        let cli = cli(ExecMode::Wsl2);
        assert_eq!(
            cli.docker_prefix(),
            vec!["wsl", "-u", "root", "--", "/opt/saba-chan/docker/docker"]
        );
        assert_eq!(cli.compose_prefix().last().map(String::as_str), Some("compose"));
    }

    #[test]
    fn test_compose_file_argument_depends_on_mode() {
        let dir = Path::new("/srv/instances/abc");

        let local = cli(ExecMode::Local).compose(dir, ["up", "-d"], Duration::from_secs(1));
        assert_eq!(local.program, "docker");
        assert_eq!(local.args[0], "compose");
        assert_eq!(local.args[1], "-f");
        assert_eq!(
            PathBuf::from(&local.args[2]),
            dir.join("docker-compose.yml")
        );
        assert_eq!(&local.args[3..], &["up", "-d"]);
        assert_eq!(local.cwd.as_deref(), Some(dir));

        let wsl = cli(ExecMode::Wsl2).compose(dir, ["stop"], Duration::from_secs(1));
        assert_eq!(wsl.program, "wsl");
        let f = wsl.args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(wsl.args[f + 1], "docker-compose.yml");
    }

    #[test]
    fn test_portable_compose_used_locally() {
        let cli = cli(ExecMode::Local).with_portable_compose(Some(PathBuf::from("/opt/app/docker/docker-compose")));
        assert_eq!(cli.compose_prefix(), vec!["/opt/app/docker/docker-compose"]);
    }

    #[test]
    fn test_container_name() {
        assert_eq!(
            container_name("palworld", "0123456789abcdef"),
            "saba-palworld-01234567"
        );
        assert_eq!(container_name("mc", "abc"), "saba-mc-abc");
    }

    #[test]
    fn test_exec_mode_flag() {
        assert_eq!(ExecMode::from_flag(true), ExecMode::Wsl2);
        assert!(!ExecMode::from_flag(false).is_wsl2());
    }

    #[tokio::test]
    async fn test_missing_program_is_reported_not_raised() {
        let spec = CommandSpec::new("definitely-not-a-real-binary-7f3a", Duration::from_secs(5));
        let output = TokioCommandRunner.run(&spec).await;
        assert!(!output.success);
        assert!(output.stderr.contains("Command not found"));
    }
}
