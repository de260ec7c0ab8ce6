//! Hook process entry point.
//!
//! `gamectl-hook <operation> [--module lifecycle|docker] [--config <path>]`
//! reads one JSON object from stdin and writes exactly one JSON object to
//! stdout. Logs and `PROGRESS:` lines go to stderr.

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use gamectl::docker::docker_dispatcher;
use gamectl::hook::result::{failure, FailureOrigin};
use gamectl::hook::{Dispatcher, HookContext, HookKind, Invocation};
use gamectl::lifecycle::lifecycle_dispatcher;
use gamectl::utils::logging::init_logging;
use gamectl::ControlConfig;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Module {
    /// Game server lifecycle hooks
    Lifecycle,
    /// Docker compose extension hooks
    Docker,
}

impl Module {
    fn kind(self) -> HookKind {
        match self {
            Module::Lifecycle => HookKind::Lifecycle,
            Module::Docker => HookKind::Extension,
        }
    }

    fn dispatcher(self) -> Dispatcher {
        match self {
            Module::Lifecycle => lifecycle_dispatcher(),
            Module::Docker => docker_dispatcher(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "gamectl-hook", version, about = "Game server hook process", long_about = None)]
struct Cli {
    /// Operation to run
    operation: Option<String>,

    /// Which hook set to dispatch into
    #[arg(long, value_enum, default_value_t = Module::Lifecycle)]
    module: Module,

    /// TOML settings file (defaults to $GAMECTL_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn emit(invocation: &Invocation) -> ExitCode {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{}", invocation.to_json());
    let _ = stdout.flush();
    ExitCode::from(u8::try_from(invocation.exit_code).unwrap_or(1))
}

fn reject(kind: HookKind, message: impl Into<String>) -> ExitCode {
    emit(&Invocation::rejected(failure(kind, FailureOrigin::Invocation, message)))
}

/// Failure shape for arguments clap rejected, from a raw `--module docker`
fn requested_kind<I>(args: I) -> HookKind
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let module = match arg.strip_prefix("--module") {
            Some("") => args.next(),
            Some(rest) => rest.strip_prefix('=').map(str::to_string),
            None => continue,
        };
        if let Some(module) = module {
            return match Module::from_str(&module, true) {
                Ok(module) => module.kind(),
                Err(_) => HookKind::Lifecycle,
            };
        }
    }
    HookKind::Lifecycle
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            eprint!("{e}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let detail = e.to_string();
            let first_line = detail.lines().next().unwrap_or("invalid arguments");
            let kind = requested_kind(std::env::args().skip(1));
            return reject(kind, format!("Invalid arguments: {first_line}"));
        }
    };
    let kind = cli.module.kind();

    let config = match ControlConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return reject(kind, e.to_string()),
    };
    init_logging(&config.logging);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return reject(kind, format!("Failed to start runtime: {e}")),
    };

    let invocation = runtime.block_on(async {
        let mut stdin = String::new();
        if let Err(e) = tokio::io::stdin().read_to_string(&mut stdin).await {
            return Invocation::rejected(failure(
                kind,
                FailureOrigin::Invocation,
                format!("Failed to read stdin: {e}"),
            ));
        }
        cli.module
            .dispatcher()
            .dispatch(cli.operation.as_deref(), &stdin, HookContext::new(config))
            .await
    });

    emit(&invocation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(args: &[&str]) -> HookKind {
        requested_kind(args.iter().map(|a| (*a).to_string()))
    }

    #[test]
    fn test_requested_kind_from_raw_args() {
        assert_eq!(kind(&["status", "--module", "docker", "--bogus"]), HookKind::Extension);
        assert_eq!(kind(&["--module=docker", "status", "extra"]), HookKind::Extension);
        assert_eq!(kind(&["--module", "lifecycle", "--bogus"]), HookKind::Lifecycle);
        assert_eq!(kind(&["status", "--bogus"]), HookKind::Lifecycle);
        assert_eq!(kind(&["--module"]), HookKind::Lifecycle);
        assert_eq!(kind(&["--module", "podman"]), HookKind::Lifecycle);
    }
}
