//! Process liveness and termination by pid.
//!
//! Unix uses signals through `nix`; Windows shells out to `tasklist` and
//! `taskkill`.

use crate::error::{ProtocolError, Result};
use tracing::debug;

#[cfg(not(unix))]
use crate::docker::cli::{CommandRunner, CommandSpec, TokioCommandRunner};
#[cfg(not(unix))]
use crate::utils::timeout::DEFAULT_TIMEOUT;

fn check_pid(pid: u32) -> Result<()> {
    // 0 and values above i32::MAX address process groups on unix
    if pid == 0 || pid > i32::MAX as u32 {
        return Err(ProtocolError::ConfigError(format!("invalid pid {pid}")));
    }
    Ok(())
}

/// Whether a process with `pid` exists
#[cfg(unix)]
pub async fn is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if check_pid(pid).is_err() {
        return false;
    }
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        // exists but belongs to another user
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub async fn is_alive(pid: u32) -> bool {
    if check_pid(pid).is_err() {
        return false;
    }
    let spec = CommandSpec::new("tasklist", DEFAULT_TIMEOUT)
        .arg("/FI")
        .arg(format!("PID eq {pid}"))
        .arg("/NH");
    let output = TokioCommandRunner.run(&spec).await;
    output.success && output.stdout.split_whitespace().any(|word| word == pid.to_string())
}

/// Send SIGTERM, or SIGKILL when `force` is set
#[cfg(unix)]
pub async fn terminate(pid: u32, force: bool) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    check_pid(pid)?;
    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    debug!(pid, ?signal, "Signalling process");
    kill(Pid::from_raw(pid as i32), signal)
        .map_err(|e| ProtocolError::CommandError(format!("Failed to signal pid {pid}: {e}")))
}

/// `taskkill /F /PID <pid>`; Windows has no graceful equivalent
#[cfg(not(unix))]
pub async fn terminate(pid: u32, force: bool) -> Result<()> {
    check_pid(pid)?;
    debug!(pid, force, "Killing process");
    let spec = CommandSpec::new("taskkill", DEFAULT_TIMEOUT)
        .arg("/F")
        .arg("/PID")
        .arg(pid.to_string());
    let output = TokioCommandRunner.run(&spec).await;
    if output.success {
        Ok(())
    } else {
        Err(ProtocolError::CommandError(format!(
            "Failed to kill pid {pid}: {}",
            output.error_text()
        )))
    }
}

/// Name of the signal `terminate` sends, for result messages
pub fn signal_name(force: bool) -> &'static str {
    if force {
        "KILL"
    } else {
        "TERM"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_own_process_is_alive() {
        assert!(is_alive(std::process::id()).await);
    }

    #[tokio::test]
    async fn test_invalid_pids() {
        assert!(!is_alive(0).await);
        assert!(!is_alive(u32::MAX).await);
        assert!(terminate(0, true).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_pid_is_a_config_error() {
        for pid in [0, u32::MAX, i32::MAX as u32 + 1] {
            match terminate(pid, false).await {
                Err(ProtocolError::ConfigError(msg)) => assert_eq!(msg, format!("invalid pid {pid}")),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_child() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        assert!(is_alive(pid).await);

        terminate(pid, false).await.unwrap();
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }
}
