//! # Asset Installation Helpers
//!
//! Integrity checks and installers used by the asset step:
//!
//! - SHA-256 digests of files on disk
//! - SteamCMD app manifests (`steamapps/appmanifest_<id>.acf`)
//! - SteamCMD command lines
//! - verified HTTP downloads (`.part` file, digest check, rename)

use crate::docker::cli::{CommandSpec, ExecMode};
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};

/// StateFlags value of a fully installed app
const STATE_FULLY_INSTALLED: &str = "4";

/// A SteamCMD-installed dedicated server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SteamApp {
    pub app_id: u32,
    #[serde(default = "default_true")]
    pub anonymous: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub beta: Option<String>,
}

fn default_true() -> bool {
    true
}

impl SteamApp {
    pub fn new(app_id: u32) -> Self {
        Self {
            app_id,
            anonymous: true,
            username: None,
            platform: None,
            beta: None,
        }
    }
}

/// Hex SHA-256 of a file
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// True when `path` exists and, if `expected` is given, its digest matches
pub async fn is_intact(path: &Path, expected: Option<&str>) -> Result<bool> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(false);
    }
    match expected {
        None => Ok(true),
        Some(expected) => Ok(sha256_file(path).await?.eq_ignore_ascii_case(expected)),
    }
}

pub fn manifest_path(install_dir: &Path, app_id: u32) -> PathBuf {
    install_dir
        .join("steamapps")
        .join(format!("appmanifest_{app_id}.acf"))
}

/// Whether an app manifest reports a fully installed app.
///
/// Manifests are Valve KeyValues text; only the `"StateFlags" "4"` pair matters.
pub fn manifest_fully_installed(contents: &str) -> bool {
    contents.lines().any(|line| {
        let quoted: Vec<&str> = line.split('"').skip(1).step_by(2).collect();
        matches!(quoted.as_slice(), ["StateFlags", flags, ..] if *flags == STATE_FULLY_INSTALLED)
    })
}

pub async fn is_app_installed(install_dir: &Path, app_id: u32) -> bool {
    match tokio::fs::read_to_string(manifest_path(install_dir, app_id)).await {
        Ok(contents) => manifest_fully_installed(&contents),
        Err(_) => false,
    }
}

/// SteamCMD invocation installing or updating `app` into `install_dir`.
///
/// Servers that will run inside the WSL2 engine need the linux depot no
/// matter which platform the host is.
pub fn steamcmd_command(
    steamcmd: &str,
    app: &SteamApp,
    install_dir: &Path,
    mode: ExecMode,
    timeout: Duration,
) -> Result<CommandSpec> {
    let platform = match mode {
        ExecMode::Wsl2 => Some("linux"),
        ExecMode::Local => app.platform.as_deref(),
    };

    let login = match (app.anonymous, &app.username) {
        (true, _) => "anonymous".to_string(),
        (false, Some(user)) => user.clone(),
        (false, None) => {
            return Err(ProtocolError::ConfigError(
                "SteamCMD login requires a username when anonymous is false".to_string(),
            ))
        }
    };

    let mut cmd = CommandSpec::new(steamcmd, timeout);
    if let Some(platform) = platform {
        cmd = cmd.arg("+@sSteamCmdForcePlatformType").arg(platform);
    }
    cmd = cmd
        .arg("+force_install_dir")
        .arg(install_dir.to_string_lossy())
        .arg("+login")
        .arg(login)
        .arg("+app_update")
        .arg(app.app_id.to_string());
    if let Some(beta) = &app.beta {
        cmd = cmd.arg("-beta").arg(beta);
    }
    Ok(cmd.arg("validate").arg("+quit"))
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Download `url` to `dest`, verifying the SHA-256 when one is expected.
///
/// Data is streamed into `<dest>.part` and only renamed into place after the
/// digest matches. The partial file is removed on mismatch and on any error
/// while streaming. Returns the digest.
#[instrument(skip(client, expected))]
pub async fn download_verified(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    expected: Option<&str>,
    timeout: Duration,
) -> Result<String> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let part = part_path(dest);

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?;

    let digest = match stream_to_file(response, &part).await {
        Ok(digest) => digest,
        Err(e) => {
            warn!(error = %e, "Download interrupted, discarding partial file");
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
    };

    if let Some(expected) = expected {
        if !digest.eq_ignore_ascii_case(expected) {
            warn!(%digest, expected, "Checksum mismatch, discarding download");
            let _ = tokio::fs::remove_file(&part).await;
            return Err(ProtocolError::CommandError(format!(
                "Checksum mismatch for {}: expected {expected}, got {digest}",
                dest.display()
            )));
        }
    }

    tokio::fs::rename(&part, dest).await?;
    Ok(digest)
}

async fn stream_to_file(mut response: reqwest::Response, part: &Path) -> Result<String> {
    let mut file = tokio::fs::File::create(part).await?;
    let mut hasher = Sha256::new();
    let mut size = 0usize;
    while let Some(chunk) = response.chunk().await? {
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        size += chunk.len();
    }
    file.flush().await?;

    let digest = hex::encode(hasher.finalize());
    debug!(size, %digest, "Download finished");
    Ok(digest)
}
