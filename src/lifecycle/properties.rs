//! # server.properties and eula.txt
//!
//! `server.properties` is edited in place: comments, blank lines and key order
//! survive an update, changed keys are rewritten where they stand and new keys
//! are appended. A missing file starts from the vanilla defaults.

use crate::error::Result;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PROPERTIES_FILE: &str = "server.properties";
pub const EULA_FILE: &str = "eula.txt";

const GENERATED_PASSWORD_LEN: usize = 16;

const DEFAULTS: &[(&str, &str)] = &[
    ("server-port", "25565"),
    ("gamemode", "survival"),
    ("difficulty", "easy"),
    ("max-players", "20"),
    ("motd", "A Minecraft Server"),
    ("level-name", "world"),
    ("online-mode", "true"),
    ("pvp", "true"),
    ("enable-command-block", "false"),
    ("spawn-protection", "16"),
    ("view-distance", "10"),
    ("simulation-distance", "10"),
    ("enable-rcon", "false"),
    ("rcon.port", "25575"),
    ("rcon.password", ""),
    ("white-list", "false"),
    ("enforce-whitelist", "false"),
    ("spawn-monsters", "true"),
    ("spawn-animals", "true"),
    ("spawn-npcs", "true"),
    ("allow-flight", "false"),
    ("allow-nether", "true"),
    ("generate-structures", "true"),
    ("level-seed", ""),
    ("level-type", "minecraft\\:normal"),
    ("max-world-size", "29999984"),
    ("player-idle-timeout", "0"),
    ("server-ip", ""),
    ("max-tick-time", "60000"),
    ("enable-query", "false"),
    ("query.port", "25565"),
    ("enable-status", "true"),
    ("enforce-secure-profile", "true"),
    ("hardcore", "false"),
    ("network-compression-threshold", "256"),
    ("op-permission-level", "4"),
    ("resource-pack", ""),
    ("require-resource-pack", "false"),
];

const KEY_MAP: &[(&str, &str)] = &[
    ("port", "server-port"),
    ("max_players", "max-players"),
    ("online_mode", "online-mode"),
    ("view_distance", "view-distance"),
    ("simulation_distance", "simulation-distance"),
    ("spawn_protection", "spawn-protection"),
    ("allow_flight", "allow-flight"),
    ("allow_nether", "allow-nether"),
    ("enable_command_block", "enable-command-block"),
    ("max_world_size", "max-world-size"),
    ("level_name", "level-name"),
    ("level_seed", "level-seed"),
    ("level_type", "level-type"),
    ("white_list", "white-list"),
    ("rcon_port", "rcon.port"),
    ("rcon_password", "rcon.password"),
];

/// Vanilla defaults used when no file exists yet
pub fn defaults() -> BTreeMap<String, String> {
    DEFAULTS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Map a settings name (`max_players`) to its properties key (`max-players`).
/// Unknown names pass through unchanged.
pub fn property_key(name: &str) -> &str {
    KEY_MAP
        .iter()
        .find(|(friendly, _)| *friendly == name)
        .map(|(_, key)| *key)
        .unwrap_or(name)
}

/// Render a JSON setting the way server.properties spells it
pub fn property_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Comment, blank or unparseable line, kept verbatim
    Raw(String),
    Pair { key: String, value: String },
}

fn parse_line(line: &str) -> Line {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
        return Line::Raw(line.to_string());
    }
    match trimmed.split_once('=') {
        Some((key, value)) => Line::Pair {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
        },
        None => Line::Raw(line.to_string()),
    }
}

/// RCON settings after [`ServerProperties::ensure_rcon`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconSettings {
    pub port: u16,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ServerProperties {
    path: PathBuf,
    lines: Vec<Line>,
    dirty: bool,
    existed: bool,
}

impl ServerProperties {
    /// Load `server.properties` from `dir`, or the defaults when it is missing
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(PROPERTIES_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Self {
                path,
                lines: text.lines().map(parse_line).collect(),
                dirty: false,
                existed: true,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut lines = vec![Line::Raw("#Minecraft server properties".to_string())];
                lines.extend(DEFAULTS.iter().map(|(k, v)| Line::Pair {
                    key: k.to_string(),
                    value: v.to_string(),
                }));
                Ok(Self {
                    path,
                    lines,
                    dirty: true,
                    existed: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file was on disk when loaded
    pub fn existed(&self) -> bool {
        self.existed
    }

    /// Whether [`save`](Self::save) would change the file
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Pair { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set `key`, in place if present, appended otherwise
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let existing = self.lines.iter_mut().rev().find_map(|line| match line {
            Line::Pair { key: k, value } if k == key => Some(value),
            _ => None,
        });
        match existing {
            Some(current) if *current == value => {}
            Some(current) => {
                *current = value;
                self.dirty = true;
            }
            None => {
                self.lines.push(Line::Pair {
                    key: key.to_string(),
                    value,
                });
                self.dirty = true;
            }
        }
    }

    /// Enable RCON on `port`. A password is generated only when none is set.
    pub fn ensure_rcon(&mut self, port: u16) -> RconSettings {
        self.set("enable-rcon", "true");
        self.set("rcon.port", port.to_string());

        let existing = self
            .get("rcon.password")
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let password = match existing {
            Some(existing) => existing,
            None => {
                let generated: String = rand::rng()
                    .sample_iter(Alphanumeric)
                    .take(GENERATED_PASSWORD_LEN)
                    .map(char::from)
                    .collect();
                self.set("rcon.password", generated.clone());
                generated
            }
        };
        RconSettings { port, password }
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Pair { key, value } => Some((key.clone(), value.clone())),
                Line::Raw(_) => None,
            })
            .collect()
    }

    pub fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = String::new();
        for line in &self.lines {
            match line {
                Line::Raw(raw) => text.push_str(raw),
                Line::Pair { key, value } => {
                    text.push_str(key);
                    text.push('=');
                    text.push_str(value);
                }
            }
            text.push('\n');
        }
        fs::write(&self.path, text)?;
        debug!(path = %self.path.display(), "Wrote server.properties");
        self.dirty = false;
        self.existed = true;
        Ok(())
    }
}

pub fn is_eula_accepted(dir: &Path) -> bool {
    let Ok(text) = fs::read_to_string(dir.join(EULA_FILE)) else {
        return false;
    };
    text.lines().any(|line| match line.split_once('=') {
        Some((key, value)) => {
            key.trim().eq_ignore_ascii_case("eula") && value.trim().eq_ignore_ascii_case("true")
        }
        None => false,
    })
}

pub fn accept_eula(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let text = "#By changing the setting below to TRUE you are indicating your agreement to our EULA (https://aka.ms/MinecraftEULA).\neula=true\n";
    fs::write(dir.join(EULA_FILE), text)?;
    Ok(())
}
