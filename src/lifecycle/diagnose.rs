//! Known failure signatures in server console output.
//!
//! `diagnose_log` matches each line against a fixed table of patterns and
//! reports every issue code at most once, on the first line that hits it.

use crate::error::Result;
use crate::hook::context::HookContext;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Lines read from `logs/latest.log` when the caller sends none
pub const TAIL_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
}

struct Signature {
    code: &'static str,
    severity: Severity,
    patterns: &'static [&'static str],
    message: &'static str,
    solution: &'static str,
}

const SIGNATURES: &[Signature] = &[
    Signature {
        code: "JAVA_NOT_FOUND",
        severity: Severity::Critical,
        patterns: &[
            r"'java' is not recognized",
            r"java: not found",
            r"No such file or directory.*java",
            r"The system cannot find the file specified",
        ],
        message: "Java executable could not be found",
        solution: "Install Java or set java_path to a valid java binary",
    },
    Signature {
        code: "JAVA_VERSION_TOO_OLD",
        severity: Severity::Critical,
        patterns: &[
            r"UnsupportedClassVersionError",
            r"class file version \d+\.\d+",
            r"requires Java \d+",
            r"has been compiled by a more recent version",
        ],
        message: "The server jar needs a newer Java runtime",
        solution: "Install a newer Java version and point java_path at it",
    },
    Signature {
        code: "EULA_NOT_ACCEPTED",
        severity: Severity::Critical,
        patterns: &[
            r"You need to agree to the EULA",
            r"Failed to load eula",
            r"Go to eula\.txt",
        ],
        message: "The EULA has not been accepted",
        solution: "Run accept_eula or set eula=true in eula.txt",
    },
    Signature {
        code: "PORT_IN_USE",
        severity: Severity::Critical,
        patterns: &[
            r"FAILED TO BIND TO PORT",
            r"Address already in use",
            r"Perhaps a server is already running on that port",
            r"java\.net\.BindException",
        ],
        message: "The server port is already in use",
        solution: "Stop the other process on that port or change server-port",
    },
    Signature {
        code: "OUT_OF_MEMORY",
        severity: Severity::Critical,
        patterns: &[
            r"java\.lang\.OutOfMemoryError",
            r"There is insufficient memory",
            r"Could not reserve enough space",
            r"GC overhead limit exceeded",
        ],
        message: "The server ran out of memory",
        solution: "Raise the memory allocation or free memory on the host",
    },
    Signature {
        code: "WORLD_CORRUPT",
        severity: Severity::Error,
        patterns: &[
            r"Failed to load.*level\.dat",
            r"Caused by: java\.util\.zip\.ZipException",
            r"Region file is truncated",
        ],
        message: "World data appears to be corrupt",
        solution: "Restore the world from a backup",
    },
    Signature {
        code: "INVALID_JAR",
        severity: Severity::Critical,
        patterns: &[
            r"Invalid or corrupt jarfile",
            r"Error: Unable to access jarfile",
            r"Could not find or load main class",
        ],
        message: "The server jar is missing or corrupt",
        solution: "Reinstall the server jar",
    },
    Signature {
        code: "PERMISSION_DENIED",
        severity: Severity::Critical,
        patterns: &[r"Permission denied", r"Access is denied"],
        message: "The server was denied access to a file",
        solution: "Check ownership and permissions of the server directory",
    },
    Signature {
        code: "SERVER_OVERLOADED",
        severity: Severity::Warning,
        patterns: &[r"Can't keep up! Is the server overloaded\?"],
        message: "The server is falling behind on ticks",
        solution: "Reduce view distance or entity counts, or allocate more resources",
    },
];

struct CompiledSignature {
    signature: &'static Signature,
    patterns: Vec<Regex>,
}

impl CompiledSignature {
    fn matches(&self, line: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(line))
    }
}

static COMPILED: Lazy<Vec<CompiledSignature>> = Lazy::new(|| {
    SIGNATURES
        .iter()
        .map(|signature| CompiledSignature {
            signature,
            patterns: signature
                .patterns
                .iter()
                .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
                .collect(),
        })
        .collect()
});

/// One detected problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogIssue {
    pub code: &'static str,
    pub severity: Severity,
    pub matched_line: String,
    pub message: &'static str,
    pub solution: &'static str,
}

/// Scan `lines` in order; each code is reported once, for its first match
pub fn diagnose<'a, I>(lines: I) -> Vec<LogIssue>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut issues: Vec<LogIssue> = Vec::new();
    for line in lines {
        for compiled in COMPILED.iter() {
            let code = compiled.signature.code;
            if issues.iter().any(|i| i.code == code) || !compiled.matches(line) {
                continue;
            }
            issues.push(LogIssue {
                code,
                severity: compiled.signature.severity,
                matched_line: line.trim().to_string(),
                message: compiled.signature.message,
                solution: compiled.signature.solution,
            });
        }
    }
    issues
}

/// Last `count` lines of `path`, decoded lossily
pub async fn tail_lines(path: &Path, count: usize) -> Result<Vec<String>> {
    let bytes = tokio::fs::read(path).await?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    Ok(lines[start..].iter().map(|l| (*l).to_string()).collect())
}

/// Log text as a list of lines or one newline-separated string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LogLines {
    List(Vec<String>),
    Text(String),
}

impl Default for LogLines {
    fn default() -> Self {
        LogLines::List(Vec::new())
    }
}

impl LogLines {
    fn into_lines(self) -> Vec<String> {
        match self {
            LogLines::List(lines) => lines,
            LogLines::Text(text) => text.lines().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiagnoseInput {
    pub log_lines: LogLines,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnoseOutput {
    pub success: bool,
    pub issues: Vec<LogIssue>,
    pub lines_analyzed: usize,
}

/// `diagnose_log`: explicit lines win; otherwise tail `logs/latest.log`
#[instrument(skip_all)]
pub async fn diagnose_log(_ctx: HookContext, input: DiagnoseInput) -> Result<DiagnoseOutput> {
    let mut lines = input.log_lines.into_lines();
    if lines.is_empty() {
        if let Some(dir) = input.working_dir.as_deref().filter(|d| !d.as_os_str().is_empty()) {
            let log = dir.join("logs").join("latest.log");
            if log.is_file() {
                lines = tail_lines(&log, TAIL_LINES).await?;
            }
        }
    }

    let issues = diagnose(lines.iter().map(String::as_str));
    debug!(lines = lines.len(), issues = issues.len(), "Log diagnosed");
    Ok(DiagnoseOutput {
        success: true,
        issues,
        lines_analyzed: lines.len(),
    })
}
