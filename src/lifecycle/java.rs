//! Java runtime discovery for the server launch command.

use crate::docker::cli::{CommandRunner, CommandSpec};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Lowest Java major version current server jars start on
pub const MIN_JAVA_MAJOR: u32 = 17;

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JavaInfo {
    pub path: String,
    pub version: String,
    pub major_version: u32,
}

/// Pull the quoted version out of `java -version` output
pub fn parse_version_output(output: &str) -> Option<String> {
    let start = output.find("version \"")? + "version \"".len();
    let len = output[start..].find('"')?;
    Some(output[start..start + len].to_string())
}

/// `17.0.2` is 17, `1.8.0_362` is 8, `21-ea` is 21
pub fn parse_major_version(version: &str) -> Option<u32> {
    let mut parts = version.split('.').map(leading_number);
    let first = parts.next()??;
    if first == 1 {
        if let Some(Some(second)) = parts.next() {
            return Some(second);
        }
    }
    Some(first)
}

fn leading_number(part: &str) -> Option<u32> {
    let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Candidate executables, most specific first
fn candidates(preferred: Option<&str>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(path) = preferred.filter(|p| !p.is_empty() && *p != "java") {
        out.push(path.to_string());
    }
    if let Ok(home) = std::env::var("JAVA_HOME") {
        let exe = if cfg!(windows) { "java.exe" } else { "java" };
        out.push(
            std::path::Path::new(&home)
                .join("bin")
                .join(exe)
                .to_string_lossy()
                .into_owned(),
        );
    }
    out.push("java".to_string());
    out.dedup();
    out
}

/// Run `java -version` for each candidate and return the first that answers
pub async fn find_java(runner: &dyn CommandRunner, preferred: Option<&str>) -> Option<JavaInfo> {
    for path in candidates(preferred) {
        let output = runner
            .run(&CommandSpec::new(path.as_str(), VERSION_TIMEOUT).arg("-version"))
            .await;
        // java prints its banner on stderr
        let text = format!("{}{}", output.stderr, output.stdout);
        let Some(version) = parse_version_output(&text) else {
            debug!(java = %path, "No usable Java at candidate");
            continue;
        };
        let Some(major_version) = parse_major_version(&version) else {
            continue;
        };
        return Some(JavaInfo {
            path,
            version,
            major_version,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::cli::CommandOutput;
    use async_trait::async_trait;

    struct FakeJava;

    #[async_trait]
    impl CommandRunner for FakeJava {
        async fn run(&self, command: &CommandSpec) -> CommandOutput {
            if command.program == "/opt/jdk/bin/java" {
                CommandOutput {
                    success: true,
                    exit_code: Some(0),
                    stdout: String::new(),
                    stderr: "openjdk version \"21.0.3\" 2024-04-16\nOpenJDK Runtime Environment".into(),
                }
            } else {
                CommandOutput::failed(format!("Command not found: {}", command.program))
            }
        }
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!(
            parse_version_output("java version \"1.8.0_362\"\nJava(TM) SE"),
            Some("1.8.0_362".to_string())
        );
        assert_eq!(parse_version_output("garbage"), None);
        assert_eq!(parse_major_version("1.8.0_362"), Some(8));
        assert_eq!(parse_major_version("17.0.2"), Some(17));
        assert_eq!(parse_major_version("21-ea"), Some(21));
        assert_eq!(parse_major_version("x"), None);
    }

    #[tokio::test]
    async fn test_find_java_prefers_configured_path() {
        let info = find_java(&FakeJava, Some("/opt/jdk/bin/java")).await.unwrap();
        assert_eq!(info.major_version, 21);
        assert_eq!(info.path, "/opt/jdk/bin/java");
    }

    #[tokio::test]
    async fn test_find_java_none_when_nothing_answers() {
        assert!(find_java(&FakeJava, Some("/missing/java")).await.is_none());
    }
}
