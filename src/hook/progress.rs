//! # Progress Reporting
//!
//! Structured progress travels on standard error next to ordinary log lines.
//! A progress line is the sentinel immediately followed by one JSON object:
//!
//! ```text
//! PROGRESS:{"percent":40,"message":"Installing assets"}
//! ```
//!
//! Both fields are optional. Anything without the sentinel prefix is a plain
//! log line.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Prefix that marks a progress line
pub const PROGRESS_SENTINEL: &str = "PROGRESS:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "clamped_percent")]
    pub percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: Some(percent.min(100)),
            message: Some(message.into()),
        }
    }

    pub fn percent(percent: u8) -> Self {
        Self {
            percent: Some(percent.min(100)),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            percent: None,
            message: Some(message.into()),
        }
    }

    /// Render as a sentinel line, without the trailing newline
    pub fn to_line(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"));
        format!("{PROGRESS_SENTINEL}{json}")
    }
}

fn clamped_percent<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.map(|p| p.clamp(0.0, 100.0).round() as u8))
}

/// Parse a line read from a hook's standard error.
///
/// Returns `None` for plain log lines and for sentinel lines whose JSON is
/// not an object.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let json = line.trim_end_matches(['\r', '\n']).strip_prefix(PROGRESS_SENTINEL)?;
    match serde_json::from_str::<serde_json::Value>(json).ok()? {
        value @ serde_json::Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writes progress lines to a shared sink, one flushed line per event
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Option<Sink>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::stderr()
    }
}

impl ProgressReporter {
    pub fn stderr() -> Self {
        Self::to_writer(io::stderr())
    }

    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Some(Arc::new(Mutex::new(Box::new(writer)))),
        }
    }

    /// Reporter that drops every event
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Reporter writing into memory, plus a handle to read it back
    pub fn capture() -> (Self, CapturedProgress) {
        let captured = CapturedProgress::default();
        (Self::to_writer(captured.clone()), captured)
    }

    pub fn emit(&self, event: &ProgressEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        // A poisoned or closed sink loses progress, never the result
        if let Ok(mut writer) = sink.lock() {
            let _ = writeln!(writer, "{}", event.to_line());
            let _ = writer.flush();
        }
    }

    pub fn report(&self, percent: u8, message: impl Into<String>) {
        self.emit(&ProgressEvent::new(percent, message));
    }

    pub fn percent(&self, percent: u8) {
        self.emit(&ProgressEvent::percent(percent));
    }

    pub fn message(&self, message: impl Into<String>) {
        self.emit(&ProgressEvent::message(message));
    }
}

/// In-memory progress sink
#[derive(Clone, Default)]
pub struct CapturedProgress {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedProgress {
    pub fn text(&self) -> String {
        self.buf
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.text().lines().filter_map(parse_progress_line).collect()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.events().into_iter().filter_map(|e| e.percent).collect()
    }
}

impl Write for CapturedProgress {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .buf
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "progress buffer poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format() {
        assert_eq!(
            ProgressEvent::new(40, "Installing").to_line(),
            r#"PROGRESS:{"percent":40,"message":"Installing"}"#
        );
        assert_eq!(ProgressEvent::percent(100).to_line(), r#"PROGRESS:{"percent":100}"#);
        assert_eq!(ProgressEvent::message("hi").to_line(), r#"PROGRESS:{"message":"hi"}"#);
    }

    #[test]
    fn test_percent_clamped() {
        assert_eq!(ProgressEvent::percent(250).percent, Some(100));
        let parsed = parse_progress_line(r#"PROGRESS:{"percent":140}"#).unwrap();
        assert_eq!(parsed.percent, Some(100));
        let parsed = parse_progress_line(r#"PROGRESS:{"percent":-3}"#).unwrap();
        assert_eq!(parsed.percent, Some(0));
    }

    #[test]
    fn test_plain_lines_are_not_progress() {
        assert!(parse_progress_line("INFO starting server").is_none());
        assert!(parse_progress_line("PROGRESS: not json").is_none());
        assert!(parse_progress_line("PROGRESS:[1,2]").is_none());
        assert!(parse_progress_line("PROGRESS:[50]").is_none());
        assert_eq!(parse_progress_line("PROGRESS:{}\n"), Some(ProgressEvent::default()));
    }

    #[test]
    fn test_capture_round_trip() {
        let (reporter, captured) = ProgressReporter::capture();
        reporter.report(0, "start");
        reporter.message("working");
        reporter.percent(100);

        assert_eq!(captured.percents(), vec![0, 100]);
        assert_eq!(captured.events().len(), 3);
        assert!(captured.text().ends_with('\n'));
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        ProgressReporter::disabled().report(50, "ignored");
    }
}
