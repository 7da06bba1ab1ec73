//! Append-only session log

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Writer factory appending each formatted event to the session log file
#[derive(Debug, Clone)]
pub struct SessionLog {
    path: Arc<PathBuf>,
}

impl SessionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<'a> MakeWriter<'a> for SessionLog {
    type Writer = SessionLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SessionLogWriter {
            path: Arc::clone(&self.path),
        }
    }
}

/// Writer for one log event
pub struct SessionLogWriter {
    path: Arc<PathBuf>,
}

impl Write for SessionLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_path())
            .and_then(|mut file| file.write_all(buf));

        if appended.is_err() {
            // Logging must never fail the caller
            let _ = io::stderr().write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// `[YYYY-mm-dd HH:MM:SS]` local timestamps
struct BracketedLocalTime;

impl FormatTime for BracketedLocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "[{}]", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Subscriber writing human-readable lines to the session log
pub fn session_subscriber(
    path: &Path,
    log_level: &str,
) -> impl tracing::Subscriber + Send + Sync + 'static {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(SessionLog::new(path))
        .with_timer(BracketedLocalTime)
        .with_ansi(false)
        .with_target(false)
        .finish()
}

/// Last `lines` lines of a session log; a missing log reads as empty
pub async fn read_log_tail(path: &Path, lines: usize) -> io::Result<Vec<String>> {
    let content = match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let all: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].iter().map(|l| l.to_string()).collect())
}
