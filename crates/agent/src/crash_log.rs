//! Crash log — append-only record of failed behavior iterations.

use std::backtrace::Backtrace;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use shadowbot_core::{Behavior, Error};

/// One failed iteration.
#[derive(Debug)]
pub struct CrashEntry<'a> {
    pub timestamp: DateTime<Utc>,
    pub behavior: Behavior,
    pub iteration: u64,
    pub elapsed: Duration,
    pub error: &'a Error,
    /// Stack captured where the error was raised.
    pub backtrace: &'a Backtrace,
}

impl CrashEntry<'_> {
    /// The error followed by every `source()` below it.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.error.to_string()];
        let mut source = std::error::Error::source(self.error);
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        chain
    }

    fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== {} behavior={} iteration={} elapsed={:.1}s",
            self.timestamp.to_rfc3339(),
            self.behavior,
            self.iteration,
            self.elapsed.as_secs_f64()
        );
        for (depth, cause) in self.chain().iter().enumerate() {
            if depth == 0 {
                let _ = writeln!(out, "error: {cause}");
            } else {
                let _ = writeln!(out, "  caused by: {cause}");
            }
        }
        let _ = writeln!(out, "backtrace:\n{}", self.backtrace);
        out
    }
}

/// Appends [`CrashEntry`] records to a file.
#[derive(Debug, Clone)]
pub struct CrashLog {
    path: PathBuf,
}

impl CrashLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry, creating the file and its directory if needed.
    pub fn record(&self, entry: &CrashEntry<'_>) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.render().as_bytes())?;
        file.flush()
    }
}
