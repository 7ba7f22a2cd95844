//! Tracing setup: stderr for humans, plus an append-only run log on disk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Shared handle to the run log. Flushes whatever is buffered when dropped.
#[derive(Clone)]
pub struct RunLog {
    inner: Arc<Mutex<BufWriter<File>>>,
}

pub struct RunLogWriter<'a>(MutexGuard<'a, BufWriter<File>>);

impl RunLog {
    /// Open `path` for appending and write the run separator.
    pub fn open(path: &Path, command: &str) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let log = RunLog {
            inner: Arc::new(Mutex::new(BufWriter::new(file))),
        };
        {
            let mut w = log.lock();
            writeln!(
                w,
                "\n--- New run started ({}, {}) ---",
                command,
                Utc::now().to_rfc3339()
            )?;
            w.flush()?;
        }
        Ok(log)
    }

    fn lock(&self) -> MutexGuard<'_, BufWriter<File>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn flush(&self) -> io::Result<()> {
        self.lock().flush()
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for RunLog {
    type Writer = RunLogWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RunLogWriter(self.lock())
    }
}

impl Write for RunLogWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Stderr only. Used by read-only commands.
pub fn init_console() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .try_init();
}

/// Stderr plus the run log. Keep the returned handle alive for the whole command.
pub fn init_with_run_log(path: &Path, command: &str) -> Result<RunLog> {
    let log = RunLog::open(path, command)?;
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(log.clone()))
        .try_init();
    Ok(log)
}
