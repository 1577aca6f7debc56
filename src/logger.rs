use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_FILTER: &str = "info";

/// Append-only log file shared by every tracing event.
#[derive(Clone)]
pub struct LogFile {
  file: Arc<Mutex<File>>,
}

impl LogFile {
  pub fn open(path: &Path) -> io::Result<Self> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Self {
      file: Arc::new(Mutex::new(file)),
    })
  }
}

pub struct LogFileGuard {
  file: Arc<Mutex<File>>,
}

impl Write for LogFileGuard {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    match self.file.lock() {
      Ok(mut file) => file.write(buf),
      Err(_) => Ok(buf.len()),
    }
  }

  fn flush(&mut self) -> io::Result<()> {
    match self.file.lock() {
      Ok(mut file) => file.flush(),
      Err(_) => Ok(()),
    }
  }
}

impl<'a> MakeWriter<'a> for LogFile {
  type Writer = LogFileGuard;

  fn make_writer(&'a self) -> Self::Writer {
    LogFileGuard {
      file: self.file.clone(),
    }
  }
}

/// Installs the global subscriber: human-readable lines on stderr plus the
/// same events, without ANSI colours, appended to `log_path`. `RUST_LOG`
/// overrides the default filter.
pub fn init(log_path: &Path) -> anyhow::Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
  let file = LogFile::open(log_path)?;

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(io::stderr))
    .with(fmt::layer().with_ansi(false).with_writer(file))
    .try_init()?;
  Ok(())
}
