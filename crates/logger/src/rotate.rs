//! Size-bounded rotating log file writer.
//!
//! A frozen or crash-looping process can produce unbounded log growth right
//! when the log matters most, so the durable log file rotates once it reaches
//! a byte bound and keeps a fixed number of numbered backups
//! (`watchdog.log.1` is the most recent).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone, Copy)]
pub struct RotationConfig {
    /// Rotate once the current file would exceed this many bytes.
    pub max_bytes: u64,
    /// Number of rotated backups to retain.
    pub max_backups: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self { max_bytes: 5 * 1024 * 1024, max_backups: 3 }
    }
}

struct Inner {
    file: File,
    written: u64,
    path: PathBuf,
    config: RotationConfig,
}

/// Shared handle to a rotating log file. Cloning shares the underlying file;
/// writes are serialized through a mutex.
#[derive(Clone)]
pub struct RotatingFileWriter {
    inner: Arc<Mutex<Inner>>,
}

impl RotatingFileWriter {
    pub fn create(path: impl AsRef<Path>, config: RotationConfig) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self { inner: Arc::new(Mutex::new(Inner { file, written, path, config })) })
    }
}

impl Inner {
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        for index in (1..self.config.max_backups).rev() {
            let from = backup_path(&self.path, index);
            if from.exists() {
                fs::rename(&from, backup_path(&self.path, index + 1))?;
            }
        }
        if self.config.max_backups > 0 {
            fs::rename(&self.path, backup_path(&self.path, 1))?;
        } else {
            fs::remove_file(&self.path)?;
        }
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.written > 0 && inner.written + buf.len() as u64 > inner.config.max_bytes {
            inner.rotate()?;
        }
        let written = inner.file.write(buf)?;
        inner.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
