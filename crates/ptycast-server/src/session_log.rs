//! Rolling on-disk session log.
//!
//! `ws.log` grows until it passes `max_bytes`, then shifts to `ws.log.1`
//! (and `.1` to `.2`, up to `keep`). Plugs into `tracing_subscriber` as a
//! [`MakeWriter`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug)]
struct LogFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    keep: usize,
}

impl LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.keep > 0 {
            for n in (1..self.keep).rev() {
                let from = numbered(&self.path, n);
                if from.exists() {
                    fs::rename(&from, numbered(&self.path, n + 1))?;
                }
            }
            fs::rename(&self.path, numbered(&self.path, 1))?;
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn numbered(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Cloneable handle to the rolling log file.
#[derive(Debug, Clone)]
pub struct SessionLog {
    inner: Arc<Mutex<LogFile>>,
}

impl SessionLog {
    /// Open (or create) the log for appending. Parent directories are created.
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, keep: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            inner: Arc::new(Mutex::new(LogFile {
                path,
                file,
                written,
                max_bytes: max_bytes.max(1),
                keep,
            })),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogFile> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Writer handed out per event.
#[derive(Debug)]
pub struct SessionLogWriter {
    log: SessionLog,
}

impl Write for SessionLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.log.lock().write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.log.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for SessionLog {
    type Writer = SessionLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SessionLogWriter { log: self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_line(log: &SessionLog, line: &str) {
        log.make_writer().write_all(line.as_bytes()).unwrap();
    }

    #[test]
    fn creates_parent_directories_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("ws.log");

        let log = SessionLog::open(&path, 1024, 2).unwrap();
        write_line(&log, "first\n");
        drop(log);

        let log = SessionLog::open(&path, 1024, 2).unwrap();
        write_line(&log, "second\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        assert_eq!(log.path(), path);
    }

    #[test]
    fn rotates_past_max_bytes_and_keeps_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ws.log");
        let log = SessionLog::open(&path, 10, 2).unwrap();

        write_line(&log, "aaaaaaaa\n"); // 9 bytes
        write_line(&log, "bbbbbbbb\n"); // rotates: a → .1
        write_line(&log, "cccccccc\n"); // rotates: a → .2, b → .1
        write_line(&log, "dddddddd\n"); // rotates: a dropped

        assert_eq!(fs::read_to_string(&path).unwrap(), "dddddddd\n");
        assert_eq!(fs::read_to_string(numbered(&path, 1)).unwrap(), "cccccccc\n");
        assert_eq!(fs::read_to_string(numbered(&path, 2)).unwrap(), "bbbbbbbb\n");
        assert!(!numbered(&path, 3).exists());
    }

    #[test]
    fn keep_zero_truncates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ws.log");
        let log = SessionLog::open(&path, 4, 0).unwrap();

        write_line(&log, "one\n");
        write_line(&log, "two\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "two\n");
        assert!(!numbered(&path, 1).exists());
    }

    #[test]
    fn oversized_line_is_written_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ws.log");
        let log = SessionLog::open(&path, 4, 1).unwrap();

        write_line(&log, "a line longer than the limit\n");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "a line longer than the limit\n"
        );
    }
}
