//! Append-only audit log files.
//!
//! One text file per logical log name, one line per message, formatted
//! `[dd.MM.yy:HH.mm.ss] message`. On the first write of a run, a file whose
//! most recent line predates today is archived to `<ddMMyyyy>_<name>.txt`
//! and a fresh file is started. Write failures are reported through the
//! `log` facade and never interrupt a provisioning run.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, NaiveDate, NaiveDateTime};
use log::{debug, warn};

const TIMESTAMP_FORMAT: &str = "%d.%m.%y:%H.%M.%S";
const ARCHIVE_DATE_FORMAT: &str = "%d%m%Y";

/// Sink for audit messages.
///
/// The session and the orchestrator only ever append formatted one-liners;
/// tests substitute an in-memory sink to assert on the emitted sequence.
pub trait AuditSink: Send + Sync {
    /// Append one message.
    fn write(&self, message: &str);
}

/// File-backed [`AuditSink`].
pub struct AuditLog {
    name: String,
    dir: PathBuf,
    first_write: Mutex<bool>,
}

impl AuditLog {
    /// Create a log named `name` under `dir`. Nothing touches the filesystem
    /// until the first write.
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            first_write: Mutex::new(true),
        }
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(format!("{}.txt", self.name))
    }

    fn append(&self, message: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.log_path();

        {
            let mut first = self.first_write.lock().unwrap();
            if *first {
                *first = false;
                if let Err(e) = self.archive_if_stale(&path) {
                    // A broken old file must not block today's log.
                    debug!("could not archive {}: {e}", path.display());
                }
            }
        }

        let timestamp = Local::now().format(TIMESTAMP_FORMAT);
        let line = format!("[{timestamp}] {message}\n");
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?
            .write_all(line.as_bytes())
    }

    /// Archive `path` to a dated filename if its last line predates today.
    fn archive_if_stale(&self, path: &Path) -> io::Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let contents = fs::read_to_string(path)?;
        let Some(last_date) = contents.lines().rev().find_map(parse_line_date) else {
            return Ok(());
        };
        if last_date >= Local::now().date_naive() {
            return Ok(());
        }

        let archive = self.dir.join(format!(
            "{}_{}.txt",
            last_date.format(ARCHIVE_DATE_FORMAT),
            self.name
        ));
        fs::copy(path, &archive)?;
        fs::remove_file(path)?;
        debug!("archived stale log to {}", archive.display());
        Ok(())
    }
}

impl AuditSink for AuditLog {
    fn write(&self, message: &str) {
        debug!("{}: {message}", self.name);
        if let Err(e) = self.append(message) {
            warn!("audit log '{}' write failed: {e}", self.name);
        }
    }
}

/// Extract the date from a `[dd.MM.yy:HH.mm.ss] ...` line.
fn parse_line_date(line: &str) -> Option<NaiveDate> {
    let stamp = line.strip_prefix('[')?.split(']').next()?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.date())
}
