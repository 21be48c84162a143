//! Append-only transcript of decoded shell output lines.
//!
//! The reader worker is the sole writer; completion waiters take a watermark
//! (the current length) before dispatching a command and only ever look at
//! lines appended after it. The mutex is held only for an append or a
//! bounded copy, never across an await point.

use std::sync::Mutex;

use tokio::sync::Notify;

/// Ordered, append-only sequence of output lines with wake-on-append.
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Mutex<Vec<String>>,
    appended: Notify,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of lines. Used as the watermark for a command about to
    /// be dispatched; the index only grows.
    pub fn len(&self) -> usize {
        self.lines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one decoded line and wake every waiter.
    pub fn append(&self, line: String) {
        self.lines.lock().unwrap().push(line);
        self.appended.notify_waiters();
    }

    /// Copy of all lines at index >= `from`.
    pub fn lines_from(&self, from: usize) -> Vec<String> {
        let lines = self.lines.lock().unwrap();
        if from >= lines.len() {
            return Vec::new();
        }
        lines[from..].to_vec()
    }

    /// Future that resolves on the next append.
    ///
    /// Callers must pin and `enable` it *before* scanning for
    /// already-appended lines, otherwise an append between the scan and
    /// the wait is lost.
    pub fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.appended.notified()
    }
}
