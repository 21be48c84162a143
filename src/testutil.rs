//! Shared test doubles: a scripted in-memory shell, a canned reachability
//! probe, and an in-memory audit sink.
//!
//! The scripted shell mimics the device's PTY behavior: responses arrive as
//! raw chunks with `\r\n` separators and an unterminated trailing prompt,
//! and dropping the connection mid-command looks exactly like the reboot
//! disconnect.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audit::AuditSink;
use crate::error::TransportError;
use crate::probe::ReachabilityProbe;
use crate::transport::{ShellConnector, ShellStream, SshConfig};

/// How a scripted shell answers one written line.
pub(crate) enum Reply {
    /// Emit these lines as one chunk (joined with `\r\n`, no trailing newline).
    Lines(Vec<String>),

    /// Emit nothing.
    Nothing,

    /// Close the connection without responding.
    DropConnection,

    /// Emit these lines, then close the connection.
    LinesThenDrop(Vec<String>),
}

type Script = Arc<dyn Fn(&str) -> Reply + Send + Sync>;

enum Behavior {
    Shell {
        banner: Vec<String>,
        script: Script,
        writes: Arc<Mutex<Vec<String>>>,
    },
    Hang,
}

/// Queue-driven [`ShellConnector`]: each connect consumes one behavior.
/// An empty queue refuses the connection.
pub(crate) struct ScriptedConnector {
    queue: Mutex<VecDeque<Behavior>>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
        })
    }

    /// Queue a shell that greets with `banner` and answers per `script`.
    /// Returns a handle recording every line written to the shell.
    pub(crate) fn push_shell(
        &self,
        banner: &[&str],
        script: impl Fn(&str) -> Reply + Send + Sync + 'static,
    ) -> Arc<Mutex<Vec<String>>> {
        let writes = Arc::new(Mutex::new(Vec::new()));
        self.queue.lock().unwrap().push_back(Behavior::Shell {
            banner: banner.iter().map(|s| s.to_string()).collect(),
            script: Arc::new(script),
            writes: writes.clone(),
        });
        writes
    }

    /// Queue a connect attempt that never resolves.
    pub(crate) fn push_hang(&self) {
        self.queue.lock().unwrap().push_back(Behavior::Hang);
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShellConnector for ScriptedConnector {
    async fn connect(
        &self,
        _config: &SshConfig,
    ) -> Result<Box<dyn ShellStream>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self.queue.lock().unwrap().pop_front();
        match behavior {
            Some(Behavior::Shell {
                banner,
                script,
                writes,
            }) => Ok(Box::new(ScriptedShell::new(banner, script, writes))),
            Some(Behavior::Hang) => std::future::pending().await,
            None => Err(TransportError::Disconnected),
        }
    }
}

pub(crate) struct ScriptedShell {
    script: Script,
    writes: Arc<Mutex<Vec<String>>>,
    chunk_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    chunk_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl ScriptedShell {
    fn new(banner: Vec<String>, script: Script, writes: Arc<Mutex<Vec<String>>>) -> Self {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let shell = Self {
            script,
            writes,
            chunk_tx: Some(chunk_tx),
            chunk_rx,
        };
        if !banner.is_empty() {
            shell.emit(&banner);
        }
        shell
    }

    fn emit(&self, lines: &[String]) {
        if let Some(tx) = &self.chunk_tx {
            let _ = tx.send(lines.join("\r\n").into_bytes());
        }
    }
}

#[async_trait]
impl ShellStream for ScriptedShell {
    async fn read_chunk(&mut self) -> Option<Vec<u8>> {
        // Buffered chunks drain even after the sender is dropped, so a
        // LinesThenDrop response is observed before the EOF.
        self.chunk_rx.recv().await
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let line = String::from_utf8_lossy(bytes).trim_end().to_string();
        self.writes.lock().unwrap().push(line.clone());
        match (self.script)(&line) {
            Reply::Lines(lines) => self.emit(&lines),
            Reply::Nothing => {}
            Reply::DropConnection => self.chunk_tx = None,
            Reply::LinesThenDrop(lines) => {
                self.emit(&lines);
                self.chunk_tx = None;
            }
        }
        Ok(())
    }

    async fn close(&mut self) {}
}

/// Canned per-host reachability with call counting.
pub(crate) struct FakeProbe {
    reachable: Mutex<HashMap<String, bool>>,
    calls: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            reachable: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set(&self, host: &str, reachable: bool) {
        self.reachable
            .lock()
            .unwrap()
            .insert(host.to_string(), reachable);
    }

    pub(crate) fn calls_for(&self, host: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|h| *h == host).count()
    }
}

#[async_trait]
impl ReachabilityProbe for FakeProbe {
    async fn probe(&self, host: &str, _timeout: Duration) -> bool {
        self.calls.lock().unwrap().push(host.to_string());
        self.reachable
            .lock()
            .unwrap()
            .get(host)
            .copied()
            .unwrap_or(false)
    }
}

/// [`AuditSink`] collecting messages in memory.
pub(crate) struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub(crate) fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn count_with_prefix(&self, prefix: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.starts_with(prefix))
            .count()
    }

    pub(crate) fn contains(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l.contains(needle))
    }
}

impl AuditSink for MemorySink {
    fn write(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}
