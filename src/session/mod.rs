//! Interactive shell session with a background reader.
//!
//! A [`ShellSession`] gives the orchestrator a synchronous-looking API over
//! an asynchronous transport: dispatch a command, then block until the
//! transcript proves it completed, failed, or the connection died. Two
//! workers run per session — a connection-lifetime worker that bridges
//! transport connect/teardown, and a reader worker that drains shell output
//! into the transcript and answers interactive confirmation requests.
//!
//! Transport failures never escape the workers: they are logged to the
//! session's sink and collapse into the liveness flag going false.

mod detector;
mod transcript;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audit::AuditSink;
use crate::transport::{ShellConnector, ShellStream, SshConfig};

pub use detector::{LineClass, PromptDetector};
pub use transcript::Transcript;

/// Connection status of a session.
///
/// Transitions only ever run `Disconnected → Connecting → Connected →
/// Disconnected`, or `→ Closing → Disconnected` on an explicit close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Outcome of one awaited command.
///
/// Produced per command from transcript content, consumed immediately by the
/// orchestrator; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// A prompt line arrived after the watermark.
    Success,

    /// The device reported an error; the offending line is attached.
    DeviceError(String),

    /// No completion or error signal within the allotted window.
    Timeout,

    /// The liveness flag went false while waiting.
    ConnectionLost,
}

struct Shared {
    host: String,
    status: watch::Sender<SessionStatus>,
    transcript: Transcript,
    detector: PromptDetector,
    cancel: CancellationToken,
    sink: Arc<dyn AuditSink>,
}

impl Shared {
    fn set_status(&self, status: SessionStatus) {
        self.status.send_replace(status);
    }

    /// Decode one raw chunk into transcript lines.
    ///
    /// Chunks are split on `\n`; carriage returns become spaces and trailing
    /// whitespace is dropped; blank segments are skipped. Chunk boundaries
    /// act as line boundaries — the device prompt arrives without a trailing
    /// newline and is only observable this way.
    ///
    /// Returns the auto-responder replies the reader must write back.
    fn ingest_chunk(&self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut replies = Vec::new();
        let mut rest = data;
        loop {
            let (segment, remainder) = match memchr::memchr(b'\n', rest) {
                Some(i) => (&rest[..i], Some(&rest[i + 1..])),
                None => (rest, None),
            };
            self.ingest_segment(segment, &mut replies);
            match remainder {
                Some(r) => rest = r,
                None => break,
            }
        }
        replies
    }

    fn ingest_segment(&self, segment: &[u8], replies: &mut Vec<Vec<u8>>) {
        let text = String::from_utf8_lossy(segment);
        let text = text.replace('\r', " ");
        let line = text.trim_end();
        if line.is_empty() {
            return;
        }

        self.sink.write(line);
        let class = self.detector.classify(line);
        self.transcript.append(line.to_string());

        // Interactive confirmation requests are answered immediately, once
        // per matching line, without waiting for a caller's command cycle.
        if class == LineClass::Confirmation {
            replies.push(b"y\n".to_vec());
            self.sink
                .write("auto-acknowledged non-secure interface prompt");
        }
    }
}

/// One interactive shell connection to one host.
pub struct ShellSession {
    shared: Arc<Shared>,
    writer: mpsc::Sender<Vec<u8>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ShellSession {
    /// Open a session: spawn the connection-lifetime worker and return
    /// immediately. Connect/auth failures do not surface here — the liveness
    /// flag stays false and the failure is written to the log sink. Use
    /// [`wait_for_live`](Self::wait_for_live) to await readiness.
    pub fn open(
        connector: Arc<dyn ShellConnector>,
        config: SshConfig,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::Disconnected);
        let shared = Arc::new(Shared {
            host: config.host.clone(),
            status,
            transcript: Transcript::new(),
            detector: PromptDetector::new(),
            cancel: CancellationToken::new(),
            sink,
        });
        shared.set_status(SessionStatus::Connecting);
        shared
            .sink
            .write(&format!("opening shell session to {}", shared.host));

        let (writer, write_rx) = mpsc::channel(16);
        let worker = tokio::spawn(connection_worker(
            shared.clone(),
            connector,
            config,
            write_rx,
        ));

        Self {
            shared,
            writer,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Whether the shell is currently usable.
    pub fn is_live(&self) -> bool {
        *self.shared.status.borrow() == SessionStatus::Connected
    }

    /// Current connection status.
    pub fn status(&self) -> SessionStatus {
        *self.shared.status.borrow()
    }

    /// Number of transcript lines so far. This is the watermark callers
    /// record before dispatching a command.
    pub fn transcript_len(&self) -> usize {
        self.shared.transcript.len()
    }

    /// Wait until the connection attempt settles, up to `timeout`.
    ///
    /// Returns `true` once the shell is ready; `false` on connect failure or
    /// when the timeout elapses first.
    pub async fn wait_for_live(&self, timeout: Duration) -> bool {
        let mut status = self.shared.status.subscribe();
        match tokio::time::timeout(
            timeout,
            status.wait_for(|s| *s != SessionStatus::Connecting),
        )
        .await
        {
            Ok(Ok(status)) => *status == SessionStatus::Connected,
            _ => false,
        }
    }

    /// Write `text` plus a newline to the shell if currently connected.
    ///
    /// Returns whether the write was attempted; a no-op `false` when the
    /// session is not live.
    pub async fn send_command(&self, text: &str) -> bool {
        if !self.is_live() {
            self.shared
                .sink
                .write(&format!("cannot send '{text}', shell not available"));
            return false;
        }

        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\n');
        match self.writer.send(bytes).await {
            Ok(()) => {
                self.shared.sink.write(&format!("sent: {text}"));
                true
            }
            Err(_) => {
                self.shared
                    .sink
                    .write(&format!("cannot send '{text}', shell worker gone"));
                false
            }
        }
    }

    /// Dispatch `text` and wait until the transcript proves completion.
    ///
    /// Records the current transcript length as a watermark, sends the
    /// command, then waits for the first conclusive line appended *after*
    /// the watermark: a prompt line is `Success`, a device-error line is
    /// `DeviceError`, loss of liveness is `ConnectionLost` (promptly, not
    /// after the full timeout), and `timeout` elapsing is `Timeout`.
    /// Pre-existing matching lines never produce a false positive.
    pub async fn send_command_await_completion(
        &self,
        text: &str,
        timeout: Duration,
    ) -> CompletionOutcome {
        let watermark = self.shared.transcript.len();
        if !self.send_command(text).await {
            return CompletionOutcome::ConnectionLost;
        }
        self.wait_from(watermark, timeout, text).await
    }

    /// Like [`send_command_await_completion`](Self::send_command_await_completion),
    /// for the one command expected to sever the connection.
    ///
    /// The management-address change reboots the device, which cannot echo a
    /// prompt on the old address while rebooting. For this operation only, a
    /// connection loss *after a successful dispatch* counts as `Success`.
    /// A dispatch that never reached the shell still fails.
    pub async fn send_command_expect_disconnect(
        &self,
        text: &str,
        timeout: Duration,
    ) -> CompletionOutcome {
        let watermark = self.shared.transcript.len();
        if !self.send_command(text).await {
            return CompletionOutcome::ConnectionLost;
        }
        match self.wait_from(watermark, timeout, text).await {
            CompletionOutcome::ConnectionLost => {
                self.shared
                    .sink
                    .write(&format!("disconnect after '{text}' treated as completion"));
                CompletionOutcome::Success
            }
            outcome => outcome,
        }
    }

    async fn wait_from(
        &self,
        watermark: usize,
        timeout: Duration,
        command: &str,
    ) -> CompletionOutcome {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut status = self.shared.status.subscribe();
        let mut cursor = watermark;

        loop {
            // Register for the wakeup before scanning so an append between
            // the scan and the wait is not lost. `enable` is required: an
            // unpolled Notified future misses `notify_waiters`.
            let notified = self.shared.transcript.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            for line in self.shared.transcript.lines_from(cursor) {
                cursor += 1;
                if self.shared.detector.is_echo(&line, command) {
                    continue;
                }
                match self.shared.detector.classify(&line) {
                    LineClass::Completion => return CompletionOutcome::Success,
                    LineClass::DeviceError => {
                        return CompletionOutcome::DeviceError(line);
                    }
                    LineClass::Confirmation | LineClass::Inconclusive => {}
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = status.wait_for(|s| *s != SessionStatus::Connected) => {
                    return CompletionOutcome::ConnectionLost;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return CompletionOutcome::Timeout;
                }
            }
        }
    }

    /// Signal the workers to stop, unblock any internal wait, and tear down
    /// the transport. Idempotent.
    pub async fn close(&self) {
        self.shared.cancel.cancel();
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("session worker for {} panicked: {e}", self.shared.host);
            }
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        // A dropped session must not leave workers holding the transport.
        self.shared.cancel.cancel();
    }
}

/// Connection-lifetime worker: establish the transport, hand the stream to
/// the reader worker, then hold until cancellation or remote disconnect and
/// publish the terminal status.
async fn connection_worker(
    shared: Arc<Shared>,
    connector: Arc<dyn ShellConnector>,
    config: SshConfig,
    write_rx: mpsc::Receiver<Vec<u8>>,
) {
    let stream = tokio::select! {
        _ = shared.cancel.cancelled() => {
            shared.sink.write("session closed before connect finished");
            shared.set_status(SessionStatus::Disconnected);
            return;
        }
        result = connector.connect(&config) => match result {
            Ok(stream) => stream,
            Err(e) => {
                shared.sink.write(&format!("connect to {} failed: {e}", shared.host));
                shared.set_status(SessionStatus::Disconnected);
                return;
            }
        },
    };

    shared.set_status(SessionStatus::Connected);
    shared.sink.write(&format!("shell ready on {}", shared.host));

    let mut reader = tokio::spawn(read_loop(shared.clone(), stream, write_rx));

    tokio::select! {
        _ = shared.cancel.cancelled() => {
            shared.set_status(SessionStatus::Closing);
            if let Err(e) = (&mut reader).await {
                warn!("reader for {} panicked: {e}", shared.host);
            }
        }
        result = &mut reader => {
            if let Err(e) = result {
                warn!("reader for {} panicked: {e}", shared.host);
            }
        }
    }

    shared.set_status(SessionStatus::Disconnected);
    shared.sink.write(&format!("connection to {} closed", shared.host));
}

/// Reader worker: drain shell output into the transcript, service write
/// requests, answer confirmation prompts, and release the transport on exit.
async fn read_loop(
    shared: Arc<Shared>,
    mut stream: Box<dyn ShellStream>,
    mut write_rx: mpsc::Receiver<Vec<u8>>,
) {
    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,

            request = write_rx.recv() => match request {
                Some(bytes) => {
                    if let Err(e) = stream.write(&bytes).await {
                        shared.sink.write(&format!("shell write failed: {e}"));
                        break;
                    }
                }
                None => break,
            },

            chunk = stream.read_chunk() => match chunk {
                Some(data) => {
                    for reply in shared.ingest_chunk(&data) {
                        if let Err(e) = stream.write(&reply).await {
                            shared.sink.write(&format!("auto-reply failed: {e}"));
                        }
                    }
                }
                None => {
                    debug!("shell stream from {} ended", shared.host);
                    break;
                }
            },
        }
    }
    stream.close().await;
}
