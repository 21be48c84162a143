//! The two-phase provisioning state machine.
//!
//! Phase 1 pushes the baseline configuration to the device's current
//! address and ends with the management-address change that reboots it.
//! After a fixed reboot wait and a reachability poll, phase 2 opens a fresh
//! session against the new address and persists the configuration again.
//! Phase 1 retries whole attempts with a bounded budget; phase 2 runs once.

use std::sync::Arc;
use std::time::Instant;

use log::info;
use tokio::time::sleep;

use super::commands::{
    ENTER_CONFIG, first_phase_commands, management_address_command, second_phase_commands,
};
use super::config::ProvisionConfig;
use crate::audit::{AuditLog, AuditSink};
use crate::error::Result;
use crate::probe::{ReachabilityProbe, TcpProbe};
use crate::session::{CompletionOutcome, ShellSession};
use crate::transport::{ShellConnector, SshConfig, SshConnector};

/// Terminal outcome of a provisioning run.
///
/// A run never returns an error: every failure mode collapses into one of
/// these, each carrying a distinct user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Both phases completed.
    FullSuccess,

    /// Phase 1 never completed within its attempt budget (or the device was
    /// unreachable to begin with).
    Phase1Failed,

    /// Phase 1 completed but the device never answered on its new address.
    UnreachableAfterReboot,

    /// The device is up on its new address but phase 2 did not complete;
    /// the persisted configuration should be checked by hand.
    Phase2Incomplete,
}

impl std::fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::FullSuccess => "provisioning completed successfully",
            Self::Phase1Failed => "initial configuration could not be completed",
            Self::UnreachableAfterReboot => "device is not reachable on its new address",
            Self::Phase2Incomplete => "configuration on the new address may be incomplete",
        };
        f.write_str(message)
    }
}

/// Drives a provisioning run end to end.
pub struct Provisioner {
    config: ProvisionConfig,
    connector: Arc<dyn ShellConnector>,
    probe: Arc<dyn ReachabilityProbe>,
    sink: Arc<dyn AuditSink>,
    session_sink: Arc<dyn AuditSink>,
}

impl Provisioner {
    /// Create a provisioner with the production collaborators: russh
    /// sessions, a TCP probe against the configured SSH port, and audit
    /// files under `logs/`.
    pub fn new(config: ProvisionConfig) -> Result<Self> {
        let probe = TcpProbe::new(config.ssh_port);
        Self::with_collaborators(
            config,
            Arc::new(SshConnector),
            Arc::new(probe),
            Arc::new(AuditLog::new("logs", "provision")),
            Arc::new(AuditLog::new("logs", "shell")),
        )
    }

    /// Create a provisioner with explicit collaborators.
    pub fn with_collaborators(
        config: ProvisionConfig,
        connector: Arc<dyn ShellConnector>,
        probe: Arc<dyn ReachabilityProbe>,
        sink: Arc<dyn AuditSink>,
        session_sink: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            probe,
            sink,
            session_sink,
        })
    }

    /// Run the whole workflow and report the terminal outcome.
    pub async fn run(&self) -> ProvisionOutcome {
        let outcome = self.execute().await;
        self.sink.write(&format!("run finished: {outcome}"));
        info!("provisioning run finished: {outcome}");
        outcome
    }

    async fn execute(&self) -> ProvisionOutcome {
        self.sink.write(&format!(
            "provisioning run started: {} -> {}",
            self.config.current_host, self.config.new_host
        ));

        if !self
            .poll_reachable(&self.config.current_host, self.config.initial_probe_window)
            .await
        {
            self.sink.write(&format!(
                "no answer from {}, check the link to the device",
                self.config.current_host
            ));
            return ProvisionOutcome::Phase1Failed;
        }

        if !self.run_first_phase().await {
            return ProvisionOutcome::Phase1Failed;
        }

        self.sink.write(&format!(
            "waiting {}s for the device to reboot on {}",
            self.config.reboot_wait.as_secs(),
            self.config.new_host
        ));
        sleep(self.config.reboot_wait).await;

        if !self
            .poll_reachable(&self.config.new_host, self.config.probe_window)
            .await
        {
            return ProvisionOutcome::UnreachableAfterReboot;
        }

        if self.run_second_phase().await {
            ProvisionOutcome::FullSuccess
        } else {
            ProvisionOutcome::Phase2Incomplete
        }
    }

    /// Phase 1 with its bounded attempt budget. Every attempt gets a fresh
    /// session; a failed attempt closes it and backs off before retrying.
    async fn run_first_phase(&self) -> bool {
        let commands = first_phase_commands(&self.config.device_hostname);

        for attempt in 1..=self.config.max_attempts {
            self.sink.write(&format!(
                "phase 1 attempt {attempt}/{}: connecting to {}",
                self.config.max_attempts, self.config.current_host
            ));

            let session = self.open_session(&self.config.current_host);
            let completed = self.first_phase_attempt(&session, &commands).await;
            session.close().await;

            if completed {
                self.sink.write("phase 1 complete on the old address");
                return true;
            }
            if attempt < self.config.max_attempts {
                sleep(self.config.retry_backoff).await;
            }
        }

        self.sink.write(&format!(
            "phase 1 failed after {} attempts",
            self.config.max_attempts
        ));
        false
    }

    async fn first_phase_attempt(&self, session: &ShellSession, commands: &[String]) -> bool {
        if !session.wait_for_live(self.config.liveness_timeout).await {
            self.sink
                .write("shell not ready in time, restarting the attempt");
            return false;
        }

        if !self.run_command_list(session, commands).await {
            return false;
        }

        // The address change is a configuration command; the list above left
        // the shell at the exec prompt after persisting.
        let reenter = [ENTER_CONFIG.to_string()];
        if !self.run_command_list(session, &reenter).await {
            return false;
        }

        let address_change = management_address_command(&self.config.new_host);
        self.sink
            .write(&format!("dispatched: {address_change} (disconnect expected)"));
        match session
            .send_command_expect_disconnect(&address_change, self.config.address_change_timeout)
            .await
        {
            CompletionOutcome::Success => {
                self.sink.write("management address change confirmed");
                true
            }
            outcome => {
                self.sink.write(&format!(
                    "management address change failed: {}",
                    describe(&outcome)
                ));
                false
            }
        }
    }

    /// Phase 2: single attempt against the new address, close regardless.
    async fn run_second_phase(&self) -> bool {
        self.sink.write(&format!(
            "phase 2: connecting to {}",
            self.config.new_host
        ));

        let session = self.open_session(&self.config.new_host);
        let completed = if session.wait_for_live(self.config.liveness_timeout).await {
            self.run_command_list(&session, &second_phase_commands())
                .await
        } else {
            self.sink
                .write("shell on the new address never became ready");
            false
        };
        session.close().await;

        if completed {
            self.sink.write("phase 2 complete on the new address");
        }
        completed
    }

    /// Submit commands one at a time, aborting the rest of the list on the
    /// first non-success outcome.
    async fn run_command_list(&self, session: &ShellSession, commands: &[String]) -> bool {
        for command in commands {
            self.sink.write(&format!("dispatched: {command}"));
            match session
                .send_command_await_completion(command, self.config.command_timeout)
                .await
            {
                CompletionOutcome::Success => {
                    self.sink.write(&format!("completed: {command}"));
                }
                outcome => {
                    self.sink
                        .write(&format!("'{command}' failed: {}", describe(&outcome)));
                    return false;
                }
            }
        }
        true
    }

    async fn poll_reachable(&self, host: &str, window: std::time::Duration) -> bool {
        self.sink.write(&format!(
            "probing {host} (window {}s)",
            window.as_secs()
        ));

        let deadline = Instant::now() + window;
        while Instant::now() <= deadline {
            if self.probe.probe(host, self.config.probe_timeout).await {
                self.sink.write(&format!("{host} is reachable"));
                return true;
            }
            sleep(self.config.probe_interval).await;
        }

        self.sink
            .write(&format!("{host} did not answer within the window"));
        false
    }

    fn open_session(&self, host: &str) -> ShellSession {
        let config = SshConfig::password(
            host,
            self.config.credentials.username.as_str(),
            self.config.credentials.password.clone(),
        )
        .with_port(self.config.ssh_port);
        ShellSession::open(self.connector.clone(), config, self.session_sink.clone())
    }
}

fn describe(outcome: &CompletionOutcome) -> String {
    match outcome {
        CompletionOutcome::Success => "success".to_string(),
        CompletionOutcome::DeviceError(line) => format!("device error: {line}"),
        CompletionOutcome::Timeout => "no completion signal before the timeout".to_string(),
        CompletionOutcome::ConnectionLost => "connection lost".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testutil::{FakeProbe, MemorySink, Reply, ScriptedConnector};

    const OLD_HOST: &str = "192.168.127.254";
    const NEW_HOST: &str = "10.20.1.5";

    fn fast_config() -> ProvisionConfig {
        let mut config = ProvisionConfig::new(OLD_HOST, NEW_HOST, "rack-07");
        config.max_attempts = 2;
        config.liveness_timeout = Duration::from_millis(200);
        config.retry_backoff = Duration::from_millis(10);
        config.command_timeout = Duration::from_millis(500);
        config.address_change_timeout = Duration::from_millis(500);
        config.reboot_wait = Duration::from_millis(10);
        config.initial_probe_window = Duration::from_millis(50);
        config.probe_window = Duration::from_millis(50);
        config.probe_interval = Duration::from_millis(10);
        config.probe_timeout = Duration::from_millis(10);
        config
    }

    /// A compliant device: echo plus prompt for everything, and the reboot
    /// disconnect right after the management-address change.
    fn device_script(cmd: &str) -> Reply {
        if cmd.starts_with("ip management address") {
            Reply::LinesThenDrop(vec![format!("MOXA(config)# {cmd}")])
        } else {
            Reply::Lines(vec![format!("MOXA(config)# {cmd}"), "MOXA(config)#".to_string()])
        }
    }

    fn provisioner(
        config: ProvisionConfig,
        connector: Arc<ScriptedConnector>,
        probe: Arc<FakeProbe>,
        sink: Arc<MemorySink>,
    ) -> Provisioner {
        Provisioner::with_collaborators(
            config,
            connector,
            probe,
            sink,
            Arc::new(MemorySink::new()),
        )
        .unwrap()
    }

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[tokio::test]
    async fn full_run_succeeds_with_compliant_device() {
        init_logs();
        let connector = ScriptedConnector::new();
        connector.push_shell(&[], device_script);
        connector.push_shell(&[], device_script);

        let probe = FakeProbe::new();
        probe.set(OLD_HOST, true);
        probe.set(NEW_HOST, true);

        let sink = Arc::new(MemorySink::new());
        let provisioner = provisioner(fast_config(), connector.clone(), probe.clone(), sink.clone());

        assert_eq!(provisioner.run().await, ProvisionOutcome::FullSuccess);

        // One session per phase, never shared across the reboot.
        assert_eq!(connector.connect_count(), 2);
        assert!(probe.calls_for(NEW_HOST) >= 1);

        // Base list + config re-entry + address change, then phase 2.
        let base = first_phase_commands("rack-07").len();
        assert_eq!(sink.count_with_prefix("dispatched: "), base + 3);
        assert_eq!(sink.count_with_prefix("completed: "), base + 2);
        assert!(sink.contains("management address change confirmed"));
        assert!(sink.contains("run finished: provisioning completed successfully"));
    }

    #[tokio::test]
    async fn three_commands_log_three_dispatch_completion_pairs() {
        let connector = ScriptedConnector::new();
        connector.push_shell(&[], |cmd| {
            Reply::Lines(vec![format!("switch# {cmd}"), "switch#".to_string()])
        });

        let probe = FakeProbe::new();
        let sink = Arc::new(MemorySink::new());
        let provisioner = provisioner(fast_config(), connector.clone(), probe, sink.clone());

        let session = provisioner.open_session(OLD_HOST);
        assert!(session.wait_for_live(Duration::from_secs(1)).await);

        let commands: Vec<String> = ["alpha", "beta", "gamma"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert!(provisioner.run_command_list(&session, &commands).await);
        session.close().await;

        assert_eq!(sink.count_with_prefix("dispatched: "), 3);
        assert_eq!(sink.count_with_prefix("completed: "), 3);
    }

    #[tokio::test]
    async fn first_attempt_without_liveness_is_retried() {
        let connector = ScriptedConnector::new();
        connector.push_hang();
        connector.push_shell(&[], device_script);
        connector.push_shell(&[], device_script);

        let probe = FakeProbe::new();
        probe.set(OLD_HOST, true);
        probe.set(NEW_HOST, true);

        let sink = Arc::new(MemorySink::new());
        let provisioner = provisioner(fast_config(), connector.clone(), probe.clone(), sink.clone());

        assert_eq!(provisioner.run().await, ProvisionOutcome::FullSuccess);
        assert_eq!(connector.connect_count(), 3);
        assert!(sink.contains("phase 1 attempt 2/2"));
        // Success is only reported after the reboot wait and the poll.
        assert!(probe.calls_for(NEW_HOST) >= 1);
    }

    #[tokio::test]
    async fn unreachable_new_address_skips_phase_two() {
        let connector = ScriptedConnector::new();
        connector.push_shell(&[], device_script);

        let probe = FakeProbe::new();
        probe.set(OLD_HOST, true);
        probe.set(NEW_HOST, false);

        let sink = Arc::new(MemorySink::new());
        let provisioner = provisioner(fast_config(), connector.clone(), probe.clone(), sink.clone());

        assert_eq!(
            provisioner.run().await,
            ProvisionOutcome::UnreachableAfterReboot
        );
        // Phase 2 never opened a session.
        assert_eq!(connector.connect_count(), 1);
        assert!(probe.calls_for(NEW_HOST) >= 2);
    }

    #[tokio::test]
    async fn device_error_aborts_the_list_and_exhausts_attempts() {
        let failing_script = |cmd: &str| {
            if cmd == "rstp enable" {
                Reply::Lines(vec![
                    format!("MOXA(config)# {cmd}"),
                    "% Invalid input detected at '^' marker.".to_string(),
                ])
            } else {
                Reply::Lines(vec![format!("MOXA(config)# {cmd}"), "MOXA(config)#".to_string()])
            }
        };

        let connector = ScriptedConnector::new();
        let first_writes = connector.push_shell(&[], failing_script);
        connector.push_shell(&[], failing_script);

        let probe = FakeProbe::new();
        probe.set(OLD_HOST, true);

        let sink = Arc::new(MemorySink::new());
        let provisioner = provisioner(fast_config(), connector.clone(), probe, sink.clone());

        assert_eq!(provisioner.run().await, ProvisionOutcome::Phase1Failed);

        // "rstp enable" is the ninth command; nothing after it was sent.
        let sent = first_writes.lock().unwrap().clone();
        assert_eq!(sent.len(), 9);
        assert_eq!(sent.last().unwrap(), "rstp enable");
        assert!(sink.contains("phase 1 failed after 2 attempts"));
    }

    #[tokio::test]
    async fn unexpected_disconnect_mid_list_fails_the_attempt() {
        let dropping_script = |cmd: &str| {
            if cmd == "ptp enable" {
                Reply::DropConnection
            } else {
                device_script(cmd)
            }
        };

        let connector = ScriptedConnector::new();
        connector.push_shell(&[], dropping_script);
        connector.push_shell(&[], dropping_script);

        let probe = FakeProbe::new();
        probe.set(OLD_HOST, true);

        let sink = Arc::new(MemorySink::new());
        let provisioner = provisioner(fast_config(), connector.clone(), probe, sink.clone());

        // The disconnect is only expected after the address change; during
        // the base list it fails the attempt.
        assert_eq!(provisioner.run().await, ProvisionOutcome::Phase1Failed);
        assert!(sink.contains("'ptp enable' failed: connection lost"));
    }

    #[tokio::test]
    async fn failing_second_phase_reports_incomplete() {
        let connector = ScriptedConnector::new();
        connector.push_shell(&[], device_script);
        connector.push_shell(&[], |cmd| {
            Reply::Lines(vec![
                format!("MOXA# {cmd}"),
                "Error: flash write failed".to_string(),
            ])
        });

        let probe = FakeProbe::new();
        probe.set(OLD_HOST, true);
        probe.set(NEW_HOST, true);

        let sink = Arc::new(MemorySink::new());
        let provisioner = provisioner(fast_config(), connector.clone(), probe, sink.clone());

        assert_eq!(provisioner.run().await, ProvisionOutcome::Phase2Incomplete);
        assert!(sink.contains("run finished: configuration on the new address may be incomplete"));
    }

    #[tokio::test]
    async fn unreachable_old_address_aborts_before_any_session() {
        let connector = ScriptedConnector::new();
        let probe = FakeProbe::new();
        probe.set(OLD_HOST, false);

        let sink = Arc::new(MemorySink::new());
        let provisioner = provisioner(fast_config(), connector.clone(), probe, sink.clone());

        assert_eq!(provisioner.run().await, ProvisionOutcome::Phase1Failed);
        assert_eq!(connector.connect_count(), 0);
        assert!(sink.contains("check the link to the device"));
    }
}
