//! # moxaprov
//!
//! Automated re-addressing and baseline provisioning for Moxa-class
//! switches over interactive SSH.
//!
//! The device speaks a free-form CLI over a PTY — there is no response
//! framing. moxaprov drives it anyway: a background reader drains shell
//! output into an append-only transcript, a heuristic detector classifies
//! lines as prompt, device error, or confirmation request, and a two-phase
//! orchestrator pushes the fixed command plan, survives the reboot
//! disconnect caused by the management-address change, and resumes on the
//! new address once it answers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use moxaprov::{ProvisionConfig, ProvisionOutcome, Provisioner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), moxaprov::Error> {
//!     let config = ProvisionConfig::new("192.168.127.254", "10.20.1.5", "rack-07");
//!     let provisioner = Provisioner::new(config)?;
//!
//!     match provisioner.run().await {
//!         ProvisionOutcome::FullSuccess => println!("switch provisioned"),
//!         outcome => eprintln!("{outcome}"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod error;
pub mod probe;
pub mod provision;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export main types for convenience
pub use audit::{AuditLog, AuditSink};
pub use error::{ConfigError, Error, TransportError};
pub use probe::{ReachabilityProbe, TcpProbe};
pub use provision::{Credentials, ProvisionConfig, ProvisionOutcome, Provisioner};
pub use session::{CompletionOutcome, SessionStatus, ShellSession};
pub use transport::{AuthMethod, ShellConnector, ShellStream, SshConfig, SshConnector};
