//! # Controller
//!
//! Core reconciliation logic for the Registry Credentials Controller.
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `engine`: One reconciliation pass per source
//! - `phase`: Lifecycle phase transitions (sole writer of `status.phase`)
//! - `resync`: Next-run calculation after a successful pass
//! - `secret`: Docker config payload and pull secret create-or-update

pub mod backoff;
pub mod engine;
pub mod phase;
pub mod resync;
pub mod secret;

pub use backoff::FibonacciBackoff;
pub use engine::{ReconcileError, ReconcileOutcome, ReconciliationEngine};
pub use phase::{next_phase, next_status, PhaseEvent, PhaseStateMachine, RefreshRecord};
pub use resync::ResyncPolicy;
pub use secret::{DockerAuth, DockerConfig, SecretSynthesizer, SyncError, SyncOutcome};
