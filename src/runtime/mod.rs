//! # Runtime
//!
//! Everything between the Kubernetes API and the reconciliation engine.
//!
//! - `context`: Shared state for reconciliations (engine, events, backoff)
//! - `error_policy`: Requeue decisions after failures, watch error classification
//! - `events`: Kubernetes Event publishing
//! - `initialization`: Startup wiring
//! - `watch_loop`: kube-runtime `Controller` with restart on stream end

pub mod context;
pub mod error_policy;
pub mod events;
pub mod initialization;
pub mod watch_loop;

pub use context::ControllerContext;
pub use events::{EventPublisher, KubeEventPublisher};
pub use initialization::{init_logging, initialize, install_crypto_provider, InitializationResult};
pub use watch_loop::run_watch_loop;
