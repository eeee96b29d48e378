//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Preflight (preflight.rs):
//!     --report → print and exit 0
//!     root check, listen port check → fatal on failure
//!
//! Startup (startup.rs):
//!     banner → open store → clear stale tproxy → readiness gate (readiness.rs)
//!     → migration → core config → assets → auto-update scheduler
//!
//! Foreground (controller.rs):
//!     apply engine config if running
//!     → serve ─┐
//!     → signal ┴→ first event wins → shutdown sequence (shutdown.rs)
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM/SIGHUP/SIGQUIT → graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: nothing network-bound runs before the gate
//! - Ordered shutdown: tproxy, engine, store; exactly once
//! - The serve/signal race has no tie-break: both lead to the same shutdown

pub mod controller;
pub mod preflight;
pub mod readiness;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use controller::{ExitReason, LifecycleController};
pub use shutdown::{Shutdown, ShutdownReport, ShutdownSequence};
pub use startup::{bootstrap, BootstrapDeps, Bootstrapped, StartupError};
