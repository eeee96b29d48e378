//! Proxy management daemon library.

pub mod assets;
pub mod config;
pub mod engine;
pub mod http;
pub mod lifecycle;
pub mod migration;
pub mod observability;
pub mod scheduler;
pub mod serverobj;
pub mod store;

pub use config::DaemonConfig;
pub use lifecycle::{LifecycleController, Shutdown};
pub use store::Store;
