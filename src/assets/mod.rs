//! Routing-rule asset subsystem.
//!
//! # Data Flow
//! ```text
//! for each required asset whose local file is missing:
//!     GET {tag_api_base}/{repo}/tags        → element 0 "name" = tag
//!     GET {mirror}/{repo}@{tag}/{filename}  → {asset_dir}/{filename}.tmp
//!     chmod 0755                            → rename to {asset_dir}/{local_name}
//! ```
//!
//! # Design Decisions
//! - Download by upstream name, install as local name
//! - Failures are reported per asset; startup never aborts here
//! - The fetcher is a trait so the rule-list refresh and tests share it

pub mod fetcher;
pub mod provisioner;

pub use fetcher::{AssetError, AssetFetcher, AssetResult, HttpFetcher};
pub use provisioner::{AssetProvisioner, AssetReport, AssetStatus};
