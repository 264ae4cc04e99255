//! dirrecon
//!
//! Reconciliation primitives for directory objects (applications, service
//! principals, users and their credentials) over two API generations: AAD
//! Graph and Microsoft Graph.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod handle;
pub mod locks;
pub mod models;
pub mod reconcile;

pub use context::ClientContext;
pub use error::{Error, Result};

/// Version injected at compile time via DIRRECON_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("DIRRECON_VERSION") {
    Some(v) => v,
    None => "dev",
};
