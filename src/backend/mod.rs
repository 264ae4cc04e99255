//! Directory backends
//!
//! Two API generations share one contract. The generation is chosen once,
//! when the client context is built, and callers only ever see
//! `Arc<dyn Backend>` or the typed [`Directory`] facade over it.
//!
//! - [`aad`] - AAD Graph (`{root}/{tenant}/{entity}?api-version=1.6`)
//! - [`msgraph`] - Microsoft Graph (`{root}/{version}/{entity}`)
//! - [`directory`] - Typed operations and the exactly-one-match lookup policy

pub mod aad;
pub mod directory;
pub mod msgraph;

pub use directory::Directory;

use crate::error::Result;
use crate::models::{CredentialKind, Entity};
use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Backend API generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    /// Legacy AAD Graph API
    #[default]
    AadGraph,
    /// Microsoft Graph API
    MsGraph,
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::AadGraph => f.write_str("aad_graph"),
            Generation::MsGraph => f.write_str("ms_graph"),
        }
    }
}

/// Operations every backend generation provides.
///
/// Objects travel as JSON in the Microsoft Graph shape. `update` sends a delta
/// on both generations; `replace_credentials` always replaces the whole
/// collection of one credential kind.
#[async_trait]
pub trait Backend: Send + Sync {
    fn generation(&self) -> Generation;

    /// Fetch one object. A missing object is [`crate::Error::NotFound`].
    async fn get(&self, entity: Entity, id: &str) -> Result<Value>;

    /// List objects, following every continuation page.
    async fn list(&self, entity: Entity, filter: Option<&str>) -> Result<Vec<Value>>;

    async fn create(&self, entity: Entity, body: &Value) -> Result<Value>;

    async fn update(&self, entity: Entity, id: &str, delta: &Value) -> Result<()>;

    async fn replace_credentials(
        &self,
        entity: Entity,
        id: &str,
        kind: CredentialKind,
        collection: &[Value],
    ) -> Result<()>;

    /// Delete one object. A missing object is [`crate::Error::NotFound`].
    async fn delete(&self, entity: Entity, id: &str) -> Result<()>;
}
