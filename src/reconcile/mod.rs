//! Reconcilers
//!
//! Each reconciler drives one resource type through create/read/update/delete
//! against the configured [`Directory`](crate::backend::Directory). Failures
//! come back as a [`Diagnostic`] naming the operation, the resource and, when
//! one is to blame, the offending attribute.

pub mod credential;
pub mod input;
pub mod lookup;
pub mod object;
pub mod replication;

use crate::error::{Error, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub use credential::{CredentialReconciler, CredentialState};
pub use object::ObjectReconciler;
pub use replication::{wait_for_replication, ReplicationPolicy};

/// Outcome of a read: the resource exists, or it should stop being tracked.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<T> {
    Present(T),
    Absent,
}

impl<T> ReadOutcome<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, ReadOutcome::Absent)
    }

    pub fn present(self) -> Option<T> {
        match self {
            ReadOutcome::Present(v) => Some(v),
            ReadOutcome::Absent => None,
        }
    }
}

/// A failed reconciler call, as reported back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("{summary}: {source}")]
pub struct Diagnostic {
    pub summary: String,
    /// Attribute the failure is attributed to, if any
    pub attribute_path: Option<String>,
    #[source]
    pub source: Error,
}

impl Diagnostic {
    pub fn new(summary: impl Into<String>, source: Error) -> Self {
        let attribute_path = match &source {
            Error::InvalidInput { attribute, .. } => Some(attribute.clone()),
            _ => None,
        };
        Self {
            summary: summary.into(),
            attribute_path,
            source,
        }
    }

    pub fn at(mut self, attribute_path: &str) -> Self {
        self.attribute_path = Some(attribute_path.to_string());
        self
    }
}

pub type Outcome<T> = std::result::Result<T, Diagnostic>;

/// Run `f` unless `cancel` fires first.
pub async fn cancellable<F, T>(cancel: &CancellationToken, operation: &str, f: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled {
            operation: operation.to_string(),
        }),
        result = f => result,
    }
}
