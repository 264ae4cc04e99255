//! Password and certificate credentials
//!
//! Credentials have no endpoint of their own: each one lives in its parent's
//! credential collection, and adding or removing one means rewriting the
//! whole collection. Every write happens under the parent's lock so that two
//! reconcilers touching the same parent never lose each other's update.

use super::replication::{wait_for_replication, ReplicationPolicy};
use super::{cancellable, Diagnostic, Outcome, ReadOutcome};
use crate::backend::Directory;
use crate::error::{Error, Result};
use crate::handle::{self, ResourceHandle};
use crate::locks::LockRegistry;
use crate::models::{Credential, CredentialHolder, Entity};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A credential as tracked by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialState<C> {
    /// Current-shape handle, `{parentId}/{kind}/{keyId}`
    pub handle: String,
    pub parent_id: String,
    pub credential: C,
}

/// Reconciles credentials of kind `C` on parents of type `P`.
pub struct CredentialReconciler<P, C> {
    directory: Directory,
    locks: Arc<LockRegistry>,
    replication: ReplicationPolicy,
    _marker: PhantomData<fn() -> (P, C)>,
}

impl<P, C> Clone for CredentialReconciler<P, C> {
    fn clone(&self) -> Self {
        Self {
            directory: self.directory.clone(),
            locks: self.locks.clone(),
            replication: self.replication,
            _marker: PhantomData,
        }
    }
}

impl<P: CredentialHolder, C: Credential> CredentialReconciler<P, C> {
    pub fn new(directory: Directory, locks: Arc<LockRegistry>, replication: ReplicationPolicy) -> Self {
        Self {
            directory,
            locks,
            replication,
            _marker: PhantomData,
        }
    }

    /// Attribute naming the parent in diagnostics
    pub fn parent_attribute() -> &'static str {
        match P::ENTITY {
            Entity::Applications => "application_object_id",
            Entity::ServicePrincipals => "service_principal_id",
            Entity::Users => "user_object_id",
        }
    }

    fn what() -> String {
        format!("{} credential", C::KIND)
    }

    fn parent_diagnostic(parent_id: &str, action: &str, err: Error) -> Diagnostic {
        let summary = if err.is_not_found() {
            format!("{} with object ID {parent_id:?} was not found", P::ENTITY.describe())
        } else {
            format!("{action} {} with object ID {parent_id:?}", P::ENTITY.describe())
        };
        Diagnostic::new(summary, err).at(Self::parent_attribute())
    }

    /// Add `credential` to the parent's collection, then wait until the
    /// directory shows it.
    pub async fn create(
        &self,
        parent_id: &str,
        credential: C,
        cancel: &CancellationToken,
    ) -> Outcome<CredentialState<C>> {
        let key = credential.key_id().map(str::to_string).ok_or_else(|| {
            Diagnostic::new(
                format!("Adding {} for {} {parent_id:?}", Self::what(), P::ENTITY.describe()),
                Error::invalid_input("key_id", "credential has no key ID"),
            )
        })?;
        let handle = ResourceHandle::new(parent_id, C::KIND, &key)
            .map_err(|e| Diagnostic::new("Encoding credential handle", e).at("id"))?
            .encode();

        let lock_key = LockRegistry::object_key(P::ENTITY, parent_id);
        let operation = format!("adding {} to {}", Self::what(), lock_key);

        cancellable(
            cancel,
            &operation,
            self.locks.with_lock(&lock_key, self.append(parent_id, &handle, credential)),
        )
        .await
        .map_err(|err| match err {
            Error::AlreadyExists { .. } => {
                Diagnostic::new(format!("{} {handle:?} already exists", Self::what()), err).at("key_id")
            }
            Error::Cancelled { .. } => Diagnostic::new(format!("Adding {}", Self::what()), err),
            err => Self::parent_diagnostic(parent_id, &format!("Adding {} for", C::KIND), err),
        })?;

        tracing::info!("Added {} {}", Self::what(), handle);

        let credential = wait_for_replication(&self.replication, cancel, &Self::what(), &handle, || {
            self.find(parent_id, &key)
        })
        .await
        .map_err(|e| {
            Diagnostic::new(
                format!("Waiting for {} {handle:?} to become visible", Self::what()),
                e,
            )
        })?;

        Ok(CredentialState {
            handle,
            parent_id: parent_id.to_string(),
            credential,
        })
    }

    async fn append(&self, parent_id: &str, handle: &str, credential: C) -> Result<()> {
        let parent: P = self.directory.get(parent_id).await?;

        let existing = C::collection(&parent);
        if existing.iter().any(|c| c.key_id() == credential.key_id()) {
            return Err(Error::AlreadyExists {
                what: Self::what(),
                id: handle.to_string(),
            });
        }

        let mut collection = existing.to_vec();
        collection.push(credential);
        self.directory
            .replace_credentials::<P, C>(parent_id, &collection)
            .await
    }

    /// The credential with `key`, or `NotFound` while it is not visible.
    async fn find(&self, parent_id: &str, key: &str) -> Result<C> {
        let parent: P = self.directory.get(parent_id).await?;
        C::collection(&parent)
            .iter()
            .find(|c| c.key_id() == Some(key))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                what: Self::what(),
                id: key.to_string(),
            })
    }

    fn decode(handle: &str) -> Outcome<ResourceHandle> {
        let decoded = handle::decode_current(handle)
            .map_err(|e| Diagnostic::new(format!("Parsing {} ID {handle:?}", Self::what()), e).at("id"))?;
        if decoded.kind != C::KIND {
            return Err(Diagnostic::new(
                format!("Parsing {} ID {handle:?}", Self::what()),
                Error::InvalidHandle {
                    handle: handle.to_string(),
                    reason: format!("handle is for a {} credential", decoded.kind),
                },
            )
            .at("id"));
        }
        Ok(decoded)
    }

    /// Read the credential behind `handle`. A missing parent or key means the
    /// credential is gone and should no longer be tracked.
    pub async fn read(
        &self,
        handle: &str,
        cancel: &CancellationToken,
    ) -> Outcome<ReadOutcome<CredentialState<C>>> {
        let decoded = Self::decode(handle)?;
        let operation = format!("reading {} {handle:?}", Self::what());

        match cancellable(cancel, &operation, self.find(&decoded.parent_id, &decoded.key)).await {
            Ok(credential) => Ok(ReadOutcome::Present(CredentialState {
                handle: decoded.encode(),
                parent_id: decoded.parent_id,
                credential,
            })),
            Err(e) if e.is_not_found() => {
                tracing::warn!("{}, removing {} {} from state", e, Self::what(), handle);
                Ok(ReadOutcome::Absent)
            }
            Err(e @ Error::Cancelled { .. }) => Err(Diagnostic::new(format!("Reading {}", Self::what()), e)),
            Err(e) => Err(Self::parent_diagnostic(&decoded.parent_id, "Retrieving", e)),
        }
    }

    /// Remove the credential behind `handle`. A parent that no longer exists
    /// took its credentials with it, so that is a success.
    pub async fn delete(&self, handle: &str, cancel: &CancellationToken) -> Outcome<()> {
        let decoded = Self::decode(handle)?;
        let lock_key = LockRegistry::object_key(P::ENTITY, &decoded.parent_id);
        let operation = format!("removing {} from {}", Self::what(), lock_key);

        cancellable(
            cancel,
            &operation,
            self.locks.with_lock(&lock_key, self.remove(&decoded)),
        )
        .await
        .map_err(|err| match err {
            Error::Cancelled { .. } => Diagnostic::new(format!("Removing {}", Self::what()), err),
            err => Self::parent_diagnostic(
                &decoded.parent_id,
                &format!("Removing {} from", C::KIND),
                err,
            ),
        })
    }

    async fn remove(&self, decoded: &ResourceHandle) -> Result<()> {
        let parent: P = match self.directory.get(&decoded.parent_id).await {
            Ok(parent) => parent,
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} {} already gone", P::ENTITY.describe(), decoded.parent_id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let collection: Vec<C> = C::collection(&parent)
            .iter()
            .filter(|c| c.key_id() != Some(decoded.key.as_str()))
            .cloned()
            .collect();

        match self
            .directory
            .replace_credentials::<P, C>(&decoded.parent_id, &collection)
            .await
        {
            Ok(()) => {
                tracing::info!("Removed {} {}", Self::what(), decoded);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
