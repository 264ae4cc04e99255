//! Top-level directory objects: applications, service principals, users

use super::replication::{wait_for_replication, ReplicationPolicy};
use super::{cancellable, Diagnostic, Outcome, ReadOutcome};
use crate::backend::Directory;
use crate::error::Error;
use crate::models::DirectoryObject;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

pub struct ObjectReconciler<T> {
    directory: Directory,
    replication: ReplicationPolicy,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ObjectReconciler<T> {
    fn clone(&self) -> Self {
        Self {
            directory: self.directory.clone(),
            replication: self.replication,
            _marker: PhantomData,
        }
    }
}

impl<T: DirectoryObject> ObjectReconciler<T> {
    pub fn new(directory: Directory, replication: ReplicationPolicy) -> Self {
        Self {
            directory,
            replication,
            _marker: PhantomData,
        }
    }

    fn what() -> &'static str {
        T::ENTITY.describe()
    }

    /// Create `object`, wait until it is readable and return it as read back.
    pub async fn create(&self, object: &T, cancel: &CancellationToken) -> Outcome<T> {
        let creating = format!("Creating {}", Self::what());
        let created = cancellable(cancel, &creating, self.directory.create(object))
            .await
            .map_err(|e| Diagnostic::new(creating.clone(), e))?;

        let Some(id) = created.object_id().map(str::to_string) else {
            return Err(Diagnostic::new(
                creating,
                Error::BadResponse {
                    operation: format!("creating {}", Self::what()),
                    reason: format!("API returned {} with nil object ID", Self::what()),
                },
            ));
        };
        tracing::info!("Created {} {}", Self::what(), id);

        wait_for_replication(&self.replication, cancel, Self::what(), &id, || {
            self.directory.get::<T>(&id)
        })
        .await
        .map_err(|e| Diagnostic::new(format!("Waiting for {} with object ID {id:?}", Self::what()), e).at("id"))
    }

    /// Read `id`; a missing object is [`ReadOutcome::Absent`], not an error.
    pub async fn read(&self, id: &str, cancel: &CancellationToken) -> Outcome<ReadOutcome<T>> {
        let operation = format!("Retrieving {} with object ID {id:?}", Self::what());
        match cancellable(cancel, &operation, self.directory.get::<T>(id)).await {
            Ok(object) => Ok(ReadOutcome::Present(object)),
            Err(e) if e.is_not_found() => {
                tracing::warn!("{} with object ID {:?} was not found, removing from state", Self::what(), id);
                Ok(ReadOutcome::Absent)
            }
            Err(e) => Err(Diagnostic::new(operation, e).at("id")),
        }
    }

    /// Apply `delta` (only its set fields are sent) and return the object as
    /// read back.
    pub async fn update(&self, id: &str, delta: &T, cancel: &CancellationToken) -> Outcome<T> {
        let operation = format!("Updating {} with object ID {id:?}", Self::what());
        cancellable(cancel, &operation, async {
            self.directory.update(id, delta).await?;
            self.directory.get::<T>(id).await
        })
        .await
        .map_err(|e| Diagnostic::new(operation.clone(), e).at("id"))
    }

    /// Delete `id`. Deleting an object that is already gone succeeds.
    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> Outcome<()> {
        let operation = format!("Deleting {} with object ID {id:?}", Self::what());
        match cancellable(cancel, &operation, self.directory.delete::<T>(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} {} was already deleted", Self::what(), id);
                Ok(())
            }
            Err(e) => Err(Diagnostic::new(operation, e).at("id")),
        }
    }
}
