//! Typed directory operations over a backend

use super::{Backend, Generation};
use crate::error::{Error, Result};
use crate::models::{Credential, CredentialHolder, DirectoryObject};
use serde_json::Value;
use std::sync::Arc;

/// Typed facade over whichever backend generation is configured.
#[derive(Clone)]
pub struct Directory {
    backend: Arc<dyn Backend>,
}

impl Directory {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn generation(&self) -> Generation {
        self.backend.generation()
    }

    pub async fn get<T: DirectoryObject>(&self, id: &str) -> Result<T> {
        let value = self.backend.get(T::ENTITY, id).await?;
        decode(value, &format!("reading {} {id:?}", T::ENTITY.describe()))
    }

    pub async fn list<T: DirectoryObject>(&self, filter: Option<&str>) -> Result<Vec<T>> {
        let operation = format!("listing {}", T::ENTITY);
        self.backend
            .list(T::ENTITY, filter)
            .await?
            .into_iter()
            .map(|v| decode(v, &operation))
            .collect()
    }

    /// Look up the single object matching `filter`.
    ///
    /// Zero matches is [`Error::NotFound`], more than one is
    /// [`Error::AmbiguousMatch`]. No arbitrary match is ever picked.
    pub async fn find_one<T: DirectoryObject>(&self, filter: &str) -> Result<T> {
        let mut matches = self.list::<T>(Some(filter)).await?;
        match matches.len() {
            0 => Err(Error::NotFound {
                what: T::ENTITY.describe().to_string(),
                id: filter.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            count => Err(Error::AmbiguousMatch {
                what: T::ENTITY.to_string(),
                filter: filter.to_string(),
                count,
            }),
        }
    }

    pub async fn create<T: DirectoryObject>(&self, object: &T) -> Result<T> {
        let operation = format!("creating {}", T::ENTITY.describe());
        let body = encode(object, &operation)?;
        let created = self.backend.create(T::ENTITY, &body).await?;
        decode(created, &operation)
    }

    /// Send `delta` as a partial update; unset fields are left untouched.
    pub async fn update<T: DirectoryObject>(&self, id: &str, delta: &T) -> Result<()> {
        let operation = format!("updating {} {id:?}", T::ENTITY.describe());
        let body = encode(delta, &operation)?;
        self.backend.update(T::ENTITY, id, &body).await
    }

    pub async fn delete<T: DirectoryObject>(&self, id: &str) -> Result<()> {
        self.backend.delete(T::ENTITY, id).await
    }

    /// Replace the parent's whole collection of `C` credentials.
    pub async fn replace_credentials<P, C>(&self, parent_id: &str, collection: &[C]) -> Result<()>
    where
        P: CredentialHolder,
        C: Credential,
    {
        let operation = format!("writing {} credentials", C::KIND);
        let values = collection
            .iter()
            .map(|c| encode(c, &operation))
            .collect::<Result<Vec<_>>>()?;
        self.backend
            .replace_credentials(P::ENTITY, parent_id, C::KIND, &values)
            .await
    }
}

/// Quote a value for use in an OData `$filter` expression.
pub fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `field eq 'value'`
pub fn eq_filter(field: &str, value: &str) -> String {
    format!("{field} eq {}", odata_literal(value))
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, operation: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|source| Error::Decode {
        operation: operation.to_string(),
        source,
    })
}

fn encode<T: serde::Serialize>(value: &T, operation: &str) -> Result<Value> {
    serde_json::to_value(value).map_err(|source| Error::Decode {
        operation: operation.to_string(),
        source,
    })
}
