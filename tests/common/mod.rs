//! In-memory directory used by the reconciler tests

#![allow(dead_code)]

use async_trait::async_trait;
use dirrecon::backend::{Backend, Generation};
use dirrecon::models::{CredentialKind, Entity};
use dirrecon::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A directory kept in memory.
///
/// `get` snapshots the object and then waits `latency` before returning it,
/// so two unsynchronized read-modify-write cycles interleave and one of them
/// writes back stale data.
#[derive(Default)]
pub struct FakeBackend {
    objects: Mutex<HashMap<(Entity, String), Value>>,
    latency: Duration,
    hidden_reads: Mutex<Range<usize>>,
    pub gets: AtomicUsize,
    pub writes: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Store `object` under its `id`.
    pub fn insert(&self, entity: Entity, object: Value) {
        let id = object["id"].as_str().expect("object needs an id").to_string();
        self.objects.lock().unwrap().insert((entity, id), object);
    }

    pub fn object(&self, entity: Entity, id: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&(entity, id.to_string()))
            .cloned()
    }

    /// Reads whose zero-based index falls in `reads` answer `NotFound`, as if
    /// the object had not replicated yet.
    pub fn hide_reads(&self, reads: Range<usize>) {
        *self.hidden_reads.lock().unwrap() = reads;
    }

    pub fn key_ids(&self, entity: Entity, id: &str, kind: CredentialKind) -> Vec<String> {
        self.object(entity, id)
            .and_then(|o| o.get(kind.collection_field()).cloned())
            .and_then(|c| c.as_array().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|c| c["keyId"].as_str().map(str::to_string))
            .collect()
    }

    fn not_found(entity: Entity, id: &str) -> Error {
        Error::NotFound {
            what: entity.describe().to_string(),
            id: id.to_string(),
        }
    }
}

/// Matches `field eq 'value'` filters, the only kind the reconcilers send.
fn matches_filter(object: &Value, filter: &str) -> bool {
    let Some((field, literal)) = filter.split_once(" eq ") else {
        return false;
    };
    let value = literal
        .trim_matches('\'')
        .replace("''", "'");
    object[field.trim()].as_str() == Some(value.as_str())
}

#[async_trait]
impl Backend for FakeBackend {
    fn generation(&self) -> Generation {
        Generation::MsGraph
    }

    async fn get(&self, entity: Entity, id: &str) -> Result<Value> {
        let read = self.gets.fetch_add(1, Ordering::SeqCst);
        if self.hidden_reads.lock().unwrap().contains(&read) {
            return Err(Self::not_found(entity, id));
        }

        let snapshot = self.object(entity, id);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        snapshot.ok_or_else(|| Self::not_found(entity, id))
    }

    async fn list(&self, entity: Entity, filter: Option<&str>) -> Result<Vec<Value>> {
        let objects = self.objects.lock().unwrap();
        let mut found: Vec<Value> = objects
            .iter()
            .filter(|((e, _), o)| *e == entity && filter.map_or(true, |f| matches_filter(o, f)))
            .map(|(_, o)| o.clone())
            .collect();
        found.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
        Ok(found)
    }

    async fn create(&self, entity: Entity, body: &Value) -> Result<Value> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut object = body.clone();
        if object.get("id").is_none() {
            object["id"] = json!(uuid::Uuid::new_v4().to_string());
        }
        self.insert(entity, object.clone());
        Ok(object)
    }

    async fn update(&self, entity: Entity, id: &str, delta: &Value) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(entity, id.to_string()))
            .ok_or_else(|| Self::not_found(entity, id))?;
        if let (Some(target), Some(fields)) = (object.as_object_mut(), delta.as_object()) {
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(())
    }

    async fn replace_credentials(
        &self,
        entity: Entity,
        id: &str,
        kind: CredentialKind,
        collection: &[Value],
    ) -> Result<()> {
        let mut delta = serde_json::Map::new();
        delta.insert(kind.collection_field().to_string(), json!(collection));
        self.update(entity, id, &Value::Object(delta)).await
    }

    async fn delete(&self, entity: Entity, id: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .remove(&(entity, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| Self::not_found(entity, id))
    }
}
