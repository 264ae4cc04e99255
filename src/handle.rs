//! Resource handles for credential sub-resources
//!
//! A handle is the external identifier of a credential. Two shapes exist:
//!
//! - legacy: `{parentId}/{keyId}`
//! - current: `{parentId}/{kind}/{keyId}`, both ids percent-encoded
//!
//! Current handles round-trip exactly. Legacy handles carry no kind, so the
//! kind comes from the resource type doing the upgrade.

use crate::error::{Error, Result};
use crate::models::CredentialKind;
use serde_json::{Map, Value};
use std::fmt;

/// State attribute holding the handle
pub const ID_ATTRIBUTE: &str = "id";

/// Decoded current-shape handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub parent_id: String,
    pub kind: CredentialKind,
    pub key: String,
}

/// Decoded legacy-shape handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyHandle {
    pub parent_id: String,
    pub key: String,
}

/// Shape of a handle string, as told by [`probe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleShape {
    Legacy,
    Current,
    Unknown,
}

impl ResourceHandle {
    pub fn new(parent_id: &str, kind: CredentialKind, key: &str) -> Result<Self> {
        if parent_id.is_empty() || key.is_empty() {
            return Err(Error::InvalidHandle {
                handle: format!("{parent_id}/{kind}/{key}"),
                reason: "parent id and key must not be empty".to_string(),
            });
        }
        Ok(Self {
            parent_id: parent_id.to_string(),
            kind,
            key: key.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}/{}/{}",
            urlencoding::encode(&self.parent_id),
            self.kind,
            urlencoding::encode(&self.key)
        )
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Encode a credential handle in the current shape.
pub fn encode(parent_id: &str, kind: CredentialKind, key: &str) -> Result<String> {
    Ok(ResourceHandle::new(parent_id, kind, key)?.encode())
}

pub fn decode_current(handle: &str) -> Result<ResourceHandle> {
    let invalid = |reason: &str| Error::InvalidHandle {
        handle: handle.to_string(),
        reason: reason.to_string(),
    };

    let segments: Vec<&str> = handle.split('/').collect();
    let [parent, kind, key] = segments.as_slice() else {
        return Err(invalid("expected {parentId}/{kind}/{keyId}"));
    };

    let kind: CredentialKind = kind.parse().map_err(|e: String| invalid(&e))?;
    let parent = urlencoding::decode(parent).map_err(|e| invalid(&e.to_string()))?;
    let key = urlencoding::decode(key).map_err(|e| invalid(&e.to_string()))?;

    ResourceHandle::new(&parent, kind, &key).map_err(|_| invalid("empty segment"))
}

pub fn decode_legacy(handle: &str) -> Result<LegacyHandle> {
    match handle.split('/').collect::<Vec<_>>().as_slice() {
        [parent, key] if !parent.is_empty() && !key.is_empty() => Ok(LegacyHandle {
            parent_id: parent.to_string(),
            key: key.to_string(),
        }),
        _ => Err(Error::InvalidHandle {
            handle: handle.to_string(),
            reason: "expected {parentId}/{keyId}".to_string(),
        }),
    }
}

/// Rewrite a legacy handle in the current shape.
pub fn migrate(legacy: &str, kind: CredentialKind) -> Result<String> {
    let old = decode_legacy(legacy)?;
    encode(&old.parent_id, kind, &old.key)
}

pub fn probe(handle: &str) -> HandleShape {
    if decode_legacy(handle).is_ok() {
        HandleShape::Legacy
    } else if decode_current(handle).is_ok() {
        HandleShape::Current
    } else {
        HandleShape::Unknown
    }
}

/// Upgrade a version 0 state map: the `id` attribute moves to the current
/// handle shape. Ids already in the current shape are left alone.
pub fn upgrade_state_v0(mut state: Map<String, Value>, kind: CredentialKind) -> Result<Map<String, Value>> {
    let id = state
        .get(ID_ATTRIBUTE)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match probe(&id) {
        HandleShape::Current => {}
        HandleShape::Legacy => {
            let upgraded = migrate(&id, kind)?;
            tracing::debug!("Upgrading {} handle {:?} to {:?}", kind, id, upgraded);
            state.insert(ID_ATTRIBUTE.to_string(), Value::String(upgraded));
        }
        HandleShape::Unknown => {
            return Err(Error::InvalidHandle {
                handle: id,
                reason: "neither a legacy nor a current credential handle".to_string(),
            })
        }
    }

    Ok(state)
}
