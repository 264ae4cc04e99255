//! AAD Graph backend
//!
//! Addresses objects as `{root}/{tenant}/{entity}/{objectId}?api-version=1.6`.
//! Continuation links (`odata.nextLink`) are relative to `{root}/{tenant}/`
//! and do not repeat the `api-version` parameter.
//!
//! AAD Graph names a few properties differently from Microsoft Graph; objects
//! are translated on the way in and out so callers only see one shape.

use super::{Backend, Generation};
use crate::error::Result;
use crate::graph::client::BaseClient;
use crate::graph::http::{Acceptance, Transport};
use crate::graph::uri;
use crate::models::{CredentialKind, Entity};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub const DEFAULT_ENDPOINT: &str = "https://graph.windows.net";
pub const DEFAULT_API_VERSION: &str = "1.6";

const NEXT_LINK: &str = "odata.nextLink";

/// AAD Graph client: `{root}/{tenant}/{entity}`, API version as a query parameter.
#[derive(Clone)]
pub struct AadGraphBackend {
    client: BaseClient,
    api_version: String,
}

impl AadGraphBackend {
    pub fn new(transport: Transport, endpoint: &str, tenant_id: &str, api_version: &str) -> Self {
        Self {
            // The version travels in the query string, not the path
            client: BaseClient::new(transport, endpoint, "", tenant_id, true),
            api_version: api_version.to_string(),
        }
    }

    fn version_param(&self) -> (String, String) {
        ("api-version".to_string(), self.api_version.clone())
    }

    fn object_url(&self, entity: Entity, id: &str) -> Result<url::Url> {
        self.client.uri(
            &format!("{}/{}", entity.path(), urlencoding::encode(id)),
            &[self.version_param()],
        )
    }
}

#[async_trait]
impl Backend for AadGraphBackend {
    fn generation(&self) -> Generation {
        Generation::AadGraph
    }

    async fn get(&self, entity: Entity, id: &str) -> Result<Value> {
        let url = self.object_url(entity, id)?;
        let response = self
            .client
            .get(&url, &Acceptance::codes(&[200]))
            .await
            .map_err(|e| e.not_found_as(entity.describe(), id))?;
        let object: Value = response.json(&format!("GET {url}"))?;
        Ok(object_from_wire(object))
    }

    async fn list(&self, entity: Entity, filter: Option<&str>) -> Result<Vec<Value>> {
        let mut query = vec![self.version_param()];
        if let Some(filter) = filter {
            query.push(("$filter".to_string(), filter.to_string()));
        }
        let first = self.client.uri(entity.path(), &query)?;

        let items = self
            .client
            .get_all_pages(entity.path(), first, NEXT_LINK, |link| {
                if link.starts_with("https://") || link.starts_with("http://") {
                    let mut url = url::Url::parse(link).map_err(|e| e.to_string())?;
                    if !url.query_pairs().any(|(k, _)| k == "api-version") {
                        url.query_pairs_mut()
                            .append_pair("api-version", &self.api_version);
                    }
                    return Ok(url);
                }
                let (path, mut params) = uri::split_relative(link);
                if !params.iter().any(|(k, _)| k == "api-version") {
                    params.push(self.version_param());
                }
                self.client.uri(&path, &params).map_err(|e| e.to_string())
            })
            .await?;

        Ok(items.into_iter().map(object_from_wire).collect())
    }

    async fn create(&self, entity: Entity, body: &Value) -> Result<Value> {
        let url = self.client.uri(entity.path(), &[self.version_param()])?;
        tracing::info!("Creating {} via AAD Graph", entity.describe());
        let response = self
            .client
            .post(&url, &object_to_wire(body.clone()), &Acceptance::codes(&[201]))
            .await?;
        let object: Value = response.json(&format!("POST {url}"))?;
        Ok(object_from_wire(object))
    }

    async fn update(&self, entity: Entity, id: &str, delta: &Value) -> Result<()> {
        let url = self.object_url(entity, id)?;
        self.client
            .patch(&url, &object_to_wire(delta.clone()), &Acceptance::codes(&[204]))
            .await
            .map_err(|e| e.not_found_as(entity.describe(), id))?;
        Ok(())
    }

    async fn replace_credentials(
        &self,
        entity: Entity,
        id: &str,
        kind: CredentialKind,
        collection: &[Value],
    ) -> Result<()> {
        let url = self.client.uri(
            &format!(
                "{}/{}/{}",
                entity.path(),
                urlencoding::encode(id),
                kind.collection_field()
            ),
            &[self.version_param()],
        )?;
        let wire: Vec<Value> = collection
            .iter()
            .cloned()
            .map(|c| credential_to_wire(kind, c))
            .collect();

        self.client
            .patch(&url, &json!({ "value": wire }), &Acceptance::codes(&[204]))
            .await
            .map_err(|e| e.not_found_as(entity.describe(), id))?;
        Ok(())
    }

    async fn delete(&self, entity: Entity, id: &str) -> Result<()> {
        let url = self.object_url(entity, id)?;
        tracing::info!("Deleting {} {}", entity.describe(), id);
        self.client
            .delete(&url, &Acceptance::codes(&[204]))
            .await
            .map_err(|e| e.not_found_as(entity.describe(), id))?;
        Ok(())
    }
}

fn rename(map: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(v) = map.remove(from) {
        map.insert(to.to_string(), v);
    }
}

/// AAD Graph object → Microsoft Graph shape
pub(crate) fn object_from_wire(mut object: Value) -> Value {
    let Some(map) = object.as_object_mut() else {
        return object;
    };

    rename(map, "objectId", "id");
    if let Some(profile) = map.get_mut("passwordProfile").and_then(Value::as_object_mut) {
        rename(
            profile,
            "forceChangePasswordNextLogin",
            "forceChangePasswordNextSignIn",
        );
    }

    for kind in CredentialKind::ALL {
        if let Some(Value::Array(items)) = map.get_mut(kind.collection_field()) {
            for item in items.iter_mut() {
                let Some(cred) = item.as_object_mut() else {
                    continue;
                };
                rename(cred, "startDate", "startDateTime");
                rename(cred, "endDate", "endDateTime");
                match kind {
                    CredentialKind::Password => rename(cred, "value", "secretText"),
                    CredentialKind::Certificate => rename(cred, "value", "key"),
                }
            }
        }
    }

    object
}

/// Microsoft Graph shape → AAD Graph object
pub(crate) fn object_to_wire(mut object: Value) -> Value {
    let Some(map) = object.as_object_mut() else {
        return object;
    };

    rename(map, "id", "objectId");
    if let Some(profile) = map.get_mut("passwordProfile").and_then(Value::as_object_mut) {
        rename(
            profile,
            "forceChangePasswordNextSignIn",
            "forceChangePasswordNextLogin",
        );
    }

    for kind in CredentialKind::ALL {
        if let Some(Value::Array(items)) = map.get_mut(kind.collection_field()) {
            for item in items.iter_mut() {
                *item = credential_to_wire(kind, item.take());
            }
        }
    }

    object
}

/// AAD Graph has no display name on credentials; it is dropped.
pub(crate) fn credential_to_wire(kind: CredentialKind, mut credential: Value) -> Value {
    if let Some(cred) = credential.as_object_mut() {
        rename(cred, "startDateTime", "startDate");
        rename(cred, "endDateTime", "endDate");
        match kind {
            CredentialKind::Password => rename(cred, "secretText", "value"),
            CredentialKind::Certificate => rename(cred, "key", "value"),
        }
        cred.remove("displayName");
        cred.remove("hint");
    }
    credential
}
