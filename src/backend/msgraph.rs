//! Microsoft Graph backend

use super::{Backend, Generation};
use crate::error::Result;
use crate::graph::client::BaseClient;
use crate::graph::http::{Acceptance, Transport};
use crate::models::{CredentialKind, Entity};
use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://graph.microsoft.com";
pub const DEFAULT_API_VERSION: &str = "v1.0";

const NEXT_LINK: &str = "@odata.nextLink";

/// Microsoft Graph client: `{root}/{version}/{entity}`, no tenant segment.
#[derive(Clone)]
pub struct MsGraphBackend {
    client: BaseClient,
}

impl MsGraphBackend {
    pub fn new(transport: Transport, endpoint: &str, api_version: &str) -> Self {
        Self {
            client: BaseClient::new(transport, endpoint, api_version, "", false),
        }
    }

    fn object_path(entity: Entity, id: &str) -> String {
        format!("{}/{}", entity.path(), urlencoding::encode(id))
    }
}

#[async_trait]
impl Backend for MsGraphBackend {
    fn generation(&self) -> Generation {
        Generation::MsGraph
    }

    async fn get(&self, entity: Entity, id: &str) -> Result<Value> {
        let url = self.client.uri(&Self::object_path(entity, id), &[])?;
        let response = self
            .client
            .get(&url, &Acceptance::codes(&[200]))
            .await
            .map_err(|e| e.not_found_as(entity.describe(), id))?;
        response.json(&format!("GET {url}"))
    }

    async fn list(&self, entity: Entity, filter: Option<&str>) -> Result<Vec<Value>> {
        let mut query = Vec::new();
        if let Some(filter) = filter {
            query.push(("$filter".to_string(), filter.to_string()));
        }
        let first = self.client.uri(entity.path(), &query)?;

        self.client
            .get_all_pages(entity.path(), first, NEXT_LINK, |link| {
                Url::parse(link).map_err(|e| e.to_string())
            })
            .await
    }

    async fn create(&self, entity: Entity, body: &Value) -> Result<Value> {
        let url = self.client.uri(entity.path(), &[])?;
        tracing::info!("Creating {} via Microsoft Graph", entity.describe());
        let response = self
            .client
            .post(&url, body, &Acceptance::codes(&[201]))
            .await?;
        response.json(&format!("POST {url}"))
    }

    async fn update(&self, entity: Entity, id: &str, delta: &Value) -> Result<()> {
        let url = self.client.uri(&Self::object_path(entity, id), &[])?;
        self.client
            .patch(&url, delta, &Acceptance::codes(&[200, 204]))
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
        let mut delta = serde_json::Map::new();
        delta.insert(kind.collection_field().to_string(), json!(collection));
        self.update(entity, id, &Value::Object(delta)).await
    }

    async fn delete(&self, entity: Entity, id: &str) -> Result<()> {
        let url = self.client.uri(&Self::object_path(entity, id), &[])?;
        tracing::info!("Deleting {} {}", entity.describe(), id);
        self.client
            .delete(&url, &Acceptance::codes(&[204]))
            .await
            .map_err(|e| e.not_found_as(entity.describe(), id))?;
        Ok(())
    }
}
