//! Directory API base client
//!
//! Combines the URI builder, authenticated transport and response validator for
//! one API root. Backends build their entity-specific calls on top of this.

use super::http::{Acceptance, RawResponse, Transport};
use super::uri;
use crate::error::{Error, Result};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

/// Base client for one API root
#[derive(Clone)]
pub struct BaseClient {
    pub transport: Transport,
    pub endpoint: String,
    pub api_version: String,
    pub tenant_id: String,
    pub include_tenant: bool,
}

/// One page of a list response.
#[derive(Debug)]
pub struct Page {
    pub items: Vec<Value>,
    pub next_link: Option<String>,
}

impl BaseClient {
    pub fn new(
        transport: Transport,
        endpoint: &str,
        api_version: &str,
        tenant_id: &str,
        include_tenant: bool,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.to_string(),
            api_version: api_version.to_string(),
            tenant_id: tenant_id.to_string(),
            include_tenant,
        }
    }

    /// Build a request URI for `path` under this client's root.
    pub fn uri(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        uri::build(
            &self.endpoint,
            &self.api_version,
            &self.tenant_id,
            self.include_tenant,
            path,
            query,
        )
    }

    pub async fn get(&self, url: &Url, acceptance: &Acceptance) -> Result<RawResponse> {
        self.transport
            .execute(Method::GET, url, None, acceptance)
            .await
    }

    pub async fn post(
        &self,
        url: &Url,
        body: &Value,
        acceptance: &Acceptance,
    ) -> Result<RawResponse> {
        self.transport
            .execute(Method::POST, url, Some(body), acceptance)
            .await
    }

    pub async fn patch(
        &self,
        url: &Url,
        body: &Value,
        acceptance: &Acceptance,
    ) -> Result<RawResponse> {
        self.transport
            .execute(Method::PATCH, url, Some(body), acceptance)
            .await
    }

    pub async fn delete(&self, url: &Url, acceptance: &Acceptance) -> Result<RawResponse> {
        self.transport
            .execute(Method::DELETE, url, None, acceptance)
            .await
    }

    /// Fetch all pages starting at `first`, following the continuation link
    /// stored under `link_field` and resolved by `resolve_next`.
    ///
    /// Any failure after the first page is a [`Error::Pagination`]; no partial
    /// results are returned.
    pub async fn get_all_pages<F>(
        &self,
        what: &str,
        first: Url,
        link_field: &str,
        resolve_next: F,
    ) -> Result<Vec<Value>>
    where
        F: Fn(&str) -> std::result::Result<Url, String>,
    {
        let acceptance = list_acceptance();
        let mut all_items = Vec::new();
        let mut seen = vec![first.to_string()];

        let page = self.get(&first, &acceptance).await?;
        let mut page = parse_page(&page, link_field).map_err(|reason| Error::Pagination {
            what: what.to_string(),
            page: 1,
            reason,
        })?;
        let mut page_number = 1;

        loop {
            all_items.extend(page.items);

            let Some(link) = page.next_link else {
                break;
            };
            page_number += 1;

            let broken = |reason: String| Error::Pagination {
                what: what.to_string(),
                page: page_number,
                reason,
            };

            let next = resolve_next(&link)
                .map_err(|e| broken(format!("unusable link {link:?}: {e}")))?;
            if seen.contains(&next.to_string()) {
                return Err(broken(format!("link {next} was already visited")));
            }
            seen.push(next.to_string());

            tracing::debug!("Fetching page {} of {}: {}", page_number, what, next);
            let response = self
                .get(&next, &acceptance)
                .await
                .map_err(|e| broken(e.to_string()))?;
            page = parse_page(&response, link_field).map_err(broken)?;
        }

        Ok(all_items)
    }
}

/// Pages are accepted on a 200 whose body carries a `value` array.
fn list_acceptance() -> Acceptance {
    Acceptance::codes(&[]).or_when(|r| {
        r.status == StatusCode::OK
            && serde_json::from_str::<Value>(&r.body)
                .map(|v| v.get("value").is_some_and(Value::is_array))
                .unwrap_or(false)
    })
}

fn parse_page(response: &RawResponse, link_field: &str) -> std::result::Result<Page, String> {
    let body: Value = serde_json::from_str(&response.body).map_err(|e| e.to_string())?;

    let items = body
        .get("value")
        .and_then(|v| v.as_array())
        .cloned()
        .ok_or_else(|| "response has no value array".to_string())?;

    let next_link = body
        .get(link_field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(Page { items, next_link })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn raw(body: &str) -> RawResponse {
        RawResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_parse_page_with_link() {
        let page = parse_page(
            &raw(r#"{"value":[{"id":"1"}],"@odata.nextLink":"https://x/next"}"#),
            "@odata.nextLink",
        )
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_link.as_deref(), Some("https://x/next"));
    }

    #[test]
    fn test_parse_page_without_value() {
        assert!(parse_page(&raw(r#"{"items":[]}"#), "@odata.nextLink").is_err());
    }

    #[test]
    fn test_list_acceptance_requires_value_array() {
        let acceptance = list_acceptance();
        assert!(acceptance.accepts(&raw(r#"{"value":[]}"#)));
        assert!(!acceptance.accepts(&raw(r#"{"value":{}}"#)));
        assert!(!acceptance.accepts(&raw("not json")));
    }
}
