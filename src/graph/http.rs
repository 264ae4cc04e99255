//! HTTP transport and response validation for directory API calls

use super::auth::TokenProvider;
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// A response whose body has been fully read.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    /// Decode the body as JSON. `operation` is used for error context.
    pub fn json<T: DeserializeOwned>(&self, operation: &str) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|source| Error::Decode {
            operation: operation.to_string(),
            source,
        })
    }

    /// Decode the body as JSON, treating an empty body as `null`.
    pub fn json_or_null(&self, operation: &str) -> Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        self.json(operation)
    }
}

type StatusPredicate = Arc<dyn Fn(&RawResponse) -> bool + Send + Sync>;

/// The set of responses an operation treats as success.
#[derive(Clone, Default)]
pub struct Acceptance {
    codes: Vec<u16>,
    predicate: Option<StatusPredicate>,
}

impl Acceptance {
    /// Accept exactly these status codes.
    pub fn codes(codes: &[u16]) -> Self {
        Self {
            codes: codes.to_vec(),
            predicate: None,
        }
    }

    /// Additionally accept any response for which `f` returns true.
    pub fn or_when(mut self, f: impl Fn(&RawResponse) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(f));
        self
    }

    pub fn accepts(&self, response: &RawResponse) -> bool {
        if self.codes.contains(&response.status.as_u16()) {
            return true;
        }
        self.predicate.as_ref().is_some_and(|f| f(response))
    }
}

impl std::fmt::Debug for Acceptance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acceptance")
            .field("codes", &self.codes)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Diagnostic for a response that was not accepted.
#[derive(Debug, Clone)]
pub struct Rejected {
    pub status: u16,
    pub body: String,
}

/// Read `response` to completion so the connection can be reused.
pub async fn drain(response: reqwest::Response) -> std::result::Result<RawResponse, reqwest::Error> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await?;
    Ok(RawResponse {
        status,
        headers,
        body,
    })
}

/// Classify a drained response against `acceptance`.
///
/// On rejection the body is only returned as diagnostic text; callers never
/// parse it as the target type.
pub fn validate(
    response: RawResponse,
    acceptance: &Acceptance,
) -> std::result::Result<RawResponse, Rejected> {
    if acceptance.accepts(&response) {
        Ok(response)
    } else {
        Err(Rejected {
            status: response.status.as_u16(),
            body: response.body,
        })
    }
}

/// HTTP client wrapper that attaches bearer credentials to every request
#[derive(Clone)]
pub struct Transport {
    client: Client,
    credentials: Option<Arc<dyn TokenProvider>>,
    user_agent: Option<String>,
}

impl Transport {
    /// Create a new transport
    pub fn new(
        credentials: Option<Arc<dyn TokenProvider>>,
        user_agent: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Setup(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            credentials,
            user_agent,
        })
    }

    /// Dispatch a request. Status codes are not interpreted here.
    pub async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json; charset=utf-8");

        if let Some(provider) = &self.credentials {
            let token = provider.token().await?;
            request = request.bearer_auth(token);
        }

        if let Some(agent) = &self.user_agent {
            request = request.header(USER_AGENT, agent);
        }

        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        request.send().await.map_err(|source| Error::Transport {
            method: method.to_string(),
            url: url.to_string(),
            source,
        })
    }

    /// Send and validate in one step, mapping rejections to [`Error::UnexpectedStatus`].
    pub async fn execute(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
        acceptance: &Acceptance,
    ) -> Result<RawResponse> {
        let response = self.send(method.clone(), url, body).await?;
        let raw = drain(response).await.map_err(|source| Error::Transport {
            method: method.to_string(),
            url: url.to_string(),
            source,
        })?;

        validate(raw, acceptance).map_err(|rejected| {
            if rejected.status != 404 {
                // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
                tracing::error!(
                    "API error: {} - {}",
                    rejected.status,
                    sanitize_for_log(&rejected.body)
                );
            }
            Error::UnexpectedStatus {
                operation: format!("{} {}", method, url),
                status: rejected.status,
                body: rejected.body,
            }
        })
    }
}
