//! Client context
//!
//! Everything a reconciler needs, built once from [`Config`]: the transport
//! with its token provider, the backend for the configured generation, the
//! lock registry and the post-create wait policy.

use crate::backend::aad::AadGraphBackend;
use crate::backend::msgraph::MsGraphBackend;
use crate::backend::{Backend, Directory, Generation};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::auth::{ClientCredentials, StaticToken, TokenProvider};
use crate::graph::http::Transport;
use crate::locks::LockRegistry;
use crate::models::{CredentialHolder, DirectoryObject, KeyCredential, PasswordCredential};
use crate::reconcile::{CredentialReconciler, ObjectReconciler, ReplicationPolicy};
use std::sync::Arc;

#[derive(Clone)]
pub struct ClientContext {
    pub directory: Directory,
    pub locks: Arc<LockRegistry>,
    pub replication: ReplicationPolicy,
}

impl ClientContext {
    pub fn new(backend: Arc<dyn Backend>, replication: ReplicationPolicy) -> Self {
        Self {
            directory: Directory::new(backend),
            locks: Arc::new(LockRegistry::new()),
            replication,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api = config.effective_api();
        let credentials = token_provider(config, &api.endpoint)?;
        let transport = Transport::new(
            Some(credentials),
            config.user_agent.clone(),
            config.request_timeout(),
        )?;

        let backend: Arc<dyn Backend> = match config.generation {
            Generation::AadGraph => {
                let tenant = config.effective_tenant();
                if tenant.is_empty() {
                    return Err(Error::Setup(
                        "a tenant ID is required for AAD Graph (set ARM_TENANT_ID)".to_string(),
                    ));
                }
                Arc::new(AadGraphBackend::new(
                    transport,
                    &api.endpoint,
                    tenant,
                    &api.api_version,
                ))
            }
            Generation::MsGraph => Arc::new(MsGraphBackend::new(
                transport,
                &api.endpoint,
                &api.api_version,
            )),
        };

        tracing::info!("Using {} at {}", config.generation, api.endpoint);
        Ok(Self::new(backend, config.replication_policy()))
    }

    pub fn objects<T: DirectoryObject>(&self) -> ObjectReconciler<T> {
        ObjectReconciler::new(self.directory.clone(), self.replication)
    }

    pub fn passwords<P: CredentialHolder>(&self) -> CredentialReconciler<P, PasswordCredential> {
        CredentialReconciler::new(self.directory.clone(), self.locks.clone(), self.replication)
    }

    pub fn certificates<P: CredentialHolder>(&self) -> CredentialReconciler<P, KeyCredential> {
        CredentialReconciler::new(self.directory.clone(), self.locks.clone(), self.replication)
    }
}

fn token_provider(config: &Config, graph_root: &str) -> Result<Arc<dyn TokenProvider>> {
    if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
        tracing::debug!("Authenticating with a pre-issued access token");
        return Ok(Arc::new(StaticToken::new(token)));
    }

    match (
        config.tenant_id.as_deref(),
        config.client_id.as_deref(),
        config.client_secret.as_deref(),
    ) {
        (Some(tenant), Some(client_id), Some(secret)) => {
            tracing::debug!("Authenticating as client {}", client_id);
            Ok(Arc::new(ClientCredentials::new(
                &config.login_endpoint,
                tenant,
                client_id,
                secret,
                graph_root,
            )))
        }
        _ => Err(Error::Setup(
            "no credentials configured: set ARM_ACCESS_TOKEN, or ARM_TENANT_ID, ARM_CLIENT_ID and ARM_CLIENT_SECRET"
                .to_string(),
        )),
    }
}
