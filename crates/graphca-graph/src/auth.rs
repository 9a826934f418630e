use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::GraphError;

pub use graphca_domain::DEFAULT_LOGIN_ENDPOINT;

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const GRAPH_RESOURCE: &str = "https://graph.microsoft.com/";

/// Source of bearer tokens for Graph requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, GraphError>;
}

/// How the client authenticates against Entra ID.
#[derive(Debug, Clone)]
pub enum Credentials {
    ClientSecret {
        tenant_id:     String,
        client_id:     String,
        client_secret: String,
    },
    /// Managed identity via IMDS. `client_id` selects a user-assigned identity.
    ManagedIdentity { client_id: Option<String> },
    AzureCli { tenant_id: Option<String> },
    Static(String),
}

impl Credentials {
    pub fn into_provider(self, http: reqwest::Client, login_base: &str) -> Arc<dyn TokenProvider> {
        match self {
            Credentials::ClientSecret { tenant_id, client_id, client_secret } => {
                Arc::new(ClientSecretTokenProvider {
                    tenant_id,
                    client_id,
                    client_secret,
                    login_base: login_base.trim_end_matches('/').to_string(),
                    client: http,
                    cache: Mutex::new(None),
                })
            }
            Credentials::ManagedIdentity { client_id } => Arc::new(ManagedIdentityTokenProvider {
                client_id,
                client: http,
                cache: Mutex::new(None),
            }),
            Credentials::AzureCli { tenant_id } => Arc::new(AzureCliTokenProvider { tenant_id }),
            Credentials::Static(tok) => Arc::new(StaticToken(tok)),
        }
    }
}

type TokenCache = Mutex<Option<(String, Instant)>>;

async fn cached(cache: &TokenCache) -> Option<String> {
    let guard = cache.lock().await;
    match guard.as_ref() {
        Some((tok, expiry)) if Instant::now() < *expiry => Some(tok.clone()),
        _ => None,
    }
}

// ── Client secret ─────────────────────────────────────────────────────────────

struct ClientSecretTokenProvider {
    tenant_id:     String,
    client_id:     String,
    client_secret: String,
    login_base:    String,
    client:        reqwest::Client,
    cache:         TokenCache,
}

#[async_trait]
impl TokenProvider for ClientSecretTokenProvider {
    async fn token(&self) -> Result<String, GraphError> {
        if let Some(tok) = cached(&self.cache).await {
            return Ok(tok);
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant_id);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
        ];
        debug!(tenant_id = %self.tenant_id, "requesting client credentials token");
        let resp: Value = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GraphError::Auth(format!("token request: {}", e)))?
            .json()
            .await
            .map_err(|e| GraphError::Auth(format!("token decode: {}", e)))?;

        let tok = resp["access_token"]
            .as_str()
            .ok_or_else(|| {
                let detail = resp["error_description"].as_str().unwrap_or("no access_token in response");
                GraphError::Auth(detail.to_string())
            })?
            .to_string();
        let expires_in = resp["expires_in"].as_u64().unwrap_or(3600);
        let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));

        *self.cache.lock().await = Some((tok.clone(), expiry));
        Ok(tok)
    }
}

// ── Managed Identity (IMDS) ───────────────────────────────────────────────────

struct ManagedIdentityTokenProvider {
    client_id: Option<String>,
    client:    reqwest::Client,
    cache:     TokenCache,
}

#[async_trait]
impl TokenProvider for ManagedIdentityTokenProvider {
    async fn token(&self) -> Result<String, GraphError> {
        if let Some(tok) = cached(&self.cache).await {
            return Ok(tok);
        }

        let mut query = vec![("api-version", "2018-02-01"), ("resource", GRAPH_RESOURCE)];
        if let Some(cid) = &self.client_id {
            query.push(("client_id", cid.as_str()));
        }
        let resp: Value = self
            .client
            .get("http://169.254.169.254/metadata/identity/oauth2/token")
            .header("Metadata", "true")
            .query(&query)
            .send()
            .await
            .map_err(|e| GraphError::Auth(format!("IMDS token request: {}", e)))?
            .json()
            .await
            .map_err(|e| GraphError::Auth(format!("IMDS token decode: {}", e)))?;

        let tok = resp["access_token"]
            .as_str()
            .ok_or_else(|| GraphError::Auth(format!("IMDS token: no access_token: {}", resp)))?
            .to_string();
        // IMDS reports expires_in as a string.
        let expires_in = resp["expires_in"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(3600);
        let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));

        *self.cache.lock().await = Some((tok.clone(), expiry));
        Ok(tok)
    }
}

// ── Azure CLI ─────────────────────────────────────────────────────────────────

struct AzureCliTokenProvider {
    tenant_id: Option<String>,
}

#[async_trait]
impl TokenProvider for AzureCliTokenProvider {
    async fn token(&self) -> Result<String, GraphError> {
        let mut cmd = Command::new("az");
        cmd.args(["account", "get-access-token", "--resource-type", "ms-graph", "--output", "json"]);
        if let Some(tenant) = &self.tenant_id {
            cmd.args(["--tenant", tenant.as_str()]);
        }
        let output = cmd.output().await.map_err(|e| {
            GraphError::Auth(format!(
                "az CLI not found: {}. Install Azure CLI or configure client credentials.",
                e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GraphError::Auth(format!(
                "az account get-access-token failed: {}. Run 'az login' first.",
                stderr.trim()
            )));
        }

        let resp: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| GraphError::Auth(format!("az CLI output parse: {}", e)))?;
        let tok = resp["accessToken"]
            .as_str()
            .ok_or_else(|| GraphError::Auth("az CLI: no accessToken in output".into()))?
            .to_string();
        Ok(tok)
    }
}

// ── Static ────────────────────────────────────────────────────────────────────

pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, GraphError> {
        Ok(self.0.clone())
    }
}
