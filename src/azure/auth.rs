//! Azure AD authentication
//!
//! Acquires management-plane access tokens through the OAuth 2.0
//! client-credentials flow and caches them until shortly before expiry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if the token response carries no expiry
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Azure AD credentials holder with token caching
#[derive(Clone)]
pub struct AzureCredentials {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl AzureCredentials {
    /// Create credentials for a service principal.
    ///
    /// `login_endpoint` is the AAD authority base URL, `scope` the resource
    /// scope to request (usually `{management endpoint}/.default`).
    pub fn new(
        client: Client,
        login_endpoint: &str,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                login_endpoint.trim_end_matches('/'),
                tenant_id
            ),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Create credentials from the conventional environment variables
    /// `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`.
    pub fn from_env(client: Client, login_endpoint: &str, scope: impl Into<String>) -> Result<Self> {
        let tenant_id = std::env::var("AZURE_TENANT_ID")
            .context("AZURE_TENANT_ID is not set; service principal credentials are required")?;
        let client_id = std::env::var("AZURE_CLIENT_ID").context("AZURE_CLIENT_ID is not set")?;
        let client_secret =
            std::env::var("AZURE_CLIENT_SECRET").context("AZURE_CLIENT_SECRET is not set")?;

        Ok(Self::new(
            client,
            login_endpoint,
            &tenant_id,
            client_id,
            client_secret,
            scope,
        ))
    }

    /// Get an access token for management API calls, using the cache when
    /// the previous token is still valid.
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("cached token expired, fetching new token");
            }
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await
            .context("Failed to send token request")?;

        let status = response.status();
        if !status.is_success() {
            // the error body can describe the failing credential; never log it
            return Err(anyhow::anyhow!("Token request failed: {}", status));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        let ttl = token_response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_response.access_token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "new token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token_response.access_token)
    }
}
