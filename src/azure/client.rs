//! HTTP plumbing for Azure Resource Manager calls
//!
//! Thin wrapper around reqwest that attaches bearer tokens, checks response
//! status with sanitized error logging, and follows `nextLink` pagination
//! for list endpoints.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::auth::AzureCredentials;
use super::model::ListEnvelope;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging: strip non-printable characters and
/// truncate long responses.
fn sanitize_for_log(body: &str) -> String {
    let printable: String = body
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .collect();

    if printable.len() > MAX_LOG_BODY_LENGTH {
        format!(
            "{}... [truncated, {} bytes total]",
            &printable[..MAX_LOG_BODY_LENGTH],
            body.len()
        )
    } else {
        printable
    }
}

/// Client for the ARM management endpoint.
#[derive(Clone)]
pub struct ArmClient {
    client: Client,
    credentials: AzureCredentials,
    management_endpoint: String,
}

impl ArmClient {
    pub fn new(client: Client, credentials: AzureCredentials, management_endpoint: &str) -> Self {
        Self {
            client,
            credentials,
            management_endpoint: management_endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Build a reqwest client with the settings shared by all callers.
    pub fn build_http_client() -> Result<Client> {
        Client::builder()
            .user_agent(concat!("azure-janitor/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")
    }

    /// Absolute URL for a management path ("/subscriptions/...") with an
    /// api-version and optional extra query parameters.
    pub fn management_url(&self, path: &str, api_version: &str, query: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}{}?api-version={}",
            self.management_endpoint, path, api_version
        );
        for (key, value) in query {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    /// GET a single JSON document.
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!("GET {}", url);
        let token = self.credentials.get_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(anyhow::anyhow!("API request failed: {}", status));
        }

        serde_json::from_str(&body).context("Failed to parse response JSON")
    }

    /// GET a paged list, following `nextLink` until exhausted.
    pub async fn get_paged<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        let mut pages = 0usize;

        while let Some(page_url) = next {
            let page: ListEnvelope<T> = self.get(&page_url).await?;
            items.extend(page.value);
            next = page.next_link;
            pages += 1;
        }

        tracing::debug!("fetched {} items over {} pages", items.len(), pages);
        Ok(items)
    }

    /// DELETE a resource; empty response bodies are expected.
    pub async fn delete(&self, url: &str) -> Result<()> {
        tracing::debug!("DELETE {}", url);
        let token = self.credentials.get_token().await?;

        let response = self
            .client
            .delete(url)
            .bearer_auth(&token)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(anyhow::anyhow!("API request failed: {}", status));
        }

        Ok(())
    }

    /// PATCH a resource with a JSON body (used for tag updates).
    pub async fn patch(&self, url: &str, body: &Value) -> Result<()> {
        tracing::debug!("PATCH {}", url);
        let token = self.credentials.get_token().await?;

        let response = self
            .client
            .patch(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let response_body = response
                .text()
                .await
                .context("Failed to read response body")?;
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(anyhow::anyhow!("API request failed: {}", status));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_for_log_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("truncated"));
        assert!(sanitized.len() < body.len());
    }

    #[test]
    fn test_sanitize_for_log_strips_non_printable_characters() {
        assert_eq!(sanitize_for_log("ok\n\tdone\u{1F600}"), "okdone");
    }
}
