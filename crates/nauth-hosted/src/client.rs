//! Thin typed wrapper over the hosted `/api/core/beta` REST surface
//! (spec.md §4.6). Route paths, method, and error formatting are
//! compatibility surfaces.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

const BASE_PATH: &str = "/api/core/beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum HostedApiError {
    #[error("{method} {url} failed: {source}")]
    Send {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned {status}: {body_snippet}")]
    Status {
        method: String,
        url: String,
        status: StatusCode,
        body_snippet: String,
    },
    #[error("failed to decode response body from {method} {url}: {source}")]
    Decode {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Supplies the bearer token lazily so a short-lived or rotating token
/// never goes stale across the client's lifetime.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> String;
}

pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> String {
        self.0.clone()
    }
}

pub struct HostedClient {
    http: reqwest::Client,
    base_url: String,
    token: Box<dyn TokenProvider>,
}

impl HostedClient {
    pub fn new(base_url: impl Into<String>, token: Box<dyn TokenProvider>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token,
        })
    }

    async fn call<B: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<R, HostedApiError> {
        let url = format!("{}{BASE_PATH}{path}", self.base_url);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(self.token.token());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|source| HostedApiError::Send {
            method: method.to_string(),
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_snippet = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(500)
                .collect();
            return Err(HostedApiError::Status {
                method: method.to_string(),
                url,
                status,
                body_snippet,
            });
        }

        response.json::<R>().await.map_err(|source| HostedApiError::Decode {
            method: method.to_string(),
            url,
            source,
        })
    }

    async fn call_no_body<R: DeserializeOwned>(&self, method: Method, path: &str) -> Result<R, HostedApiError> {
        self.call::<(), R>(method, path, None).await
    }

    /// For endpoints that return no body on success (e.g. `204 No Content`
    /// deletes) — only status is checked.
    async fn call_no_response(&self, method: Method, path: &str) -> Result<(), HostedApiError> {
        let url = format!("{}{BASE_PATH}{path}", self.base_url);
        let response = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(self.token.token())
            .send()
            .await
            .map_err(|source| HostedApiError::Send {
                method: method.to_string(),
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_snippet = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(500)
                .collect();
            return Err(HostedApiError::Status {
                method: method.to_string(),
                url,
                status,
                body_snippet,
            });
        }
        Ok(())
    }

    pub async fn list_systems(&self, team_id: &str) -> Result<Vec<Value>, HostedApiError> {
        self.call_no_body(Method::GET, &format!("/teams/{team_id}/systems")).await
    }

    pub async fn list_accounts(&self, system_id: &str) -> Result<Vec<Value>, HostedApiError> {
        self.call_no_body(Method::GET, &format!("/systems/{system_id}/accounts")).await
    }

    pub async fn create_account<B: Serialize>(&self, system_id: &str, body: &B) -> Result<Value, HostedApiError> {
        self.call(Method::POST, &format!("/systems/{system_id}/accounts"), Some(body)).await
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Value, HostedApiError> {
        self.call_no_body(Method::GET, &format!("/accounts/{account_id}")).await
    }

    pub async fn patch_account<B: Serialize>(&self, account_id: &str, body: &B) -> Result<Value, HostedApiError> {
        self.call(Method::PATCH, &format!("/accounts/{account_id}"), Some(body)).await
    }

    pub async fn delete_account(&self, account_id: &str) -> Result<(), HostedApiError> {
        self.call_no_response(Method::DELETE, &format!("/accounts/{account_id}")).await
    }

    pub async fn list_sk_groups(&self, account_id: &str) -> Result<Vec<Value>, HostedApiError> {
        self.call_no_body(Method::GET, &format!("/accounts/{account_id}/account-sk-groups")).await
    }

    pub async fn list_users(&self, account_id: &str) -> Result<Vec<Value>, HostedApiError> {
        self.call_no_body(Method::GET, &format!("/accounts/{account_id}/nats-users")).await
    }

    pub async fn create_user<B: Serialize>(&self, account_id: &str, body: &B) -> Result<Value, HostedApiError> {
        self.call(Method::POST, &format!("/accounts/{account_id}/nats-users"), Some(body)).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Value, HostedApiError> {
        self.call_no_body(Method::GET, &format!("/nats-users/{user_id}")).await
    }

    pub async fn patch_user<B: Serialize>(&self, user_id: &str, body: &B) -> Result<Value, HostedApiError> {
        self.call(Method::PATCH, &format!("/nats-users/{user_id}"), Some(body)).await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), HostedApiError> {
        self.call_no_response(Method::DELETE, &format!("/nats-users/{user_id}")).await
    }

    pub async fn fetch_user_creds(&self, user_id: &str) -> Result<String, HostedApiError> {
        let value: Value = self
            .call_no_body(Method::POST, &format!("/nats-users/{user_id}/creds"))
            .await?;
        Ok(value
            .get("creds")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    pub async fn list_streams(&self, account_id: &str) -> Result<Vec<Value>, HostedApiError> {
        self.call_no_body(Method::GET, &format!("/accounts/{account_id}/jetstream/streams")).await
    }

    pub async fn list_kv_buckets(&self, account_id: &str) -> Result<Vec<Value>, HostedApiError> {
        self.call_no_body(Method::GET, &format!("/accounts/{account_id}/jetstream/kv-buckets")).await
    }

    pub async fn list_object_buckets(&self, account_id: &str) -> Result<Vec<Value>, HostedApiError> {
        self.call_no_body(Method::GET, &format!("/accounts/{account_id}/jetstream/object-buckets")).await
    }
}
