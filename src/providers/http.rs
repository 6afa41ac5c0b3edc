//! Reqwest-backed collaborator clients.
//!
//! Each client owns a [`reqwest::Client`] with the configured timeout and a
//! crate user-agent. Failure statuses go through one explicit mapping; the
//! orchestrator never sees a raw transport error.

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info_span, Instrument};
use url::Url;

use super::{
    ClientRegistry, DeliveredMessage, IdentityLogin, IdentityProvider, IdentityUser,
    MessagingProvider, NewIdentity, NewRecord, ProviderError, RecordFilter, RegistryRecord,
};
use async_trait::async_trait;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|_| ProviderError::Unavailable("failed to build HTTP client".to_string()))
}

/// Validate and normalize the collaborator base URL once, at construction.
fn base_url(url: &str) -> Result<String, ProviderError> {
    let parsed =
        Url::parse(url).map_err(|_| ProviderError::Unavailable("invalid base URL".to_string()))?;
    if parsed.host().is_none() {
        return Err(ProviderError::Unavailable(
            "base URL has no host".to_string(),
        ));
    }
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ProviderError::Unavailable(format!(
                "unsupported scheme {scheme}"
            )));
        }
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn map_status(status: StatusCode, detail: String) -> ProviderError {
    match status.as_u16() {
        400 => ProviderError::Validation(detail),
        401 | 403 => ProviderError::Unauthorized(detail),
        404 => ProviderError::NotFound(detail),
        409 => ProviderError::Conflict(detail),
        _ => ProviderError::Unavailable(detail),
    }
}

async fn failure(response: Response) -> ProviderError {
    let status = response.status();
    let detail = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| {
            body.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| status.to_string());
    debug!(%status, "collaborator call failed");
    map_status(status, detail)
}

fn transport(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Unavailable("request timed out".to_string())
    } else {
        ProviderError::Unavailable("provider unreachable".to_string())
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, ProviderError> {
    response
        .json::<T>()
        .await
        .map_err(|_| ProviderError::Unavailable("malformed provider response".to_string()))
}

/// External identity provider owning credential checks and registration.
pub struct HttpIdentityProvider {
    client: Client,
    base: String,
}

impl HttpIdentityProvider {
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(base: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            base: base_url(base)?,
        })
    }
}

#[derive(serde::Serialize)]
struct LoginBody<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn register(&self, identity: &NewIdentity) -> Result<IdentityUser, ProviderError> {
        let url = format!("{}/auth/register", self.base);
        let span = info_span!("identity.register", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .json(identity)
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport(&err))?;

        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        decode(response).await
    }

    async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<IdentityLogin, ProviderError> {
        let url = format!("{}/auth/login", self.base);
        let span = info_span!("identity.login", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .json(&LoginBody {
                identifier,
                password,
            })
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport(&err))?;

        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        decode(response).await
    }
}

/// The application's own subject registry.
pub struct HttpClientRegistry {
    client: Client,
    base: String,
}

impl HttpClientRegistry {
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(base: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            base: base_url(base)?,
        })
    }
}

#[async_trait]
impl ClientRegistry for HttpClientRegistry {
    async fn create(&self, record: &NewRecord) -> Result<RegistryRecord, ProviderError> {
        let url = format!("{}/records", self.base);
        let span = info_span!("registry.create", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .json(record)
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport(&err))?;

        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        decode(response).await
    }

    async fn update(&self, id: &str, attrs: &NewRecord) -> Result<RegistryRecord, ProviderError> {
        let url = format!("{}/records/{id}", self.base);
        let span = info_span!("registry.update", http.method = "PUT", url = %url);
        let response = self
            .client
            .put(&url)
            .json(attrs)
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport(&err))?;

        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        decode(response).await
    }

    async fn get(&self, id: &str) -> Result<Option<RegistryRecord>, ProviderError> {
        let url = format!("{}/records/{id}", self.base);
        let span = info_span!("registry.get", http.method = "GET", url = %url);
        let response = self
            .client
            .get(&url)
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport(&err))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        decode(response).await.map(Some)
    }

    async fn filter(&self, criteria: &RecordFilter) -> Result<Vec<RegistryRecord>, ProviderError> {
        let url = format!("{}/records", self.base);
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(email) = &criteria.email {
            query.push(("email", email));
        }
        if let Some(external_id) = &criteria.external_id {
            query.push(("external_id", external_id));
        }

        let span = info_span!("registry.filter", http.method = "GET", url = %url);
        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport(&err))?;

        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        decode(response).await
    }
}

/// Messaging provider delivering codes and recording delivery metadata.
pub struct HttpMessagingProvider {
    client: Client,
    base: String,
}

impl HttpMessagingProvider {
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(base: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            base: base_url(base)?,
        })
    }
}

#[derive(serde::Serialize)]
struct SendBody<'a> {
    subject_id: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct Delivery {
    id: String,
}

#[async_trait]
impl MessagingProvider for HttpMessagingProvider {
    async fn send(&self, subject_id: &str, content: &str) -> Result<String, ProviderError> {
        let url = format!("{}/messages", self.base);
        let span = info_span!("messaging.send", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .json(&SendBody {
                subject_id,
                content,
            })
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport(&err))?;

        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        let delivery: Delivery = decode(response).await?;
        Ok(delivery.id)
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<DeliveredMessage>, ProviderError> {
        let url = format!("{}/messages/by-token/{token}", self.base);
        let span = info_span!("messaging.get_by_token", http.method = "GET", url = %url);
        let response = self
            .client
            .get(&url)
            .send()
            .instrument(span)
            .await
            .map_err(|err| transport(&err))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        decode(response).await.map(Some)
    }
}
