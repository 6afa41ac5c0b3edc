//! Contracts for the external collaborators the auth core consumes.
//!
//! The orchestrator only ever sees these traits; HTTP-backed implementations
//! live in [`http`], and tests substitute their own doubles.

pub mod http;

use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Collaborator-side error taxonomy. Each orchestrator call site remaps these
/// through its own table; nothing here reaches callers unmapped.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
}

/// Registration payload handed to the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// The identity provider's view of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityUser {
    /// The provider's own subject id.
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Successful credential check: the provider's own token plus its user view.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityLogin {
    pub token: String,
    pub user: IdentityUser,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn register(&self, identity: &NewIdentity) -> Result<IdentityUser, ProviderError>;
    async fn login(&self, identifier: &str, password: &str)
        -> Result<IdentityLogin, ProviderError>;
}

/// Attributes for creating or updating a registry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    pub external_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// The application's own subject record, keyed independently from the
/// identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub id: String,
    pub external_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Persisted access-control entry; resolved into the token role at
    /// issuance and never recomputed from the token afterward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordFilter {
    pub email: Option<String>,
    pub external_id: Option<String>,
}

#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// May fail with [`ProviderError::Conflict`]; the orchestrator handles
    /// that by falling back to an update.
    async fn create(&self, record: &NewRecord) -> Result<RegistryRecord, ProviderError>;
    async fn update(&self, id: &str, attrs: &NewRecord) -> Result<RegistryRecord, ProviderError>;
    async fn get(&self, id: &str) -> Result<Option<RegistryRecord>, ProviderError>;
    async fn filter(&self, criteria: &RecordFilter) -> Result<Vec<RegistryRecord>, ProviderError>;
}

/// Delivery metadata recorded by the messaging provider for a sent message.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveredMessage {
    pub subject_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Unix seconds at which the message went out.
    pub sent_at: i64,
}

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Deliver `content` to the subject's channel; returns a delivery id.
    async fn send(&self, subject_id: &str, content: &str) -> Result<String, ProviderError>;
    /// Look up a delivered message by the token embedded in it.
    async fn get_by_token(&self, token: &str) -> Result<Option<DeliveredMessage>, ProviderError>;
}

/// Source of one-time codes. Opaque to the core beyond an expectation of
/// uniqueness within the code TTL.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Six-digit numeric codes from the operating system RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = OsRng;
        format!("{:06}", rng.gen_range(0..1_000_000))
    }
}

/// Access-control lookup consulted at token issuance.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn role_for_email(&self, email: &str) -> Result<Option<String>, ProviderError>;
}

/// Serves role lookups from the registry's records.
pub struct RegistryRoleDirectory {
    registry: Arc<dyn ClientRegistry>,
}

impl RegistryRoleDirectory {
    #[must_use]
    pub fn new(registry: Arc<dyn ClientRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl RoleDirectory for RegistryRoleDirectory {
    async fn role_for_email(&self, email: &str) -> Result<Option<String>, ProviderError> {
        let matches = self
            .registry
            .filter(&RecordFilter {
                email: Some(email.to_string()),
                ..RecordFilter::default()
            })
            .await?;
        Ok(matches.into_iter().next().and_then(|record| record.role))
    }
}
