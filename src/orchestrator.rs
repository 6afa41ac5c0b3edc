//! Login strategy orchestration.
//!
//! Each operation is a stateless transaction over the stores, the token
//! issuer, and the three external collaborators. Collaborator failures are
//! remapped at every call site; nothing propagates in a provider's own shape.

use base64ct::{Base64, Encoding};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::clock;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::profile::{merge_profiles, source_fields, UserProfile};
use crate::providers::{
    ClientRegistry, CodeGenerator, IdentityProvider, IdentityUser, MessagingProvider, NewIdentity,
    NewRecord, ProviderError, RecordFilter, RegistryRecord,
};
use crate::signature;
use crate::store::{OtpStore, RevocationStore};
use crate::token::{SessionClaims, Subject, TokenIssuer};

const MIN_PASSWORD_LENGTH: usize = 8;

/// An issued token plus the normalized profile it was issued for.
#[derive(Debug)]
pub struct AuthSession {
    pub token: String,
    pub profile: UserProfile,
}

/// Result of an embed login: no registry profile exists on this path, only
/// the token and a partner-facing signature for later correlation.
#[derive(Debug)]
pub struct EmbedSession {
    pub token: String,
    pub partner_signature: String,
}

/// Partner-supplied embed payload. Decoded only after the signature over the
/// transmitted blob has been verified.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedContext {
    pub subject: String,
    pub person_id: String,
}

pub struct AuthOrchestrator {
    config: AuthConfig,
    identity: Arc<dyn IdentityProvider>,
    registry: Arc<dyn ClientRegistry>,
    messaging: Arc<dyn MessagingProvider>,
    codes: Arc<dyn CodeGenerator>,
    tokens: Arc<TokenIssuer>,
    otp: Arc<OtpStore>,
    revocations: Arc<RevocationStore>,
}

impl AuthOrchestrator {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        config: AuthConfig,
        identity: Arc<dyn IdentityProvider>,
        registry: Arc<dyn ClientRegistry>,
        messaging: Arc<dyn MessagingProvider>,
        codes: Arc<dyn CodeGenerator>,
        tokens: Arc<TokenIssuer>,
        otp: Arc<OtpStore>,
        revocations: Arc<RevocationStore>,
    ) -> Self {
        Self {
            config,
            identity,
            registry,
            messaging,
            codes,
            tokens,
            otp,
            revocations,
        }
    }

    /// Password login, delegated to the identity provider.
    ///
    /// # Errors
    /// `Validation` for malformed input, `Unauthorized` for bad credentials
    /// (no registry call is made in that case), `ServiceUnavailable` when a
    /// collaborator fails.
    #[instrument(skip_all)]
    pub async fn password_login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "missing identifier or password".to_string(),
            ));
        }

        let login = self
            .identity
            .login(identifier, password)
            .await
            .map_err(map_identity_login)?;

        // Registration on first login belongs to the signup path; here an
        // absent record only thins the profile.
        let record = self
            .registry
            .filter(&RecordFilter {
                external_id: Some(login.user.id.clone()),
                ..RecordFilter::default()
            })
            .await
            .map_err(map_registry)?
            .into_iter()
            .next();

        self.session_for(&login.user, record.as_ref()).await
    }

    /// Register with the identity provider, then create-or-update the
    /// registry record. Idempotent with respect to registry state; a
    /// provider-level duplicate still fails at step one.
    ///
    /// # Errors
    /// `Validation` for malformed input or provider-reported registration
    /// failures, `ServiceUnavailable` for collaborator failures.
    #[instrument(skip_all)]
    pub async fn signup(&self, request: &NewIdentity) -> Result<AuthSession, AuthError> {
        let email = normalize_email(&request.email);
        if !valid_email(&email) {
            return Err(AuthError::Validation("invalid email".to_string()));
        }
        if request.username.trim().is_empty() {
            return Err(AuthError::Validation("missing username".to_string()));
        }
        if request.password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::Validation("password too short".to_string()));
        }

        let user = self
            .identity
            .register(request)
            .await
            .map_err(map_identity_register)?;

        let attrs = NewRecord {
            external_id: user.id.clone(),
            email: email.clone(),
            username: Some(request.username.clone()),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
        };

        let record = match self.registry.create(&attrs).await {
            Ok(record) => record,
            Err(ProviderError::Conflict(_)) => {
                // The subject already has a record: update it in place and
                // re-fetch, instead of surfacing the conflict.
                debug!("registry record exists, falling back to update");
                self.absorb_registry_conflict(&email, &attrs).await?
            }
            Err(err) => return Err(map_registry(err)),
        };

        self.session_for(&user, Some(&record)).await
    }

    /// Dispatch a one-time code to the subject's delivery channel.
    ///
    /// # Errors
    /// `Forbidden` while the resend cooldown is live, `ServiceUnavailable`
    /// when delivery fails.
    #[instrument(skip_all)]
    pub async fn send_code(&self, subject_id: &str) -> Result<String, AuthError> {
        let now = clock::unix_now();
        self.otp.request_send(subject_id, now).await?;
        let code = self
            .otp
            .generate_and_store(subject_id, self.codes.as_ref(), now)
            .await;
        let delivery = self
            .messaging
            .send(subject_id, &code)
            .await
            .map_err(map_messaging)?;
        debug!(subject_id, delivery = %delivery, "one-time code dispatched");
        Ok(delivery)
    }

    /// Exchange a one-time code for a session. The code is gone afterwards
    /// whether or not issuance succeeds.
    ///
    /// # Errors
    /// `Forbidden` when the code is invalid, expired, or already used.
    #[instrument(skip_all)]
    pub async fn code_login(&self, code: &str) -> Result<AuthSession, AuthError> {
        let now = clock::unix_now();
        let subject_id = match self.otp.consume(code, now).await {
            Ok(subject_id) => subject_id,
            Err(AuthError::NotFound(_)) => {
                return Err(AuthError::Forbidden(
                    "invalid or expired code".to_string(),
                ));
            }
            Err(err) => return Err(err),
        };
        self.subject_session(&subject_id).await
    }

    /// Exchange a delivered magic-link token for a session.
    ///
    /// # Errors
    /// `Forbidden` when no message matches or the link expired;
    /// `RetryWithNewCode` when it expired but auto-resend dispatched a fresh
    /// code for the same subject.
    #[instrument(skip_all)]
    pub async fn magic_link_login(&self, token: &str) -> Result<AuthSession, AuthError> {
        let message = self
            .messaging
            .get_by_token(token)
            .await
            .map_err(map_messaging)?
            .ok_or_else(|| AuthError::Forbidden("unknown login link".to_string()))?;

        let now = clock::unix_now();
        if now - message.sent_at > self.config.magic_link_ttl_seconds() {
            if self.config.auto_resend() {
                self.resend_after_expiry(&message.subject_id).await?;
                return Err(AuthError::RetryWithNewCode(
                    "login link expired; a new code was sent".to_string(),
                ));
            }
            return Err(AuthError::Forbidden("login link expired".to_string()));
        }

        self.subject_session(&message.subject_id).await
    }

    /// Session establishment from a trusted partner embed.
    ///
    /// # Errors
    /// `Unauthorized` on signature mismatch (the payload is never decoded),
    /// `Validation` when a verified payload is malformed.
    #[instrument(skip_all)]
    pub async fn embed_login(
        &self,
        context: &str,
        context_signature: &str,
    ) -> Result<EmbedSession, AuthError> {
        if !signature::verify(
            context.as_bytes(),
            context_signature,
            self.config.embed_shared_key(),
        ) {
            warn!("embed context signature mismatch");
            return Err(AuthError::Unauthorized(
                "invalid embed signature".to_string(),
            ));
        }

        let embed = decode_embed_context(context)?;
        let subject = Subject {
            id: embed.subject.clone(),
            email: embed.subject.clone(),
            role: Some(self.config.embed_role().to_string()),
        };
        let token = self.tokens.issue(&subject, None).await?;
        let partner_signature =
            signature::derive(&embed.person_id, self.config.embed_shared_key());
        Ok(EmbedSession {
            token,
            partner_signature,
        })
    }

    /// Re-sign the presented claims without extending their trust window.
    ///
    /// # Errors
    /// `Internal` when the claims lack issuance metadata.
    pub async fn refresh(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        self.tokens.refresh(claims).await
    }

    /// Revoke the presented token until its natural expiry. Claims without a
    /// jti or expiry are a defensive no-op.
    pub async fn logout(&self, claims: &SessionClaims) {
        if let (Some(jti), Some(exp)) = (&claims.jti, claims.exp) {
            self.revocations.revoke(jti, exp, clock::unix_now()).await;
            debug!(jti = %jti, "token revoked on logout");
        }
    }

    /// Verify a presented token and check it against the revocation list.
    ///
    /// # Errors
    /// `Unauthorized` for invalid, expired, or revoked tokens.
    pub async fn authenticate(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let now = clock::unix_now();
        let claims = self.tokens.verify(token, now)?;
        if let Some(jti) = &claims.jti {
            if self.revocations.is_revoked(jti, now).await {
                return Err(AuthError::Unauthorized("token revoked".to_string()));
            }
        }
        Ok(claims)
    }

    async fn absorb_registry_conflict(
        &self,
        email: &str,
        attrs: &NewRecord,
    ) -> Result<RegistryRecord, AuthError> {
        let existing = self
            .registry
            .filter(&RecordFilter {
                email: Some(email.to_string()),
                ..RecordFilter::default()
            })
            .await
            .map_err(map_registry)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                AuthError::ServiceUnavailable(
                    "registry reported a conflict but no record matches".to_string(),
                )
            })?;

        self.registry
            .update(&existing.id, attrs)
            .await
            .map_err(map_registry)?;
        self.registry
            .get(&existing.id)
            .await
            .map_err(map_registry)?
            .ok_or_else(|| {
                AuthError::ServiceUnavailable("registry record vanished mid-signup".to_string())
            })
    }

    /// Issue a token and merge the profile for an identity-provider user,
    /// with the registry record as the lower-precedence source.
    async fn session_for(
        &self,
        user: &IdentityUser,
        record: Option<&RegistryRecord>,
    ) -> Result<AuthSession, AuthError> {
        let identity_fields = source_fields(user);
        let profile = match record {
            Some(record) => merge_profiles(&[&source_fields(record), &identity_fields]),
            None => merge_profiles(&[&identity_fields]),
        };

        let subject = Subject {
            id: record.map_or_else(|| user.id.clone(), |record| record.id.clone()),
            email: user.email.clone(),
            role: record.and_then(|record| record.role.clone()),
        };
        let token = self.tokens.issue(&subject, None).await?;
        Ok(AuthSession { token, profile })
    }

    /// Session for a subject known only by its registry id (OTP and
    /// magic-link paths).
    async fn subject_session(&self, subject_id: &str) -> Result<AuthSession, AuthError> {
        let record = self
            .registry
            .get(subject_id)
            .await
            .map_err(map_registry)?
            .ok_or_else(|| AuthError::NotFound("no record for subject".to_string()))?;

        let profile = merge_profiles(&[&source_fields(&record)]);
        let subject = Subject {
            id: record.id.clone(),
            email: record.email.clone(),
            role: record.role.clone(),
        };
        let token = self.tokens.issue(&subject, None).await?;
        Ok(AuthSession { token, profile })
    }

    async fn resend_after_expiry(&self, subject_id: &str) -> Result<(), AuthError> {
        match self.send_code(subject_id).await {
            Ok(_) => Ok(()),
            // A live cooldown means a fresh code is already out there.
            Err(AuthError::Forbidden(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn decode_embed_context(context: &str) -> Result<EmbedContext, AuthError> {
    let bytes = Base64::decode_vec(context.trim())
        .map_err(|_| AuthError::Validation("malformed embed context".to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| AuthError::Validation("malformed embed context".to_string()))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

// Per-call-site mapping tables. Identity login and registration differ in how
// conflicts surface; registry and messaging failures never carry a specific
// user-facing meaning.

fn map_identity_login(err: ProviderError) -> AuthError {
    match err {
        ProviderError::Validation(msg) => AuthError::Validation(msg),
        ProviderError::Unauthorized(_) => {
            AuthError::Unauthorized("invalid credentials".to_string())
        }
        ProviderError::Conflict(msg)
        | ProviderError::NotFound(msg)
        | ProviderError::Unavailable(msg) => AuthError::ServiceUnavailable(msg),
    }
}

fn map_identity_register(err: ProviderError) -> AuthError {
    match err {
        // Provider-level duplicates surface exactly as the provider reports
        // them: a registration validation failure.
        ProviderError::Validation(msg) | ProviderError::Conflict(msg) => {
            AuthError::Validation(msg)
        }
        ProviderError::Unauthorized(msg) => AuthError::Unauthorized(msg),
        ProviderError::NotFound(msg) | ProviderError::Unavailable(msg) => {
            AuthError::ServiceUnavailable(msg)
        }
    }
}

fn map_registry(err: ProviderError) -> AuthError {
    AuthError::ServiceUnavailable(err.to_string())
}

fn map_messaging(err: ProviderError) -> AuthError {
    AuthError::ServiceUnavailable(err.to_string())
}
