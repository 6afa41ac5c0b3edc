//! Immutable configuration handed to each component at construction.

use secrecy::SecretString;
use std::time::Duration;

const DEFAULT_OTP_CODE_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_MAGIC_LINK_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_ROLE: &str = "authenticated";
const DEFAULT_EMBED_ROLE: &str = "operator";
const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 10;

/// Built once at wiring time and never mutated afterward; components read
/// from it at construction, not from ambient state.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    issuer: String,
    embed_shared_key: SecretString,
    default_role: String,
    embed_role: String,
    otp_code_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
    magic_link_ttl_seconds: i64,
    auto_resend: bool,
    provider_timeout: Duration,
}

impl AuthConfig {
    #[must_use]
    pub fn new(issuer: String, embed_shared_key: SecretString) -> Self {
        Self {
            issuer,
            embed_shared_key,
            default_role: DEFAULT_ROLE.to_string(),
            embed_role: DEFAULT_EMBED_ROLE.to_string(),
            otp_code_ttl_seconds: DEFAULT_OTP_CODE_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            magic_link_ttl_seconds: DEFAULT_MAGIC_LINK_TTL_SECONDS,
            auto_resend: false,
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_default_role(mut self, role: String) -> Self {
        self.default_role = role;
        self
    }

    #[must_use]
    pub fn with_embed_role(mut self, role: String) -> Self {
        self.embed_role = role;
        self
    }

    #[must_use]
    pub fn with_otp_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_magic_link_ttl_seconds(mut self, seconds: i64) -> Self {
        self.magic_link_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_auto_resend(mut self, enabled: bool) -> Self {
        self.auto_resend = enabled;
        self
    }

    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn embed_shared_key(&self) -> &SecretString {
        &self.embed_shared_key
    }

    #[must_use]
    pub fn default_role(&self) -> &str {
        &self.default_role
    }

    #[must_use]
    pub fn embed_role(&self) -> &str {
        &self.embed_role
    }

    #[must_use]
    pub fn otp_code_ttl_seconds(&self) -> i64 {
        self.otp_code_ttl_seconds
    }

    #[must_use]
    pub fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    #[must_use]
    pub fn magic_link_ttl_seconds(&self) -> i64 {
        self.magic_link_ttl_seconds
    }

    #[must_use]
    pub fn auto_resend(&self) -> bool {
        self.auto_resend
    }

    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        self.provider_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::AuthConfig;
    use secrecy::SecretString;
    use std::time::Duration;

    fn config() -> AuthConfig {
        AuthConfig::new(
            "https://api.passgate.dev".to_string(),
            SecretString::from("embed-key".to_string()),
        )
    }

    #[test]
    fn defaults() {
        let config = config();
        assert_eq!(config.issuer(), "https://api.passgate.dev");
        assert_eq!(config.default_role(), super::DEFAULT_ROLE);
        assert_eq!(config.embed_role(), super::DEFAULT_EMBED_ROLE);
        assert_eq!(
            config.otp_code_ttl_seconds(),
            super::DEFAULT_OTP_CODE_TTL_SECONDS
        );
        assert_eq!(
            config.resend_cooldown_seconds(),
            super::DEFAULT_RESEND_COOLDOWN_SECONDS
        );
        assert_eq!(
            config.magic_link_ttl_seconds(),
            super::DEFAULT_MAGIC_LINK_TTL_SECONDS
        );
        assert!(!config.auto_resend());
        assert_eq!(
            config.provider_timeout(),
            Duration::from_secs(super::DEFAULT_PROVIDER_TIMEOUT_SECONDS)
        );
    }

    #[test]
    fn overrides() {
        let config = config()
            .with_default_role("member".to_string())
            .with_embed_role("agent".to_string())
            .with_otp_code_ttl_seconds(120)
            .with_resend_cooldown_seconds(30)
            .with_magic_link_ttl_seconds(600)
            .with_auto_resend(true)
            .with_provider_timeout(Duration::from_secs(3));

        assert_eq!(config.default_role(), "member");
        assert_eq!(config.embed_role(), "agent");
        assert_eq!(config.otp_code_ttl_seconds(), 120);
        assert_eq!(config.resend_cooldown_seconds(), 30);
        assert_eq!(config.magic_link_ttl_seconds(), 600);
        assert!(config.auto_resend());
        assert_eq!(config.provider_timeout(), Duration::from_secs(3));
    }
}
