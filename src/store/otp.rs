//! One-time codes and per-subject resend cooldown marks.

use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AuthError;
use crate::providers::CodeGenerator;

#[derive(Debug)]
struct OtpRecord {
    subject_id: String,
    expires_at: i64,
}

/// Codes and cooldown marks live in separate maps with independent TTLs: the
/// mark keeps throttling resends even after the code itself has expired.
#[derive(Debug)]
pub struct OtpStore {
    code_ttl_seconds: i64,
    cooldown_seconds: i64,
    codes: Mutex<HashMap<String, OtpRecord>>,
    cooldowns: Mutex<HashMap<String, i64>>,
}

impl OtpStore {
    #[must_use]
    pub fn new(code_ttl_seconds: i64, cooldown_seconds: i64) -> Self {
        Self {
            code_ttl_seconds,
            cooldown_seconds,
            codes: Mutex::new(HashMap::new()),
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Gate for a new send: the existence of a live cooldown mark alone blocks
    /// it. This check and the later mark write are not atomic; two concurrent
    /// requests for the same subject can both pass, costing at most one extra
    /// send. Codes stay single-use either way.
    pub async fn request_send(&self, subject_id: &str, now: i64) -> Result<(), AuthError> {
        let cooldowns = self.cooldowns.lock().await;
        if cooldowns.get(subject_id).is_some_and(|until| now < *until) {
            debug!(subject_id, "resend blocked by cooldown");
            return Err(AuthError::Forbidden(
                "a code was already sent recently".to_string(),
            ));
        }
        Ok(())
    }

    /// Obtain a code from the generator, store it against the subject, and
    /// write the cooldown mark. Returns the code for delivery.
    pub async fn generate_and_store(
        &self,
        subject_id: &str,
        generator: &dyn CodeGenerator,
        now: i64,
    ) -> String {
        let code = generator.generate();
        self.codes.lock().await.insert(
            code.clone(),
            OtpRecord {
                subject_id: subject_id.to_string(),
                expires_at: now + self.code_ttl_seconds,
            },
        );
        self.cooldowns
            .lock()
            .await
            .insert(subject_id.to_string(), now + self.cooldown_seconds);
        code
    }

    /// Look up and remove the record in one step: a code can be consumed at
    /// most once. Absent or expired codes are indistinguishable to the caller.
    pub async fn consume(&self, code: &str, now: i64) -> Result<String, AuthError> {
        let mut codes = self.codes.lock().await;
        match codes.remove(code) {
            Some(record) if now < record.expires_at => Ok(record.subject_id),
            _ => Err(AuthError::NotFound(
                "unknown or expired code".to_string(),
            )),
        }
    }

    /// Best-effort purge of expired codes and stale cooldown marks.
    pub async fn cleanup_expired(&self, now: i64) {
        self.codes
            .lock()
            .await
            .retain(|_, record| now < record.expires_at);
        self.cooldowns.lock().await.retain(|_, until| now < *until);
    }
}

#[cfg(test)]
mod tests {
    use super::OtpStore;
    use crate::error::AuthError;
    use crate::providers::CodeGenerator;

    const NOW: i64 = 1_700_000_000;

    struct FixedCode(&'static str);

    impl CodeGenerator for FixedCode {
        fn generate(&self) -> String {
            self.0.to_string()
        }
    }

    fn store() -> OtpStore {
        OtpStore::new(300, 60)
    }

    #[tokio::test]
    async fn codes_are_single_use() {
        let store = store();
        let code = store
            .generate_and_store("subject-1", &FixedCode("123456"), NOW)
            .await;

        let subject = store.consume(&code, NOW + 1).await.expect("first consume");
        assert_eq!(subject, "subject-1");

        let second = store.consume(&code, NOW + 2).await;
        assert!(matches!(second, Err(AuthError::NotFound(_))));
    }

    #[tokio::test]
    async fn expired_codes_cannot_be_consumed() {
        let store = store();
        let code = store
            .generate_and_store("subject-1", &FixedCode("123456"), NOW)
            .await;

        let result = store.consume(&code, NOW + 301).await;
        assert!(matches!(result, Err(AuthError::NotFound(_))));
    }

    #[tokio::test]
    async fn never_issued_codes_are_not_found() {
        let store = store();
        let result = store.consume("000000", NOW).await;
        assert!(matches!(result, Err(AuthError::NotFound(_))));
    }

    #[tokio::test]
    async fn cooldown_blocks_a_second_send() {
        let store = store();
        store.request_send("subject-1", NOW).await.expect("first gate");
        store
            .generate_and_store("subject-1", &FixedCode("123456"), NOW)
            .await;

        let gated = store.request_send("subject-1", NOW + 30).await;
        assert!(matches!(gated, Err(AuthError::Forbidden(_))));
    }

    #[tokio::test]
    async fn cooldown_outlives_the_code_it_throttles() {
        // Code TTL shorter than the cooldown: the code dies first, yet the
        // mark keeps rate-limiting resends.
        let store = OtpStore::new(10, 120);
        let code = store
            .generate_and_store("subject-1", &FixedCode("123456"), NOW)
            .await;

        assert!(matches!(
            store.consume(&code, NOW + 20).await,
            Err(AuthError::NotFound(_))
        ));
        assert!(matches!(
            store.request_send("subject-1", NOW + 20).await,
            Err(AuthError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn cooldown_expiry_allows_a_new_send() {
        let store = store();
        store
            .generate_and_store("subject-1", &FixedCode("123456"), NOW)
            .await;

        store
            .request_send("subject-1", NOW + 61)
            .await
            .expect("cooldown expired");
    }

    #[tokio::test]
    async fn cooldowns_are_per_subject() {
        let store = store();
        store
            .generate_and_store("subject-1", &FixedCode("123456"), NOW)
            .await;

        store
            .request_send("subject-2", NOW + 1)
            .await
            .expect("other subject unaffected");
    }

    #[tokio::test]
    async fn cleanup_purges_expired_codes_and_marks() {
        let store = store();
        let code = store
            .generate_and_store("subject-1", &FixedCode("123456"), NOW)
            .await;

        store.cleanup_expired(NOW + 400).await;

        assert!(matches!(
            store.consume(&code, NOW + 400).await,
            Err(AuthError::NotFound(_))
        ));
        store
            .request_send("subject-1", NOW + 400)
            .await
            .expect("mark purged");
    }
}
