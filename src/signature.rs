//! Partner signature verification and derivation.
//!
//! Both directions use the same primitive: HMAC-SHA256 over the raw bytes,
//! base64-encoded. Verification never errors on malformed input; malformed
//! input is simply not valid.

use base64ct::{Base64, Encoding};
use ring::hmac;
use secrecy::{ExposeSecret, SecretString};

/// Check a partner-supplied signature over an opaque context blob.
///
/// The comparison runs in constant time; any mismatch, including signatures
/// that are not valid base64, yields `false`.
#[must_use]
pub fn verify(context: &[u8], signature: &str, key: &SecretString) -> bool {
    let Ok(supplied) = Base64::decode_vec(signature.trim()) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, key.expose_secret().as_bytes());
    hmac::verify(&key, context, &supplied).is_ok()
}

/// One-way derivation handed back to partners so a widget can later prove
/// continuity with the original embed session.
#[must_use]
pub fn derive(identifier: &str, salt: &SecretString) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, salt.expose_secret().as_bytes());
    let tag = hmac::sign(&key, identifier.as_bytes());
    Base64::encode_string(tag.as_ref())
}

#[cfg(test)]
mod tests {
    use super::{derive, verify};
    use base64ct::{Base64, Encoding};
    use secrecy::SecretString;

    fn key() -> SecretString {
        SecretString::from("shared-partner-key".to_string())
    }

    #[test]
    fn derive_then_verify_round_trips() {
        let signature = derive("person-42", &key());
        assert!(verify(b"person-42", &signature, &key()));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let signature = derive("person-42", &key());
        let other = SecretString::from("different-key".to_string());
        assert!(!verify(b"person-42", &signature, &other));
    }

    #[test]
    fn verify_rejects_tampered_context() {
        let signature = derive("person-42", &key());
        assert!(!verify(b"person-43", &signature, &key()));
    }

    #[test]
    fn verify_rejects_any_single_bit_flip_in_signature() {
        let signature = derive("person-42", &key());
        let mut raw = Base64::decode_vec(&signature).expect("valid base64");
        for index in 0..raw.len() {
            for bit in 0..8 {
                raw[index] ^= 1 << bit;
                let mutated = Base64::encode_string(&raw);
                assert!(
                    !verify(b"person-42", &mutated, &key()),
                    "bit {bit} of byte {index} accepted"
                );
                raw[index] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn verify_rejects_any_single_bit_flip_in_context() {
        let context = b"person-42".to_vec();
        let signature = derive("person-42", &key());
        let mut mutated = context.clone();
        for index in 0..mutated.len() {
            for bit in 0..8 {
                mutated[index] ^= 1 << bit;
                assert!(!verify(&mutated, &signature, &key()));
                mutated[index] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn verify_rejects_malformed_base64_without_panicking() {
        assert!(!verify(b"person-42", "%%% not base64 %%%", &key()));
        assert!(!verify(b"person-42", "", &key()));
    }
}
