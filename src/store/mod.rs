//! Short-lived key-value state: revoked token ids, one-time codes, and
//! resend cooldown marks. Each store offers atomic get/set/delete with a TTL
//! at single-key granularity; there are no multi-key transactions.

mod otp;
mod revocation;

pub use otp::OtpStore;
pub use revocation::RevocationStore;
