use sha2::{Digest, Sha256};

use super::domain::Lead;

/// Deterministic lead bucketing keyed by a process-wide secret.
///
/// The bucket is the first four bytes of `SHA-256(lead:affiliate:offer:sub:secret)` read
/// big-endian, reduced modulo 100. A missing sub is hashed as the literal `null`.
#[derive(Clone)]
pub struct LeadBucketer {
    secret: String,
}

impl LeadBucketer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn bucket(&self, lead: &Lead) -> u8 {
        let input = format!(
            "{}:{}:{}:{}:{}",
            lead.lead_id,
            lead.affiliate_id,
            lead.offer_id,
            lead.sub_id.as_deref().unwrap_or("null"),
            self.secret
        );
        let digest = Sha256::digest(input.as_bytes());
        let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        (prefix % 100) as u8
    }
}

impl std::fmt::Debug for LeadBucketer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeadBucketer").finish_non_exhaustive()
    }
}

/// A bucket below the configured percentage is a provisional accept.
pub fn within_percentage(bucket: u8, percent_accept: u8) -> bool {
    bucket < percent_accept
}
