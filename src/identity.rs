//! Identity anonymization
//!
//! Derives a daily-rotating pseudonym from request metadata. The digest
//! covers `origin_ip ++ user_agent ++ YYYY-MM-DD`, so requests from the
//! same client correlate within one calendar day and stop correlating
//! after it. No raw identity leaves this module.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Which calendar the rotating day is taken from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DayPolicy {
    /// Calendar day in UTC
    #[default]
    Utc,
    /// Calendar day at a fixed offset from UTC (e.g. -180 for UTC-3)
    FixedOffset { offset_minutes: i32 },
}

impl DayPolicy {
    /// Whether the policy names a representable offset (under 24 hours)
    pub fn is_valid(&self) -> bool {
        match self {
            DayPolicy::Utc => true,
            DayPolicy::FixedOffset { offset_minutes } => fixed_offset(*offset_minutes).is_some(),
        }
    }

    /// Calendar day of an instant under this policy
    ///
    /// An out-of-range offset reads as UTC; config validation rejects it
    /// before an anonymizer is built.
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            DayPolicy::Utc => at.date_naive(),
            DayPolicy::FixedOffset { offset_minutes } => match fixed_offset(*offset_minutes) {
                Some(offset) => at.with_timezone(&offset).date_naive(),
                None => at.date_naive(),
            },
        }
    }
}

fn fixed_offset(offset_minutes: i32) -> Option<FixedOffset> {
    offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
}

/// Derives anonymized identity keys
#[derive(Clone)]
pub struct IdentityAnonymizer {
    policy: DayPolicy,
    /// Optional server secret; switches the digest to HMAC-SHA256
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for IdentityAnonymizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityAnonymizer")
            .field("policy", &self.policy)
            .field("keyed", &self.secret.is_some())
            .finish()
    }
}

impl Default for IdentityAnonymizer {
    fn default() -> Self {
        Self::new(DayPolicy::Utc)
    }
}

impl IdentityAnonymizer {
    /// Create an unkeyed anonymizer (plain SHA-256)
    pub fn new(policy: DayPolicy) -> Self {
        Self {
            policy,
            secret: None,
        }
    }

    /// Key the digest with a server secret
    pub fn with_secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        self.secret = (!secret.is_empty()).then(|| secret.to_vec());
        self
    }

    /// Day policy in effect
    pub fn policy(&self) -> DayPolicy {
        self.policy
    }

    /// Derive the identity key for the given day
    ///
    /// Always produces a 64-character lowercase hex string, including for
    /// empty inputs.
    pub fn derive(&self, origin_ip: &str, user_agent: &str, day: NaiveDate) -> String {
        let day = day.format("%Y-%m-%d").to_string();
        match &self.secret {
            Some(secret) => {
                // HMAC accepts keys of any length
                let mut mac = match HmacSha256::new_from_slice(secret) {
                    Ok(mac) => mac,
                    Err(_) => return plain_digest(origin_ip, user_agent, &day),
                };
                mac.update(origin_ip.as_bytes());
                mac.update(user_agent.as_bytes());
                mac.update(day.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            None => plain_digest(origin_ip, user_agent, &day),
        }
    }

    /// Derive the identity key for the day containing `at`
    pub fn derive_at(&self, origin_ip: &str, user_agent: &str, at: DateTime<Utc>) -> String {
        self.derive(origin_ip, user_agent, self.policy.day_of(at))
    }

    /// Derive the identity key for today
    pub fn derive_now(&self, origin_ip: &str, user_agent: &str) -> String {
        self.derive_at(origin_ip, user_agent, Utc::now())
    }
}

fn plain_digest(origin_ip: &str, user_agent: &str, day: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(origin_ip.as_bytes());
    hasher.update(user_agent.as_bytes());
    hasher.update(day.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_derive_deterministic() {
        let anon = IdentityAnonymizer::default();
        let a = anon.derive("203.0.113.7", "Mozilla/5.0", day(2025, 3, 8));
        let b = anon.derive("203.0.113.7", "Mozilla/5.0", day(2025, 3, 8));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_derive_rotates_daily() {
        let anon = IdentityAnonymizer::default();
        let a = anon.derive("203.0.113.7", "Mozilla/5.0", day(2025, 3, 8));
        let b = anon.derive("203.0.113.7", "Mozilla/5.0", day(2025, 3, 9));
        assert_ne!(a, b);
    }

    #[test]
    fn test_derive_matches_plain_sha256_of_concatenation() {
        let anon = IdentityAnonymizer::default();
        let expected = hex::encode(Sha256::digest(b"10.0.0.1curl/8.02025-01-31"));
        assert_eq!(anon.derive("10.0.0.1", "curl/8.0", day(2025, 1, 31)), expected);
    }

    #[test]
    fn test_derive_empty_inputs() {
        let anon = IdentityAnonymizer::default();
        let a = anon.derive("", "", day(2025, 3, 8));
        assert_eq!(a, anon.derive("", "", day(2025, 3, 8)));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_secret_changes_digest() {
        let plain = IdentityAnonymizer::default();
        let keyed = IdentityAnonymizer::default().with_secret("s3cr3t");
        let d = day(2025, 3, 8);
        assert_ne!(plain.derive("ip", "ua", d), keyed.derive("ip", "ua", d));
        assert_eq!(keyed.derive("ip", "ua", d), keyed.derive("ip", "ua", d));
    }

    #[test]
    fn test_empty_secret_is_unkeyed() {
        let plain = IdentityAnonymizer::default();
        let keyed = IdentityAnonymizer::default().with_secret("");
        let d = day(2025, 3, 8);
        assert_eq!(plain.derive("ip", "ua", d), keyed.derive("ip", "ua", d));
    }

    #[test]
    fn test_day_policy_offset() {
        // 01:30 UTC is still the previous day at UTC-3
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 1, 30, 0).unwrap();
        assert_eq!(DayPolicy::Utc.day_of(at), day(2025, 3, 9));
        assert_eq!(
            DayPolicy::FixedOffset {
                offset_minutes: -180
            }
            .day_of(at),
            day(2025, 3, 8)
        );
    }

    #[test]
    fn test_day_policy_validity() {
        assert!(DayPolicy::Utc.is_valid());
        assert!(DayPolicy::FixedOffset { offset_minutes: -180 }.is_valid());
        assert!(DayPolicy::FixedOffset { offset_minutes: 1439 }.is_valid());
        assert!(!DayPolicy::FixedOffset { offset_minutes: 1440 }.is_valid());
        assert!(!DayPolicy::FixedOffset { offset_minutes: i32::MIN }.is_valid());
    }

    #[test]
    fn test_derive_at_uses_policy() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 1, 30, 0).unwrap();
        let anon = IdentityAnonymizer::new(DayPolicy::FixedOffset {
            offset_minutes: -180,
        });
        assert_eq!(
            anon.derive_at("ip", "ua", at),
            anon.derive("ip", "ua", day(2025, 3, 8))
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let anon = IdentityAnonymizer::default().with_secret("hunter2");
        let debug = format!("{:?}", anon);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("keyed: true"));
    }
}
