//! Cryptographic acceptability of a signature algorithm at a given instant.
//!
//! Runs its own small chain (encryption listed, digest listed, key size,
//! encryption expiration, digest expiration) and summarizes it as a
//! [`CryptographicVerdict`].

use chrono::{DateTime, Utc};

use crate::domain::crypto::{DigestAlgorithm, EncryptionAlgorithm, TokenSignature};
use crate::domain::policy::{CryptoAlgorithm, CryptographicPolicy, Expiration};
use crate::domain::verification::{ChainReport, CryptographicVerdict};
use crate::services::chain::{CheckOutcome, ConstraintChain, FnItem};

pub const ACCEPTABLE_ENCRYPTION: &str = "acceptable-encryption-algorithm";
pub const ACCEPTABLE_DIGEST: &str = "acceptable-digest-algorithm";
pub const PUBLIC_KEY_SIZE: &str = "public-key-size";
pub const ENCRYPTION_NOT_EXPIRED: &str = "encryption-algorithm-not-expired";
pub const DIGEST_NOT_EXPIRED: &str = "digest-algorithm-not-expired";

/// Judge of one token's algorithms against one policy bucket.
pub struct CryptographicChecker<'a> {
    policy: &'a CryptographicPolicy,
    at: DateTime<Utc>,
}

/// Sub-chain report plus its summary.
#[derive(Debug, Clone)]
pub struct CryptographicCheck {
    pub report: ChainReport,
    pub verdict: CryptographicVerdict,
}

impl CryptographicCheck {
    #[must_use]
    pub fn is_acceptable(&self) -> bool {
        self.verdict.acceptable
    }
}

impl<'a> CryptographicChecker<'a> {
    #[must_use]
    pub fn new(policy: &'a CryptographicPolicy, at: DateTime<Utc>) -> Self {
        Self { policy, at }
    }

    /// Full check of a signature algorithm and key size.
    #[must_use]
    pub fn check_signature(
        &self,
        signature: &TokenSignature,
        concerned_material: &str,
    ) -> CryptographicCheck {
        let encryption = signature.algorithm.encryption;
        let digest = signature.algorithm.digest;
        let key_size = signature.key_size_bits;

        let mut chain = ConstraintChain::new(format!("cryptographic:{concerned_material}"));
        chain.push(self.listed_item(ACCEPTABLE_ENCRYPTION, encryption.into()));
        chain.push(self.listed_item(ACCEPTABLE_DIGEST, digest.into()));
        chain.push(self.key_size_item(encryption, key_size));
        chain.push(self.expiration_item(ENCRYPTION_NOT_EXPIRED, encryption.into(), key_size));
        chain.push(self.expiration_item(DIGEST_NOT_EXPIRED, digest.into(), None));
        let report = chain.execute();

        let verdict = self.summarize(
            &report,
            signature.algorithm.to_string(),
            key_size,
            concerned_material,
            self.secure_until(encryption, digest, key_size),
            |name| match name {
                ACCEPTABLE_DIGEST | DIGEST_NOT_EXPIRED => digest.to_string(),
                _ => encryption.to_string(),
            },
        );
        CryptographicCheck { report, verdict }
    }

    /// Digest-only check, used for relied-upon digests and certificate references.
    #[must_use]
    pub fn check_digest(&self, digest: DigestAlgorithm, concerned_material: &str) -> CryptographicCheck {
        let mut chain = ConstraintChain::new(format!("cryptographic:{concerned_material}"));
        chain.push(self.listed_item(ACCEPTABLE_DIGEST, digest.into()));
        chain.push(self.expiration_item(DIGEST_NOT_EXPIRED, digest.into(), None));
        let report = chain.execute();

        let secure_until = self
            .policy
            .expiration_of(digest.into(), None)
            .ok()
            .and_then(|exp| exp.date());
        let verdict = self.summarize(
            &report,
            digest.to_string(),
            None,
            concerned_material,
            secure_until,
            |_| digest.to_string(),
        );
        CryptographicCheck { report, verdict }
    }

    fn listed_item(
        &self,
        name: &'static str,
        algorithm: CryptoAlgorithm,
    ) -> FnItem<impl Fn() -> CheckOutcome + 'a> {
        let policy = self.policy;
        FnItem::new(name, policy.level, move || {
            CheckOutcome::from_bool(
                policy.is_listed(algorithm),
                format!("{algorithm} is not an acceptable algorithm"),
            )
        })
    }

    fn key_size_item(
        &self,
        algorithm: EncryptionAlgorithm,
        key_size: Option<u32>,
    ) -> FnItem<impl Fn() -> CheckOutcome + 'a> {
        let policy = self.policy;
        FnItem::new(PUBLIC_KEY_SIZE, policy.level, move || {
            match (policy.min_key_size(algorithm), key_size) {
                (None, _) => CheckOutcome::pass(),
                (Some(_), None) => CheckOutcome::fail(format!(
                    "public key size of {algorithm} is unknown"
                )),
                (Some(min), Some(bits)) => CheckOutcome::from_bool(
                    bits >= min,
                    format!("{algorithm} key of {bits} bits is below the minimum of {min} bits"),
                ),
            }
        })
    }

    fn expiration_item(
        &self,
        name: &'static str,
        algorithm: CryptoAlgorithm,
        key_size: Option<u32>,
    ) -> FnItem<impl Fn() -> CheckOutcome + 'a> {
        let policy = self.policy;
        let at = self.at;
        FnItem::new(name, policy.level, move || {
            match policy.expiration_of(algorithm, key_size) {
                Ok(Expiration::Never) => CheckOutcome::pass(),
                Ok(Expiration::At(date)) if at < date => CheckOutcome::pass(),
                Ok(Expiration::At(date)) => CheckOutcome::fail(format!(
                    "{algorithm} expired on {} (evaluated at {})",
                    date.format("%Y-%m-%d"),
                    at.format("%Y-%m-%dT%H:%M:%SZ")
                )),
                // UnsupportedAlgorithm keeps its own wording in the report
                Err(e) => CheckOutcome::fail(e.to_string()),
            }
        })
    }

    /// Earliest expiration among the algorithms involved.
    fn secure_until(
        &self,
        encryption: EncryptionAlgorithm,
        digest: DigestAlgorithm,
        key_size: Option<u32>,
    ) -> Option<DateTime<Utc>> {
        [
            self.policy.expiration_of(encryption.into(), key_size),
            self.policy.expiration_of(digest.into(), None),
        ]
        .into_iter()
        .filter_map(|exp| exp.ok().and_then(|e| e.date()))
        .min()
    }

    fn summarize(
        &self,
        report: &ChainReport,
        algorithm: String,
        key_size_bits: Option<u32>,
        concerned_material: &str,
        secure_until: Option<DateTime<Utc>>,
        failing_algorithm: impl Fn(&str) -> String,
    ) -> CryptographicVerdict {
        let failure = report.failure();
        if let Some(failed) = failure {
            log::debug!(
                "Cryptographic check of {concerned_material} failed at {}: {:?}",
                failed.name,
                failed.message
            );
        }
        CryptographicVerdict {
            algorithm: failure.map_or(algorithm, |f| failing_algorithm(&f.name)),
            key_size_bits,
            evaluated_at: self.at,
            secure_until,
            acceptable: report.is_ok(),
            concerned_material: concerned_material.to_string(),
            failure_reason: failure.and_then(|f| f.message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crypto::SignatureAlgorithm;
    use crate::domain::verification::{ConstraintStatus, Level};
    use chrono::TimeZone;

    fn at(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    fn sig(enc: EncryptionAlgorithm, digest: DigestAlgorithm, bits: u32) -> TokenSignature {
        TokenSignature::new(SignatureAlgorithm::new(enc, digest), Some(bits))
    }

    #[test]
    fn sha256_rsa2048_accepted_today() {
        let policy = CryptographicPolicy::default();
        let check = CryptographicChecker::new(&policy, at(2024))
            .check_signature(&sig(EncryptionAlgorithm::Rsa, DigestAlgorithm::Sha256, 2048), "S-1");
        assert!(check.is_acceptable());
        assert_eq!(check.verdict.algorithm, "SHA256withRSA");
        assert_eq!(check.report.results.len(), 5);
        assert_eq!(
            check.verdict.secure_until,
            Some(Utc.with_ymd_and_hms(2029, 12, 31, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn sha1_rejected_after_expiration() {
        let policy = CryptographicPolicy::default()
            .with_expiration(DigestAlgorithm::Sha1, Some(at(2016)));
        let signature = sig(EncryptionAlgorithm::Rsa, DigestAlgorithm::Sha1, 4096);

        let before = CryptographicChecker::new(&policy, at(2015)).check_signature(&signature, "S-1");
        assert!(before.is_acceptable());

        let after = CryptographicChecker::new(&policy, at(2020)).check_signature(&signature, "S-1");
        assert!(!after.is_acceptable());
        assert_eq!(after.verdict.algorithm, "SHA1");
        assert_eq!(after.verdict.concerned_material, "S-1");
        assert_eq!(
            after.report.result(DIGEST_NOT_EXPIRED).map(|r| r.status),
            Some(ConstraintStatus::NotOk)
        );
    }

    #[test]
    fn small_key_stops_before_expiration_items() {
        let policy = CryptographicPolicy::default();
        let check = CryptographicChecker::new(&policy, at(2024))
            .check_signature(&sig(EncryptionAlgorithm::Rsa, DigestAlgorithm::Sha256, 512), "S-1");
        assert!(!check.is_acceptable());
        assert_eq!(check.report.results.len(), 3);
        assert_eq!(check.verdict.algorithm, "RSA");
    }

    #[test]
    fn unsupported_algorithm_has_distinct_reason() {
        let mut policy = CryptographicPolicy::default();
        policy
            .expirations
            .retain(|row| row.algorithm != CryptoAlgorithm::Digest(DigestAlgorithm::Sha384));
        let check = CryptographicChecker::new(&policy, at(2024)).check_digest(DigestAlgorithm::Sha384, "ref");
        assert!(!check.is_acceptable());
        assert!(check
            .verdict
            .failure_reason
            .as_deref()
            .is_some_and(|r| r.contains("unsupported algorithm")));
    }

    #[test]
    fn warn_level_policy_never_rejects() {
        let policy = CryptographicPolicy::default().with_level(Level::Warn);
        let check = CryptographicChecker::new(&policy, at(2024))
            .check_digest(DigestAlgorithm::Md5, "ref");
        assert!(check.is_acceptable());
        assert_eq!(check.report.results[1].status, ConstraintStatus::Warn);
    }
}
