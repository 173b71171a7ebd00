//! Verification domain types.
//!
//! Structured results of constraint chains, summarized cryptographic verdicts
//! and the per-document report handed back by validation. Everything here is
//! immutable once produced and serializes to JSON for callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::level::SignatureLevel;

/// Severity of a chain item: what a failing check does to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// Failure stops the chain and fails the verdict.
    Fail,
    /// Failure is recorded and degrades the indication.
    Warn,
    /// Failure is recorded for information only.
    Inform,
    /// The check is not run.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintStatus {
    Ok,
    NotOk,
    Warn,
    Inform,
}

impl fmt::Display for ConstraintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConstraintStatus::Ok => "OK",
            ConstraintStatus::NotOk => "NOT_OK",
            ConstraintStatus::Warn => "WARN",
            ConstraintStatus::Inform => "INFORM",
        })
    }
}

/// Overall outcome of a chain, separate from the OK / NOT_OK conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Indication {
    Passed,
    PassedWithWarnings,
    Failed,
}

/// Result of one executed chain item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintResult {
    pub name: String,
    pub status: ConstraintStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_results: Vec<ConstraintResult>,
}

impl ConstraintResult {
    #[must_use]
    pub fn new(name: impl Into<String>, status: ConstraintStatus) -> Self {
        Self {
            name: name.into(),
            status,
            message: None,
            sub_results: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ConstraintStatus::Ok
    }
}

/// Executed chain: results in execution order; items after a fatal failure are absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub title: String,
    pub results: Vec<ConstraintResult>,
    pub conclusion: ConstraintStatus,
    pub indication: Indication,
}

impl ChainReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.conclusion == ConstraintStatus::Ok
    }

    #[must_use]
    pub fn result(&self, name: &str) -> Option<&ConstraintResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// First fatal failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&ConstraintResult> {
        self.results
            .iter()
            .find(|r| r.status == ConstraintStatus::NotOk)
    }
}

/// Summary of a cryptographic judgement at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptographicVerdict {
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_size_bits: Option<u32>,
    pub evaluated_at: DateTime<Utc>,
    /// `None` when the algorithm never expires (or is unknown to the policy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_until: Option<DateTime<Utc>>,
    pub acceptable: bool,
    /// Token id, or a description of the failing item.
    pub concerned_material: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Signature,
    Timestamp,
}

/// Acceptance result for a signature or timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReport {
    pub token_id: String,
    pub kind: TokenKind,
    pub chain: ChainReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cryptographic: Option<CryptographicVerdict>,
}

impl TokenReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.chain.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureReport {
    pub signature_id: String,
    pub level: SignatureLevel,
    pub profile: String,
    pub acceptance: TokenReport,
    pub timestamps: Vec<TokenReport>,
    /// Per-certificate advisory checks (e.g. revocation data availability).
    pub certificates: Vec<ConstraintResult>,
}

impl SignatureReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.acceptance.is_ok() && self.timestamps.iter().all(TokenReport::is_ok)
    }
}

/// Result of validating a whole document at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub document: String,
    pub evaluated_at: DateTime<Utc>,
    pub signatures: Vec<SignatureReport>,
}

impl VerificationReport {
    /// Overall success indicator: every signature and timestamp passed.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.signatures.is_empty() && self.signatures.iter().all(SignatureReport::is_ok)
    }

    #[must_use]
    pub fn signature(&self, id: &str) -> Option<&SignatureReport> {
        self.signatures.iter().find(|s| s.signature_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_like_report_vocabulary() {
        let json = serde_json::to_string(&ConstraintStatus::NotOk).unwrap();
        assert_eq!(json, "\"NOT_OK\"");
        assert_eq!(ConstraintStatus::Warn.to_string(), "WARN");
    }

    #[test]
    fn empty_report_is_not_success() {
        let report = VerificationReport {
            document: "empty".into(),
            evaluated_at: Utc::now(),
            signatures: Vec::new(),
        };
        assert!(!report.success());
    }
}
