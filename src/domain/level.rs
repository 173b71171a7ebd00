//! Baseline assurance levels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::unsigned::{UnsignedBlock, UnsignedMaterial};

/// B < T < LT < LTA. Always derived from the unsigned material, never stored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignatureLevel {
    B,
    T,
    Lt,
    Lta,
}

impl SignatureLevel {
    pub const ALL: [SignatureLevel; 4] = [
        SignatureLevel::B,
        SignatureLevel::T,
        SignatureLevel::Lt,
        SignatureLevel::Lta,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureLevel::B => "B",
            SignatureLevel::T => "T",
            SignatureLevel::Lt => "LT",
            SignatureLevel::Lta => "LTA",
        }
    }

    #[must_use]
    pub fn next(self) -> Option<SignatureLevel> {
        match self {
            SignatureLevel::B => Some(SignatureLevel::T),
            SignatureLevel::T => Some(SignatureLevel::Lt),
            SignatureLevel::Lt => Some(SignatureLevel::Lta),
            SignatureLevel::Lta => None,
        }
    }

    /// Level of a signature whose unsigned area is `material`.
    #[must_use]
    pub fn of(material: &UnsignedMaterial) -> SignatureLevel {
        let mut has_t = false;
        let mut has_long_term = false;
        for block in material.blocks() {
            match block {
                UnsignedBlock::ArchiveTimestamp(_) => return SignatureLevel::Lta,
                UnsignedBlock::SignatureTimestamp(_) => has_t = true,
                UnsignedBlock::CertificateValues(_)
                | UnsignedBlock::RevocationValues { .. }
                | UnsignedBlock::TimestampValidationData { .. } => has_long_term = true,
                UnsignedBlock::ValidationDataTimestamp(_) | UnsignedBlock::RefsOnlyTimestamp(_) => {}
            }
        }
        match (has_t, has_long_term) {
            (true, true) => SignatureLevel::Lt,
            (true, false) => SignatureLevel::T,
            _ => SignatureLevel::B,
        }
    }
}

impl fmt::Display for SignatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper
            .rsplit(['-', '_'])
            .next()
            .unwrap_or(upper.as_str());
        match bare {
            "B" => Ok(SignatureLevel::B),
            "T" => Ok(SignatureLevel::T),
            "LT" => Ok(SignatureLevel::Lt),
            "LTA" => Ok(SignatureLevel::Lta),
            _ => Err(format!("unknown signature level: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_and_next() {
        assert!(SignatureLevel::B < SignatureLevel::T);
        assert!(SignatureLevel::Lt < SignatureLevel::Lta);
        assert_eq!(SignatureLevel::T.next(), Some(SignatureLevel::Lt));
        assert_eq!(SignatureLevel::Lta.next(), None);
    }

    #[test]
    fn parses_profile_names() {
        assert_eq!("lta".parse(), Ok(SignatureLevel::Lta));
        assert_eq!("XAdES-BASELINE-LT".parse(), Ok(SignatureLevel::Lt));
        assert_eq!("CAdES_BASELINE_T".parse(), Ok(SignatureLevel::T));
        assert!("X".parse::<SignatureLevel>().is_err());
    }

    #[test]
    fn empty_material_is_b() {
        assert_eq!(SignatureLevel::of(&UnsignedMaterial::new()), SignatureLevel::B);
    }
}
