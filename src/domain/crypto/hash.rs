//! Digest algorithm domain type.
//!
//! Covers every digest a policy may need to judge, including the legacy ones
//! (MD5, SHA-1) that only ever appear in old signatures being re-evaluated.

use crate::domain::constants::{
    MD5_ALGORITHM_OID, SHA1_ALGORITHM_OID, SHA224_ALGORITHM_OID, SHA256_ALGORITHM_OID,
    SHA384_ALGORITHM_OID, SHA512_ALGORITHM_OID,
};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fmt;
use std::str::FromStr;

use super::DigestBytes;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha1 => "SHA1",
            DigestAlgorithm::Sha224 => "SHA224",
            DigestAlgorithm::Sha256 => "SHA256",
            DigestAlgorithm::Sha384 => "SHA384",
            DigestAlgorithm::Sha512 => "SHA512",
        }
    }

    #[must_use]
    pub fn digest_size(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 16,
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha224 => 28,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// DER content octets of the algorithm OID (no tag/length).
    #[must_use]
    pub fn oid_bytes(&self) -> &'static [u8] {
        match self {
            DigestAlgorithm::Md5 => MD5_ALGORITHM_OID,
            DigestAlgorithm::Sha1 => SHA1_ALGORITHM_OID,
            DigestAlgorithm::Sha224 => SHA224_ALGORITHM_OID,
            DigestAlgorithm::Sha256 => SHA256_ALGORITHM_OID,
            DigestAlgorithm::Sha384 => SHA384_ALGORITHM_OID,
            DigestAlgorithm::Sha512 => SHA512_ALGORITHM_OID,
        }
    }

    #[must_use]
    pub fn from_oid_bytes(oid: &[u8]) -> Option<Self> {
        [
            DigestAlgorithm::Md5,
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha224,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ]
        .into_iter()
        .find(|alg| alg.oid_bytes() == oid)
    }

    /// XML Signature / XAdES algorithm URI.
    #[must_use]
    pub fn xml_uri(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "http://www.w3.org/2001/04/xmldsig-more#md5",
            DigestAlgorithm::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            DigestAlgorithm::Sha224 => "http://www.w3.org/2001/04/xmldsig-more#sha224",
            DigestAlgorithm::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            DigestAlgorithm::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            DigestAlgorithm::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Digest `data` with this algorithm.
    #[must_use]
    pub fn digest(&self, data: &[u8]) -> DigestBytes {
        let bytes = match self {
            DigestAlgorithm::Md5 => md5::Md5::digest(data).to_vec(),
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha224 => Sha224::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        };
        DigestBytes::from_trusted(*self, bytes)
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "MD5" => Ok(DigestAlgorithm::Md5),
            "SHA1" => Ok(DigestAlgorithm::Sha1),
            "SHA224" => Ok(DigestAlgorithm::Sha224),
            "SHA256" => Ok(DigestAlgorithm::Sha256),
            "SHA384" => Ok(DigestAlgorithm::Sha384),
            "SHA512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(format!("unknown digest algorithm: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_sizes_match_output() {
        for alg in [
            DigestAlgorithm::Md5,
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha224,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(alg.digest(b"abc").as_slice().len(), alg.digest_size());
            assert_eq!(DigestAlgorithm::from_oid_bytes(alg.oid_bytes()), Some(alg));
        }
    }

    #[test]
    fn test_known_sha256_vector() {
        let digest = DigestAlgorithm::Sha256.digest(b"abc");
        assert_eq!(
            hex::encode(digest.as_slice()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("sha-256".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Sha256));
        assert_eq!("SHA1".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Sha1));
        assert!("whirlpool".parse::<DigestAlgorithm>().is_err());
    }
}
