use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DigestAlgorithm;

/// Public-key algorithm of a signature or certificate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EncryptionAlgorithm {
    Rsa,
    RsaPss,
    Dsa,
    Ecdsa,
    Ed25519,
}

impl EncryptionAlgorithm {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::Rsa => "RSA",
            EncryptionAlgorithm::RsaPss => "RSASSA-PSS",
            EncryptionAlgorithm::Dsa => "DSA",
            EncryptionAlgorithm::Ecdsa => "ECDSA",
            EncryptionAlgorithm::Ed25519 => "EdDSA",
        }
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RSA" => Ok(EncryptionAlgorithm::Rsa),
            "RSASSA-PSS" | "RSAPSS" | "RSA-PSS" => Ok(EncryptionAlgorithm::RsaPss),
            "DSA" => Ok(EncryptionAlgorithm::Dsa),
            "ECDSA" | "EC" => Ok(EncryptionAlgorithm::Ecdsa),
            "EDDSA" | "ED25519" => Ok(EncryptionAlgorithm::Ed25519),
            _ => Err(format!("unknown encryption algorithm: {s}")),
        }
    }
}

/// Algorithm that produced a signature value: key algorithm plus digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureAlgorithm {
    pub encryption: EncryptionAlgorithm,
    pub digest: DigestAlgorithm,
}

impl SignatureAlgorithm {
    #[must_use]
    pub fn new(encryption: EncryptionAlgorithm, digest: DigestAlgorithm) -> Self {
        Self { encryption, digest }
    }

    /// Resolve a CMS `signatureAlgorithm` given in dotted form.
    ///
    /// Bare key algorithms (rsaEncryption, id-ecPublicKey, ...) take their
    /// digest from `digest`, the SignerInfo `digestAlgorithm`; combined ones
    /// such as sha256WithRSAEncryption carry their own.
    #[must_use]
    pub fn from_oid(oid: &str, digest: DigestAlgorithm) -> Option<Self> {
        use DigestAlgorithm::{Md5, Sha1, Sha224, Sha256, Sha384, Sha512};
        use EncryptionAlgorithm::{Dsa, Ecdsa, Ed25519, Rsa, RsaPss};

        let (encryption, implied) = match oid {
            "1.2.840.113549.1.1.1" => (Rsa, None),
            "1.2.840.113549.1.1.4" => (Rsa, Some(Md5)),
            "1.2.840.113549.1.1.5" => (Rsa, Some(Sha1)),
            "1.2.840.113549.1.1.11" => (Rsa, Some(Sha256)),
            "1.2.840.113549.1.1.12" => (Rsa, Some(Sha384)),
            "1.2.840.113549.1.1.13" => (Rsa, Some(Sha512)),
            "1.2.840.113549.1.1.14" => (Rsa, Some(Sha224)),
            "1.2.840.113549.1.1.10" => (RsaPss, None),
            "1.2.840.10045.2.1" => (Ecdsa, None),
            "1.2.840.10045.4.1" => (Ecdsa, Some(Sha1)),
            "1.2.840.10045.4.3.1" => (Ecdsa, Some(Sha224)),
            "1.2.840.10045.4.3.2" => (Ecdsa, Some(Sha256)),
            "1.2.840.10045.4.3.3" => (Ecdsa, Some(Sha384)),
            "1.2.840.10045.4.3.4" => (Ecdsa, Some(Sha512)),
            "1.2.840.10040.4.1" => (Dsa, None),
            "1.2.840.10040.4.3" => (Dsa, Some(Sha1)),
            "2.16.840.1.101.3.4.3.2" => (Dsa, Some(Sha256)),
            "1.3.101.112" => (Ed25519, Some(Sha512)),
            _ => return None,
        };
        Some(Self::new(encryption, implied.unwrap_or(digest)))
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}with{}", self.digest, self.encryption)
    }
}

/// Signature algorithm and public key length as reported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenSignature {
    pub algorithm: SignatureAlgorithm,
    /// Public key length in bits, when the decoder could determine it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_size_bits: Option<u32>,
}

impl TokenSignature {
    #[must_use]
    pub fn new(algorithm: SignatureAlgorithm, key_size_bits: Option<u32>) -> Self {
        Self {
            algorithm,
            key_size_bits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_jca_style_names() {
        let alg = SignatureAlgorithm::new(EncryptionAlgorithm::Rsa, DigestAlgorithm::Sha256);
        assert_eq!(alg.to_string(), "SHA256withRSA");
    }

    #[test]
    fn resolves_cms_signature_oids() {
        let combined = SignatureAlgorithm::from_oid("1.2.840.113549.1.1.12", DigestAlgorithm::Sha256);
        assert_eq!(
            combined,
            Some(SignatureAlgorithm::new(EncryptionAlgorithm::Rsa, DigestAlgorithm::Sha384))
        );
        let bare = SignatureAlgorithm::from_oid("1.2.840.10045.2.1", DigestAlgorithm::Sha512);
        assert_eq!(
            bare,
            Some(SignatureAlgorithm::new(EncryptionAlgorithm::Ecdsa, DigestAlgorithm::Sha512))
        );
        assert_eq!(SignatureAlgorithm::from_oid("1.2.3.4", DigestAlgorithm::Sha256), None);
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("ec".parse(), Ok(EncryptionAlgorithm::Ecdsa));
        assert_eq!("RSA-PSS".parse(), Ok(EncryptionAlgorithm::RsaPss));
        assert!("GOST".parse::<EncryptionAlgorithm>().is_err());
    }
}
