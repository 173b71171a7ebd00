//! Timestamp request builder service.
//!
//! Builds RFC3161 `TimeStampReq` structures for a precomputed digest.

use crate::domain::asn1::encode_tlv;
use crate::domain::constants::{
    ASN1_INTEGER_TAG, ASN1_NULL, ASN1_OCTET_STRING_TAG, ASN1_OID_TAG, ASN1_SEQUENCE_TAG,
    CERT_REQ_TRUE, TS_REQ_VERSION_1,
};
use crate::domain::crypto::DigestBytes;
use crate::infra::error::{SigningError, SigningResult};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Service for building RFC3161 timestamp requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampRequestBuilder;

impl TimestampRequestBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build a request whose message imprint is `digest`.
    ///
    /// ```text
    /// TimeStampReq ::= SEQUENCE {
    ///     version         INTEGER { v1(1) },
    ///     messageImprint  MessageImprint,
    ///     reqPolicy       TSAPolicyId OPTIONAL,
    ///     nonce           INTEGER OPTIONAL,
    ///     certReq         BOOLEAN DEFAULT FALSE,
    ///     extensions      [0] IMPLICIT Extensions OPTIONAL }
    /// ```
    pub fn build_request(&self, digest: &DigestBytes) -> SigningResult<Vec<u8>> {
        if digest.as_slice().is_empty() {
            return Err(SigningError::TimestampError(
                "Cannot create timestamp request for an empty digest".into(),
            ));
        }

        let mut algorithm_identifier = encode_tlv(ASN1_OID_TAG, digest.algorithm().oid_bytes());
        algorithm_identifier.extend_from_slice(ASN1_NULL);
        let mut message_imprint = encode_tlv(ASN1_SEQUENCE_TAG, &algorithm_identifier);
        message_imprint.extend(encode_tlv(ASN1_OCTET_STRING_TAG, digest.as_slice()));

        let mut body = TS_REQ_VERSION_1.to_vec();
        body.extend(encode_tlv(ASN1_SEQUENCE_TAG, &message_imprint));
        body.extend(encode_tlv(ASN1_INTEGER_TAG, &Self::nonce(digest)));
        body.extend_from_slice(&CERT_REQ_TRUE);
        let request = encode_tlv(ASN1_SEQUENCE_TAG, &body);

        log::debug!(
            "Built RFC3161 timestamp request: {} bytes for {} imprint",
            request.len(),
            digest.algorithm()
        );
        Ok(request)
    }

    /// 8 random bytes behind a 0x00 so the INTEGER stays positive.
    ///
    /// The RNG is seeded from the digest, keeping requests reproducible.
    fn nonce(digest: &DigestBytes) -> [u8; 9] {
        let mut seed = [0u8; 32];
        for (slot, byte) in seed.iter_mut().zip(digest.as_slice()) {
            *slot = *byte;
        }
        let mut rng = StdRng::from_seed(seed);
        let mut nonce = [0u8; 9];
        rng.fill_bytes(&mut nonce[1..]);
        nonce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asn1::read_tlv;
    use crate::domain::crypto::DigestAlgorithm;

    #[test]
    fn build_request_produces_der_structure() {
        let digest = DigestAlgorithm::Sha256.digest(b"signature value");
        let request = TimestampRequestBuilder::new().build_request(&digest).unwrap();

        let (outer, rest) = read_tlv(&request).unwrap();
        assert!(rest.is_empty());
        assert_eq!(outer.tag, ASN1_SEQUENCE_TAG);
        let fields = outer.children().unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].raw, TS_REQ_VERSION_1);
        let imprint = fields[1].children().unwrap();
        assert_eq!(imprint[1].content, digest.as_slice());
        // Nonce INTEGER with leading 0x00
        assert_eq!(fields[2].content.len(), 9);
        assert_eq!(fields[2].content[0], 0x00);
        assert_eq!(fields[3].raw, CERT_REQ_TRUE);
    }

    #[test]
    fn large_digests_use_long_form_lengths() {
        let digest = DigestAlgorithm::Sha512.digest(b"x");
        let request = TimestampRequestBuilder::new().build_request(&digest).unwrap();
        assert!(read_tlv(&request).is_ok());
        assert!(request.windows(digest.as_slice().len()).any(|w| w == digest.as_slice()));
    }

    #[test]
    fn nonce_is_reproducible_per_digest() {
        let builder = TimestampRequestBuilder::new();
        let a = DigestAlgorithm::Sha256.digest(b"a");
        let b = DigestAlgorithm::Sha256.digest(b"b");
        assert_eq!(builder.build_request(&a).unwrap(), builder.build_request(&a).unwrap());
        assert_ne!(builder.build_request(&a).unwrap(), builder.build_request(&b).unwrap());
    }
}
