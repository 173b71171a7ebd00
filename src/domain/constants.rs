//! Centralized constants for commonly repeated DER/OID bytes, tags and URIs.
//! Keep this intentionally small; only broadly reused literals should live here.

// === ASN.1 DER Constants ===

/// ASN.1 NULL value (tag + length + null)
pub const ASN1_NULL: &[u8] = &[0x05, 0x00];

/// ASN.1 SEQUENCE tag
pub const ASN1_SEQUENCE_TAG: u8 = 0x30;

/// ASN.1 SET tag
pub const ASN1_SET_TAG: u8 = 0x31;

/// ASN.1 INTEGER tag
pub const ASN1_INTEGER_TAG: u8 = 0x02;

/// ASN.1 OBJECT IDENTIFIER tag
pub const ASN1_OID_TAG: u8 = 0x06;

/// ASN.1 OCTET STRING tag
pub const ASN1_OCTET_STRING_TAG: u8 = 0x04;

/// ASN.1 BOOLEAN tag
pub const ASN1_BOOLEAN_TAG: u8 = 0x01;


/// ASN.1 `GeneralizedTime` tag
pub const ASN1_GENERALIZED_TIME_TAG: u8 = 0x18;

/// Constructed context-specific `[0]`
pub const ASN1_CONTEXT_0_EXPLICIT_TAG: u8 = 0xa0;

/// Constructed context-specific `[1]`
pub const ASN1_CONTEXT_1_EXPLICIT_TAG: u8 = 0xa1;

/// Constructed context-specific `[2]`, used for timestamp validation data blocks
pub const ASN1_CONTEXT_2_EXPLICIT_TAG: u8 = 0xa2;

/// Constructed context-specific `[4]`, the `directoryName` choice of `GeneralName`
pub const ASN1_CONTEXT_4_EXPLICIT_TAG: u8 = 0xa4;

/// DER long form length encoding: 1-byte length follows
pub const DER_LONG_FORM_1_BYTE: u8 = 0x81;

/// DER long form length encoding: 2-byte length follows
pub const DER_LONG_FORM_2_BYTE: u8 = 0x82;

/// DER long form length encoding: 3-byte length follows
pub const DER_LONG_FORM_3_BYTE: u8 = 0x83;

// === RFC3161 Timestamp Request Constants ===

/// Version 1 for RFC3161 timestamp requests
pub const TS_REQ_VERSION_1: [u8; 3] = [0x02, 0x01, 0x01];

/// BOOLEAN TRUE value for certReq field
pub const CERT_REQ_TRUE: [u8; 3] = [0x01, 0x01, 0xFF];

/// Standard nonce length for RFC3161 requests (8 random bytes + leading zero)
pub const TS_REQ_NONCE_LENGTH: u8 = 9;

// === CMS OIDs (content octets only) ===

/// PKCS#7 `SignedData` (1.2.840.113549.1.7.2)
pub const PKCS7_SIGNED_DATA_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];

/// id-ct-TSTInfo (1.2.840.113549.1.9.16.1.4)
pub const TST_INFO_OID: &[u8] = &[
    0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x10, 0x01, 0x04,
];

/// id-contentType (1.2.840.113549.1.9.3)
pub const CONTENT_TYPE_ATTR_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x03];

/// id-messageDigest (1.2.840.113549.1.9.4)
pub const MESSAGE_DIGEST_ATTR_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x04];

/// id-aa-signingCertificate (1.2.840.113549.1.9.16.2.12)
pub const SIGNING_CERTIFICATE_ATTR_OID: &[u8] = &[
    0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x10, 0x02, 0x0c,
];

/// id-aa-signingCertificateV2 (1.2.840.113549.1.9.16.2.47)
pub const SIGNING_CERTIFICATE_V2_ATTR_OID: &[u8] = &[
    0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x10, 0x02, 0x2f,
];

/// id-aa-signatureTimeStampToken (1.2.840.113549.1.9.16.2.14)
pub const SIGNATURE_TIMESTAMP_ATTR_OID: &[u8] = &[
    0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x10, 0x02, 0x0e,
];

/// id-aa-ets-certValues (1.2.840.113549.1.9.16.2.23)
pub const CERTIFICATE_VALUES_ATTR_OID: &[u8] = &[
    0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x10, 0x02, 0x17,
];

/// id-aa-ets-revocationValues (1.2.840.113549.1.9.16.2.24)
pub const REVOCATION_VALUES_ATTR_OID: &[u8] = &[
    0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x10, 0x02, 0x18,
];

/// id-aa-ets-escTimeStamp (1.2.840.113549.1.9.16.2.25)
pub const ESC_TIMESTAMP_ATTR_OID: &[u8] = &[
    0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x10, 0x02, 0x19,
];

/// id-aa-ets-certCRLTimestamp (1.2.840.113549.1.9.16.2.26)
pub const CERT_CRL_TIMESTAMP_ATTR_OID: &[u8] = &[
    0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x10, 0x02, 0x1a,
];

/// id-aa-ets-archiveTimestampV3 (0.4.0.1733.2.4)
pub const ARCHIVE_TIMESTAMP_V3_ATTR_OID: &[u8] = &[0x04, 0x00, 0x8d, 0x45, 0x02, 0x04];

// === Hash Algorithm OIDs ===

/// MD5 (1.2.840.113549.2.5)
pub const MD5_ALGORITHM_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x05];

/// SHA-1 (1.3.14.3.2.26)
pub const SHA1_ALGORITHM_OID: &[u8] = &[0x2b, 0x0e, 0x03, 0x02, 0x1a];

/// SHA-224 (2.16.840.1.101.3.4.2.4)
pub const SHA224_ALGORITHM_OID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x04];

/// SHA-256 (2.16.840.1.101.3.4.2.1)
pub const SHA256_ALGORITHM_OID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];

/// SHA-384 (2.16.840.1.101.3.4.2.2)
pub const SHA384_ALGORITHM_OID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02];

/// SHA-512 (2.16.840.1.101.3.4.2.3)
pub const SHA512_ALGORITHM_OID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03];

// === XML namespaces and canonicalization URIs ===

pub const XMLDSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const XADES_111_NAMESPACE: &str = "http://uri.etsi.org/01903/v1.1.1#";
pub const XADES_122_NAMESPACE: &str = "http://uri.etsi.org/01903/v1.2.2#";
pub const XADES_132_NAMESPACE: &str = "http://uri.etsi.org/01903/v1.3.2#";
pub const XADES_141_NAMESPACE: &str = "http://uri.etsi.org/01903/v1.4.1#";

pub const C14N_INCLUSIVE: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const C14N_INCLUSIVE_WITH_COMMENTS: &str =
    "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";
pub const C14N_EXCLUSIVE: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const C14N_EXCLUSIVE_WITH_COMMENTS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";
pub const C14N_11: &str = "http://www.w3.org/2006/12/xml-c14n11";
pub const C14N_11_WITH_COMMENTS: &str = "http://www.w3.org/2006/12/xml-c14n11#WithComments";

/// Canonicalization methods accepted for XML covered data.
pub const SUPPORTED_C14N_METHODS: &[&str] = &[
    C14N_INCLUSIVE,
    C14N_INCLUSIVE_WITH_COMMENTS,
    C14N_EXCLUSIVE,
    C14N_EXCLUSIVE_WITH_COMMENTS,
    C14N_11,
    C14N_11_WITH_COMMENTS,
];

/// Default method used when the caller leaves it unset.
pub const DEFAULT_C14N_METHOD: &str = C14N_EXCLUSIVE;
