//! Minimal DER TLV helpers.
//!
//! Only what the crate needs to walk RFC 3161 tokens and to lay out its own
//! deterministic block encodings; this is not a general ASN.1 codec.

use crate::domain::constants::{DER_LONG_FORM_1_BYTE, DER_LONG_FORM_2_BYTE, DER_LONG_FORM_3_BYTE};
use crate::infra::error::{SigningError, SigningResult};

/// One decoded TLV element borrowed from its source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    /// Header plus content.
    pub raw: &'a [u8],
    pub content: &'a [u8],
}

impl<'a> Tlv<'a> {
    #[must_use]
    pub fn is_constructed(&self) -> bool {
        self.tag & 0x20 != 0
    }

    /// Iterate over the children of a constructed element.
    pub fn children(&self) -> SigningResult<Vec<Tlv<'a>>> {
        read_all(self.content)
    }
}

/// Encode a DER length.
#[must_use]
pub fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len <= 0xFF {
        vec![DER_LONG_FORM_1_BYTE, len as u8]
    } else if len <= 0xFFFF {
        vec![DER_LONG_FORM_2_BYTE, (len >> 8) as u8, len as u8]
    } else if len <= 0xFF_FFFF {
        vec![
            DER_LONG_FORM_3_BYTE,
            (len >> 16) as u8,
            (len >> 8) as u8,
            len as u8,
        ]
    } else {
        vec![
            0x84,
            (len >> 24) as u8,
            (len >> 16) as u8,
            (len >> 8) as u8,
            len as u8,
        ]
    }
}

/// Encode a full TLV.
#[must_use]
pub fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 6);
    out.push(tag);
    out.extend_from_slice(&encode_length(content.len()));
    out.extend_from_slice(content);
    out
}

/// Decode the first TLV in `data`; returns it and the remaining bytes.
pub fn read_tlv(data: &[u8]) -> SigningResult<(Tlv<'_>, &[u8])> {
    if data.len() < 2 {
        return Err(SigningError::Asn1Error("truncated TLV header".into()));
    }
    let tag = data[0];
    if tag & 0x1F == 0x1F {
        return Err(SigningError::Asn1Error("multi-byte tags not supported".into()));
    }
    let first = data[1];
    let (len, header_len) = if first & 0x80 == 0 {
        (first as usize, 2)
    } else {
        let count = (first & 0x7F) as usize;
        if count == 0 || count > 4 {
            return Err(SigningError::Asn1Error(format!(
                "unsupported length encoding 0x{first:02x}"
            )));
        }
        if data.len() < 2 + count {
            return Err(SigningError::Asn1Error("truncated TLV length".into()));
        }
        let len = data[2..2 + count]
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, 2 + count)
    };
    let end = header_len
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| SigningError::Asn1Error("TLV length exceeds buffer".into()))?;
    Ok((
        Tlv {
            tag,
            raw: &data[..end],
            content: &data[header_len..end],
        },
        &data[end..],
    ))
}

/// Decode every TLV in `data` back to back.
pub fn read_all(mut data: &[u8]) -> SigningResult<Vec<Tlv<'_>>> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let (tlv, rest) = read_tlv(data)?;
        out.push(tlv);
        data = rest;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_forms() {
        assert_eq!(encode_length(5), vec![5]);
        assert_eq!(encode_length(0x80), vec![0x81, 0x80]);
        assert_eq!(encode_length(0x1234), vec![0x82, 0x12, 0x34]);
    }

    #[test]
    fn read_nested() {
        let inner = encode_tlv(0x04, &[1, 2, 3]);
        let outer = encode_tlv(0x30, &inner);
        let (tlv, rest) = read_tlv(&outer).unwrap();
        assert!(rest.is_empty());
        assert!(tlv.is_constructed());
        let children = tlv.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].content, &[1, 2, 3]);
    }

    #[test]
    fn long_content_roundtrips_header() {
        let content = vec![0xAB; 300];
        let encoded = encode_tlv(0x04, &content);
        assert_eq!(&encoded[..4], &[0x04, 0x82, 0x01, 0x2c]);
        let (tlv, _) = read_tlv(&encoded).unwrap();
        assert_eq!(tlv.content.len(), 300);
    }

    #[test]
    fn rejects_overlong_length() {
        assert!(read_tlv(&[0x30, 0x05, 0x01]).is_err());
        assert!(read_tlv(&[0x30]).is_err());
    }
}
