//! Minimal ASN.1 DER reader and writer.
//!
//! Certificate extensions are small, nested, loosely typed structures. Rather than
//! pulling in a schema compiler, the extension codec works on top of two primitives:
//!
//! - [`DerReader`] walks the top-level values of a buffer one TLV at a time and
//!   exposes the tag class/number, so callers can pick out context-specific fields
//!   (e.g. `[0] keyIdentifier` of an Authority Key Identifier).
//! - A handful of `encode_*` helpers produce definite-length DER for the types the
//!   codec emits (SEQUENCE, BOOLEAN, INTEGER, OCTET STRING, BIT STRING, OID).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerError {
    #[error("unexpected end of DER data")]
    Truncated,
    #[error("indefinite length not supported")]
    IndefiniteLength,
    #[error("DER length too large")]
    LengthOverflow,
    #[error("expected {expected:?}, found {found:?}")]
    UnexpectedTag { expected: Tag, found: Tag },
    #[error("invalid object identifier: {0}")]
    InvalidOid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

/// An identifier octet (or octets) split into class, form and number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
}

impl Tag {
    pub const BOOLEAN: Tag = Tag::universal(1, false);
    pub const INTEGER: Tag = Tag::universal(2, false);
    pub const BIT_STRING: Tag = Tag::universal(3, false);
    pub const OCTET_STRING: Tag = Tag::universal(4, false);
    pub const OID: Tag = Tag::universal(6, false);
    pub const SEQUENCE: Tag = Tag::universal(16, true);

    pub const fn universal(number: u32, constructed: bool) -> Self {
        Tag {
            class: TagClass::Universal,
            constructed,
            number,
        }
    }

    pub const fn context(number: u32, constructed: bool) -> Self {
        Tag {
            class: TagClass::ContextSpecific,
            constructed,
            number,
        }
    }

    pub fn is_context(&self, number: u32) -> bool {
        self.class == TagClass::ContextSpecific && self.number == number
    }

    fn write(&self, out: &mut Vec<u8>) {
        let class_bits = match self.class {
            TagClass::Universal => 0x00,
            TagClass::Application => 0x40,
            TagClass::ContextSpecific => 0x80,
            TagClass::Private => 0xC0,
        };
        let form_bit = if self.constructed { 0x20 } else { 0x00 };
        if self.number < 0x1F {
            out.push(class_bits | form_bit | self.number as u8);
            return;
        }
        out.push(class_bits | form_bit | 0x1F);
        write_base128(self.number, out);
    }
}

/// One decoded tag/length/value triple. `value` borrows from the reader's buffer.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    pub tag: Tag,
    pub value: &'a [u8],
}

/// A zero-copy cursor over a run of DER values.
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Read the next value, whatever its tag.
    pub fn read_tlv(&mut self) -> Result<Tlv<'a>, DerError> {
        let tag = self.read_tag()?;
        let length = self.read_length()?;
        let end = self
            .pos
            .checked_add(length)
            .ok_or(DerError::LengthOverflow)?;
        if end > self.data.len() {
            return Err(DerError::Truncated);
        }
        let value = &self.data[self.pos..end];
        self.pos = end;
        Ok(Tlv { tag, value })
    }

    /// Read the next value and require it to carry `expected`.
    pub fn read_expected(&mut self, expected: Tag) -> Result<&'a [u8], DerError> {
        let tlv = self.read_tlv()?;
        if tlv.tag != expected {
            return Err(DerError::UnexpectedTag {
                expected,
                found: tlv.tag,
            });
        }
        Ok(tlv.value)
    }

    /// Enter a SEQUENCE and return a reader over its contents.
    pub fn read_sequence(&mut self) -> Result<DerReader<'a>, DerError> {
        self.read_expected(Tag::SEQUENCE).map(DerReader::new)
    }

    /// Iterate the remaining top-level values.
    ///
    /// Iteration stops after the first malformed value, which is yielded as an error.
    pub fn values(self) -> Values<'a> {
        Values {
            reader: self,
            failed: false,
        }
    }

    fn read_byte(&mut self) -> Result<u8, DerError> {
        let b = *self.data.get(self.pos).ok_or(DerError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_tag(&mut self) -> Result<Tag, DerError> {
        let first = self.read_byte()?;
        let class = match first >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        };
        let constructed = first & 0x20 != 0;
        let mut number = u32::from(first & 0x1F);
        if number == 0x1F {
            number = 0;
            loop {
                let b = self.read_byte()?;
                if number > (u32::MAX >> 7) {
                    return Err(DerError::LengthOverflow);
                }
                number = (number << 7) | u32::from(b & 0x7F);
                if b & 0x80 == 0 {
                    break;
                }
            }
        }
        Ok(Tag {
            class,
            constructed,
            number,
        })
    }

    fn read_length(&mut self) -> Result<usize, DerError> {
        let first = self.read_byte()?;
        if first < 0x80 {
            return Ok(usize::from(first));
        }
        if first == 0x80 {
            return Err(DerError::IndefiniteLength);
        }
        let num_bytes = usize::from(first & 0x7F);
        if num_bytes > 4 {
            return Err(DerError::LengthOverflow);
        }
        let mut length = 0usize;
        for _ in 0..num_bytes {
            length = (length << 8) | usize::from(self.read_byte()?);
        }
        Ok(length)
    }
}

/// Iterator returned by [`DerReader::values`].
pub struct Values<'a> {
    reader: DerReader<'a>,
    failed: bool,
}

impl<'a> Iterator for Values<'a> {
    type Item = Result<Tlv<'a>, DerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_empty() {
            return None;
        }
        let item = self.reader.read_tlv();
        self.failed = item.is_err();
        Some(item)
    }
}

// ================= Encoding =================

pub fn encode_tlv(tag: Tag, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 6);
    tag.write(&mut out);
    let len = value.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(value);
    out
}

pub fn encode_sequence(items: &[Vec<u8>]) -> Vec<u8> {
    encode_tlv(Tag::SEQUENCE, &items.concat())
}

pub fn encode_boolean(value: bool) -> Vec<u8> {
    encode_tlv(Tag::BOOLEAN, &[if value { 0xFF } else { 0x00 }])
}

/// Non-negative INTEGER in minimal two's-complement form.
pub fn encode_unsigned(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes[..3].iter().take_while(|b| **b == 0).count();
    let mut content = Vec::with_capacity(5);
    if bytes[skip] & 0x80 != 0 {
        content.push(0);
    }
    content.extend_from_slice(&bytes[skip..]);
    encode_tlv(Tag::INTEGER, &content)
}

pub fn encode_octet_string(value: &[u8]) -> Vec<u8> {
    encode_tlv(Tag::OCTET_STRING, value)
}

pub fn encode_bit_string(unused_bits: u8, bytes: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(bytes.len() + 1);
    content.push(unused_bits);
    content.extend_from_slice(bytes);
    encode_tlv(Tag::BIT_STRING, &content)
}

/// Encode a dotted-decimal OID such as `1.3.6.1.5.5.7.3.1`.
pub fn encode_oid(dotted: &str) -> Result<Vec<u8>, DerError> {
    let invalid = || DerError::InvalidOid(dotted.to_string());
    let arcs = dotted
        .split('.')
        .map(|arc| arc.parse::<u32>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
        return Err(invalid());
    }
    let mut content = Vec::new();
    let first = arcs[0]
        .checked_mul(40)
        .and_then(|v| v.checked_add(arcs[1]))
        .ok_or_else(invalid)?;
    write_base128(first, &mut content);
    for arc in &arcs[2..] {
        write_base128(*arc, &mut content);
    }
    Ok(encode_tlv(Tag::OID, &content))
}

fn write_base128(mut value: u32, out: &mut Vec<u8>) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    loop {
        groups[n] = (value & 0x7F) as u8;
        n += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i > 0 { 0x80 } else { 0x00 };
        out.push(groups[i] | continuation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterate_sequence_by_tag() {
        let der = encode_sequence(&[
            encode_tlv(Tag::context(0, false), &[0x01, 0x02]),
            encode_tlv(Tag::context(2, false), &[0x03]),
            encode_unsigned(5),
        ]);
        assert_eq!(&der[..4], &[0x30, 0x0A, 0x80, 0x02]);
        let inner = DerReader::new(&der).read_sequence().unwrap();
        let values: Vec<Tlv> = inner.values().collect::<Result<_, _>>().unwrap();
        assert_eq!(values.len(), 3);
        assert!(values[0].tag.is_context(0));
        assert_eq!(values[0].value, &[0x01, 0x02]);
        assert!(values[1].tag.is_context(2));
        assert_eq!(values[2].tag, Tag::INTEGER);
        assert_eq!(values[2].value, &[0x05]);
    }

    #[test]
    fn test_truncated_value_is_error() {
        let der = [0x30, 0x05, 0x04, 0x01];
        let mut reader = DerReader::new(&der);
        assert_eq!(reader.read_tlv().unwrap_err(), DerError::Truncated);
    }

    #[test]
    fn test_values_stop_after_error() {
        let der = [0x04, 0x01, 0xAA, 0x04, 0x05, 0x00];
        let items: Vec<_> = DerReader::new(&der).values().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[test]
    fn test_indefinite_length_rejected() {
        let der = [0x30, 0x80, 0x00, 0x00];
        assert_eq!(
            DerReader::new(&der).read_tlv().unwrap_err(),
            DerError::IndefiniteLength
        );
    }

    #[test]
    fn test_long_form_length() {
        let payload = vec![0x5A; 300];
        let der = encode_octet_string(&payload);
        assert_eq!(&der[..4], &[0x04, 0x82, 0x01, 0x2C]);
        let value = DerReader::new(&der)
            .read_expected(Tag::OCTET_STRING)
            .unwrap();
        assert_eq!(value, payload.as_slice());
    }

    #[test]
    fn test_high_tag_number() {
        let der = encode_tlv(Tag::context(40, false), &[0x01]);
        assert_eq!(&der[..2], &[0x9F, 0x28]);
        let tlv = DerReader::new(&der).read_tlv().unwrap();
        assert!(tlv.tag.is_context(40));
    }

    #[test]
    fn test_unsigned_integer_encoding() {
        assert_eq!(encode_unsigned(0), vec![0x02, 0x01, 0x00]);
        assert_eq!(encode_unsigned(127), vec![0x02, 0x01, 0x7F]);
        assert_eq!(encode_unsigned(128), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(encode_unsigned(256), vec![0x02, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_oid_encoding() {
        let der = encode_oid("1.3.6.1.5.5.7.3.1").unwrap();
        assert_eq!(
            der,
            vec![0x06, 0x08, 0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x01]
        );
        assert_eq!(
            encode_oid("2.5.29.35").unwrap(),
            vec![0x06, 0x03, 0x55, 0x1D, 0x23]
        );
        assert!(encode_oid("1").is_err());
        assert!(encode_oid("1.40").is_err());
        assert!(encode_oid("1.2.x").is_err());
    }
}
