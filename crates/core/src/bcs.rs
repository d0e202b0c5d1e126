//! BCS size accounting for the pure arguments this crate submits.
//!
//! Only the shapes the airdrop contract takes are covered: fixed 32-byte
//! addresses, byte strings, and vectors of those. A vector is a ULEB128
//! element count followed by each element's encoding.

use crate::ledger::SuiAddress;

/// A value with a known BCS encoded size.
pub trait BcsEncode {
    fn encoded_len(&self) -> usize;
}

impl BcsEncode for SuiAddress {
    fn encoded_len(&self) -> usize {
        32
    }
}

impl BcsEncode for [u8] {
    fn encoded_len(&self) -> usize {
        uleb128_len(self.len()) + self.len()
    }
}

impl BcsEncode for Vec<u8> {
    fn encoded_len(&self) -> usize {
        self.as_slice().encoded_len()
    }
}

impl BcsEncode for str {
    fn encoded_len(&self) -> usize {
        self.as_bytes().encoded_len()
    }
}

impl BcsEncode for String {
    fn encoded_len(&self) -> usize {
        self.as_str().encoded_len()
    }
}

/// Bytes needed to write `value` as ULEB128.
pub fn uleb128_len(mut value: usize) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Encoded size of `vector<T>` holding `items`.
pub fn vector_len<T: BcsEncode>(items: &[T]) -> usize {
    uleb128_len(items.len()) + items.iter().map(BcsEncode::encoded_len).sum::<usize>()
}

/// Byte-level encoder that the size accounting is checked against.
#[cfg(test)]
pub(crate) mod encode {
    use super::BcsEncode;
    use crate::ledger::SuiAddress;

    pub(crate) trait EncodeInto: BcsEncode {
        fn encode_into(&self, out: &mut Vec<u8>);
    }

    impl EncodeInto for SuiAddress {
        fn encode_into(&self, out: &mut Vec<u8>) {
            out.extend_from_slice(self.as_bytes());
        }
    }

    impl EncodeInto for String {
        fn encode_into(&self, out: &mut Vec<u8>) {
            write_uleb128(self.len(), out);
            out.extend_from_slice(self.as_bytes());
        }
    }

    pub(crate) fn write_uleb128(mut value: usize, out: &mut Vec<u8>) {
        while value >= 0x80 {
            out.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        out.push(value as u8);
    }

    pub(crate) fn encode_vector<T: EncodeInto>(items: &[T]) -> Vec<u8> {
        let mut out = Vec::new();
        write_uleb128(items.len(), &mut out);
        for item in items {
            item.encode_into(&mut out);
        }
        out
    }
}
