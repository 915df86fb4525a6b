use byteorder::{ByteOrder, LittleEndian};

use crate::StorageError;

pub const MAGIC: [u8; 4] = *b"TLIA";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 32;

/// Fixed-size prefix of every item file.
///
/// Layout (little-endian):
/// - `0..4`   magic
/// - `4..6`   format version
/// - `6..8`   flags (reserved)
/// - `8..16`  `expires_at` (unix seconds, `0` = never)
/// - `16..20` payload length
/// - `20..24` reserved
/// - `24..32` content hash
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemHeader {
    pub expires_at: i64,
    pub payload_len: u32,
    pub content_hash: u64,
}

impl ItemHeader {
    pub fn new(expires_at: i64, payload: &[u8]) -> Result<Self, StorageError> {
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| StorageError::OversizedPayload { len: payload.len() })?;
        Ok(Self {
            expires_at,
            payload_len,
            content_hash: crate::content_hash(payload),
        })
    }

    /// `None` when the item never expires.
    pub fn expiry(&self) -> Option<i64> {
        (self.expires_at != 0).then_some(self.expires_at)
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        LittleEndian::write_u16(&mut buf[4..6], FORMAT_VERSION);
        LittleEndian::write_i64(&mut buf[8..16], self.expires_at);
        LittleEndian::write_u32(&mut buf[16..20], self.payload_len);
        LittleEndian::write_u64(&mut buf[24..32], self.content_hash);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() < HEADER_LEN {
            return Err(StorageError::Truncated {
                expected: HEADER_LEN,
                found: bytes.len(),
            });
        }
        if bytes[0..4] != MAGIC {
            return Err(StorageError::InvalidHeader("bad magic"));
        }
        let version = LittleEndian::read_u16(&bytes[4..6]);
        if version != FORMAT_VERSION {
            return Err(StorageError::UnsupportedVersion(version));
        }
        Ok(Self {
            expires_at: LittleEndian::read_i64(&bytes[8..16]),
            payload_len: LittleEndian::read_u32(&bytes[16..20]),
            content_hash: LittleEndian::read_u64(&bytes[24..32]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_foreign_files() {
        let mut bytes = ItemHeader::new(5, b"abc").unwrap().encode();
        bytes[0] = b'X';
        assert!(matches!(
            ItemHeader::decode(&bytes),
            Err(StorageError::InvalidHeader(_))
        ));
    }

    #[test]
    fn decode_rejects_future_versions() {
        let mut bytes = ItemHeader::new(5, b"abc").unwrap().encode();
        LittleEndian::write_u16(&mut bytes[4..6], FORMAT_VERSION + 1);
        match ItemHeader::decode(&bytes) {
            Err(StorageError::UnsupportedVersion(v)) => assert_eq!(v, FORMAT_VERSION + 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn zero_expiry_means_forever() {
        let header = ItemHeader::new(0, b"").unwrap();
        assert_eq!(header.expiry(), None);
        let header = ItemHeader::new(42, b"").unwrap();
        assert_eq!(header.expiry(), Some(42));
    }
}
