//! On-disk item format and atomic write primitives for tilia cache stores.
//!
//! ## Format
//! Each cached item is stored as one file:
//! - a fixed-size header (32 bytes, little-endian)
//! - the opaque payload bytes
//!
//! The header embeds:
//! - a magic tag and format version
//! - the absolute expiry time in unix seconds (`0` means "never expires")
//! - payload length and a truncated BLAKE3 content hash
//!
//! Expiry lives in the header rather than in the file's modified time, so it
//! survives copies, backups and filesystems with coarse mtime granularity.
//!
//! ## Writes
//! Writers stage the full file in a temp directory on the same filesystem and
//! `rename` it over the destination. Readers never observe a torn item.

mod header;
mod read;
mod write;

use thiserror::Error;

pub use header::{ItemHeader, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use read::{read_header, read_item, StoredItem};
pub use write::{atomic_write, write_item_atomic};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    #[error("unsupported item format version {0}")]
    UnsupportedVersion(u16),
    #[error("truncated file: expected at least {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("payload hash mismatch: expected {expected}, found {found}")]
    HashMismatch { expected: u64, found: u64 },
    #[error("payload of {len} bytes exceeds the item size limit")]
    OversizedPayload { len: usize },
}

impl StorageError {
    /// Whether this error means the file vanished while we were using it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

pub(crate) fn content_hash(payload: &[u8]) -> u64 {
    let hash_bytes = blake3::hash(payload);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash_bytes.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_item() {
        let dir = tempfile::TempDir::new().unwrap();
        let tmp_dir = dir.path().join("tmp");
        std::fs::create_dir_all(&tmp_dir).unwrap();
        let path = dir.path().join("item");

        write_item_atomic(&tmp_dir, &path, 1_700_000_000, b"hello", None).unwrap();

        let item = read_item(&path).unwrap().unwrap();
        assert_eq!(item.header.expires_at, 1_700_000_000);
        assert_eq!(item.payload, b"hello");

        let header = read_header(&path).unwrap().unwrap();
        assert_eq!(header, item.header);

        // Temp files never linger after a successful write.
        assert_eq!(std::fs::read_dir(&tmp_dir).unwrap().count(), 0);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent");
        assert!(read_item(&path).unwrap().is_none());
        assert!(read_header(&path).unwrap().is_none());
    }

    #[test]
    fn truncated_header_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let tmp_dir = dir.path().to_path_buf();
        let path = dir.path().join("item");
        write_item_atomic(&tmp_dir, &path, 0, b"value", None).unwrap();

        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len((HEADER_LEN - 1) as u64).unwrap();

        match read_item(&path).unwrap_err() {
            StorageError::Truncated { .. } => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn truncated_payload_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let tmp_dir = dir.path().to_path_buf();
        let path = dir.path().join("item");
        write_item_atomic(&tmp_dir, &path, 0, b"longer value", None).unwrap();

        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len((HEADER_LEN + 3) as u64).unwrap();

        match read_item(&path).unwrap_err() {
            StorageError::Truncated { expected, found } => {
                assert_eq!(expected, HEADER_LEN + "longer value".len());
                assert_eq!(found, HEADER_LEN + 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn corrupted_payload_is_hash_mismatch() {
        let dir = tempfile::TempDir::new().unwrap();
        let tmp_dir = dir.path().to_path_buf();
        let path = dir.path().join("item");
        write_item_atomic(&tmp_dir, &path, 0, b"payload", None).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[HEADER_LEN] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        match read_item(&path).unwrap_err() {
            StorageError::HashMismatch { expected, found } => assert_ne!(expected, found),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn oversized_length_claim_is_truncated_without_allocating() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("item");
        let header = ItemHeader {
            expires_at: 0,
            payload_len: u32::MAX,
            content_hash: 0,
        };
        std::fs::write(&path, header.encode()).unwrap();

        match read_item(&path).unwrap_err() {
            StorageError::Truncated { expected, found } => {
                assert_eq!(expected, HEADER_LEN + u32::MAX as usize);
                assert_eq!(found, HEADER_LEN);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The header alone is still readable.
        assert_eq!(read_header(&path).unwrap(), Some(header));
    }

    #[test]
    fn overwrite_replaces_previous_item() {
        let dir = tempfile::TempDir::new().unwrap();
        let tmp_dir = dir.path().to_path_buf();
        let path = dir.path().join("item");

        write_item_atomic(&tmp_dir, &path, 10, b"first", None).unwrap();
        write_item_atomic(&tmp_dir, &path, 20, b"second", None).unwrap();

        let item = read_item(&path).unwrap().unwrap();
        assert_eq!(item.header.expires_at, 20);
        assert_eq!(item.payload, b"second");
    }

    #[cfg(unix)]
    #[test]
    fn applies_file_mode_after_rename() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let tmp_dir = dir.path().to_path_buf();
        let path = dir.path().join("item");
        write_item_atomic(&tmp_dir, &path, 0, b"x", Some(0o640)).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}
