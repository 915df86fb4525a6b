use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::header::{ItemHeader, HEADER_LEN};
use crate::StorageError;

/// A fully read and verified item file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredItem {
    pub header: ItemHeader,
    pub payload: Vec<u8>,
}

/// Read only the header of the item at `path`.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_header(path: &Path) -> Result<Option<ItemHeader>, StorageError> {
    let Some(mut file) = open_if_exists(path)? else {
        return Ok(None);
    };
    let mut buf = [0u8; HEADER_LEN];
    read_full(&mut file, &mut buf, 0)?;
    ItemHeader::decode(&buf).map(Some)
}

/// Read and verify the item at `path`.
///
/// Returns `Ok(None)` when the file does not exist. A file that exists but is
/// shorter than its header claims is reported as [`StorageError::Truncated`].
pub fn read_item(path: &Path) -> Result<Option<StoredItem>, StorageError> {
    let Some(mut file) = open_if_exists(path)? else {
        return Ok(None);
    };

    let mut header_bytes = [0u8; HEADER_LEN];
    read_full(&mut file, &mut header_bytes, 0)?;
    let header = ItemHeader::decode(&header_bytes)?;

    // Never trust the header length for an allocation the file cannot back.
    let expected = HEADER_LEN + header.payload_len as usize;
    let file_len = file.metadata()?.len();
    if file_len < expected as u64 {
        return Err(StorageError::Truncated {
            expected,
            found: usize::try_from(file_len).unwrap_or(usize::MAX),
        });
    }

    let mut payload = vec![0u8; header.payload_len as usize];
    read_full(&mut file, &mut payload, HEADER_LEN)?;

    let found = crate::content_hash(&payload);
    if found != header.content_hash {
        return Err(StorageError::HashMismatch {
            expected: header.content_hash,
            found,
        });
    }

    Ok(Some(StoredItem { header, payload }))
}

fn open_if_exists(path: &Path) -> Result<Option<File>, StorageError> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Fill `buf` completely, reporting short files as `Truncated` with absolute
/// offsets (`already_read` is the number of bytes consumed before `buf`).
fn read_full(file: &mut File, buf: &mut [u8], already_read: usize) -> Result<(), StorageError> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(StorageError::Truncated {
                    expected: already_read + buf.len(),
                    found: already_read + filled,
                })
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
