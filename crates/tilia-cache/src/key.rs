//! Key and store-name validation.
//!
//! The accepted character set is safe both as a cache key and as a single
//! path segment, so keys map 1:1 onto file names without escaping.

pub const MIN_KEY_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 64;

const KEY_PUNCTUATION: &[char] = &['-', '.', '[', ']', '_'];
const NAME_PUNCTUATION: &[char] = &['-', '_'];

/// Upper bound on key length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum KeyLength {
    /// 64 characters.
    #[default]
    Standard,
    /// 128 characters.
    Long,
}

impl KeyLength {
    pub const fn max(self) -> usize {
        match self {
            KeyLength::Standard => 64,
            KeyLength::Long => 128,
        }
    }
}

/// Returns whether `key` may be used as a cache key.
pub fn is_valid_key(key: &str, length: KeyLength) -> bool {
    // `..` passes the charset check but resolves to the parent directory.
    key != ".." && is_valid_with(key, length.max(), KEY_PUNCTUATION)
}

/// Returns whether `name` may be used as a store name.
pub fn is_valid_store_name(name: &str) -> bool {
    is_valid_with(name, MAX_NAME_LEN, NAME_PUNCTUATION)
}

fn is_valid_with(s: &str, max: usize, punctuation: &[char]) -> bool {
    // All accepted characters are ASCII, so byte length equals char count.
    if s.len() < MIN_KEY_LEN || s.len() > max || s.starts_with('-') {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || punctuation.contains(&c))
}
