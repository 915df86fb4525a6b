#![no_main]

use libfuzzer_sys::fuzz_target;
use tilia_cache::{is_valid_key, is_valid_store_name, KeyLength};

/// Comfortably above the longest accepted key; longer inputs add nothing.
const MAX_KEY_INPUT: usize = 512;

fuzz_target!(|data: &[u8]| {
    let Ok(key) = std::str::from_utf8(&data[..data.len().min(MAX_KEY_INPUT)]) else {
        return;
    };

    let standard = is_valid_key(key, KeyLength::Standard);
    let long = is_valid_key(key, KeyLength::Long);
    assert!(!standard || long, "standard key rejected as long key: {key:?}");

    if long {
        // Valid keys are always a single, non-special path segment.
        let path = std::path::Path::new(key);
        assert_eq!(path.components().count(), 1, "{key:?}");
        assert!(!key.contains(['/', '\\']), "{key:?}");
        assert_ne!(key, "..");
    }
    if is_valid_store_name(key) {
        assert!(standard, "store name is not a valid key: {key:?}");
    }
});
