#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let path = dir.path().join("item");
    let cap = data.len().min(64 * 1024);
    std::fs::write(&path, &data[..cap]).expect("failed to write item bytes");

    // Malformed items must surface as errors, never panics.
    if let Ok(Some(item)) = tilia_storage::read_item(&path) {
        assert_eq!(item.payload.len(), item.header.payload_len as usize);
    }
    let _ = tilia_storage::read_header(&path);
});
