#![no_main]

use libfuzzer_sys::fuzz_target;
use tilia_storage::{ItemHeader, MAGIC};

fuzz_target!(|data: &[u8]| {
    let Ok(header) = ItemHeader::decode(data) else {
        return;
    };
    assert_eq!(&data[..4], &MAGIC[..]);

    // Flag and reserved bytes are not interpreted; every field that is must
    // survive a re-encode.
    let encoded = header.encode();
    assert_eq!(ItemHeader::decode(&encoded).ok(), Some(header));
    assert_eq!(&encoded[8..20], &data[8..20]);
    assert_eq!(&encoded[24..32], &data[24..32]);
});
