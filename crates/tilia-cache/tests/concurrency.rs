use std::sync::{Arc, Barrier};

use tilia_cache::{FileCacheStore, PathResolver, StoreOptions};

#[test]
fn concurrent_writers_never_expose_torn_values() {
    let tmp = tempfile::tempdir().unwrap();
    let resolver = PathResolver::new(tmp.path());
    let options = StoreOptions::default().base_path("cache");

    // Seed the store so readers always find a complete value.
    FileCacheStore::open(&resolver, "shared", options.clone())
        .unwrap()
        .set("value", &vec![0u32; 4096], None)
        .unwrap();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|idx| {
            let barrier = barrier.clone();
            // Each thread gets its own handle, like separate processes would.
            let resolver = PathResolver::new(tmp.path());
            let options = options.clone();
            std::thread::spawn(move || {
                let store = FileCacheStore::open(&resolver, "shared", options).unwrap();
                barrier.wait();
                for round in 0..25u32 {
                    let fill = idx as u32 * 1000 + round;
                    store.set("value", &vec![fill; 4096], None).unwrap();

                    let value: Vec<u32> = store.get("value").unwrap().unwrap();
                    assert_eq!(value.len(), 4096);
                    assert!(value.iter().all(|v| *v == value[0]), "torn value");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let store = FileCacheStore::open(&resolver, "shared", options).unwrap();
    let value: Vec<u32> = store.get("value").unwrap().unwrap();
    assert!(value.iter().all(|v| *v == value[0]));

    let leftovers: Vec<_> = std::fs::read_dir(store.layout().tmp_dir())
        .unwrap()
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn concurrent_opens_of_new_store_succeed() {
    let tmp = tempfile::tempdir().unwrap();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let root = tmp.path().to_path_buf();
            std::thread::spawn(move || {
                let resolver = PathResolver::new(root);
                let store = FileCacheStore::open(
                    &resolver,
                    "fresh",
                    StoreOptions::default().base_path("cache").ttl_default(30),
                )
                .unwrap();
                assert_eq!(store.settings().ttl_default, 30);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(tmp.path().join("cache/fresh.toml").is_file());
}
