use std::path::Path;

use tilia_cache::{
    list_instances, FilePermissions, KeyLength, ManualClock, PathResolver, StoreOptions,
    StoreProfile, StoreRegistry,
};

#[test]
fn list_instances_reopens_persisted_stores() {
    let tmp = tempfile::tempdir().unwrap();
    let resolver = PathResolver::new(tmp.path());
    let registry = StoreRegistry::new(resolver.clone(), "cache");

    let sessions = registry
        .open("sessions", StoreOptions::default().ttl_default(120))
        .unwrap();
    sessions.set("aa", &1u8, None).unwrap();
    registry
        .open(
            "assets",
            StoreOptions::with_profile(StoreProfile::persistent())
                .file_permissions(FilePermissions::GroupReadWrite),
        )
        .unwrap();

    // Noise that is not a store.
    std::fs::write(tmp.path().join("cache/notes.txt"), b"hello").unwrap();
    std::fs::write(tmp.path().join("cache/-bad.toml"), b"").unwrap();
    std::fs::create_dir(tmp.path().join("cache/dir.toml")).unwrap();

    let stores = list_instances(&resolver, Path::new("cache")).unwrap();
    let names: Vec<_> = stores.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["assets", "sessions"]);

    let assets = &stores[0];
    assert!(assets.settings().ttl_disabled());
    assert_eq!(
        assets.settings().file_permissions,
        FilePermissions::GroupReadWrite
    );

    let sessions = &stores[1];
    assert_eq!(sessions.settings().ttl_default, 120);
    assert_eq!(sessions.key_length(), KeyLength::Long);
    assert_eq!(sessions.get::<u8>("aa").unwrap(), Some(1));
}

#[test]
fn list_instances_of_missing_base_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let resolver = PathResolver::new(tmp.path());
    assert!(list_instances(&resolver, Path::new("nowhere"))
        .unwrap()
        .is_empty());
}

#[test]
fn destroyed_stores_are_not_listed() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = StoreRegistry::new(PathResolver::new(tmp.path()), "cache");

    registry.open("keep", StoreOptions::default()).unwrap();
    let mut doomed = registry.open("doomed", StoreOptions::default()).unwrap();
    doomed.destroy().unwrap();

    let names: Vec<_> = registry
        .list()
        .unwrap()
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    assert_eq!(names, vec!["keep"]);
}

#[test]
fn registry_clock_drives_expiry() {
    let tmp = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(1_000);
    let registry =
        StoreRegistry::new(PathResolver::new(tmp.path()), "cache").with_clock(clock.clone());

    let store = registry.open("sessions", StoreOptions::default()).unwrap();
    store.set("aa", &1u8, Some(10)).unwrap();
    clock.advance(11);
    assert_eq!(store.get::<u8>("aa").unwrap(), None);

    let listed = registry.list().unwrap();
    assert_eq!(listed[0].get::<u8>("aa").unwrap(), None);
}

#[test]
fn absolute_base_path_ignores_document_root() {
    let root = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    let registry = StoreRegistry::new(PathResolver::new(root.path()), elsewhere.path());

    registry.open("sessions", StoreOptions::default()).unwrap();
    assert!(elsewhere.path().join("sessions.toml").is_file());
    assert!(!root.path().join("sessions.toml").exists());
}
