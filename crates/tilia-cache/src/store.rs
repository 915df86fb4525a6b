use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tilia_storage::{ItemHeader, StorageError};

use crate::clock::Clock;
use crate::error::CacheError;
use crate::key::{is_valid_key, is_valid_store_name, KeyLength};
use crate::options::StoreOptions;
use crate::paths::{PathResolver, StoreLayout};
use crate::settings::StoreSettings;
use crate::util::{
    bincode_deserialize, bincode_serialize, list_files, prune_stale_tmp, remove_dir_all_nofollow,
    remove_file_best_effort,
};
use crate::Result;

/// Grace period used when the store has no default TTL to derive one from.
pub const FALLBACK_GRACE_SECS: i64 = 15 * 60;

/// Temp files untouched for this long are treated as crash leftovers.
const STALE_TMP_AGE: Duration = Duration::from_secs(60 * 60);

/// A named, file-backed key-value store.
///
/// Every item is one file under `<base>/stores/<name>/`; writes go through a
/// temp file and an atomic rename, so concurrent processes sharing the same
/// directory never observe torn values. The handle itself is not internally
/// synchronized.
#[derive(Debug)]
pub struct FileCacheStore {
    pub(crate) name: String,
    pub(crate) layout: StoreLayout,
    pub(crate) settings: StoreSettings,
    pub(crate) key_length: KeyLength,
    pub(crate) resolver: PathResolver,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) candidate: bool,
    pub(crate) destroyed: bool,
}

impl FileCacheStore {
    /// Open (or create) the store `name`.
    ///
    /// Explicit options win over persisted settings, which win over the
    /// profile defaults. Settings are rewritten only when the effective values
    /// differ from what is on disk.
    pub fn open(resolver: &PathResolver, name: &str, options: StoreOptions) -> Result<Self> {
        if !is_valid_store_name(name) {
            return Err(CacheError::InvalidName {
                name: name.to_string(),
            });
        }

        let layout = StoreLayout::new(resolver.resolve(&options.base_path), name);
        let on_disk = StoreSettings::load(&layout.settings_path())?;
        let settings = reconcile(&options, on_disk);
        let permissions = settings.file_permissions;

        resolver.ensure_dir(layout.base(), permissions)?;
        resolver.ensure_dir(&layout.tmp_dir(), permissions)?;
        resolver.ensure_dir(&layout.live_dir(), permissions)?;

        if on_disk != Some(settings) {
            settings.save(&layout.settings_path(), &layout.tmp_dir())?;
            if on_disk.is_none() {
                tracing::info!(
                    target = "tilia.cache",
                    store = name,
                    base = %layout.base().display(),
                    ttl_default = settings.ttl_default,
                    ttl_ignore = settings.ttl_ignore,
                    "created cache store"
                );
            } else {
                tracing::debug!(
                    target = "tilia.cache",
                    store = name,
                    "updated persisted store settings"
                );
            }
        }

        Ok(Self {
            name: name.to_string(),
            layout,
            settings,
            key_length: options.profile.key_length,
            resolver: resolver.clone(),
            clock: options.clock,
            candidate: false,
            destroyed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn key_length(&self) -> KeyLength {
        self.key_length
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn is_candidate_active(&self) -> bool {
        self.candidate
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.get_bytes(key)? else {
            return Ok(None);
        };
        bincode_deserialize(&bytes)
            .map(Some)
            .map_err(|source| CacheError::Decode {
                path: self.item_path(key),
                source,
            })
    }

    /// Like [`Self::get`], returning `default` on a miss.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Raw payload of `key`, bypassing the value codec.
    pub fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_key(key)?;
        let path = self.item_path(key);

        let item = match tilia_storage::read_item(&path) {
            Ok(Some(item)) => item,
            Ok(None) => return Ok(None),
            Err(err) => return self.read_failure(&path, err).map(|()| None),
        };

        if self.is_expired(&path, &item.header) {
            return Ok(None);
        }
        Ok(Some(item.payload))
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        self.check_key(key)?;
        let path = self.item_path(key);

        let header = match tilia_storage::read_header(&path) {
            Ok(Some(header)) => header,
            Ok(None) => return Ok(false),
            Err(err) => return self.read_failure(&path, err).map(|()| false),
        };
        Ok(!self.is_expired(&path, &header))
    }

    /// Store `value` under `key`.
    ///
    /// `ttl` is in seconds: `None` uses the store default, `Some(0)` keeps the
    /// item forever. Stores with `ttl_ignore` always use their default.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<u64>) -> Result<()> {
        self.check_key(key)?;
        let bytes = bincode_serialize(value).map_err(|source| CacheError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.set_bytes(key, &bytes, ttl)
    }

    /// Raw variant of [`Self::set`].
    pub fn set_bytes(&self, key: &str, payload: &[u8], ttl: Option<u64>) -> Result<()> {
        self.check_key(key)?;

        let permissions = self.settings.file_permissions;
        let dir = self.write_dir();
        let tmp_dir = self.layout.tmp_dir();
        self.resolver.ensure_dir(&tmp_dir, permissions)?;
        self.resolver.ensure_dir(&dir, permissions)?;

        let path = dir.join(key);
        tilia_storage::write_item_atomic(
            &tmp_dir,
            &path,
            self.expires_at(ttl),
            payload,
            Some(permissions.file_mode()),
        )
        .map_err(|source| CacheError::Write { path, source })
    }

    /// Remove `key`. Missing items are not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.check_key(key)?;
        remove_file_best_effort(&self.item_path(key), "delete");
        Ok(())
    }

    /// Remove every item of the live store.
    pub fn clear(&self) -> Result<()> {
        self.check_active()?;
        let dir = self.layout.live_dir();
        let files = list_files(&dir).map_err(|err| CacheError::io(&dir, err))?;
        for (_, path) in files {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(CacheError::io(path, err)),
            }
        }
        Ok(())
    }

    /// Delete every item past its expiry plus grace period.
    ///
    /// Unreadable item files are removed as well. Returns the number of files
    /// removed; always `0` for stores with expiry disabled.
    pub fn clear_expired(&self) -> Result<usize> {
        self.check_active()?;
        if self.settings.ttl_disabled() {
            return Ok(0);
        }

        let dir = self.layout.live_dir();
        let files = list_files(&dir).map_err(|err| CacheError::io(&dir, err))?;
        let now = self.clock.now();
        let mut removed = 0;
        for (name, path) in files {
            let reap = match tilia_storage::read_header(&path) {
                Ok(Some(header)) => self.past_grace(&header, now),
                Ok(None) => false,
                Err(err) if err.is_not_found() => false,
                Err(err) => {
                    tracing::debug!(
                        target = "tilia.cache",
                        store = %self.name,
                        key = %name,
                        error = %err,
                        "removing unreadable cache item"
                    );
                    true
                }
            };
            if reap && remove_file_best_effort(&path, "clear_expired") {
                removed += 1;
            }
        }

        let stale_tmp = prune_stale_tmp(&self.layout.tmp_dir(), STALE_TMP_AGE);
        tracing::debug!(
            target = "tilia.cache",
            store = %self.name,
            removed,
            stale_tmp,
            "cleared expired items"
        );
        Ok(removed)
    }

    pub fn get_multiple<T, K>(&self, keys: &[K]) -> Result<Vec<Option<T>>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        keys.iter().map(|key| self.get(key.as_ref())).collect()
    }

    /// Store every pair, stopping at the first failure.
    ///
    /// Items written before the failing one stay written.
    pub fn set_multiple<I, K, V>(&self, items: I, ttl: Option<u64>) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        for (key, value) in items {
            self.set(key.as_ref(), &value, ttl)?;
        }
        Ok(())
    }

    pub fn delete_multiple<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        for key in keys {
            self.delete(key.as_ref())?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.check_active()?;
        let dir = self.layout.live_dir();
        let files = list_files(&dir).map_err(|err| CacheError::io(&dir, err))?;
        Ok(files.is_empty())
    }

    /// Keys present in the live store (expired or not), ascending.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.check_active()?;
        let dir = self.layout.live_dir();
        let files = list_files(&dir).map_err(|err| CacheError::io(&dir, err))?;
        Ok(files
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| is_valid_key(name, self.key_length))
            .collect())
    }

    /// All live, unexpired values ordered by key.
    pub fn export<T: DeserializeOwned>(&self) -> Result<BTreeMap<String, T>> {
        let mut out = BTreeMap::new();
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                out.insert(key, value);
            }
        }
        Ok(out)
    }

    /// Clear the store and remove its settings and data directory.
    ///
    /// Not transactional: if a step fails, the items removed so far stay
    /// removed and the error is returned. Backups are left in place.
    pub fn destroy(&mut self) -> Result<()> {
        self.check_active()?;
        self.clear()?;

        let settings_path = self.layout.settings_path();
        match std::fs::remove_file(&settings_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(CacheError::io(settings_path, err)),
        }

        let candidate_dir = self.layout.candidate_dir();
        remove_dir_all_nofollow(&candidate_dir)
            .map_err(|err| CacheError::io(&candidate_dir, err))?;
        self.resolver.forget(&candidate_dir);

        let live_dir = self.layout.live_dir();
        match std::fs::remove_dir(&live_dir) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(CacheError::io(live_dir, err)),
        }
        self.resolver.forget(&live_dir);

        self.destroyed = true;
        self.candidate = false;
        tracing::info!(target = "tilia.cache", store = %self.name, "destroyed cache store");
        Ok(())
    }

    pub(crate) fn check_active(&self) -> Result<()> {
        if self.destroyed {
            return Err(CacheError::Destroyed {
                store: self.name.clone(),
            });
        }
        Ok(())
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if !is_valid_key(key, self.key_length) {
            return Err(CacheError::InvalidKey {
                key: key.to_string(),
            });
        }
        self.check_active()
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.layout.live_dir().join(key)
    }

    fn write_dir(&self) -> PathBuf {
        if self.candidate {
            self.layout.candidate_dir()
        } else {
            self.layout.live_dir()
        }
    }

    fn expires_at(&self, ttl: Option<u64>) -> i64 {
        if self.settings.ttl_disabled() {
            return 0;
        }
        let ttl = if self.settings.ttl_ignore {
            self.settings.ttl_default
        } else {
            ttl.unwrap_or(self.settings.ttl_default)
        };
        if ttl == 0 {
            return 0;
        }
        self.clock
            .now()
            .saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX))
    }

    fn grace_period(&self) -> i64 {
        if self.settings.ttl_default > 0 {
            i64::try_from(self.settings.ttl_default / 2).unwrap_or(i64::MAX)
        } else {
            FALLBACK_GRACE_SECS
        }
    }

    fn past_grace(&self, header: &ItemHeader, now: i64) -> bool {
        match header.expiry() {
            Some(end_of_life) => now > end_of_life.saturating_add(self.grace_period()),
            None => false,
        }
    }

    /// Expiry test shared by reads. Items past the grace window are unlinked
    /// as a side effect; items merely expired are left for a concurrent writer
    /// that may be refreshing them.
    fn is_expired(&self, path: &Path, header: &ItemHeader) -> bool {
        if self.settings.ttl_disabled() {
            return false;
        }
        let Some(end_of_life) = header.expiry() else {
            return false;
        };
        let now = self.clock.now();
        if end_of_life >= now {
            return false;
        }
        if self.past_grace(header, now) {
            remove_file_best_effort(path, "expired");
            tracing::debug!(
                target = "tilia.cache",
                store = %self.name,
                path = %path.display(),
                end_of_life,
                "removed expired cache item"
            );
        }
        true
    }

    /// A failed read is a miss if the file disappeared under us, fatal otherwise.
    fn read_failure(&self, path: &Path, err: StorageError) -> Result<()> {
        if err.is_not_found() || !path.exists() {
            tracing::debug!(
                target = "tilia.cache",
                store = %self.name,
                path = %path.display(),
                "cache item vanished during read"
            );
            return Ok(());
        }
        Err(CacheError::Read {
            path: path.to_path_buf(),
            source: err,
        })
    }
}

fn reconcile(options: &StoreOptions, on_disk: Option<StoreSettings>) -> StoreSettings {
    let profile = &options.profile;
    StoreSettings {
        ttl_default: options
            .ttl_default
            .or(on_disk.map(|s| s.ttl_default))
            .unwrap_or(profile.ttl_default),
        ttl_ignore: options
            .ttl_ignore
            .or(on_disk.map(|s| s.ttl_ignore))
            .unwrap_or(profile.ttl_ignore),
        file_permissions: options
            .file_permissions
            .or(on_disk.map(|s| s.file_permissions))
            .unwrap_or_default(),
    }
}
