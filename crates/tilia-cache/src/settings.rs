use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::permissions::FilePermissions;

/// Persisted per-store configuration, stored as `<base>/<store>.toml`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettings {
    /// Default TTL in seconds; `0` keeps items forever.
    pub ttl_default: u64,
    /// Ignore per-item TTL arguments and always use `ttl_default`.
    pub ttl_ignore: bool,
    pub file_permissions: FilePermissions,
}

impl StoreSettings {
    /// Expiry bookkeeping is skipped entirely for such stores.
    pub fn ttl_disabled(&self) -> bool {
        self.ttl_default == 0 && self.ttl_ignore
    }

    /// Returns `Ok(None)` if the settings file does not exist (a new store).
    pub fn load(path: &Path) -> Result<Option<Self>, CacheError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::io(path, err)),
        };
        let settings = toml::from_str(&text).map_err(|err| CacheError::Settings {
            path: path.to_path_buf(),
            message: err.message().to_string(),
        })?;
        Ok(Some(settings))
    }

    /// Fully replace the settings file at `path`, staging it in `tmp_dir`.
    pub fn save(&self, path: &Path, tmp_dir: &Path) -> Result<(), CacheError> {
        let text = toml::to_string(self).map_err(|err| CacheError::Settings {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        tilia_storage::atomic_write(
            tmp_dir,
            path,
            text.as_bytes(),
            Some(self.file_permissions.file_mode()),
        )
        .map_err(|source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
