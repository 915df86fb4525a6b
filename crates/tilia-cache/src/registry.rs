use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use crate::key::is_valid_store_name;
use crate::options::{StoreOptions, StoreProfile};
use crate::paths::{PathResolver, SETTINGS_EXTENSION};
use crate::store::FileCacheStore;
use crate::Result;

/// Open every store persisted under `base_path`, sorted by name.
///
/// Stores are discovered through their settings files and reopened with the
/// persisted settings. They use the long-key profile so that every persisted
/// key is addressable regardless of how the store was originally opened.
pub fn list_instances(resolver: &PathResolver, base_path: &Path) -> Result<Vec<FileCacheStore>> {
    list_instances_with_clock(resolver, base_path, Arc::new(SystemClock))
}

fn list_instances_with_clock(
    resolver: &PathResolver,
    base_path: &Path,
    clock: Arc<dyn Clock>,
) -> Result<Vec<FileCacheStore>> {
    let base = resolver.resolve(base_path);
    let entries = match std::fs::read_dir(&base) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(CacheError::io(base, err)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(
                    target = "tilia.cache",
                    base = %base.display(),
                    error = %err,
                    "failed to read directory entry while listing stores"
                );
                continue;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(SETTINGS_EXTENSION) {
            continue;
        }
        if !entry.file_type().map(|ty| ty.is_file()).unwrap_or(false) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if is_valid_store_name(name) {
            names.push(name.to_string());
        }
    }
    names.sort();

    names
        .iter()
        .map(|name| {
            let options = StoreOptions {
                base_path: base.clone(),
                profile: StoreProfile::default().long_keys(),
                clock: clock.clone(),
                ..StoreOptions::default()
            };
            FileCacheStore::open(resolver, name, options)
        })
        .collect()
}

/// Opens stores below one base path with a shared [`PathResolver`].
#[derive(Clone, Debug)]
pub struct StoreRegistry {
    resolver: PathResolver,
    base_path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl StoreRegistry {
    pub fn new(resolver: PathResolver, base_path: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            base_path: base_path.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Open `name` below this registry's base path; `options.base_path` and
    /// `options.clock` are replaced by the registry's.
    pub fn open(&self, name: &str, options: StoreOptions) -> Result<FileCacheStore> {
        let options = StoreOptions {
            base_path: self.base_path.clone(),
            clock: self.clock.clone(),
            ..options
        };
        FileCacheStore::open(&self.resolver, name, options)
    }

    pub fn list(&self) -> Result<Vec<FileCacheStore>> {
        list_instances_with_clock(&self.resolver, &self.base_path, self.clock.clone())
    }
}
