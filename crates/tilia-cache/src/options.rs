use std::path::PathBuf;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::key::KeyLength;
use crate::permissions::FilePermissions;

/// Built-in defaults for a family of stores, used when neither an explicit
/// option nor a persisted setting provides a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreProfile {
    pub ttl_default: u64,
    pub ttl_ignore: bool,
    pub key_length: KeyLength,
}

impl StoreProfile {
    /// Per-item TTLs, items without one never expire.
    pub const fn variable_ttl() -> Self {
        Self {
            ttl_default: 0,
            ttl_ignore: false,
            key_length: KeyLength::Standard,
        }
    }

    /// Every item lives exactly `ttl` seconds regardless of the per-item TTL.
    pub const fn fixed_ttl(ttl: u64) -> Self {
        Self {
            ttl_default: ttl,
            ttl_ignore: true,
            key_length: KeyLength::Standard,
        }
    }

    /// No expiry at all.
    pub const fn persistent() -> Self {
        Self {
            ttl_default: 0,
            ttl_ignore: true,
            key_length: KeyLength::Standard,
        }
    }

    pub const fn long_keys(mut self) -> Self {
        self.key_length = KeyLength::Long;
        self
    }
}

impl Default for StoreProfile {
    fn default() -> Self {
        Self::variable_ttl()
    }
}

/// Options for [`crate::FileCacheStore::open`].
///
/// `ttl_default`, `ttl_ignore` and `file_permissions` are explicit overrides:
/// when set they win over the persisted settings, which in turn win over the
/// profile.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Base directory; relative paths resolve against the document root.
    pub base_path: PathBuf,
    pub profile: StoreProfile,
    pub ttl_default: Option<u64>,
    pub ttl_ignore: Option<bool>,
    pub file_permissions: Option<FilePermissions>,
    pub clock: Arc<dyn Clock>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            base_path: PathBuf::new(),
            profile: StoreProfile::default(),
            ttl_default: None,
            ttl_ignore: None,
            file_permissions: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl StoreOptions {
    pub fn with_profile(profile: StoreProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub fn base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn ttl_default(mut self, secs: u64) -> Self {
        self.ttl_default = Some(secs);
        self
    }

    pub fn ttl_ignore(mut self, ignore: bool) -> Self {
        self.ttl_ignore = Some(ignore);
        self
    }

    pub fn file_permissions(mut self, permissions: FilePermissions) -> Self {
        self.file_permissions = Some(permissions);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}
