//! File-backed key-value cache stores with per-item TTL.
//!
//! A store is a named namespace whose items live as one file per key. Writes
//! are staged in a temp directory and renamed into place, so any number of
//! processes can share a store without locks. Expiry is recorded in each
//! item's header (see `tilia-storage`).
//!
//! ## On-disk layout
//!
//! Relative to a store's resolved base path:
//! - `stores/<store>/<key>`: live items
//! - `tmp/`: staging area for atomic writes and backups (shared by all stores)
//! - `candidates/<store>/<key>`: replacement store under construction
//! - `backup/<store>/<backup>/<key>`: named full copies
//! - `<store>.toml`: [`StoreSettings`] (`ttlDefault`, `ttlIgnore`,
//!   `filePermissions`)
//!
//! ## Expiry
//!
//! An item past its expiry is reported as missing. It is only unlinked once a
//! grace period has also passed (half the store's default TTL, or
//! [`FALLBACK_GRACE_SECS`]), leaving a window for a concurrent writer to
//! refresh it.

mod backup;
mod clock;
mod error;
mod key;
mod options;
mod paths;
mod permissions;
mod registry;
mod settings;
mod store;
mod util;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CacheError;
pub use key::{is_valid_key, is_valid_store_name, KeyLength, MAX_NAME_LEN, MIN_KEY_LEN};
pub use options::{StoreOptions, StoreProfile};
pub use paths::{CacheConfig, PathResolver, StoreLayout, SETTINGS_EXTENSION};
pub use permissions::FilePermissions;
pub use registry::{list_instances, StoreRegistry};
pub use settings::StoreSettings;
pub use store::{FileCacheStore, FALLBACK_GRACE_SECS};
pub use util::BINCODE_PAYLOAD_LIMIT_BYTES;

pub type Result<T> = std::result::Result<T, CacheError>;
