use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::CacheError;
use crate::permissions::{apply_mode, FilePermissions};

pub const SETTINGS_EXTENSION: &str = "toml";

const STORES_DIR: &str = "stores";
const TMP_DIR: &str = "tmp";
const CANDIDATES_DIR: &str = "candidates";
const BACKUP_DIR: &str = "backup";

/// Upper bound on remembered directories before the set is reset.
const MAX_ENSURED_PATHS: usize = 1024;

/// Configuration for selecting the document root that relative store base
/// paths are resolved against.
#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
    pub root_override: Option<PathBuf>,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            root_override: std::env::var_os("TILIA_CACHE_DIR").map(PathBuf::from),
        }
    }

    pub fn document_root(&self) -> Result<PathBuf, CacheError> {
        match &self.root_override {
            Some(root) => Ok(root.clone()),
            None => default_document_root(),
        }
    }
}

fn default_document_root() -> Result<PathBuf, CacheError> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or(CacheError::MissingHomeDir)?;

    Ok(home.join(".tilia").join("cache"))
}

/// Resolves configured base paths and creates directories on demand.
///
/// Clones share the set of directories already ensured in this process, so
/// repeated opens of the same store skip redundant filesystem work.
#[derive(Clone, Debug)]
pub struct PathResolver {
    document_root: PathBuf,
    ensured: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathResolver {
    pub fn new(document_root: impl Into<PathBuf>) -> Self {
        Self {
            document_root: document_root.into(),
            ensured: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Ok(Self::new(config.document_root()?))
    }

    pub fn document_root(&self) -> &Path {
        &self.document_root
    }

    /// Absolute paths are returned unchanged; relative ones are joined onto the
    /// document root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.document_root.join(path)
        }
    }

    /// Make sure `path` exists as a writable directory.
    ///
    /// Directories created here get `permissions.dir_mode()`; pre-existing
    /// directories keep their mode.
    pub fn ensure_dir(&self, path: &Path, permissions: FilePermissions) -> Result<(), CacheError> {
        if self.ensured.lock().contains(path) {
            return Ok(());
        }

        let existed = path.is_dir();
        if !existed {
            std::fs::create_dir_all(path).map_err(|source| CacheError::Path {
                path: path.to_path_buf(),
                source,
            })?;
            apply_mode(path, permissions.dir_mode()).map_err(|source| CacheError::Path {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let meta = std::fs::metadata(path).map_err(|source| CacheError::Path {
            path: path.to_path_buf(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(CacheError::Configuration(format!(
                "{} exists but is not a directory",
                path.display()
            )));
        }
        // Mode bits alone miss directories owned by someone else. The probe
        // name is never a valid key, so listings skip it.
        if existed {
            tempfile::Builder::new()
                .prefix("~tilia-probe")
                .tempfile_in(path)
                .map_err(|source| CacheError::Path {
                    path: path.to_path_buf(),
                    source,
                })?;
        }

        let mut ensured = self.ensured.lock();
        if ensured.len() >= MAX_ENSURED_PATHS {
            ensured.clear();
        }
        ensured.insert(path.to_path_buf());
        Ok(())
    }

    /// Drop `path` (and anything below it) from the ensured set after the
    /// directory was removed or renamed away.
    pub fn forget(&self, path: &Path) {
        self.ensured.lock().retain(|p| !p.starts_with(path));
    }

    pub fn reset(&self) {
        self.ensured.lock().clear();
    }
}

/// The on-disk layout of a single store below its resolved base path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreLayout {
    base: PathBuf,
    name: String,
}

impl StoreLayout {
    pub fn new(base: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            name: name.into(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn live_dir(&self) -> PathBuf {
        self.base.join(STORES_DIR).join(&self.name)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.base.join(TMP_DIR)
    }

    pub fn candidate_dir(&self) -> PathBuf {
        self.base.join(CANDIDATES_DIR).join(&self.name)
    }

    pub fn backup_root(&self) -> PathBuf {
        self.base.join(BACKUP_DIR).join(&self.name)
    }

    pub fn backup_dir(&self, backup: &str) -> PathBuf {
        self.backup_root().join(backup)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.base
            .join(format!("{}.{SETTINGS_EXTENSION}", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_relative_and_absolute() {
        let resolver = PathResolver::new("/srv/root");
        assert_eq!(
            resolver.resolve(Path::new("data")),
            PathBuf::from("/srv/root/data")
        );
        assert_eq!(
            resolver.resolve(Path::new("/var/cache")),
            PathBuf::from("/var/cache")
        );
        assert_eq!(resolver.resolve(Path::new("")), PathBuf::from("/srv/root"));
    }

    #[test]
    fn ensure_dir_is_remembered_until_forgotten() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());
        let dir = tmp.path().join("a/b/c");

        resolver.ensure_dir(&dir, FilePermissions::OwnerOnly).unwrap();
        assert!(dir.is_dir());

        // Remembered: removing the directory behind the resolver's back is not
        // noticed until it is forgotten.
        std::fs::remove_dir(&dir).unwrap();
        resolver.ensure_dir(&dir, FilePermissions::OwnerOnly).unwrap();
        assert!(!dir.exists());

        resolver.forget(&tmp.path().join("a"));
        resolver.ensure_dir(&dir, FilePermissions::OwnerOnly).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn ensure_dir_rejects_files() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());
        let file = tmp.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        let err = resolver
            .ensure_dir(&file, FilePermissions::OwnerOnly)
            .unwrap_err();
        assert!(matches!(err, CacheError::Path { .. } | CacheError::Configuration(_)));
    }

    #[cfg(unix)]
    #[test]
    fn ensure_dir_rejects_unwritable_existing_dir() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());
        let dir = tmp.path().join("locked");
        std::fs::create_dir(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o555)).unwrap();

        // Root ignores mode bits; nothing to check there.
        let privileged = std::fs::write(dir.join("canary"), b"").is_ok();
        if !privileged {
            let err = resolver
                .ensure_dir(&dir, FilePermissions::OwnerOnly)
                .unwrap_err();
            assert!(matches!(err, CacheError::Path { .. }), "{err:?}");
        }
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), usize::from(privileged));

        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();
        resolver.ensure_dir(&dir, FilePermissions::OwnerOnly).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn created_dirs_get_profile_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());
        let dir = tmp.path().join("shared");
        resolver
            .ensure_dir(&dir, FilePermissions::GroupReadWrite)
            .unwrap();
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o770);
    }

    #[test]
    fn layout() {
        let layout = StoreLayout::new("/base", "sessions");
        assert_eq!(layout.live_dir(), PathBuf::from("/base/stores/sessions"));
        assert_eq!(layout.tmp_dir(), PathBuf::from("/base/tmp"));
        assert_eq!(
            layout.candidate_dir(),
            PathBuf::from("/base/candidates/sessions")
        );
        assert_eq!(
            layout.backup_dir("nightly"),
            PathBuf::from("/base/backup/sessions/nightly")
        );
        assert_eq!(layout.settings_path(), PathBuf::from("/base/sessions.toml"));
    }
}
