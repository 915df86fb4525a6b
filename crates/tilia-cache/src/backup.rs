//! Whole-store backup, restore and candidate promotion.
//!
//! None of these operations are transactional across their individual
//! directory steps. A crash in between can leave, e.g., a backup without a live
//! directory; recovering from that is left to the operator.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CacheError;
use crate::key::{is_valid_key, KeyLength};
use crate::permissions::{apply_mode, FilePermissions};
use crate::store::FileCacheStore;
use crate::util::{dir_has_files, list_dirs, list_files, remove_dir_all_nofollow};
use crate::Result;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

impl FileCacheStore {
    /// Copy every live item into `backup/<store>/<backup>/`.
    ///
    /// Items are copied into a staging directory first and renamed into place,
    /// so a failed backup never appears under its final name. Returns the
    /// number of items copied.
    pub fn backup(&self, backup: &str) -> Result<usize> {
        self.check_backup_name(backup)?;
        let dest = self.layout.backup_dir(backup);
        if dest.exists() {
            return Err(self.backup_exists(backup));
        }

        let permissions = self.settings.file_permissions;
        let tmp_dir = self.layout.tmp_dir();
        self.resolver.ensure_dir(&tmp_dir, permissions)?;
        let staging = unique_staging_dir(&tmp_dir, &self.name, backup);
        fs::create_dir(&staging).map_err(|source| CacheError::Path {
            path: staging.clone(),
            source,
        })?;

        let copied = copy_items(&self.layout.live_dir(), &staging, permissions).and_then(|n| {
            apply_mode(&staging, permissions.dir_mode())
                .map_err(|err| CacheError::io(&staging, err))?;
            Ok(n)
        });
        let copied = match copied {
            Ok(n) => n,
            Err(err) => {
                discard_staging(&staging);
                return Err(err);
            }
        };

        let backup_root = self.layout.backup_root();
        let moved = self
            .resolver
            .ensure_dir(&backup_root, permissions)
            .and_then(|()| {
                if dest.exists() {
                    return Err(self.backup_exists(backup));
                }
                fs::rename(&staging, &dest).map_err(|err| CacheError::io(&dest, err))
            });
        if let Err(err) = moved {
            discard_staging(&staging);
            return Err(err);
        }

        tracing::info!(
            target = "tilia.cache",
            store = %self.name,
            backup,
            items = copied,
            "created store backup"
        );
        Ok(copied)
    }

    /// Replace the live store with the named backup.
    ///
    /// The backup directory is moved, not copied: afterwards it no longer
    /// exists under its backup name.
    pub fn restore(&self, backup: &str) -> Result<()> {
        self.check_backup_name(backup)?;
        let src = self.layout.backup_dir(backup);
        if !src.is_dir() {
            return Err(CacheError::NotFound {
                store: self.name.clone(),
                backup: backup.to_string(),
            });
        }

        self.clear()?;
        let live = self.layout.live_dir();
        match fs::remove_dir(&live) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(CacheError::io(live, err)),
        }
        self.resolver.forget(&live);

        fs::rename(&src, &live).map_err(|err| CacheError::io(&live, err))?;
        self.resolver.forget(&src);

        tracing::info!(
            target = "tilia.cache",
            store = %self.name,
            backup,
            "restored store from backup"
        );
        Ok(())
    }

    /// Backup names of this store, ascending.
    pub fn list_backups(&self) -> Result<Vec<String>> {
        self.check_active()?;
        let root = self.layout.backup_root();
        list_dirs(&root).map_err(|err| CacheError::io(root, err))
    }

    pub fn delete_backup(&self, backup: &str) -> Result<()> {
        self.check_backup_name(backup)?;
        let dir = self.layout.backup_dir(backup);
        if !dir.is_dir() {
            return Err(CacheError::NotFound {
                store: self.name.clone(),
                backup: backup.to_string(),
            });
        }
        remove_dir_all_nofollow(&dir).map_err(|err| CacheError::io(&dir, err))?;
        self.resolver.forget(&dir);
        Ok(())
    }

    /// A backup name derived from the store clock, e.g. `backup-1760870400`.
    pub fn default_backup_name(&self) -> String {
        format!("backup-{}", self.clock.now())
    }

    /// Route subsequent writes into `candidates/<store>/`.
    ///
    /// Reads keep using the live directory until the candidate is promoted.
    /// An existing candidate directory is reused as-is.
    pub fn set_candidate(&mut self) -> Result<()> {
        self.check_active()?;
        self.resolver
            .ensure_dir(&self.layout.candidate_dir(), self.settings.file_permissions)?;
        self.candidate = true;
        Ok(())
    }

    /// Throw away the candidate directory and write to the live store again.
    pub fn discard_candidate(&mut self) -> Result<()> {
        self.check_active()?;
        let dir = self.layout.candidate_dir();
        remove_dir_all_nofollow(&dir).map_err(|err| CacheError::io(&dir, err))?;
        self.resolver.forget(&dir);
        self.candidate = false;
        Ok(())
    }

    /// Swap the candidate in: live → `backup/<store>/<backup>`, then
    /// candidate → live.
    ///
    /// Returns `Ok(false)` if there is no candidate directory. An empty
    /// candidate is refused. If the second rename fails the store is left
    /// without a live directory; the previous contents are in the backup.
    pub fn promote_candidate(&mut self, backup: &str) -> Result<bool> {
        self.check_backup_name(backup)?;
        let candidate = self.layout.candidate_dir();
        if !candidate.is_dir() {
            return Ok(false);
        }
        let has_items =
            dir_has_files(&candidate).map_err(|err| CacheError::io(&candidate, err))?;
        if !has_items {
            return Err(CacheError::EmptyCandidate {
                store: self.name.clone(),
            });
        }

        let dest = self.layout.backup_dir(backup);
        if dest.exists() {
            return Err(self.backup_exists(backup));
        }
        self.resolver
            .ensure_dir(&self.layout.backup_root(), self.settings.file_permissions)?;

        let live = self.layout.live_dir();
        if live.exists() {
            fs::rename(&live, &dest).map_err(|source| CacheError::Promote {
                store: self.name.clone(),
                step: "moving the live store to backup",
                source,
            })?;
            self.resolver.forget(&live);
        }

        fs::rename(&candidate, &live).map_err(|source| CacheError::Promote {
            store: self.name.clone(),
            step: "moving the candidate into place",
            source,
        })?;
        self.resolver.forget(&candidate);
        self.candidate = false;

        tracing::info!(
            target = "tilia.cache",
            store = %self.name,
            backup,
            "promoted candidate store"
        );
        Ok(true)
    }

    fn check_backup_name(&self, backup: &str) -> Result<()> {
        if !is_valid_key(backup, KeyLength::Standard) {
            return Err(CacheError::InvalidName {
                name: backup.to_string(),
            });
        }
        self.check_active()
    }

    fn backup_exists(&self, backup: &str) -> CacheError {
        CacheError::AlreadyExists {
            store: self.name.clone(),
            backup: backup.to_string(),
        }
    }
}

/// Copy item files from `from` into `to`, keeping modified times.
fn copy_items(from: &Path, to: &Path, permissions: FilePermissions) -> Result<usize> {
    let files = list_files(from).map_err(|err| CacheError::io(from, err))?;
    let mut copied = 0;
    for (name, src) in files {
        let dst = to.join(&name);
        let copy_err = |source: io::Error| CacheError::Copy {
            from: src.clone(),
            to: dst.clone(),
            source,
        };

        let modified = match fs::symlink_metadata(&src).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(copy_err(err)),
        };
        match fs::copy(&src, &dst) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound && !src.exists() => continue,
            Err(err) => return Err(copy_err(err)),
        }
        apply_mode(&dst, permissions.file_mode()).map_err(copy_err)?;
        fs::File::options()
            .write(true)
            .open(&dst)
            .and_then(|file| file.set_modified(modified))
            .map_err(copy_err)?;
        copied += 1;
    }
    Ok(copied)
}

fn unique_staging_dir(tmp_dir: &Path, store: &str, backup: &str) -> PathBuf {
    let pid = std::process::id();
    let counter = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    tmp_dir.join(format!("backup-{store}-{backup}.{pid}.{counter}"))
}

fn discard_staging(staging: &Path) {
    if let Err(err) = remove_dir_all_nofollow(staging) {
        tracing::debug!(
            target = "tilia.cache",
            path = %staging.display(),
            error = %err,
            "failed to remove backup staging directory"
        );
    }
}
