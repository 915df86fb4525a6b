use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::header::ItemHeader;
use crate::StorageError;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Atomically replace `dest` with an item file holding `payload`.
///
/// The file is staged in `tmp_dir`, which must live on the same filesystem as
/// `dest`. `file_mode` is applied after the rename (unix only): temp files are
/// created with the process umask and need correcting.
pub fn write_item_atomic(
    tmp_dir: &Path,
    dest: &Path,
    expires_at: i64,
    payload: &[u8],
    file_mode: Option<u32>,
) -> Result<(), StorageError> {
    let header = ItemHeader::new(expires_at, payload)?;
    write_via_tmp(tmp_dir, dest, file_mode, |file| {
        file.write_all(&header.encode())?;
        file.write_all(payload)
    })
}

/// Atomically replace `dest` with `bytes` (no item header).
pub fn atomic_write(
    tmp_dir: &Path,
    dest: &Path,
    bytes: &[u8],
    file_mode: Option<u32>,
) -> Result<(), StorageError> {
    write_via_tmp(tmp_dir, dest, file_mode, |file| file.write_all(bytes))
}

fn write_via_tmp(
    tmp_dir: &Path,
    dest: &Path,
    file_mode: Option<u32>,
    write: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> Result<(), StorageError> {
    let (tmp_path, mut file) = open_unique_tmp_file(dest, tmp_dir)?;

    let result = (|| -> io::Result<()> {
        write(&mut file)?;
        file.sync_all()?;
        drop(file);
        rename_overwrite(&tmp_path, dest)
    })();

    if let Err(err) = result {
        if let Err(remove_err) = fs::remove_file(&tmp_path) {
            if remove_err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target = "tilia.storage",
                    path = %tmp_path.display(),
                    error = %remove_err,
                    "failed to remove temporary file after write failure"
                );
            }
        }
        return Err(err.into());
    }

    if let Some(mode) = file_mode {
        set_mode(dest, mode)?;
    }
    if let Some(parent) = dest.parent() {
        sync_dir_best_effort(parent);
    }
    Ok(())
}

fn rename_overwrite(tmp_path: &Path, dest: &Path) -> io::Result<()> {
    const MAX_RENAME_ATTEMPTS: usize = 1024;
    let mut attempts = 0usize;

    loop {
        match fs::rename(tmp_path, dest) {
            Ok(()) => return Ok(()),
            Err(err)
                if cfg!(windows)
                    && (err.kind() == io::ErrorKind::AlreadyExists || dest.exists()) =>
            {
                // Windows `rename` refuses to overwrite; concurrent writers may
                // keep recreating `dest`, so retry a bounded number of times.
                match fs::remove_file(dest) {
                    Ok(()) => {}
                    Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                    Err(remove_err) => return Err(remove_err),
                }

                attempts += 1;
                if attempts >= MAX_RENAME_ATTEMPTS {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn open_unique_tmp_file(dest: &Path, tmp_dir: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = tmp_dir.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

fn sync_dir_best_effort(dir: &Path) {
    #[cfg(unix)]
    match fs::File::open(dir).and_then(|dir| dir.sync_all()) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::debug!(
                target = "tilia.storage",
                dir = %dir.display(),
                error = %err,
                "failed to sync directory (best effort)"
            );
        }
    }

    #[cfg(not(unix))]
    let _ = dir;
}
