use serde::{Deserialize, Serialize};

/// Directory and file modes applied to everything a store writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilePermissions {
    /// `0o700` directories, `0o600` files.
    #[default]
    OwnerOnly,
    /// `0o770` directories, `0o660` files.
    GroupReadWrite,
    /// Like [`FilePermissions::GroupReadWrite`] with the setgid bit on
    /// directories so new entries inherit the group.
    GroupSetgid,
}

impl FilePermissions {
    pub const fn dir_mode(self) -> u32 {
        match self {
            FilePermissions::OwnerOnly => 0o700,
            FilePermissions::GroupReadWrite => 0o770,
            FilePermissions::GroupSetgid => 0o2770,
        }
    }

    pub const fn file_mode(self) -> u32 {
        match self {
            FilePermissions::OwnerOnly => 0o600,
            FilePermissions::GroupReadWrite | FilePermissions::GroupSetgid => 0o660,
        }
    }
}

#[cfg(unix)]
pub(crate) fn apply_mode(path: &std::path::Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let current = std::fs::metadata(path)?.permissions().mode() & 0o7777;
    if current == mode {
        return Ok(());
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn apply_mode(_path: &std::path::Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes() {
        assert_eq!(FilePermissions::default(), FilePermissions::OwnerOnly);
        assert_eq!(FilePermissions::GroupSetgid.dir_mode(), 0o2770);
        assert_eq!(FilePermissions::GroupSetgid.file_mode(), 0o660);
        assert_eq!(FilePermissions::OwnerOnly.file_mode(), 0o600);
    }
}
