//! Decides which trash directory governs a given source path, and caches
//! the home trash location across calls for the lifetime of the process.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use super::mount;
use crate::{Error, Result};

const STICKY_BIT: u32 = 0o1000;

struct HomeTrashCache {
    home_trash_path: PathBuf,
    home_topdir: Option<PathBuf>,
}

static HOME_CACHE: OnceCell<HomeTrashCache> = OnceCell::new();

fn data_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME")
        .map_err(|_| Error::io(None, std::io::Error::new(std::io::ErrorKind::NotFound, "HOME is not set")))?;
    Ok(PathBuf::from(home).join(".local").join("share"))
}

fn home_cache() -> Result<&'static HomeTrashCache> {
    HOME_CACHE.get_or_try_init(|| -> Result<HomeTrashCache> {
        let home_trash_path = data_home()?.join("Trash");
        let mounts = mount::mounts()?;
        let home_topdir = mount::topdir(&mounts, &home_trash_path);
        Ok(HomeTrashCache { home_trash_path, home_topdir })
    })
}

/// Where a source path's trash lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrashLocation {
    HomeTrash { base: PathBuf },
    TopDirShared { base: PathBuf },
    TopDirPrivate { base: PathBuf },
}

impl TrashLocation {
    pub fn files_dir(&self) -> PathBuf {
        self.base().join("files")
    }

    pub fn info_dir(&self) -> PathBuf {
        self.base().join("info")
    }

    fn base(&self) -> &Path {
        match self {
            TrashLocation::HomeTrash { base } => base,
            TrashLocation::TopDirShared { base } => base,
            TrashLocation::TopDirPrivate { base } => base,
        }
    }
}

fn current_uid() -> u32 {
    unsafe { libc::getuid() }
}

fn is_eligible_shared_trash(path: &Path) -> bool {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(_) => return false,
    };
    if metadata.file_type().is_symlink() {
        return false;
    }
    if !metadata.is_dir() {
        return false;
    }
    metadata.permissions().mode() & STICKY_BIT != 0
}

/// Result of routing a source path to a trash: the location to use, and
/// the path string that should be written to its info record's `Path=`
/// field (already relative to the correct base when applicable).
pub struct Routed {
    pub location: TrashLocation,
    pub path_for_record: PathBuf,
}

/// Implements the routing algorithm from the FreeDesktop component
/// design: home trash for sources that share the home trash's topdir,
/// otherwise a shared or private top-directory trash on the source's own
/// volume.
pub fn route(abs_src: &Path) -> Result<Routed> {
    let cache = home_cache()?;
    let mounts = mount::mounts()?;
    let src_topdir = mount::topdir(&mounts, abs_src);

    if let Some(src_topdir) = &src_topdir {
        if Some(src_topdir) != cache.home_topdir.as_ref() {
            let uid = current_uid();
            let shared = src_topdir.join(".Trash");
            let rel = abs_src
                .strip_prefix(src_topdir)
                .map(PathBuf::from)
                .unwrap_or_else(|_| abs_src.to_path_buf());

            if is_eligible_shared_trash(&shared) {
                return Ok(Routed {
                    location: TrashLocation::TopDirShared { base: shared.join(uid.to_string()) },
                    path_for_record: rel,
                });
            }
            let private = src_topdir.join(format!(".Trash-{}", uid));
            return Ok(Routed { location: TrashLocation::TopDirPrivate { base: private }, path_for_record: rel });
        }
    }

    let home_parent = cache.home_trash_path.parent().map(Path::to_path_buf);
    let path_for_record = match &home_parent {
        Some(parent) if abs_src.starts_with(parent) => {
            abs_src.strip_prefix(parent).map(PathBuf::from).unwrap_or_else(|_| abs_src.to_path_buf())
        }
        _ => abs_src.to_path_buf(),
    };
    Ok(Routed { location: TrashLocation::HomeTrash { base: cache.home_trash_path.clone() }, path_for_record })
}

/// The home trash location, for callers (EMPTY, QUERY) that need it
/// without routing a specific source path.
pub fn home_trash() -> Result<PathBuf> {
    Ok(home_cache()?.home_trash_path.clone())
}

pub fn ensure_structure(location: &TrashLocation) -> Result<()> {
    for dir in [location.files_dir(), location.info_dir()] {
        create_dir_with_mode(&dir, 0o700)?;
    }
    Ok(())
}

/// Creates `dir` and every missing ancestor under it with `mode`,
/// mirroring `os.MkdirAll`'s behavior of applying the same permission
/// bits to each component it creates rather than leaving intermediate
/// directories at the process umask.
fn create_dir_with_mode(dir: &Path, mode: u32) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    if let Some(parent) = dir.parent() {
        create_dir_with_mode(parent, mode)?;
    }
    match std::fs::create_dir(dir) {
        Ok(()) => {
            let mut perms = std::fs::metadata(dir).map_err(|e| Error::io(dir.to_path_buf(), e))?.permissions();
            perms.set_mode(mode);
            std::fs::set_permissions(dir, perms).map_err(|e| Error::io(dir.to_path_buf(), e))?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(Error::io(dir.to_path_buf(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligible_shared_trash_requires_sticky_bit() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join(".Trash");
        std::fs::create_dir(&shared).unwrap();
        // No sticky bit set yet.
        assert!(!is_eligible_shared_trash(&shared));

        let mut perms = std::fs::metadata(&shared).unwrap().permissions();
        perms.set_mode(0o1777);
        std::fs::set_permissions(&shared, perms).unwrap();
        assert!(is_eligible_shared_trash(&shared));
    }

    #[test]
    fn eligible_shared_trash_rejects_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let mut perms = std::fs::metadata(&real).unwrap().permissions();
        perms.set_mode(0o1777);
        std::fs::set_permissions(&real, perms).unwrap();

        let link = dir.path().join(".Trash");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert!(!is_eligible_shared_trash(&link));
    }

    #[test]
    fn ensure_structure_creates_mode_0700_dirs_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join(".Trash-1000");
        let location = TrashLocation::TopDirPrivate { base: base.clone() };

        ensure_structure(&location).unwrap();
        for sub in [location.files_dir(), location.info_dir()] {
            let mode = std::fs::metadata(&sub).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }

        // Calling again must not fail even though everything exists.
        ensure_structure(&location).unwrap();
    }
}
