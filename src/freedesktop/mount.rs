//! Enumerates currently mounted filesystems and maps a path to its
//! "topdir" — the deepest mountpoint prefix of that path.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Error, Result};

static LAST_MOUNT_COUNT: AtomicUsize = AtomicUsize::new(32);

const SKIPPED_DEVICES: &[&str] = &["rootfs", "sysfs", "cgroup", "cgroup2"];

/// Reads `/proc/mounts`, skipping pseudo-filesystems and `/dev`/`/sys`
/// mountpoints, returning every remaining mountpoint path.
#[cfg(target_os = "linux")]
pub fn mounts() -> Result<Vec<PathBuf>> {
    let file = File::open("/proc/mounts").map_err(|e| Error::io(PathBuf::from("/proc/mounts"), e))?;
    let hint = LAST_MOUNT_COUNT.load(Ordering::Relaxed);
    let mut out = Vec::with_capacity(hint);
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::io(PathBuf::from("/proc/mounts"), e))?;
        let mut fields = line.split_whitespace();
        let device = match fields.next() {
            Some(d) => d,
            None => continue,
        };
        let mount_path = match fields.next() {
            Some(p) => p,
            None => continue,
        };
        if SKIPPED_DEVICES.contains(&device) {
            continue;
        }
        if mount_path.starts_with("/dev/") || mount_path.starts_with("/sys/") {
            continue;
        }
        out.push(PathBuf::from(mount_path));
    }
    LAST_MOUNT_COUNT.store(out.len().max(1), Ordering::Relaxed);
    Ok(out)
}

/// BSD targets have no `/proc/mounts`; this degrades to reporting only
/// the root filesystem, which keeps topdir resolution total. A fuller
/// enumeration via `getmntinfo` is tracked as an open question (see
/// DESIGN.md) rather than guessed at here.
#[cfg(not(target_os = "linux"))]
pub fn mounts() -> Result<Vec<PathBuf>> {
    Ok(vec![PathBuf::from("/")])
}

/// Returns the longest element of `mounts` that is a path-prefix of
/// `path`, or `None` if `mounts` is empty or nothing matches.
pub fn topdir(mounts: &[PathBuf], path: &Path) -> Option<PathBuf> {
    mounts
        .iter()
        .filter(|m| path.starts_with(m.as_path()))
        .max_by_key(|m| m.as_os_str().len())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topdir_picks_longest_prefix() {
        let mounts = vec![PathBuf::from("/"), PathBuf::from("/home"), PathBuf::from("/home/user/data")];
        assert_eq!(topdir(&mounts, Path::new("/home/user/data/x.txt")), Some(PathBuf::from("/home/user/data")));
        assert_eq!(topdir(&mounts, Path::new("/home/user/docs/x.txt")), Some(PathBuf::from("/home")));
        assert_eq!(topdir(&mounts, Path::new("/etc/x.txt")), Some(PathBuf::from("/")));
    }

    #[test]
    fn topdir_empty_mounts_is_none() {
        assert_eq!(topdir(&[], Path::new("/a/b")), None);
    }
}
