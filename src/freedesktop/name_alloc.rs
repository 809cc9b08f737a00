//! Picks a collision-free basename for an incoming file inside a trash's
//! `files/` directory, committing to it by exclusively creating the
//! matching `info/<name>.trashinfo` file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::Error;

pub struct Allocation {
    pub content_path: PathBuf,
    pub info_path: PathBuf,
    pub info_file: File,
}

/// Splits `name` at its last `.`. A dotfile like `.bashrc` has its only
/// dot at position 0, so it splits as stem `""`, ext `"bashrc"` —
/// producing collision names like `.1.bashrc`, not `.bashrc.1`.
fn split_stem_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) => (&name[..idx], &name[idx + 1..]),
        None => (name, ""),
    }
}

fn candidate_name(stem: &str, ext: &str, i: u64) -> String {
    if ext.is_empty() {
        format!("{}.{}", stem, i)
    } else {
        format!("{}.{}.{}", stem, i, ext)
    }
}

fn try_name(files_dir: &Path, info_dir: &Path, name: &str) -> Result<Option<Allocation>, Error> {
    let content_path = files_dir.join(name);
    if content_path.exists() {
        return Ok(None);
    }
    let info_path = info_dir.join(format!("{}.trashinfo", name));
    match OpenOptions::new().write(true).create_new(true).open(&info_path) {
        Ok(info_file) => Ok(Some(Allocation { content_path, info_path, info_file })),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(Error::io(info_path, e)),
    }
}

/// Finds a free name in `files_dir`/`info_dir` for `basename`, starting
/// with `basename` itself and then `stem.1.ext`, `stem.2.ext`, … The
/// returned `info_file` handle is the exclusive-create proof that this
/// allocation is uncontested; callers must unlink `info_path` if they
/// abandon the allocation before writing the record.
pub fn allocate(files_dir: &Path, info_dir: &Path, basename: &str) -> Result<Allocation, Error> {
    if let Some(alloc) = try_name(files_dir, info_dir, basename)? {
        return Ok(alloc);
    }
    let (stem, ext) = split_stem_ext(basename);
    let mut i: u64 = 1;
    loop {
        let candidate = candidate_name(stem, ext, i);
        if let Some(alloc) = try_name(files_dir, info_dir, &candidate)? {
            return Ok(alloc);
        }
        i = i.checked_add(1).ok_or_else(|| {
            Error::io(
                info_dir.to_path_buf(),
                std::io::Error::new(std::io::ErrorKind::Other, "name allocator exhausted u64 counter"),
            )
        })?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_stem_and_extension() {
        assert_eq!(split_stem_ext("x.log"), ("x", "log"));
        assert_eq!(split_stem_ext("x"), ("x", ""));
        assert_eq!(split_stem_ext(".hidden"), ("", "hidden"));
    }

    #[test]
    fn collision_name_for_dotfile_keeps_leading_dot() {
        assert_eq!(candidate_name("", "bashrc", 1), ".1.bashrc");
    }

    #[test]
    fn allocates_plain_name_when_free() {
        let dir = tempfile::tempdir().unwrap();
        let files = dir.path().join("files");
        let info = dir.path().join("info");
        std::fs::create_dir_all(&files).unwrap();
        std::fs::create_dir_all(&info).unwrap();

        let alloc = allocate(&files, &info, "x.log").unwrap();
        assert_eq!(alloc.content_path, files.join("x.log"));
        assert_eq!(alloc.info_path, info.join("x.log.trashinfo"));
    }

    #[test]
    fn falls_back_to_counter_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let files = dir.path().join("files");
        let info = dir.path().join("info");
        std::fs::create_dir_all(&files).unwrap();
        std::fs::create_dir_all(&info).unwrap();
        std::fs::write(files.join("x.log"), b"old").unwrap();

        let alloc = allocate(&files, &info, "x.log").unwrap();
        assert_eq!(alloc.content_path, files.join("x.1.log"));
        assert_eq!(alloc.info_path, info.join("x.1.log.trashinfo"));
    }

    #[test]
    fn dotfile_collision_keeps_leading_dot() {
        let dir = tempfile::tempdir().unwrap();
        let files = dir.path().join("files");
        let info = dir.path().join("info");
        std::fs::create_dir_all(&files).unwrap();
        std::fs::create_dir_all(&info).unwrap();
        std::fs::write(files.join(".bashrc"), b"old").unwrap();

        let alloc = allocate(&files, &info, ".bashrc").unwrap();
        assert_eq!(alloc.content_path, files.join(".1.bashrc"));
        assert_eq!(alloc.info_path, info.join(".1.bashrc.trashinfo"));
    }
}
