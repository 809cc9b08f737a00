//! FreeDesktop trash backend: implements the on-disk `.trashinfo` format,
//! mount-aware routing between the home trash and per-volume trashes, and
//! the name-collision policy described by the trash specification.

mod info;
mod locator;
mod mount;
mod name_alloc;

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use glob::Pattern;

use crate::{Error, MatchMode, QueryOptions, QueryResult, Result, TrashedEntry};

fn current_uid() -> u32 {
    unsafe { libc::getuid() }
}

pub fn trash(paths: &[&Path]) -> Result<()> {
    for path in paths {
        trash_one(path)?;
    }
    Ok(())
}

fn trash_one(path: &Path) -> Result<()> {
    if !path.exists() && std::fs::symlink_metadata(path).is_err() {
        // Non-existent input: a no-op, per the trash operation's contract.
        return Ok(());
    }
    let abs = absolute_path(path)?;
    let routed = locator::route(&abs)?;
    locator::ensure_structure(&routed.location)?;

    let basename = abs
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::malformed(abs.clone(), "path has no valid utf-8 file name"))?;

    let alloc = name_alloc::allocate(&routed.location.files_dir(), &routed.location.info_dir(), basename)?;

    let record = info::render(&routed.path_for_record, Local::now());
    if let Err(e) = write_and_close(alloc.info_file, &record) {
        let _ = std::fs::remove_file(&alloc.info_path);
        return Err(Error::io(alloc.info_path, e));
    }

    match std::fs::rename(&abs, &alloc.content_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let _ = std::fs::remove_file(&alloc.info_path);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&alloc.info_path);
            Err(Error::io(abs, e))
        }
    }
}

fn write_and_close(mut file: std::fs::File, contents: &str) -> std::io::Result<()> {
    file.write_all(contents.as_bytes())
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir().map_err(|e| Error::io(None, e))?;
        Ok(cwd.join(path))
    }
}

pub fn empty() -> Result<()> {
    if let Ok(home) = locator::home_trash() {
        demote_remove_all(&home)?;
    }
    let uid = current_uid();
    for mount in mount::mounts()? {
        demote_remove_all(&mount.join(".Trash").join(uid.to_string()))?;
        demote_remove_all(&mount.join(format!(".Trash-{}", uid)))?;
    }
    Ok(())
}

/// Removes a directory tree, treating "doesn't exist", "permission
/// denied", "not a directory" and "read-only filesystem" as a skip
/// rather than a failure, retrying once on "interrupted", and
/// propagating every other error as fatal.
fn demote_remove_all(path: &Path) -> Result<()> {
    loop {
        match std::fs::remove_dir_all(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound
                        | std::io::ErrorKind::PermissionDenied
                        | std::io::ErrorKind::NotADirectory
                        | std::io::ErrorKind::ReadOnlyFilesystem
                ) =>
            {
                log::debug!("skipping trash removal at {}: {}", path.display(), e);
                return Ok(());
            }
            Err(e) => return Err(Error::io(path.to_path_buf(), e)),
        }
    }
}

enum Matcher {
    Paths,
    Globs(Vec<(String, Pattern)>),
}

fn build_matcher(options: &QueryOptions) -> Result<Matcher> {
    match options.mode {
        MatchMode::Paths => Ok(Matcher::Paths),
        MatchMode::Globs => {
            let mut compiled = Vec::with_capacity(options.search.len());
            for key in &options.search {
                let pattern = Pattern::new(key)
                    .map_err(|e| Error::invalid_options(format!("invalid glob {:?}: {}", key, e)))?;
                compiled.push((key.clone(), pattern));
            }
            Ok(Matcher::Globs(compiled))
        }
    }
}

/// For `Paths` mode: which of the caller's search keys (if any) this
/// absolute original path satisfies, checked both as an absolute match
/// and relative to `base_dir`.
fn matching_path_keys(options: &QueryOptions, absolute_original: &Path, base_dir: &Path) -> Vec<String> {
    let relative = absolute_original.strip_prefix(base_dir).ok();
    options
        .search
        .iter()
        .filter(|key| {
            let key_path = Path::new(key.as_str());
            key_path == absolute_original || relative.map_or(false, |r| r == key_path)
        })
        .cloned()
        .collect()
}

struct Candidate {
    info_dir: PathBuf,
    files_dir: PathBuf,
    base_dir: PathBuf,
}

fn candidate_trashes() -> Result<Vec<Candidate>> {
    let mut out = Vec::new();
    if let Ok(home) = locator::home_trash() {
        let home_base = home.parent().map(Path::to_path_buf).unwrap_or_else(|| home.clone());
        out.push(Candidate { info_dir: home.join("info"), files_dir: home.join("files"), base_dir: home_base });
    }
    let uid = current_uid();
    for mount in mount::mounts()? {
        let shared = mount.join(".Trash").join(uid.to_string());
        out.push(Candidate { info_dir: shared.join("info"), files_dir: shared.join("files"), base_dir: mount.clone() });
        let private = mount.join(format!(".Trash-{}", uid));
        out.push(Candidate { info_dir: private.join("info"), files_dir: private.join("files"), base_dir: mount });
    }
    Ok(out)
}

pub fn query(options: &QueryOptions) -> Result<QueryResult> {
    let matcher = build_matcher(options)?;
    let mut result = QueryResult::default();

    for candidate in candidate_trashes()? {
        let entries = match std::fs::read_dir(&candidate.info_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                let err = Error::io(candidate.info_dir.clone(), e);
                if options.fail_fast {
                    return Err(err);
                }
                result.failures.push(err);
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let err = Error::io(candidate.info_dir.clone(), e);
                    if options.fail_fast {
                        return Err(err);
                    }
                    result.failures.push(err);
                    continue;
                }
            };
            let info_path = entry.path();
            if info_path.extension().and_then(|e| e.to_str()) != Some("trashinfo") {
                continue;
            }
            match process_record(options, &matcher, &candidate, &info_path) {
                Ok(matched) => {
                    for (key, trashed) in matched {
                        result.matches.entry(key).or_default().push(trashed);
                    }
                }
                Err(err) => {
                    if options.fail_fast {
                        return Err(err);
                    }
                    result.failures.push(err);
                }
            }
        }
    }

    Ok(result)
}

fn process_record(
    options: &QueryOptions,
    matcher: &Matcher,
    candidate: &Candidate,
    info_path: &Path,
) -> Result<Vec<(String, TrashedEntry)>> {
    let contents = std::fs::read_to_string(info_path).map_err(|e| Error::io(info_path.to_path_buf(), e))?;
    let parsed = info::parse(info_path, &contents)?;
    let original_path = info::absolute_original_path(&candidate.base_dir, &parsed.path);

    let keys = match matcher {
        Matcher::Paths => matching_path_keys(options, &original_path, &candidate.base_dir),
        Matcher::Globs(patterns) => patterns
            .iter()
            .filter(|(_, pattern)| pattern.matches_path(&original_path))
            .map(|(key, _)| key.clone())
            .collect(),
    };
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let stem = info_path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let content_path = candidate.files_dir.join(stem);
    let entry = crate::make_entry(original_path, parsed.deletion_date, None, info_path.to_path_buf(), content_path);
    Ok(keys.into_iter().map(|k| (k, entry.clone())).collect())
}

pub fn restore(entry: &TrashedEntry, force: bool) -> Result<()> {
    if !force && entry.original_path.exists() {
        return Err(Error::new(crate::ErrorKind::AlreadyExists));
    }
    if let Some(parent) = entry.original_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent.to_path_buf(), e))?;
    }
    std::fs::rename(entry.content_path(), &entry.original_path)
        .map_err(|e| Error::io(entry.content_path().to_path_buf(), e))?;
    if let Err(e) = std::fs::remove_file(entry.info_path()) {
        log::warn!(
            "restored {} but failed to remove trash record {}: {}",
            entry.original_path.display(),
            entry.info_path().display(),
            e
        );
    }
    Ok(())
}

pub fn delete(entry: &TrashedEntry) -> Result<()> {
    std::fs::remove_file(entry.info_path()).map_err(|e| Error::io(entry.info_path().to_path_buf(), e))?;
    let content = entry.content_path();
    let metadata = std::fs::symlink_metadata(content).map_err(|e| Error::io(content.to_path_buf(), e))?;
    if metadata.is_dir() {
        std::fs::remove_dir_all(content).map_err(|e| Error::io(content.to_path_buf(), e))?;
    } else {
        std::fs::remove_file(content).map_err(|e| Error::io(content.to_path_buf(), e))?;
    }
    Ok(())
}
