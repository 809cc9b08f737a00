//! Moves files and folders to the operating system's trash, empties it,
//! and finds or restores previously trashed items.
//!
//! The heavy lifting happens in a platform-specific backend selected at
//! compile time: [`freedesktop`] on Linux and the BSDs, `windows` on
//! Windows, `macos` on macOS, and `unsupported` everywhere else. None of
//! those modules are part of the public API; use the free functions and
//! types exported from this crate root instead.

#[cfg(any(
    target_os = "linux",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
#[path = "freedesktop/mod.rs"]
mod platform;

#[cfg(target_os = "windows")]
#[path = "windows/mod.rs"]
mod platform;

#[cfg(target_os = "macos")]
#[path = "macos.rs"]
mod platform;

#[cfg(not(any(
    target_os = "linux",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    target_os = "windows",
    target_os = "macos"
)))]
#[path = "unsupported.rs"]
mod platform;

use std::fmt;
use std::path::{Path, PathBuf};

/// The kind of failure an [`Error`] represents.
///
/// This mirrors the failure modes named by the trash specification rather
/// than exposing raw OS error codes, so callers can match on it without
/// caring which backend produced it.
#[derive(Debug)]
pub enum ErrorKind {
    /// This platform has no trash backend.
    PlatformNotSupported,
    /// A restore was attempted without `force` and something already
    /// occupies the original path.
    AlreadyExists,
    /// The caller passed a combination of options that can never be
    /// satisfied (e.g. both path and glob matching at once).
    InvalidOptions { message: String },
    /// A filesystem call failed. `path` is the file or directory the call
    /// was operating on, when known.
    Io { path: Option<PathBuf>, kind: std::io::ErrorKind, source: std::io::Error },
    /// A trash info record could not be parsed.
    MalformedRecord { path: PathBuf, message: String },
    /// A platform API (the Windows shell functions, or the macOS Finder
    /// scripting bridge) returned failure.
    PlatformApi { code: i64, message: String },
}

/// The error type returned by every fallible operation in this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn new(kind: ErrorKind) -> Self {
        Error { kind }
    }

    pub(crate) fn not_supported() -> Self {
        Error::new(ErrorKind::PlatformNotSupported)
    }

    pub(crate) fn io(path: impl Into<Option<PathBuf>>, source: std::io::Error) -> Self {
        let kind = source.kind();
        Error::new(ErrorKind::Io { path: path.into(), kind, source })
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::new(ErrorKind::MalformedRecord { path: path.into(), message: message.into() })
    }

    pub(crate) fn platform_api(code: i64, message: impl Into<String>) -> Self {
        Error::new(ErrorKind::PlatformApi { code, message: message.into() })
    }

    pub(crate) fn invalid_options(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidOptions { message: message.into() })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::PlatformNotSupported => {
                write!(f, "this platform does not have a supported trash backend")
            }
            ErrorKind::AlreadyExists => {
                write!(f, "a file already exists at the restore destination")
            }
            ErrorKind::InvalidOptions { message } => write!(f, "invalid options: {}", message),
            ErrorKind::Io { path: Some(path), source, .. } => {
                write!(f, "io error on {}: {}", path.display(), source)
            }
            ErrorKind::Io { path: None, source, .. } => write!(f, "io error: {}", source),
            ErrorKind::MalformedRecord { path, message } => {
                write!(f, "malformed trash record {}: {}", path.display(), message)
            }
            ErrorKind::PlatformApi { code, message } => {
                write!(f, "platform api failed ({}): {}", code, message)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A single entry previously moved to the trash.
///
/// Kept as plain data rather than captured closures so that an entry can
/// be passed around, logged, and compared without holding a borrow on the
/// engine that produced it; `restore`/`delete` dispatch back into
/// whichever `platform` module is compiled in, so the entry itself needs
/// no backend tag of its own.
#[derive(Debug, Clone)]
pub struct TrashedEntry {
    /// Absolute path the item was trashed from.
    pub original_path: PathBuf,
    /// Local time the item was trashed, second precision on FreeDesktop,
    /// sub-second on Windows.
    pub deletion_date: chrono::DateTime<chrono::Local>,
    /// Size in bytes, when the backend records it (Windows only).
    pub file_size: Option<u64>,
    /// Stable hex fingerprint distinguishing entries with identical
    /// `original_path`/`deletion_date`.
    pub unique_id: String,

    info_path: PathBuf,
    content_path: PathBuf,
}

impl TrashedEntry {
    /// Restores this entry to `original_path`.
    ///
    /// Fails with [`ErrorKind::AlreadyExists`] if `force` is `false` and
    /// something already occupies that path.
    pub fn restore(&self, force: bool) -> Result<()> {
        platform::restore(self, force)
    }

    /// Permanently removes this entry: the info record first, then the
    /// trashed content.
    pub fn delete(self) -> Result<()> {
        platform::delete(&self)
    }
}

/// How [`QueryOptions::search`] keys should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Each key is an absolute or trash-relative path.
    Paths,
    /// Each key is a glob pattern (`*`, `?`, `[...]`).
    Globs,
}

/// Parameters for [`query`].
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub search: Vec<String>,
    pub mode: MatchMode,
    /// Abort on the first non-fatal per-record error instead of
    /// collecting it into [`QueryResult::failures`].
    pub fail_fast: bool,
}

impl QueryOptions {
    pub fn new(search: Vec<String>, mode: MatchMode) -> Self {
        QueryOptions { search, mode, fail_fast: false }
    }

    fn validate(&self) -> Result<()> {
        if self.search.is_empty() {
            return Err(Error::invalid_options("search must contain at least one entry"));
        }
        Ok(())
    }
}

/// Result of a [`query`] call.
#[derive(Debug, Default)]
pub struct QueryResult {
    /// Matches, keyed by the original search string that produced them.
    pub matches: std::collections::HashMap<String, Vec<TrashedEntry>>,
    /// Non-fatal errors collected while walking trash directories, when
    /// `fail_fast` was `false`.
    pub failures: Vec<Error>,
}

/// Moves every path in `paths` into the platform trash.
///
/// Paths that do not exist are silently skipped. The first fatal error
/// stops the whole batch; paths already processed remain trashed.
pub fn trash<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    let paths: Vec<&Path> = paths.iter().map(AsRef::as_ref).collect();
    platform::trash(&paths)
}

/// Empties every reachable trash (the home trash and, on FreeDesktop
/// systems, every currently mounted volume's top-directory trash for the
/// current user).
pub fn empty() -> Result<()> {
    platform::empty()
}

/// Searches trashed entries by path or glob pattern.
pub fn query(options: QueryOptions) -> Result<QueryResult> {
    options.validate()?;
    platform::query(&options)
}

pub(crate) fn make_entry(
    original_path: PathBuf,
    deletion_date: chrono::DateTime<chrono::Local>,
    file_size: Option<u64>,
    info_path: PathBuf,
    content_path: PathBuf,
) -> TrashedEntry {
    let unique_id = fnv1a_hex(info_path.to_string_lossy().as_bytes());
    TrashedEntry { original_path, deletion_date, file_size, unique_id, info_path, content_path }
}

impl TrashedEntry {
    pub(crate) fn info_path(&self) -> &Path {
        &self.info_path
    }

    pub(crate) fn content_path(&self) -> &Path {
        &self.content_path
    }
}

/// FNV-1a 64-bit hash, rendered as lowercase hex.
fn fnv1a_hex(bytes: &[u8]) -> String {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    format!("{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_known_vector() {
        // FNV-1a 64-bit of the empty string is the offset basis itself.
        assert_eq!(fnv1a_hex(b""), format!("{:x}", 0xcbf2_9ce4_8422_2325u64));
    }

    #[test]
    fn fnv1a_differs_per_input() {
        assert_ne!(fnv1a_hex(b"/a/b"), fnv1a_hex(b"/a/c"));
    }
}
