//! macOS backend. Delegates to Finder via AppleScript rather than talking
//! to a private trash API directly, matching how the rest of the system
//! treats the trash as Finder's to own on this platform.

use crate::{Error, QueryOptions, QueryResult, Result, TrashedEntry};
use std::path::Path;
use std::process::Command;

fn run_osascript(script: &str) -> Result<()> {
    let output = Command::new("osascript")
        .arg("-e")
        .arg(script)
        .output()
        .map_err(|e| Error::io(None, e))?;
    if !output.status.success() {
        let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(Error::platform_api(
            output.status.code().unwrap_or(-1) as i64,
            if message.is_empty() { "osascript failed".into() } else { message },
        ));
    }
    Ok(())
}

fn escape_applescript_literal(path: &str) -> String {
    path.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn trash(paths: &[&Path]) -> Result<()> {
    for path in paths {
        if !path.exists() {
            continue;
        }
        let abs = path.canonicalize().map_err(|e| Error::io(path.to_path_buf(), e))?;
        let escaped = escape_applescript_literal(&abs.to_string_lossy());
        let script = format!("tell application \"Finder\" to delete POSIX file \"{}\"", escaped);
        run_osascript(&script)?;
    }
    Ok(())
}

pub fn empty() -> Result<()> {
    run_osascript("tell application \"Finder\" to empty")
}

pub fn query(_options: &QueryOptions) -> Result<QueryResult> {
    // Finder's scripting surface exposes no stable, parseable directory
    // of trashed items with restore metadata; querying is not offered on
    // this backend.
    Err(Error::not_supported())
}

pub fn restore(_entry: &TrashedEntry, _force: bool) -> Result<()> {
    Err(Error::not_supported())
}

pub fn delete(_entry: &TrashedEntry) -> Result<()> {
    Err(Error::not_supported())
}
