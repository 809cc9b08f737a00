//! Reads and writes `.trashinfo` records: the FreeDesktop trash
//! specification's text format for an entry's metadata.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use percent_encoding::percent_decode_str;
use url::Url;

use crate::Error;

const HEADER: &str = "[Trash Info]";
const PATH_KEY: &str = "Path";
const DATE_KEY: &str = "DeletionDate";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Percent-encodes `path` per RFC 2396 section 2. `path` may be relative
/// (routed to a top-directory trash) or absolute (home trash).
fn escape_path(path: &Path) -> String {
    let is_absolute = path.is_absolute();
    let synthetic = if is_absolute { path.to_path_buf() } else { Path::new("/").join(path) };
    // `Url::from_file_path` only accepts absolute paths; relative record
    // paths are escaped the same way under a throwaway leading slash and
    // then the slash is stripped back off.
    let url = Url::from_file_path(&synthetic).unwrap_or_else(|_| Url::parse("file:///").unwrap());
    let escaped = url.path().to_string();
    if is_absolute {
        escaped
    } else {
        escaped.trim_start_matches('/').to_string()
    }
}

fn unescape_path(escaped: &str) -> Result<String, std::str::Utf8Error> {
    Ok(percent_decode_str(escaped).decode_utf8()?.into_owned())
}

pub fn render(path_for_record: &Path, deletion_date: DateTime<Local>) -> String {
    format!(
        "{}\n{}={}\n{}={}\n",
        HEADER,
        PATH_KEY,
        escape_path(path_for_record),
        DATE_KEY,
        deletion_date.format(DATE_FORMAT)
    )
}

pub struct ParsedRecord {
    pub path: String,
    pub deletion_date: DateTime<Local>,
}

/// Parses a `.trashinfo` record body. Tolerant of field order and of
/// paths containing whitespace, since it splits each line on the first
/// `=` rather than on whitespace.
pub fn parse(source_path: &Path, contents: &str) -> Result<ParsedRecord, Error> {
    let mut path = None;
    let mut deletion_date = None;

    for line in contents.lines() {
        let line = line.trim_end_matches('\r');
        if line == HEADER || line.is_empty() {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some(kv) => kv,
            None => continue,
        };
        match key {
            PATH_KEY => {
                let decoded = unescape_path(value)
                    .map_err(|e| Error::malformed(source_path, format!("invalid Path encoding: {}", e)))?;
                path = Some(decoded);
            }
            DATE_KEY => {
                let naive = NaiveDateTime::parse_from_str(value, DATE_FORMAT)
                    .map_err(|e| Error::malformed(source_path, format!("invalid DeletionDate: {}", e)))?;
                deletion_date = Some(
                    naive
                        .and_local_timezone(Local)
                        .single()
                        .unwrap_or_else(|| Local.from_utc_datetime(&naive)),
                );
            }
            _ => continue,
        }
    }

    let path = path.ok_or_else(|| Error::malformed(source_path, "missing Path field"))?;
    let deletion_date = deletion_date.ok_or_else(|| Error::malformed(source_path, "missing DeletionDate field"))?;
    Ok(ParsedRecord { path, deletion_date })
}

pub fn absolute_original_path(base_dir: &Path, record_path: &str) -> PathBuf {
    let p = Path::new(record_path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_simple_path() {
        let date = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let rendered = render(Path::new("/home/user/a.txt"), date);
        let parsed = parse(Path::new("unused"), &rendered).unwrap();
        assert_eq!(parsed.path, "/home/user/a.txt");
        assert_eq!(parsed.deletion_date, date);
    }

    #[test]
    fn roundtrips_path_with_space_and_percent() {
        let date = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let rendered = render(Path::new("/home/user/a b%c.txt"), date);
        let parsed = parse(Path::new("unused"), &rendered).unwrap();
        assert_eq!(parsed.path, "/home/user/a b%c.txt");
    }

    #[test]
    fn relative_record_path_has_no_leading_slash() {
        let date = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let rendered = render(Path::new("subdir/a.txt"), date);
        let parsed = parse(Path::new("unused"), &rendered).unwrap();
        assert_eq!(parsed.path, "subdir/a.txt");
    }

    #[test]
    fn rejects_missing_fields() {
        let err = parse(Path::new("x"), "[Trash Info]\nPath=/a\n");
        assert!(err.is_err());
    }
}
