//! Parses the binary `$I…` metadata files the shell writes alongside
//! each recycled item's `$R…` content.

use std::path::PathBuf;

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::Error;

const HEADER_MARKER: u8 = 0x02;

pub struct ParsedInfo {
    pub file_size: u64,
    pub deletion_date: DateTime<Local>,
    pub original_path: PathBuf,
}

/// FILETIME epoch (1601-01-01 UTC) expressed as seconds before the Unix
/// epoch, used to convert the 100ns-tick timestamp in the header.
const FILETIME_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

fn filetime_to_local(ticks: u64) -> DateTime<Local> {
    let ticks = ticks as i64;
    let secs = ticks / 10_000_000 - FILETIME_EPOCH_OFFSET_SECS;
    let nanos = (ticks % 10_000_000) * 100;
    let utc = Utc.timestamp_opt(secs, nanos as u32).single().unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
    utc.with_timezone(&Local)
}

/// Parses the contents of an `$I…` file. Scans forward for the `0x02`
/// header marker rather than assuming it sits at offset 0, since some
/// shell versions prefix the record with padding.
pub fn parse(path: &std::path::Path, bytes: &[u8]) -> Result<ParsedInfo, Error> {
    let start = bytes
        .iter()
        .position(|&b| b == HEADER_MARKER)
        .ok_or_else(|| Error::malformed(path, "no 0x02 header marker found"))?;

    let header = &bytes[start..];
    if header.len() < 28 {
        return Err(Error::malformed(path, "record shorter than fixed header"));
    }

    let file_size = u64::from_le_bytes(header[8..16].try_into().unwrap());
    let filetime = u64::from_le_bytes(header[16..24].try_into().unwrap());
    let declared_len = u32::from_le_bytes(header[24..28].try_into().unwrap()) as usize;

    let path_bytes = &header[28..];
    let mut units = Vec::with_capacity(path_bytes.len() / 2);
    for chunk in path_bytes.chunks_exact(2) {
        let unit = u16::from_le_bytes([chunk[0], chunk[1]]);
        if unit == 0 {
            break;
        }
        units.push(unit);
    }

    if declared_len != 0 && declared_len != units.len() {
        log::trace!(
            "{}: declared path length {} does not match scanned length {}, using scanned length",
            path.display(),
            declared_len,
            units.len()
        );
    }

    let original_path = PathBuf::from(String::from_utf16_lossy(&units));
    Ok(ParsedInfo { file_size, deletion_date: filetime_to_local(filetime), original_path })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_record(path: &str, size: u64, filetime: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&[0x02, 0, 0, 0, 0, 0, 0, 0]);
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&filetime.to_le_bytes());
        let units: Vec<u16> = path.encode_utf16().collect();
        out.extend_from_slice(&(units.len() as u32).to_le_bytes());
        for u in &units {
            out.extend_from_slice(&u.to_le_bytes());
        }
        out.extend_from_slice(&[0, 0]);
        out
    }

    #[test]
    fn parses_well_formed_record() {
        let bytes = build_record("C:\\Users\\a\\file.txt", 1234, 132_857_984_000_000_000);
        let parsed = parse(std::path::Path::new("$Ixxxx"), &bytes).unwrap();
        assert_eq!(parsed.file_size, 1234);
        assert_eq!(parsed.original_path, PathBuf::from("C:\\Users\\a\\file.txt"));
    }

    #[test]
    fn skips_leading_garbage_before_marker() {
        let mut bytes = vec![0xff, 0xee];
        bytes.extend(build_record("C:\\a.txt", 1, 132_857_984_000_000_000));
        let parsed = parse(std::path::Path::new("$Ixxxx"), &bytes).unwrap();
        assert_eq!(parsed.original_path, PathBuf::from("C:\\a.txt"));
    }

    #[test]
    fn rejects_missing_marker() {
        assert!(parse(std::path::Path::new("$Ixxxx"), &[0, 0, 0]).is_err());
    }
}
