//! Windows trash backend. Trashing and emptying go through the shell's
//! file-operation and recycle-bin APIs; query and restore work by
//! reading the binary `$I…` metadata files the shell leaves behind,
//! since there is no API that returns structured recycle bin entries.

mod info;

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use glob::Pattern;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND, MAX_PATH};
use windows::Win32::Security::Authorization::ConvertSidToStringSidW;
use windows::Win32::Security::{GetTokenInformation, TokenUser, TOKEN_QUERY, TOKEN_USER};
use windows::Win32::Storage::FileSystem::GetLogicalDriveStringsW;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT};
use windows::Win32::System::Memory::LocalFree;
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};
use windows::Win32::UI::Shell::{
    SHEmptyRecycleBinW, SHFileOperationW, FOF_ALLOWUNDO, FOF_NOCONFIRMATION, FOF_NOCONFIRMMKDIR, FOF_NOERRORUI,
    FOF_SILENT, FO_DELETE, SHERB_NOCONFIRMATION, SHERB_NOPROGRESSUI, SHERB_NOSOUND, SHFILEOPSTRUCTW,
};

use crate::{Error, MatchMode, QueryOptions, QueryResult, Result, TrashedEntry};

/// The `coinit_*` cargo features select which `COINIT` flags this crate
/// initializes COM with, mirroring the choices the shell file-operation
/// API itself exposes.
fn coinit_flags() -> COINIT {
    let mut bits = 0i32;
    if cfg!(feature = "coinit_multithreaded") {
        bits |= 0x0;
    } else {
        bits |= 0x2; // COINIT_APARTMENTTHREADED
    }
    if cfg!(feature = "coinit_disable_ole1dde") {
        bits |= 0x4;
    }
    if cfg!(feature = "coinit_speed_over_memory") {
        bits |= 0x8;
    }
    COINIT(bits)
}

/// Runs `f` with COM initialized on the current thread, uninitializing
/// it again on the way out regardless of how `f` returns.
fn with_com<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    unsafe {
        CoInitializeEx(None, coinit_flags()).ok().map_err(|e| Error::platform_api(e.code().0 as i64, e.message()))?;
    }
    scopeguard::defer! {
        unsafe { CoUninitialize() };
    }
    f()
}

fn to_wide_double_null(paths: &[PathBuf]) -> Vec<u16> {
    let mut buf: Vec<u16> = Vec::new();
    for path in paths {
        buf.extend(OsStr::new(path).encode_wide());
        buf.push(0);
    }
    buf.push(0);
    buf
}

pub fn trash(paths: &[&Path]) -> Result<()> {
    let existing: Vec<PathBuf> = paths.iter().filter(|p| p.exists()).map(|p| p.to_path_buf()).collect();
    if existing.is_empty() {
        return Ok(());
    }
    with_com(|| {
        let mut wide = to_wide_double_null(&existing);
        let flags = FOF_SILENT | FOF_NOCONFIRMATION | FOF_ALLOWUNDO | FOF_NOCONFIRMMKDIR | FOF_NOERRORUI;

        let mut op = SHFILEOPSTRUCTW {
            hwnd: HWND(0),
            wFunc: FO_DELETE.0,
            pFrom: PCWSTR(wide.as_mut_ptr()),
            pTo: PCWSTR::null(),
            fFlags: flags.0 as u16,
            fAnyOperationsAborted: Default::default(),
            hNameMappings: std::ptr::null_mut(),
            lpszProgressTitle: PCWSTR::null(),
        };

        let result = unsafe { SHFileOperationW(&mut op) };
        if result != 0 {
            return Err(Error::platform_api(result as i64, "SHFileOperationW failed"));
        }
        if op.fAnyOperationsAborted.as_bool() {
            return Err(Error::platform_api(0, "SHFileOperationW reported an aborted operation"));
        }
        Ok(())
    })
}

pub fn empty() -> Result<()> {
    with_com(|| {
        let flags = SHERB_NOCONFIRMATION | SHERB_NOPROGRESSUI | SHERB_NOSOUND;
        let result = unsafe { SHEmptyRecycleBinW(HWND(0), PCWSTR::null(), flags) };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.code().0 as u32 == 126 => {
                // "module not found"/DLL-load-failed is the documented
                // signal for an already-empty recycle bin on several
                // shell32 builds.
                Ok(())
            }
            Err(e) => Err(Error::platform_api(e.code().0 as i64, e.message())),
        }
    })
}

fn current_user_sid() -> Result<String> {
    unsafe {
        let mut token = HANDLE::default();
        OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token)
            .ok()
            .map_err(|e| Error::platform_api(e.code().0 as i64, e.message()))?;

        let mut size = 0u32;
        let _ = GetTokenInformation(token, TokenUser, None, 0, &mut size);
        let mut buf = vec![0u8; size as usize];
        let ok = GetTokenInformation(token, TokenUser, Some(buf.as_mut_ptr() as *mut _), size, &mut size);
        let _ = CloseHandle(token);
        ok.ok().map_err(|e| Error::platform_api(e.code().0 as i64, e.message()))?;

        let token_user = &*(buf.as_ptr() as *const TOKEN_USER);
        let mut sid_ptr = PWSTR::null();
        ConvertSidToStringSidW(token_user.User.Sid, &mut sid_ptr)
            .ok()
            .map_err(|e| Error::platform_api(e.code().0 as i64, e.message()))?;
        let sid_string = sid_ptr.to_string().unwrap_or_default();
        LocalFree(windows::Win32::Foundation::HLOCAL(sid_ptr.0 as isize));
        Ok(sid_string)
    }
}

fn logical_drives() -> Result<Vec<PathBuf>> {
    unsafe {
        let mut buf = [0u16; (MAX_PATH as usize) * 4];
        let len = GetLogicalDriveStringsW(Some(&mut buf));
        if len == 0 {
            return Err(Error::platform_api(0, "GetLogicalDriveStringsW failed"));
        }
        let mut drives = Vec::new();
        for chunk in buf[..len as usize].split(|&c| c == 0) {
            if !chunk.is_empty() {
                drives.push(PathBuf::from(String::from_utf16_lossy(chunk)));
            }
        }
        Ok(drives)
    }
}

fn recycle_bin_dirs() -> Result<Vec<PathBuf>> {
    let sid = current_user_sid()?;
    Ok(logical_drives()?.into_iter().map(|d| d.join("$Recycle.Bin").join(&sid)).collect())
}

fn content_path_for(info_path: &Path) -> Option<PathBuf> {
    let name = info_path.file_name()?.to_str()?;
    if !name.starts_with("$I") {
        return None;
    }
    let content_name = format!("$R{}", &name[2..]);
    info_path.parent().map(|p| p.join(content_name))
}

pub fn query(options: &QueryOptions) -> Result<QueryResult> {
    let mut result = QueryResult::default();
    let globs: Option<Vec<(String, Pattern)>> = match options.mode {
        MatchMode::Globs => Some(
            options
                .search
                .iter()
                .map(|k| {
                    Pattern::new(k)
                        .map(|p| (k.clone(), p))
                        .map_err(|e| Error::invalid_options(format!("invalid glob {:?}: {}", k, e)))
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        MatchMode::Paths => None,
    };

    for bin_dir in recycle_bin_dirs()? {
        let entries = match std::fs::read_dir(&bin_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                let err = Error::io(bin_dir.clone(), e);
                if options.fail_fast {
                    return Err(err);
                }
                result.failures.push(err);
                continue;
            }
        };
        for entry in entries.flatten() {
            let info_path = entry.path();
            let name = match info_path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if !name.starts_with("$I") {
                continue;
            }
            match process_one(options, &globs, &info_path) {
                Ok(matches) => {
                    for (key, trashed) in matches {
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

fn process_one(
    options: &QueryOptions,
    globs: &Option<Vec<(String, Pattern)>>,
    info_path: &Path,
) -> Result<Vec<(String, TrashedEntry)>> {
    let bytes = std::fs::read(info_path).map_err(|e| Error::io(info_path.to_path_buf(), e))?;
    let parsed = info::parse(info_path, &bytes)?;
    let content_path = content_path_for(info_path)
        .ok_or_else(|| Error::malformed(info_path, "could not derive content path from $I name"))?;

    let keys: Vec<String> = match globs {
        Some(patterns) => {
            patterns.iter().filter(|(_, p)| p.matches_path(&parsed.original_path)).map(|(k, _)| k.clone()).collect()
        }
        None => options
            .search
            .iter()
            .filter(|k| Path::new(k.as_str()) == parsed.original_path)
            .cloned()
            .collect(),
    };
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let entry = crate::make_entry(
        parsed.original_path.clone(),
        parsed.deletion_date,
        Some(parsed.file_size),
        info_path.to_path_buf(),
        content_path,
    );
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
