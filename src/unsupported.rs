//! Fallback backend for targets without a native trash implementation.
//! Every operation fails with [`crate::ErrorKind::PlatformNotSupported`].

use crate::{Error, QueryOptions, QueryResult, Result, TrashedEntry};
use std::path::Path;

pub fn trash(_paths: &[&Path]) -> Result<()> {
    Err(Error::not_supported())
}

pub fn empty() -> Result<()> {
    Err(Error::not_supported())
}

pub fn query(_options: &QueryOptions) -> Result<QueryResult> {
    Err(Error::not_supported())
}

pub fn restore(_entry: &TrashedEntry, _force: bool) -> Result<()> {
    Err(Error::not_supported())
}

pub fn delete(_entry: &TrashedEntry) -> Result<()> {
    Err(Error::not_supported())
}
