//! LOAD DATA LOCAL INFILE sources.
//!
//! When a query triggers the server's INFILE sub-flow, the driver streams
//! bytes from a whitelisted file or a registered reader. Disallowed sources
//! still terminate the protocol exchange (the server must see the empty
//! terminator packet) before the error surfaces.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};

use crate::error::{Error, Result};

/// Paths registered with `Reader::<name>` resolve through the reader
/// registry instead of the filesystem.
const READER_PREFIX: &str = "Reader::";

/// Creates a fresh reader for each INFILE request of its name.
pub type ReaderFactory = Box<dyn Fn() -> Box<dyn Read + Send> + Send + Sync>;

fn whitelist() -> &'static RwLock<HashSet<PathBuf>> {
    static SET: OnceLock<RwLock<HashSet<PathBuf>>> = OnceLock::new();
    SET.get_or_init(Default::default)
}

fn readers() -> &'static RwLock<HashMap<String, ReaderFactory>> {
    static MAP: OnceLock<RwLock<HashMap<String, ReaderFactory>>> = OnceLock::new();
    MAP.get_or_init(Default::default)
}

/// Allow a local file path to be streamed on server request.
pub fn register_local_file(path: impl Into<PathBuf>) {
    let mut set = whitelist().write().unwrap_or_else(|e| e.into_inner());
    set.insert(path.into());
}

pub fn deregister_local_file(path: &Path) {
    let mut set = whitelist().write().unwrap_or_else(|e| e.into_inner());
    set.remove(path);
}

/// Register a reader under `Reader::<name>`.
pub fn register_reader(name: impl Into<String>, factory: ReaderFactory) {
    let mut map = readers().write().unwrap_or_else(|e| e.into_inner());
    map.insert(name.into(), factory);
}

pub fn deregister_reader(name: &str) {
    let mut map = readers().write().unwrap_or_else(|e| e.into_inner());
    map.remove(name);
}

/// Resolve the source the server asked for, enforcing the whitelist.
pub(crate) fn open(name: &[u8], allow_all_files: bool) -> Result<Box<dyn Read + Send>> {
    let name = simdutf8::basic::from_utf8(name)
        .map_err(|_| Error::BadConfig("INFILE path is not valid UTF-8".to_owned()))?;

    if let Some(reader_name) = name.strip_prefix(READER_PREFIX) {
        let map = readers().read().unwrap_or_else(|e| e.into_inner());
        return match map.get(reader_name) {
            Some(factory) => Ok(factory()),
            None => Err(Error::BadConfig(format!(
                "no INFILE reader registered under {reader_name:?}"
            ))),
        };
    }

    let path = Path::new(name);
    let allowed = allow_all_files || {
        let set = whitelist().read().unwrap_or_else(|e| e.into_inner());
        set.contains(path)
    };
    if !allowed {
        return Err(Error::BadConfig(format!(
            "INFILE path {name:?} is not whitelisted"
        )));
    }
    Ok(Box::new(File::open(path)?))
}
