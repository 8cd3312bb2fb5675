//! Filesystem utilities for sidecar working directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Prefix for sidecar working directories under the system temp dir.
pub const WORKING_DIR_PREFIX: &str = "docshim-";

/// Create a fresh, uniquely named working directory.
///
/// The directory is not removed automatically; its owner is responsible for
/// calling [`remove_dir_all_if_exists`].
pub fn create_working_directory() -> io::Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(WORKING_DIR_PREFIX)
        .tempdir()?;
    Ok(dir.keep())
}

/// Write a file directly inside `dir`.
///
/// Never creates `dir`; a missing directory is `NotFound`.
pub fn write_into(dir: &Path, name: &str, contents: &[u8]) -> io::Result<PathBuf> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("directory does not exist: {}", dir.display()),
        ));
    }
    let path = dir.join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

/// Copy a file into `dir`, keeping its file name.
pub fn copy_into(dir: &Path, src: &Path) -> io::Result<PathBuf> {
    let name = src.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a file path: {}", src.display()),
        )
    })?;
    let contents = fs::read(src)?;
    write_into(dir, &name.to_string_lossy(), &contents)
}

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
