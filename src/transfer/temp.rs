//! Temp files for file based transfer
//!
//! Files live in RAM (/dev/shm) when possible. Their names contain
//! `tty-graphics-protocol` because terminals refuse to delete temp
//! files without it.

use log::debug;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::constants::{RAM_DIR, TEMP_FILE_PREFIX};

/// Directory for transfer temp files
pub fn temp_dir() -> PathBuf {
    let ram = Path::new(RAM_DIR);
    if is_writable_dir(ram) {
        ram.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

fn is_writable_dir(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_dir() {
        return false;
    }
    let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

/// Create a persistent temp file holding `data` in `dir`
pub fn create_in(dir: &Path, data: &[u8]) -> io::Result<PathBuf> {
    let named = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .tempfile_in(dir)?;
    let (mut file, path) = named.keep().map_err(|e| e.error)?;
    if let Err(e) = file.write_all(data).and_then(|_| file.flush()) {
        let _ = std::fs::remove_file(&path);
        return Err(e);
    }
    debug!("Created temp file {} ({} bytes)", path.display(), data.len());
    Ok(path)
}

/// Create a persistent temp file holding `data`
pub fn create(data: &[u8]) -> io::Result<PathBuf> {
    create_in(&temp_dir(), data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_in(dir.path(), &[1, 2, 3]).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(TEMP_FILE_PREFIX));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(create_in(&dir.path().join("missing"), b"x").is_err());
    }
}
