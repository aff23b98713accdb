//! POSIX shared memory segments
//!
//! Segments are created with shm_open, sized with ftruncate and filled
//! through a memmap2 mapping. The terminal unlinks a segment after
//! reading it; we only unlink segments it never consumed.

use log::debug;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::constants::SHM_PREFIX;
use crate::error::ShmError;

static SEGMENT_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Unique segment name: /pixcat-<pid>-<nanos>-<counter>
fn unique_name() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let n = SEGMENT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}{}-{:x}-{}", SHM_PREFIX, std::process::id(), nanos, n)
}

/// Create a new segment holding `data`, returning its name.
#[cfg(unix)]
pub fn create(data: &[u8]) -> Result<String, ShmError> {
    use std::os::unix::io::FromRawFd;

    let name = unique_name();
    let c_name = std::ffi::CString::new(name.as_str()).map_err(|_| ShmError::Io {
        op: "shm_open",
        name: name.clone(),
        source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
    })?;

    let fd = unsafe {
        libc::shm_open(
            c_name.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o600 as libc::mode_t,
        )
    };
    if fd < 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOSYS) {
            return Err(ShmError::NotSupported);
        }
        return Err(ShmError::Io {
            op: "shm_open",
            name,
            source: err,
        });
    }

    // Owns fd from here on
    let file = unsafe { std::fs::File::from_raw_fd(fd) };

    let fill = || -> std::io::Result<()> {
        file.set_len(data.len() as u64)?;
        if !data.is_empty() {
            let mut map = unsafe { memmap2::MmapMut::map_mut(&file)? };
            map.copy_from_slice(data);
            map.flush()?;
        }
        Ok(())
    };

    if let Err(source) = fill() {
        unsafe { libc::shm_unlink(c_name.as_ptr()) };
        return Err(ShmError::Io {
            op: "write",
            name,
            source,
        });
    }

    debug!("Created shared memory {} ({} bytes)", name, data.len());
    Ok(name)
}

#[cfg(not(unix))]
pub fn create(_data: &[u8]) -> Result<String, ShmError> {
    Err(ShmError::NotSupported)
}

/// Remove a segment name from the system namespace
#[cfg(unix)]
pub fn unlink(name: &str) -> Result<(), ShmError> {
    let c_name = std::ffi::CString::new(name).map_err(|_| ShmError::Io {
        op: "shm_unlink",
        name: name.to_string(),
        source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
    })?;
    let ret = unsafe { libc::shm_unlink(c_name.as_ptr()) };
    if ret < 0 {
        return Err(ShmError::Io {
            op: "shm_unlink",
            name: name.to_string(),
            source: std::io::Error::last_os_error(),
        });
    }
    debug!("Unlinked shared memory {}", name);
    Ok(())
}

#[cfg(not(unix))]
pub fn unlink(_name: &str) -> Result<(), ShmError> {
    Err(ShmError::NotSupported)
}
