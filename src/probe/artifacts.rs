//! Probe artifacts
//!
//! The file and shared memory probes each need a small object holding the
//! sentinel bytes. A terminal that supports the channel reads and removes
//! it; everything else is removed here once negotiation is over.

use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::ShmError;
use crate::transfer::{shm, temp, TransferChannel, Verdicts};

/// Creates and removes transfer objects
pub trait ArtifactBackend: Send {
    fn create_temp_file(&mut self, data: &[u8]) -> io::Result<PathBuf>;
    fn create_shm(&mut self, data: &[u8]) -> Result<String, ShmError>;
    fn remove_temp_file(&mut self, path: &Path) -> io::Result<()>;
    fn unlink_shm(&mut self, name: &str) -> Result<(), ShmError>;
}

/// Real files and segments
#[derive(Debug, Default)]
pub struct SystemArtifacts;

impl ArtifactBackend for SystemArtifacts {
    fn create_temp_file(&mut self, data: &[u8]) -> io::Result<PathBuf> {
        temp::create(data)
    }

    fn create_shm(&mut self, data: &[u8]) -> Result<String, ShmError> {
        shm::create(data)
    }

    fn remove_temp_file(&mut self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn unlink_shm(&mut self, name: &str) -> Result<(), ShmError> {
        shm::unlink(name)
    }
}

/// Slot for one artifact
#[derive(Debug, Default)]
enum Slot<T> {
    #[default]
    Empty,
    Live(T),
    /// Created and then handed to the terminal or removed
    Done,
}

/// Owner of the probe temp file and the probe shared memory segment
pub struct ArtifactStore {
    backend: Box<dyn ArtifactBackend>,
    temp_file: Slot<PathBuf>,
    shm: Slot<String>,
    finalized: bool,
}

impl ArtifactStore {
    pub fn new(backend: Box<dyn ArtifactBackend>) -> Self {
        Self {
            backend,
            temp_file: Slot::Empty,
            shm: Slot::Empty,
            finalized: false,
        }
    }

    /// Backend for transmissions outside of probing
    pub fn backend(&mut self) -> &mut dyn ArtifactBackend {
        self.backend.as_mut()
    }

    /// Create the probe temp file. Only the first call does anything.
    pub fn create_temp_file(&mut self, data: &[u8]) -> io::Result<&Path> {
        if matches!(self.temp_file, Slot::Empty) {
            let path = self.backend.create_temp_file(data)?;
            self.temp_file = Slot::Live(path);
        }
        match &self.temp_file {
            Slot::Live(path) => Ok(path.as_path()),
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                "probe temp file already released",
            )),
        }
    }

    /// Create the probe segment. Only the first call does anything.
    pub fn create_shm(&mut self, data: &[u8]) -> Result<&str, ShmError> {
        if matches!(self.shm, Slot::Empty) {
            let name = self.backend.create_shm(data)?;
            self.shm = Slot::Live(name);
        }
        match &self.shm {
            Slot::Live(name) => Ok(name.as_str()),
            _ => Err(ShmError::Io {
                op: "shm_open",
                name: String::new(),
                source: io::Error::new(io::ErrorKind::Other, "probe segment already released"),
            }),
        }
    }

    /// Remove artifacts whose channel was not found to work.
    /// Supported ones belong to the terminal now. Safe to call repeatedly.
    pub fn finalize(&mut self, verdicts: &Verdicts) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        if let Slot::Live(path) = std::mem::replace(&mut self.temp_file, Slot::Done) {
            if verdicts.is_supported(TransferChannel::TempFile) {
                debug!("Leaving probe file {} to the terminal", path.display());
            } else if let Err(e) = self.backend.remove_temp_file(&path) {
                warn!("Failed to remove probe file {}: {}", path.display(), e);
            } else {
                debug!("Removed probe file {}", path.display());
            }
        }

        if let Slot::Live(name) = std::mem::replace(&mut self.shm, Slot::Done) {
            if verdicts.is_supported(TransferChannel::SharedMemory) {
                debug!("Leaving probe segment {} to the terminal", name);
            } else if let Err(e) = self.backend.unlink_shm(&name) {
                warn!("Failed to unlink probe segment {}: {}", name, e);
            } else {
                debug!("Unlinked probe segment {}", name);
            }
        }
    }
}

impl Drop for ArtifactStore {
    fn drop(&mut self) {
        if !self.finalized {
            // Nothing was confirmed, so nothing is the terminal's
            self.finalize(&Verdicts::new());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transfer::TransferVerdict;
    use std::sync::{Arc, Mutex};

    /// What a fake backend was asked to do
    #[derive(Debug, Default)]
    pub struct Ledger {
        pub created_files: Vec<PathBuf>,
        pub created_shm: Vec<String>,
        pub removed_files: Vec<PathBuf>,
        pub unlinked_shm: Vec<String>,
        pub file_payloads: Vec<Vec<u8>>,
    }

    /// In-memory backend with switchable failures
    #[derive(Clone, Default)]
    pub struct FakeArtifacts {
        pub ledger: Arc<Mutex<Ledger>>,
        pub fail_file: bool,
        pub fail_shm: Option<fn() -> ShmError>,
    }

    impl ArtifactBackend for FakeArtifacts {
        fn create_temp_file(&mut self, data: &[u8]) -> io::Result<PathBuf> {
            if self.fail_file {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            let mut ledger = self.ledger.lock().unwrap();
            let path = PathBuf::from(format!(
                "/fake/tty-graphics-protocol-{}",
                ledger.created_files.len()
            ));
            ledger.created_files.push(path.clone());
            ledger.file_payloads.push(data.to_vec());
            Ok(path)
        }

        fn create_shm(&mut self, _data: &[u8]) -> Result<String, ShmError> {
            if let Some(make) = self.fail_shm {
                return Err(make());
            }
            let mut ledger = self.ledger.lock().unwrap();
            let name = format!("/pixcat-fake-{}", ledger.created_shm.len());
            ledger.created_shm.push(name.clone());
            Ok(name)
        }

        fn remove_temp_file(&mut self, path: &Path) -> io::Result<()> {
            self.ledger
                .lock()
                .unwrap()
                .removed_files
                .push(path.to_path_buf());
            Ok(())
        }

        fn unlink_shm(&mut self, name: &str) -> Result<(), ShmError> {
            self.ledger
                .lock()
                .unwrap()
                .unlinked_shm
                .push(name.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_created_once() {
        let fake = FakeArtifacts::default();
        let ledger = Arc::clone(&fake.ledger);
        let mut store = ArtifactStore::new(Box::new(fake));
        let first = store.create_temp_file(&[1, 2, 3]).unwrap().to_path_buf();
        let second = store.create_temp_file(&[1, 2, 3]).unwrap().to_path_buf();
        assert_eq!(first, second);
        store.create_shm(&[1, 2, 3]).unwrap();
        store.create_shm(&[1, 2, 3]).unwrap();

        let l = ledger.lock().unwrap();
        assert_eq!(l.created_files.len(), 1);
        assert_eq!(l.created_shm.len(), 1);
    }

    #[test]
    fn test_finalize_removes_unsupported_once() {
        let fake = FakeArtifacts::default();
        let ledger = Arc::clone(&fake.ledger);
        let mut store = ArtifactStore::new(Box::new(fake));
        store.create_temp_file(&[1, 2, 3]).unwrap();
        store.create_shm(&[1, 2, 3]).unwrap();

        let verdicts = Verdicts::new();
        store.finalize(&verdicts);
        store.finalize(&verdicts);
        drop(store);

        let l = ledger.lock().unwrap();
        assert_eq!(l.removed_files.len(), 1);
        assert_eq!(l.unlinked_shm.len(), 1);
    }

    #[test]
    fn test_finalize_leaves_supported() {
        let fake = FakeArtifacts::default();
        let ledger = Arc::clone(&fake.ledger);
        let mut store = ArtifactStore::new(Box::new(fake));
        store.create_temp_file(&[1, 2, 3]).unwrap();
        store.create_shm(&[1, 2, 3]).unwrap();

        let mut verdicts = Verdicts::new();
        verdicts.settle(TransferChannel::SharedMemory, TransferVerdict::Supported);
        verdicts.settle(TransferChannel::TempFile, TransferVerdict::Unsupported);
        store.finalize(&verdicts);

        let l = ledger.lock().unwrap();
        assert_eq!(l.removed_files.len(), 1);
        assert!(l.unlinked_shm.is_empty());
    }

    #[test]
    fn test_finalize_without_artifacts() {
        let fake = FakeArtifacts::default();
        let ledger = Arc::clone(&fake.ledger);
        let mut store = ArtifactStore::new(Box::new(fake));
        store.finalize(&Verdicts::new());
        let l = ledger.lock().unwrap();
        assert!(l.removed_files.is_empty());
        assert!(l.unlinked_shm.is_empty());
    }

    #[test]
    fn test_failed_creation_leaves_nothing() {
        let fake = FakeArtifacts {
            fail_file: true,
            fail_shm: Some(|| ShmError::NotSupported),
            ..FakeArtifacts::default()
        };
        let mut store = ArtifactStore::new(Box::new(fake));
        assert!(store.create_temp_file(&[1, 2, 3]).is_err());
        assert!(matches!(
            store.create_shm(&[1, 2, 3]),
            Err(ShmError::NotSupported)
        ));
        // Creation is retried and fails again
        assert!(store.create_temp_file(&[1, 2, 3]).is_err());
    }
}
