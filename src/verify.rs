//! Download verification
//!
//! Inspects the directory an external client downloads into. Artifacts are
//! owned by the client process and never deleted here. A missing or
//! unreadable file is reported as size 0 / no checksum rather than as an
//! error.

use md5::{Digest, Md5};
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Size and checksum inspection over a download directory
#[derive(Debug)]
pub struct DownloadVerifier {
    dir: PathBuf,
    inspected: Mutex<BTreeSet<String>>,
}

impl DownloadVerifier {
    /// Create a verifier for `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DownloadVerifier {
            dir: dir.into(),
            inspected: Mutex::new(BTreeSet::new()),
        }
    }

    /// Directory being inspected
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of an artifact
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Size of a downloaded artifact in bytes, 0 if absent
    pub fn size(&self, filename: &str) -> u64 {
        self.remember(filename);
        std::fs::metadata(self.path_of(filename))
            .map(|meta| meta.len())
            .unwrap_or(0)
    }

    /// MD5 of a downloaded artifact, `None` if it cannot be read
    pub fn md5(&self, filename: &str) -> Option<[u8; 16]> {
        self.remember(filename);
        let mut file = File::open(self.path_of(filename)).ok()?;
        let mut hasher = Md5::new();
        io::copy(&mut file, &mut hasher).ok()?;
        Some(hasher.finalize().into())
    }

    /// Forget every artifact inspected so far
    ///
    /// The files themselves belong to the client and are left in place.
    pub fn clear(&self) {
        let mut inspected = self.inspected.lock().unwrap_or_else(|e| e.into_inner());
        let inspected = std::mem::take(&mut *inspected);
        if !inspected.is_empty() {
            tracing::debug!(count = inspected.len(), "forgot inspected download artifacts");
        }
    }

    /// Filenames inspected since the last clear
    pub fn inspected(&self) -> Vec<String> {
        self.inspected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn remember(&self, filename: &str) {
        self.inspected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(filename.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = DownloadVerifier::new(dir.path());

        assert_eq!(verifier.size("missing.bin"), 0);
        assert_eq!(verifier.md5("missing.bin"), None);
    }

    #[test]
    fn test_size_and_md5() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), b"hello").unwrap();
        let verifier = DownloadVerifier::new(dir.path());

        assert_eq!(verifier.size("data.bin"), 5);
        assert_eq!(
            hex::encode(verifier.md5("data.bin").unwrap()),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn test_clear_forgets_without_deleting() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("inspected.bin"), b"x").unwrap();
        std::fs::write(dir.path().join("other.bin"), b"y").unwrap();
        let verifier = DownloadVerifier::new(dir.path());

        verifier.size("inspected.bin");
        verifier.md5("never-downloaded.bin");
        assert_eq!(verifier.inspected().len(), 2);

        verifier.clear();
        assert!(dir.path().join("inspected.bin").exists());
        assert!(dir.path().join("other.bin").exists());
        assert!(verifier.inspected().is_empty());
    }
}
