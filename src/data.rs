//! Bulk payloads for download tests
//!
//! The [`DataManager`] holds one generated payload at a time. Every read
//! returns the same bytes until the payload is regenerated or cleared, so a
//! copy downloaded by an external client can be compared by checksum.

use bytes::Bytes;
use md5::{Digest, Md5};
use rand::RngCore;
use std::sync::RwLock;

/// Small payload class (500 KiB), exercises low-latency transfers
pub const SMALL_PAYLOAD_LEN: usize = 500 * 1024;

/// Large payload class (50 MiB), exercises sustained throughput
pub const LARGE_PAYLOAD_LEN: usize = 50 * 1024 * 1024;

/// Payload size class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSize {
    Small,
    Large,
    Custom(usize),
}

impl PayloadSize {
    /// Length in bytes
    pub fn len(&self) -> usize {
        match self {
            PayloadSize::Small => SMALL_PAYLOAD_LEN,
            PayloadSize::Large => LARGE_PAYLOAD_LEN,
            PayloadSize::Custom(len) => *len,
        }
    }
}

/// A generated payload and its digest
#[derive(Debug, Clone)]
pub struct Payload {
    data: Bytes,
    md5: [u8; 16],
}

impl Payload {
    fn generate(len: usize) -> Self {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        let md5 = Md5::digest(&data).into();
        Payload {
            data: Bytes::from(data),
            md5,
        }
    }

    /// Payload bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// MD5 digest of the payload
    pub fn md5(&self) -> [u8; 16] {
        self.md5
    }
}

/// Holder of the current payload
#[derive(Debug, Default)]
pub struct DataManager {
    current: RwLock<Option<Payload>>,
}

impl DataManager {
    /// Create a manager with no payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current payload with fresh random bytes
    pub fn generate(&self, size: PayloadSize) -> Payload {
        let payload = Payload::generate(size.len());
        tracing::debug!(
            len = payload.data.len(),
            md5 = %hex::encode(payload.md5),
            "generated payload"
        );
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(payload.clone());
        payload
    }

    /// Current payload bytes, empty if nothing was generated
    pub fn get_data(&self) -> Bytes {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.data.clone())
            .unwrap_or_default()
    }

    /// Digest of the current payload
    pub fn md5(&self) -> Option<[u8; 16]> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.md5)
    }

    /// Drop the current payload
    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_until_generated() {
        let manager = DataManager::new();
        assert!(manager.get_data().is_empty());
        assert!(manager.md5().is_none());
    }

    #[test]
    fn test_stable_across_reads() {
        let manager = DataManager::new();
        manager.generate(PayloadSize::Custom(4096));

        let first = manager.get_data();
        let second = manager.get_data();
        assert_eq!(first.len(), 4096);
        assert_eq!(first, second);
    }

    #[test]
    fn test_md5_matches_data() {
        let manager = DataManager::new();
        let payload = manager.generate(PayloadSize::Small);

        let expected: [u8; 16] = Md5::digest(manager.get_data()).into();
        assert_eq!(manager.md5(), Some(expected));
        assert_eq!(payload.md5(), expected);
        assert_eq!(payload.data().len(), SMALL_PAYLOAD_LEN);
    }

    #[test]
    fn test_regenerate_replaces_payload() {
        let manager = DataManager::new();
        manager.generate(PayloadSize::Custom(1024));
        let before = manager.md5();
        manager.generate(PayloadSize::Custom(1024));
        assert_ne!(manager.md5(), before);
    }

    #[test]
    fn test_clear() {
        let manager = DataManager::new();
        manager.generate(PayloadSize::Custom(16));
        manager.clear();
        assert!(manager.get_data().is_empty());
    }

    #[test]
    fn test_size_classes() {
        assert_eq!(PayloadSize::Small.len(), 512_000);
        assert_eq!(PayloadSize::Large.len(), 52_428_800);
        assert_eq!(PayloadSize::Custom(7).len(), 7);
    }
}
