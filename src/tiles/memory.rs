//! Shared memory accounting for decoded tile buffers.
//!
//! Layers reserve their whole cache budget once, up front, and give it back
//! when they are dropped.

use crate::prelude::{Arc, Mutex};
use crate::{MapError, Result};

/// Default budget shared by all layers of a process: 512 MiB
pub const DEFAULT_MEMORY_LIMIT: usize = 512 * 1024 * 1024;

#[derive(Debug)]
struct Ledger {
    limit: usize,
    used: usize,
    allocations: usize,
}

/// Cloneable handle to a shared byte budget
#[derive(Debug, Clone)]
pub struct MemoryManager {
    ledger: Arc<Mutex<Ledger>>,
}

impl MemoryManager {
    pub fn new(limit: usize) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger {
                limit,
                used: 0,
                allocations: 0,
            })),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// True if `bytes` could be allocated right now
    pub fn is_available(&self, bytes: usize) -> bool {
        match self.ledger.lock() {
            Ok(ledger) => ledger.limit - ledger.used >= bytes,
            Err(_) => false,
        }
    }

    /// Reserve `bytes` under `tag`
    pub fn allocate(&self, tag: &str, bytes: usize) -> Result<MemoryHandle> {
        let mut ledger = self
            .ledger
            .lock()
            .map_err(|_| MapError::Runtime("memory ledger poisoned".to_string()))?;

        let available = ledger.limit - ledger.used;
        if bytes > available {
            log::warn!(
                "cannot reserve {} bytes for '{}', {} bytes available",
                bytes,
                tag,
                available
            );
            return Err(MapError::NotEnoughMemory {
                tag: tag.to_string(),
                requested: bytes,
                available,
            });
        }

        ledger.used += bytes;
        ledger.allocations += 1;
        log::debug!("reserved {} bytes for '{}'", bytes, tag);

        Ok(MemoryHandle {
            tag: tag.to_string(),
            bytes,
            ledger: Some(Arc::clone(&self.ledger)),
        })
    }

    pub fn used(&self) -> usize {
        self.ledger.lock().map(|l| l.used).unwrap_or(0)
    }

    pub fn limit(&self) -> usize {
        self.ledger.lock().map(|l| l.limit).unwrap_or(0)
    }

    /// Number of live reservations
    pub fn allocation_count(&self) -> usize {
        self.ledger.lock().map(|l| l.allocations).unwrap_or(0)
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT)
    }
}

/// A live reservation; released by [`MemoryHandle::free`] or on drop
#[derive(Debug)]
pub struct MemoryHandle {
    tag: String,
    bytes: usize,
    ledger: Option<Arc<Mutex<Ledger>>>,
}

impl MemoryHandle {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn is_freed(&self) -> bool {
        self.ledger.is_none()
    }

    /// Return the reservation to the shared budget. Idempotent.
    pub fn free(&mut self) {
        if let Some(ledger) = self.ledger.take() {
            if let Ok(mut ledger) = ledger.lock() {
                ledger.used = ledger.used.saturating_sub(self.bytes);
                ledger.allocations = ledger.allocations.saturating_sub(1);
            }
            log::debug!("released {} bytes for '{}'", self.bytes, self.tag);
        }
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let manager = MemoryManager::new(1000);
        let mut handle = manager.allocate("layer", 600).unwrap();

        assert_eq!(manager.used(), 600);
        assert!(!manager.is_available(500));
        assert!(manager.is_available(400));

        handle.free();
        handle.free();
        assert_eq!(manager.used(), 0);
        assert!(handle.is_freed());
    }

    #[test]
    fn test_over_budget() {
        let manager = MemoryManager::new(100);
        let err = manager.allocate("big", 101).unwrap_err();

        assert!(matches!(
            err,
            MapError::NotEnoughMemory { requested: 101, available: 100, .. }
        ));
        assert_eq!(manager.used(), 0);
    }

    #[test]
    fn test_drop_releases() {
        let manager = MemoryManager::new(100);
        {
            let _handle = manager.allocate("scoped", 80).unwrap();
            assert_eq!(manager.allocation_count(), 1);
        }
        assert_eq!(manager.used(), 0);
        assert_eq!(manager.allocation_count(), 0);
    }
}
