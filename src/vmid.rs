//! Bounded-range VMID allocation.
//!
//! Proxmox addresses containers by numeric VMID and has no allocation
//! service of its own, so each backend instance carves identifiers out of
//! a configured closed-open range `[start, end)`.
//!
//! The cursor is never persisted: it is recomputed from the live inventory
//! on every successful connect via [`VmidAllocator::rebase`]. This holds
//! under a single-writer assumption - exactly one live backend process
//! manages a given range at a time. Two processes racing a connect against
//! the same range can allocate overlapping VMIDs; that limitation is
//! accepted, not defended against.

use crate::error::{Error, Result};
use std::sync::Mutex;

/// Monotonically increasing VMID cursor bounded by `[start, end)`.
///
/// Private to one backend instance. All methods are safe under concurrent
/// invocation; the critical sections are a single comparison and
/// increment.
#[derive(Debug)]
pub struct VmidAllocator {
    start: u32,
    end: u32,
    next: Mutex<u32>,
}

impl VmidAllocator {
    /// Creates an allocator over `[start, end)` with the cursor at `start`.
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            next: Mutex::new(start),
        }
    }

    /// Returns the inclusive lower bound of the range.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Returns the exclusive upper bound of the range.
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Returns the next VMID and advances the cursor.
    ///
    /// Once the cursor reaches `end`, fails with [`Error::VmidExhausted`].
    /// Exhaustion is surfaced, never auto-recovered: the range is not
    /// implicitly extended and freed VMIDs are not reused within a
    /// connection.
    pub fn allocate(&self) -> Result<u32> {
        let mut next = self
            .next
            .lock()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
        if *next >= self.end {
            return Err(Error::VmidExhausted {
                start: self.start,
                end: self.end,
            });
        }
        let vmid = *next;
        *next += 1;
        Ok(vmid)
    }

    /// Recomputes the cursor from the live inventory.
    ///
    /// The cursor lands one past the highest VMID seen, bounded below by
    /// the configured start. VMIDs outside the managed range still advance
    /// the cursor when they exceed it, so a range shared with manually
    /// created containers never collides with them.
    pub fn rebase(&self, live: impl IntoIterator<Item = u32>) {
        let mut cursor = self.start;
        for vmid in live {
            if vmid >= cursor {
                cursor = vmid + 1;
            }
        }
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        *next = cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_advances() {
        let alloc = VmidAllocator::new(100, 103);
        assert_eq!(alloc.allocate().unwrap(), 100);
        assert_eq!(alloc.allocate().unwrap(), 101);
        assert_eq!(alloc.allocate().unwrap(), 102);
        assert!(matches!(
            alloc.allocate(),
            Err(Error::VmidExhausted { start: 100, end: 103 })
        ));
    }

    #[test]
    fn test_rebase_from_inventory() {
        let alloc = VmidAllocator::new(1, 1000);
        alloc.rebase([5, 9, 12]);
        assert_eq!(alloc.allocate().unwrap(), 13);
    }

    #[test]
    fn test_rebase_empty_inventory_stays_at_start() {
        let alloc = VmidAllocator::new(200, 300);
        alloc.rebase([]);
        assert_eq!(alloc.allocate().unwrap(), 200);
    }

    #[test]
    fn test_rebase_ignores_lower_vmids() {
        let alloc = VmidAllocator::new(200, 300);
        alloc.rebase([5, 9, 12]);
        assert_eq!(alloc.allocate().unwrap(), 200);
    }
}
