//! VT reference holder: tracks which virtual terminal a local X server is
//! running on and releases it exactly once.
//!
//! Grounded on the `vt`/`have_vt_ref` pair and `x_server_local_set_vt` in
//! `original_source/src/x-server-local.c` — the original keeps a boolean
//! next to the VT number because `vt_unref` must never be called twice for
//! one `vt_ref`, and `vt_ref`/`vt_unref` both take the VT number itself
//! (§6: "VT allocator: `ref(vt)`, `unref(vt)`"), not a number the allocator
//! chooses. Modeling the held/not-held pair as one `VtLease` whose `Drop`
//! does the unref makes the "released on stop and on drop" invariant
//! structural instead of something every caller has to remember.

use std::sync::Arc;

/// Collaborator seam for VT allocation. No real VT subsystem is implemented
/// here; tests and the CLI demo use [`NullVtAllocator`].
pub trait VtAllocator: Send + Sync {
    fn acquire(&self, vt: u32);
    fn release(&self, vt: u32);
}

/// Default allocator: a no-op stand-in for the real VT subsystem, which is
/// out of scope here. The supervisor still needs the seam so `LocalXServer`
/// can be built and tested without a real display-manager-owned VT pool.
pub struct NullVtAllocator;

impl VtAllocator for NullVtAllocator {
    fn acquire(&self, _vt: u32) {}
    fn release(&self, _vt: u32) {}
}

/// Owns at most one VT at a time. `held ⇔ vt.is_some()` is enforced by
/// construction: there is no way to observe a lease with a VT number but no
/// live allocation, or vice versa.
pub struct VtLease {
    allocator: Arc<dyn VtAllocator>,
    vt: Option<u32>,
}

impl VtLease {
    /// `requested < 0` means "unassigned" per §3's `vt: i32 (default -1)`;
    /// only `requested > 0` acquires a reference, matching `set_vt`'s
    /// `if (vt > 0) vt_ref(vt)`.
    pub fn acquire(allocator: Arc<dyn VtAllocator>, requested: i32) -> Self {
        let vt = if requested > 0 {
            allocator.acquire(requested as u32);
            Some(requested as u32)
        } else {
            None
        };
        Self { allocator, vt }
    }

    pub fn vt(&self) -> Option<u32> {
        self.vt
    }

    /// Release the VT now rather than waiting for drop. Calling this twice,
    /// or after `Drop` already ran, is a no-op.
    pub fn release(&mut self) {
        if let Some(vt) = self.vt.take() {
            self.allocator.release(vt);
        }
    }
}

impl Drop for VtLease {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingVtAllocator {
        acquired: Mutex<Vec<u32>>,
        released: Mutex<Vec<u32>>,
    }

    impl RecordingVtAllocator {
        fn new() -> Self {
            Self {
                acquired: Mutex::new(Vec::new()),
                released: Mutex::new(Vec::new()),
            }
        }
    }

    impl VtAllocator for RecordingVtAllocator {
        fn acquire(&self, vt: u32) {
            self.acquired.lock().unwrap().push(vt);
        }

        fn release(&self, vt: u32) {
            self.released.lock().unwrap().push(vt);
        }
    }

    #[test]
    fn negative_vt_holds_nothing() {
        let allocator = Arc::new(RecordingVtAllocator::new());
        let lease = VtLease::acquire(allocator.clone(), -1);
        assert_eq!(lease.vt(), None);
        assert!(allocator.acquired.lock().unwrap().is_empty());
    }

    #[test]
    fn zero_vt_holds_nothing() {
        let allocator = Arc::new(RecordingVtAllocator::new());
        let lease = VtLease::acquire(allocator.clone(), 0);
        assert_eq!(lease.vt(), None);
        assert!(allocator.acquired.lock().unwrap().is_empty());
    }

    #[test]
    fn positive_vt_acquires_the_requested_number() {
        let allocator = Arc::new(RecordingVtAllocator::new());
        let lease = VtLease::acquire(allocator.clone(), 7);
        assert_eq!(lease.vt(), Some(7));
        assert_eq!(*allocator.acquired.lock().unwrap(), vec![7]);
    }

    #[test]
    fn explicit_release_unrefs_exactly_once() {
        let allocator = Arc::new(RecordingVtAllocator::new());
        let mut lease = VtLease::acquire(allocator.clone(), 7);
        lease.release();
        lease.release();
        assert_eq!(*allocator.released.lock().unwrap(), vec![7]);
    }

    #[test]
    fn drop_releases_held_vt() {
        let allocator = Arc::new(RecordingVtAllocator::new());
        {
            let _lease = VtLease::acquire(allocator.clone(), 3);
        }
        assert_eq!(*allocator.released.lock().unwrap(), vec![3]);
    }

    #[test]
    fn drop_of_unassigned_lease_releases_nothing() {
        let allocator = Arc::new(RecordingVtAllocator::new());
        {
            let _lease = VtLease::acquire(allocator.clone(), -1);
        }
        assert!(allocator.released.lock().unwrap().is_empty());
    }
}
