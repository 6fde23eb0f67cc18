//! The old generation.
//!
//! The young collector never frees old values. It only allocates promoted
//! copies through [`OldSpace`] and asks it to run a full collection, during
//! which the old space calls back into [`MajorHooks`].

use std::alloc::Layout;
use std::ptr::NonNull;

use fnv::FnvHashMap;
use mimalloc_rust_sys::basic_allocation::mi_free;
use mimalloc_rust_sys::heap::{mi_heap_malloc_aligned, mi_heap_new};
use mimalloc_rust_sys::types::mi_heap_t;

use super::mark::Marker;
use crate::value::{Value, VALUE_ALIGN};

/// What a full collection needs from the runtime.
pub trait MajorHooks {
    /// Mark every root, through the given marker.
    fn mark_roots(&mut self, marker: &mut Marker);

    /// Called once marking is done and before anything is freed.
    fn before_sweep(&mut self);
}

/// A non-moving heap that holds every value surviving a minor collection.
pub trait OldSpace {
    /// Allocate `size` zeroed bytes aligned to [`VALUE_ALIGN`].
    fn allocate(&mut self, size: usize) -> NonNull<u8>;

    /// Release one value.
    fn free(&mut self, value: Value);

    fn is_marked(&self, value: Value) -> bool;

    /// Run a full collection: mark from `hooks`, then reclaim the rest.
    fn collect(&mut self, hooks: &mut dyn MajorHooks);

    fn live_objects(&self) -> usize;

    fn live_bytes(&self) -> usize;
}

/// A mark-sweep old space over a private mimalloc heap. Mark bits live in the
/// value headers.
pub struct SweepHeap {
    mi_heap: *mut mi_heap_t,
    /// Every live block, by address, with its size.
    blocks: FnvHashMap<usize, usize>,
    live_bytes: usize,
}

impl SweepHeap {
    pub fn new() -> SweepHeap {
        SweepHeap {
            mi_heap: unsafe { mi_heap_new() },
            blocks: FnvHashMap::default(),
            live_bytes: 0,
        }
    }
}

impl Default for SweepHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl OldSpace for SweepHeap {
    fn allocate(&mut self, size: usize) -> NonNull<u8> {
        let ptr = unsafe { mi_heap_malloc_aligned(self.mi_heap, size, VALUE_ALIGN) } as *mut u8;
        let ptr = match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => match Layout::from_size_align(size, VALUE_ALIGN) {
                Ok(layout) => std::alloc::handle_alloc_error(layout),
                Err(_) => crate::fatal::oversized(size),
            },
        };
        unsafe { ptr.as_ptr().write_bytes(0, size) }
        self.blocks.insert(ptr.as_ptr() as usize, size);
        self.live_bytes += size;
        ptr
    }

    fn free(&mut self, value: Value) {
        if let Some(size) = self.blocks.remove(&value.addr()) {
            self.live_bytes -= size;
            unsafe { mi_free(value.addr() as *mut _) }
        }
    }

    fn is_marked(&self, value: Value) -> bool {
        value.flags().marked()
    }

    fn collect(&mut self, hooks: &mut dyn MajorHooks) {
        let mut marker = Marker::new();
        hooks.mark_roots(&mut marker);
        marker.drain();
        hooks.before_sweep();

        let before = self.blocks.len();
        let mut dead = vec![];
        for &addr in self.blocks.keys() {
            let v = unsafe { Value::from_addr(addr) };
            let mut flags = v.flags();
            if flags.marked() {
                flags.set_marked(false);
                v.set_flags(flags);
            } else {
                dead.push(v);
            }
        }
        for v in dead {
            self.free(v);
        }
        tracing::debug!(
            marked = marker.marked_count(),
            freed = before - self.blocks.len(),
            live_bytes = self.live_bytes,
            "old space swept"
        );
    }

    fn live_objects(&self) -> usize {
        self.blocks.len()
    }

    fn live_bytes(&self) -> usize {
        self.live_bytes
    }
}

impl Drop for SweepHeap {
    fn drop(&mut self) {
        for &addr in self.blocks.keys() {
            unsafe { mi_free(addr as *mut _) }
        }
    }
}
