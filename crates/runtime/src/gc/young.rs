//! The young generation: one contiguous birth region.
//!
//! Values are bump-allocated upward from `start`; store-list entries grow
//! downward from `end`. Both meet in the middle, so the region is full when
//! `cur` reaches `store`.

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::config::{KILOWORD, MAX_MINOR_SIZE_KW};
use crate::value::layout::align_up;
use crate::value::{Value, VALUE_ALIGN, WORD};

/// Number of entries in the direct-mapped touch cache.
pub const TOUCH_CACHE_SIZE: usize = 64;

/// Bytes an ordinary allocation leaves free for store-list entries.
pub const STORE_SLACK: usize = 64 * WORD;

/// Young arenas are sized in multiples of this.
pub const ARENA_GRANULE: usize = 4096;

/// A snapshot of the arena boundaries and cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaCursors {
    pub start: usize,
    pub cur: usize,
    pub store: usize,
    pub end: usize,
}

impl ArenaCursors {
    pub fn is_ordered(&self) -> bool {
        self.start <= self.cur && self.cur <= self.store && self.store <= self.end
    }
}

pub struct YoungArena {
    base: NonNull<u8>,
    layout: Layout,
    cur: usize,
    store: usize,
    /// Addresses recently pushed on the store list.
    touch_cache: [usize; TOUCH_CACHE_SIZE],
}

/// Largest young arena a collection grows to, besides the bytes it was
/// asked for.
pub const MAX_ARENA_HEADROOM: usize = MAX_MINOR_SIZE_KW * KILOWORD;

/// Size of the arena that follows a collection asked to make room for
/// `requested` bytes.
///
/// The headroom above `requested` is a quarter of it plus the configured
/// minor size, capped at [`MAX_ARENA_HEADROOM`].
pub fn next_arena_size(requested: usize, minor_size: usize) -> usize {
    let headroom = (requested / 4 + minor_size).min(MAX_ARENA_HEADROOM);
    align_up(requested + headroom, ARENA_GRANULE)
}

impl YoungArena {
    pub fn new(size: usize) -> YoungArena {
        let size = align_up(size.max(ARENA_GRANULE), ARENA_GRANULE);
        let layout = match Layout::from_size_align(size, ARENA_GRANULE) {
            Ok(layout) => layout,
            Err(_) => crate::fatal::oversized(size),
        };
        let base = unsafe { std::alloc::alloc_zeroed(layout) };
        let base = match NonNull::new(base) {
            Some(base) => base,
            None => std::alloc::handle_alloc_error(layout),
        };
        let start = base.as_ptr() as usize;
        YoungArena {
            base,
            layout,
            cur: start,
            store: start + size,
            touch_cache: [0; TOUCH_CACHE_SIZE],
        }
    }

    pub fn start(&self) -> usize {
        self.base.as_ptr() as usize
    }

    pub fn end(&self) -> usize {
        self.start() + self.layout.size()
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Bytes handed out so far.
    pub fn used(&self) -> usize {
        self.cur - self.start()
    }

    /// Bytes left between the allocation cursor and the store list.
    pub fn free(&self) -> usize {
        self.store - self.cur
    }

    pub fn cursors(&self) -> ArenaCursors {
        ArenaCursors {
            start: self.start(),
            cur: self.cur,
            store: self.store,
            end: self.end(),
        }
    }

    pub fn contains(&self, v: Value) -> bool {
        self.contains_addr(v.addr())
    }

    pub fn contains_addr(&self, addr: usize) -> bool {
        addr >= self.start() && addr < self.end()
    }

    /// Hand out `size` bytes, or `None` if they do not fit.
    ///
    /// The arena is allocated zeroed and never reused, so the bytes are zero.
    pub fn bump(&mut self, size: usize) -> Option<NonNull<u8>> {
        debug_assert_eq!(size % VALUE_ALIGN, 0);
        if self.free() < size {
            return None;
        }
        let ptr = self.cur as *mut u8;
        self.cur += size;
        NonNull::new(ptr)
    }

    /// Push `v` on the store list, unless the touch cache says it was pushed
    /// recently. Returns `false` if there is no room left.
    pub fn record_store(&mut self, v: Value) -> bool {
        let addr = v.addr();
        let idx = (addr / VALUE_ALIGN) % TOUCH_CACHE_SIZE;
        if self.touch_cache[idx] == addr {
            return true;
        }
        if self.free() < WORD {
            return false;
        }
        self.store -= WORD;
        unsafe { (self.store as *mut usize).write(addr) }
        self.touch_cache[idx] = addr;
        true
    }

    pub fn store_len(&self) -> usize {
        (self.end() - self.store) / WORD
    }

    /// Values on the store list, most recent first.
    pub fn store_entries(&self) -> impl Iterator<Item = Value> + '_ {
        (self.store..self.end())
            .step_by(WORD)
            .map(|entry| unsafe { Value::from_addr(*(entry as *const usize)) })
    }
}

impl Drop for YoungArena {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}
