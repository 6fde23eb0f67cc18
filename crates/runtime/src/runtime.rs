//! The runtime context: one value owns the young arena, the old space and every
//! root source, and all allocating operations go through it.

mod maps;
mod objects;
#[cfg(test)]
mod test;

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use enum_ordinalize::Ordinalize;

use crate::config::GcConfig;
use crate::error::ConfigError;
use crate::gc::old::{OldSpace, SweepHeap};
use crate::gc::roots::{GlobalIndex, RootSet};
use crate::gc::young::{ArenaCursors, YoungArena, ARENA_GRANULE, STORE_SLACK};
use crate::gc::{CollectKind, GcStats};
use crate::special::SpecialRegistry;
use crate::value::layout::{align_up, value_size, ObjectBody};
use crate::value::{Magic, Predef, Slot, Value, ValueHeader, VALUE_ALIGN};

/// Seed of the object hash sequence.
const HASH_SEED: u32 = 0x2545_f491;

pub struct Runtime {
    pub(crate) config: GcConfig,
    pub(crate) young: YoungArena,
    pub(crate) old: Box<dyn OldSpace>,
    pub(crate) roots: RootSet,
    pub(crate) specials: SpecialRegistry,
    pub(crate) stats: GcStats,

    /// Bytes of the current reservation not yet allocated.
    reserved: usize,
    pub(crate) collecting: bool,
    forbid_gc: u32,
    hash_state: u32,
}

impl Runtime {
    /// Create a runtime over the bundled mark-sweep old space.
    pub fn new(config: GcConfig) -> Result<Runtime, ConfigError> {
        Runtime::with_old_space(config, Box::new(SweepHeap::new()))
    }

    /// Create a runtime over a host-provided old space.
    pub fn with_old_space(
        config: GcConfig,
        old: Box<dyn OldSpace>,
    ) -> Result<Runtime, ConfigError> {
        config.validate()?;
        let young = YoungArena::new(align_up(config.minor_size_bytes(), ARENA_GRANULE));
        let mut rt = Runtime {
            config,
            young,
            old,
            roots: RootSet::new(),
            specials: SpecialRegistry::new(),
            stats: GcStats::default(),
            reserved: 0,
            collecting: false,
            forbid_gc: 0,
            hash_state: HASH_SEED,
        };
        rt.bootstrap_predefined();
        tracing::debug!(
            young_size = rt.young.size(),
            old_live = rt.old.live_objects(),
            "runtime initialized"
        );
        Ok(rt)
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn arena_cursors(&self) -> ArenaCursors {
        self.young.cursors()
    }

    pub fn young_size(&self) -> usize {
        self.young.size()
    }

    /// Number of pending entries in the store list.
    pub fn store_list_len(&self) -> usize {
        self.young.store_len()
    }

    pub fn is_young(&self, v: Value) -> bool {
        self.young.contains(v)
    }

    pub fn old_live_objects(&self) -> usize {
        self.old.live_objects()
    }

    pub fn old_live_bytes(&self) -> usize {
        self.old.live_bytes()
    }

    /// Allocate `base + extra` zeroed bytes in the young arena, collecting first
    /// if they do not fit.
    ///
    /// An allocation covered by an earlier [`Runtime::reserve`] never collects.
    pub fn allocate(&mut self, base: usize, extra: usize) -> NonNull<u8> {
        let size = align_up(base + extra, VALUE_ALIGN);
        let needed = if self.reserved >= size {
            size
        } else {
            size + STORE_SLACK
        };
        if self.young.free() < needed {
            self.collect(size + STORE_SLACK, CollectKind::AllowMajor);
            self.reserved = 0;
        }
        let ptr = match self.young.bump(size) {
            Some(ptr) => ptr,
            None => gc_fatal!(self, "young arena cannot hold {} bytes", size),
        };
        self.reserved = self.reserved.saturating_sub(size);
        ptr
    }

    /// Make sure the next `bytes` of allocation happen without a collection.
    ///
    /// Store-list entries are taken from the same room, so `reserve(k * WORD)`
    /// also covers `k` barrier entries beyond the usual slack.
    pub fn reserve(&mut self, bytes: usize) {
        let bytes = align_up(bytes, VALUE_ALIGN);
        if self.young.free() < bytes + STORE_SLACK {
            self.collect(bytes + STORE_SLACK, CollectKind::AllowMajor);
        }
        self.reserved = bytes;
    }

    /// Record that `v` may now hold a pointer to a young value.
    ///
    /// Must be called after every store of a young pointer into a value that
    /// might be old. Touching a young value does nothing. Each touch of a
    /// distinct old value takes one word of the young arena; an ordinary
    /// allocation leaves room for 64 of them, and `reserve(k * WORD)` makes
    /// room for `k` more.
    pub fn touch(&mut self, v: Value) {
        if self.young.contains(v) {
            return;
        }
        if !self.young.record_store(v) {
            gc_fatal!(self, "store list overflow while touching {:?}", v);
        }
        tracing::trace!(value = ?v, entries = self.young.store_len(), "touched");
    }

    /// Touch `v` after `stored` was written into it, if `stored` is young.
    pub fn touch_if_young(&mut self, v: Value, stored: Slot) {
        if stored.map_or(false, |s| self.young.contains(s)) {
            self.touch(v);
        }
    }

    /// Allocate a young value of the given kind with its header filled in,
    /// except for the discriminant.
    pub(crate) fn alloc_value(&mut self, magic: Magic, len: usize) -> Value {
        let len32 = match u32::try_from(len) {
            Ok(len) => len,
            Err(_) => gc_fatal!(self, "{:?} of length {} is too large", magic, len),
        };
        let ptr = self.allocate(value_size(magic, len), 0);
        let v = Value::from_header(ptr.cast::<ValueHeader>());
        unsafe {
            (*v.header_ptr()).magic = magic.ordinal();
            (*v.header_ptr()).len = len32;
        }
        v
    }

    /// Allocate a value directly in old space. Only used for values created
    /// before the first mutator allocation.
    pub(crate) fn alloc_old_value(&mut self, magic: Magic, len: usize) -> Value {
        let ptr = self.old.allocate(value_size(magic, len));
        let v = Value::from_header(ptr.cast::<ValueHeader>());
        unsafe {
            (*v.header_ptr()).magic = magic.ordinal();
            (*v.header_ptr()).len = len as u32;
        }
        v
    }

    /// Fill in the object header fields of a freshly allocated object.
    pub(crate) fn init_object(&mut self, obj: Value, discr: Value, num: u32) {
        let hash = self.next_object_hash();
        obj.set_discr(discr);
        unsafe {
            let body = obj.body::<ObjectBody>();
            (*body).hash = hash;
            (*body).num = num;
        }
    }

    fn next_object_hash(&mut self) -> u32 {
        loop {
            let mut x = self.hash_state;
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            self.hash_state = x;
            // Hashes are kept to 30 bits and never zero.
            let hash = x & 0x3fff_ffff;
            if hash != 0 {
                return hash;
            }
        }
    }

    /// The predefined value `which`.
    pub fn predef(&self, which: Predef) -> Value {
        match self.roots.predef[which as usize] {
            Some(v) => v,
            None => gc_fatal!(self, "predefined {} is missing", which.name()),
        }
    }

    pub(crate) fn set_predef(&mut self, which: Predef, v: Value) {
        self.roots.predef[which as usize] = Some(v);
    }

    /// Add a global slot, initialized to `init`.
    pub fn add_global(&mut self, init: Slot) -> GlobalIndex {
        self.roots.globals.add(init)
    }

    pub fn global(&self, idx: GlobalIndex) -> Slot {
        self.roots.globals.get(idx)
    }

    /// Store into a global slot. The chunk holding it is rescanned at the next
    /// minor collection.
    pub fn set_global(&mut self, idx: GlobalIndex, v: impl Into<Slot>) {
        self.roots.globals.set(idx, v.into())
    }

    /// Forbid collection until the returned guard is dropped. Any allocation
    /// that would need to collect while the guard lives is fatal.
    pub fn forbid_collection(&mut self) -> NoCollect<'_> {
        self.forbid_gc += 1;
        NoCollect { rt: self }
    }

    pub fn collection_forbidden(&self) -> bool {
        self.forbid_gc > 0
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let destroyed = self.specials.destroy_all();
        tracing::debug!(
            specials_destroyed = destroyed,
            minor = self.stats.minor_collections,
            major = self.stats.major_collections,
            "runtime dropped"
        );
    }
}

/// A runtime borrowed with collection forbidden.
pub struct NoCollect<'rt> {
    rt: &'rt mut Runtime,
}

impl Deref for NoCollect<'_> {
    type Target = Runtime;

    fn deref(&self) -> &Runtime {
        &*self.rt
    }
}

impl DerefMut for NoCollect<'_> {
    fn deref_mut(&mut self) -> &mut Runtime {
        &mut *self.rt
    }
}

impl Drop for NoCollect<'_> {
    fn drop(&mut self) {
        self.rt.forbid_gc -= 1;
    }
}
