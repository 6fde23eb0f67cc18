use crate::frame::FrameRegistry;
use crate::intern::InternTable;
use crate::module::ModuleRegistry;
use crate::value::{Predef, Slot};

use super::forward::Forwarder;
use super::mark::Marker;

/// Globals are grouped in chunks of this many slots.
pub const GLOBAL_CHUNK: usize = 16;

/// Index of a global slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalIndex(usize);

/// Global slots. A chunk is rescanned by a minor collection only if one of
/// its slots was stored into since the previous one.
#[derive(Default)]
pub(crate) struct Globals {
    slots: Vec<Slot>,
    touched: Vec<bool>,
}

impl Globals {
    pub fn add(&mut self, init: Slot) -> GlobalIndex {
        let idx = self.slots.len();
        self.slots.push(init);
        if idx % GLOBAL_CHUNK == 0 {
            self.touched.push(false);
        }
        self.touched[idx / GLOBAL_CHUNK] = true;
        GlobalIndex(idx)
    }

    pub fn get(&self, idx: GlobalIndex) -> Slot {
        self.slots[idx.0]
    }

    pub fn set(&mut self, idx: GlobalIndex, v: Slot) {
        self.slots[idx.0] = v;
        self.touched[idx.0 / GLOBAL_CHUNK] = true;
    }

    /// Forward the touched chunks and clear their flags. Returns the number
    /// of chunks scanned.
    pub fn forward_touched(&mut self, fwd: &mut Forwarder) -> usize {
        let mut scanned = 0;
        for (chunk, touched) in self.touched.iter_mut().enumerate() {
            if !*touched {
                continue;
            }
            let lo = chunk * GLOBAL_CHUNK;
            let hi = (lo + GLOBAL_CHUNK).min(self.slots.len());
            self.slots[lo..hi].iter_mut().for_each(|slot| fwd.forward(slot));
            *touched = false;
            scanned += 1;
        }
        scanned
    }

    pub fn mark_all(&self, marker: &mut Marker) {
        self.slots.iter().for_each(|slot| marker.mark(*slot));
    }
}

/// Every root source of a runtime.
pub(crate) struct RootSet {
    pub globals: Globals,
    pub predef: Vec<Slot>,
    pub interns: InternTable,
    pub frames: FrameRegistry,
    pub modules: ModuleRegistry,
}

impl RootSet {
    pub fn new() -> RootSet {
        RootSet {
            globals: Globals::default(),
            predef: vec![None; Predef::COUNT],
            interns: InternTable::default(),
            frames: FrameRegistry::default(),
            modules: ModuleRegistry::default(),
        }
    }

    /// Forward the roots of a minor collection, in order: touched globals,
    /// modules, frames, predefined values, interned strings.
    pub fn forward(&mut self, fwd: &mut Forwarder) {
        let chunks = self.globals.forward_touched(fwd);
        self.modules.forward(fwd);
        self.frames.for_each_root(|slot| fwd.forward(slot));
        self.predef.iter_mut().for_each(|slot| fwd.forward(slot));
        self.interns.forward(fwd);
        tracing::trace!(global_chunks = chunks, "roots forwarded");
    }

    /// Mark every root, all global chunks included.
    pub fn mark(&mut self, marker: &mut Marker) {
        self.globals.mark_all(marker);
        self.modules.mark(marker);
        self.frames.for_each_root(|slot| marker.mark(*slot));
        self.predef.iter().for_each(|slot| marker.mark(*slot));
        self.interns.mark(marker);
    }
}
