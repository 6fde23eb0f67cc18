//! Call frames: the mutator's local roots.
//!
//! Every function that holds a [`Value`] across an allocation must keep it in
//! a frame variable, and re-read it after the allocation, since a collection
//! may have moved it.

use std::ops::{Deref, DerefMut};

use slotmap::SlotMap;

use crate::runtime::Runtime;
use crate::value::{Slot, Value};

slotmap::new_key_type! {pub struct FrameKey;}

pub(crate) struct CallFrame {
    pub name: &'static str,
    pub vars: Box<[Slot]>,
    /// The closure being run, if any.
    pub current: Slot,
    /// The caller's frame.
    pub prev: Option<FrameKey>,
}

/// The frame chain, top first.
#[derive(Default)]
pub(crate) struct FrameRegistry {
    frames: SlotMap<FrameKey, CallFrame>,
    top: Option<FrameKey>,
}

impl FrameRegistry {
    pub fn push(&mut self, name: &'static str, nvars: usize) -> FrameKey {
        let frame = CallFrame {
            name,
            vars: vec![None; nvars].into_boxed_slice(),
            current: None,
            prev: self.top,
        };
        let key = self.frames.insert(frame);
        self.top = Some(key);
        key
    }

    /// Unlink `key` from the chain.
    ///
    /// Frames above it were left behind by guards that never ran their
    /// destructor; they are unlinked too.
    pub fn pop(&mut self, key: FrameKey) {
        if !self.frames.contains_key(key) {
            tracing::warn!("popping a frame that is no longer linked");
            return;
        }
        while let Some(top) = self.top {
            let frame = match self.frames.remove(top) {
                Some(frame) => frame,
                None => break,
            };
            self.top = frame.prev;
            if top == key {
                return;
            }
            tracing::warn!(frame = frame.name, "unlinking a frame left on the chain");
        }
    }

    pub fn get(&self, key: FrameKey) -> Option<&CallFrame> {
        self.frames.get(key)
    }

    pub fn get_mut(&mut self, key: FrameKey) -> Option<&mut CallFrame> {
        self.frames.get_mut(key)
    }

    pub fn top(&self) -> Option<FrameKey> {
        self.top
    }

    fn chain(&self) -> impl Iterator<Item = &CallFrame> {
        std::iter::successors(self.top.and_then(|k| self.frames.get(k)), |frame| {
            frame.prev.and_then(|k| self.frames.get(k))
        })
    }

    pub fn depth(&self) -> usize {
        self.chain().count()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.chain().map(|frame| frame.name).collect()
    }

    /// Visit every root slot, top frame first: its variables, then its
    /// current closure.
    pub fn for_each_root(&mut self, mut f: impl FnMut(&mut Slot)) {
        let mut cur = self.top;
        while let Some(key) = cur {
            let frame = match self.frames.get_mut(key) {
                Some(frame) => frame,
                None => break,
            };
            frame.vars.iter_mut().for_each(&mut f);
            f(&mut frame.current);
            cur = frame.prev;
        }
    }
}

/// A linked call frame. It dereferences to the runtime, and unlinks itself
/// when dropped, unwinding included.
pub struct FrameGuard<'rt> {
    rt: &'rt mut Runtime,
    key: FrameKey,
}

impl Runtime {
    /// Link a new frame of `nvars` empty variables on top of the chain.
    pub fn enter_frame(&mut self, name: &'static str, nvars: usize) -> FrameGuard<'_> {
        let key = self.roots.frames.push(name, nvars);
        FrameGuard { rt: self, key }
    }

    pub fn frame_depth(&self) -> usize {
        self.roots.frames.depth()
    }

    pub fn top_frame(&self) -> Option<FrameKey> {
        self.roots.frames.top()
    }

    /// Names of the linked frames, innermost first.
    pub fn backtrace(&self) -> Vec<&'static str> {
        self.roots.frames.names()
    }
}

impl<'rt> FrameGuard<'rt> {
    pub fn key(&self) -> FrameKey {
        self.key
    }

    fn frame(&self) -> &CallFrame {
        match self.rt.roots.frames.get(self.key) {
            Some(frame) => frame,
            None => gc_fatal!(self.rt, "frame used after being unlinked"),
        }
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        if self.rt.roots.frames.get(self.key).is_none() {
            gc_fatal!(self.rt, "frame used after being unlinked");
        }
        match self.rt.roots.frames.get_mut(self.key) {
            Some(frame) => frame,
            None => unreachable!(),
        }
    }

    /// Number of variables in this frame.
    pub fn var_count(&self) -> usize {
        self.frame().vars.len()
    }

    pub fn var(&self, idx: usize) -> Slot {
        match self.frame().vars.get(idx) {
            Some(slot) => *slot,
            None => gc_fatal!(self.rt, "frame variable {} out of range", idx),
        }
    }

    /// The variable `idx`, which must not be empty.
    pub fn value(&self, idx: usize) -> Value {
        match self.var(idx) {
            Some(v) => v,
            None => gc_fatal!(self.rt, "frame variable {} is empty", idx),
        }
    }

    pub fn set_var(&mut self, idx: usize, v: impl Into<Slot>) {
        let v = v.into();
        match self.frame_mut().vars.get_mut(idx) {
            Some(slot) => *slot = v,
            None => gc_fatal!(self.rt, "frame variable {} out of range", idx),
        }
    }

    pub fn current(&self) -> Slot {
        self.frame().current
    }

    pub fn set_current(&mut self, v: impl Into<Slot>) {
        self.frame_mut().current = v.into();
    }
}

impl Deref for FrameGuard<'_> {
    type Target = Runtime;

    fn deref(&self) -> &Runtime {
        &*self.rt
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut Runtime {
        &mut *self.rt
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.rt.roots.frames.pop(self.key);
    }
}
