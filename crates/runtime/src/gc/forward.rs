use std::ptr;

use super::old::OldSpace;
use super::young::YoungArena;
use crate::value::layout::{for_each_slot, value_size};
use crate::value::{HeaderFlags, Slot, Value};

/// Copies young values into old space during a minor collection.
///
/// Each copied value leaves a forwarding entry in its old place, so a value
/// reached twice is copied once. Copies are queued on a scan vector and their
/// fields forwarded in turn, until the vector is empty.
pub struct Forwarder<'a> {
    young_start: usize,
    young_end: usize,
    old: &'a mut dyn OldSpace,
    scan: Vec<Value>,
    copied_bytes: usize,
    copied_values: usize,
}

impl<'a> Forwarder<'a> {
    pub(crate) fn new(young: &YoungArena, old: &'a mut dyn OldSpace) -> Forwarder<'a> {
        Forwarder {
            young_start: young.start(),
            young_end: young.end(),
            old,
            scan: vec![],
            copied_bytes: 0,
            copied_values: 0,
        }
    }

    fn is_young(&self, v: Value) -> bool {
        v.addr() >= self.young_start && v.addr() < self.young_end
    }

    /// Forward the value held in `slot`, updating it in place.
    pub fn forward(&mut self, slot: &mut Slot) {
        if let Some(v) = *slot {
            *slot = Some(self.forward_value(v));
        }
    }

    /// The address `v` lives at after this collection. Old values are
    /// returned unchanged.
    pub fn forward_value(&mut self, v: Value) -> Value {
        if !self.is_young(v) {
            return v;
        }
        if let Some(copy) = v.forwarded_to() {
            return copy;
        }
        let size = value_size(v.magic(), v.len());
        let dst = self.old.allocate(size);
        unsafe { ptr::copy_nonoverlapping(v.addr() as *const u8, dst.as_ptr(), size) }
        let copy = Value::from_header(dst.cast());
        copy.set_flags(HeaderFlags::new());
        v.set_forwarding(copy);
        self.scan.push(copy);
        self.copied_bytes += size;
        self.copied_values += 1;
        copy
    }

    /// Forward every pointer field of the old value `v`.
    pub(crate) fn scan_fields(&mut self, v: Value) {
        unsafe { for_each_slot(v, |slot| self.forward(&mut *slot)) }
    }

    /// Scan copied values until no new copies appear.
    pub(crate) fn drain(&mut self) {
        while let Some(v) = self.scan.pop() {
            self.scan_fields(v);
        }
    }

    pub fn copied_bytes(&self) -> usize {
        self.copied_bytes
    }

    pub fn copied_values(&self) -> usize {
        self.copied_values
    }
}
