use crate::value::layout::{for_each_slot, SpecialBody};
use crate::value::{Magic, Slot, Value};

/// The marking entry point handed to an old space during a full collection.
///
/// Marking is iterative: newly marked values go on a stack which
/// [`Marker::drain`] empties, marking their fields in turn.
pub struct Marker {
    stack: Vec<Value>,
    marked: usize,
}

impl Marker {
    pub fn new() -> Marker {
        Marker {
            stack: vec![],
            marked: 0,
        }
    }

    pub fn mark(&mut self, slot: Slot) {
        if let Some(v) = slot {
            self.mark_value(v)
        }
    }

    pub fn mark_value(&mut self, v: Value) {
        let mut flags = v.flags();
        if flags.marked() {
            return;
        }
        flags.set_marked(true);
        v.set_flags(flags);
        self.marked += 1;
        self.stack.push(v);
    }

    /// Mark everything reachable from the values marked so far.
    pub fn drain(&mut self) {
        while let Some(v) = self.stack.pop() {
            if v.is(Magic::Special) {
                unsafe { (*v.body::<SpecialBody>()).marked = 1 }
            }
            unsafe { for_each_slot(v, |slot| self.mark(*slot)) }
        }
    }

    /// Number of values marked by this marker.
    pub fn marked_count(&self) -> usize {
        self.marked
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self::new()
    }
}
