//! Interned strings: one String value per distinct text, held as a root.

use fnv::FnvHashMap;
use smol_str::SmolStr;

use crate::gc::forward::Forwarder;
use crate::gc::mark::Marker;
use crate::runtime::Runtime;
use crate::value::Value;

#[derive(Default)]
pub(crate) struct InternTable {
    map: FnvHashMap<SmolStr, Value>,
}

impl InternTable {
    pub fn get(&self, s: &str) -> Option<Value> {
        self.map.get(s).copied()
    }

    pub fn insert(&mut self, s: SmolStr, v: Value) {
        self.map.insert(s, v);
    }

    pub fn remove(&mut self, s: &str) -> bool {
        self.map.remove(s).is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn forward(&mut self, fwd: &mut Forwarder) {
        for v in self.map.values_mut() {
            *v = fwd.forward_value(*v);
        }
    }

    pub fn mark(&self, marker: &mut Marker) {
        self.map.values().for_each(|v| marker.mark_value(*v));
    }
}

impl Runtime {
    /// The interned String value for `s`, created on first use.
    pub fn intern(&mut self, s: &str) -> Value {
        if let Some(v) = self.roots.interns.get(s) {
            return v;
        }
        let v = self.make_string(s);
        self.roots.interns.insert(s.into(), v);
        tracing::trace!(name = s, "interned");
        v
    }

    pub fn interned(&self, s: &str) -> Option<Value> {
        self.roots.interns.get(s)
    }

    /// Forget the interned value for `s`. Returns whether there was one.
    pub fn unintern(&mut self, s: &str) -> bool {
        self.roots.interns.remove(s)
    }

    pub fn interned_count(&self) -> usize {
        self.roots.interns.len()
    }
}
