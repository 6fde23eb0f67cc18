//! Special values: heap values owning an external resource.
//!
//! The resource itself is boxed in a side table, and the heap value only
//! carries its key. Copying the heap value therefore never duplicates the
//! resource, and the resource is destroyed exactly once: when its value is
//! found dead by a minor or full collection, or when the runtime is dropped.

use std::any::Any;
use std::fmt;
use std::fs::File;

use slotmap::{Key, KeyData, SlotMap};

use crate::gc::young::YoungArena;
use crate::runtime::Runtime;
use crate::value::layout::SpecialBody;
use crate::value::{Magic, Predef, Value};

slotmap::new_key_type! {pub struct PayloadKey;}

/// Identifies a registered kind of special value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecialKind(u32);

impl SpecialKind {
    /// Boxed [`std::fs::File`] handles.
    pub const FILE: SpecialKind = SpecialKind(0);

    pub fn index(self) -> u32 {
        self.0
    }
}

pub type DestroyFn = Box<dyn FnMut(Box<dyn Any>)>;
pub type FormatFn = Box<dyn Fn(&dyn Any) -> String>;

/// How to destroy and describe the payloads of one special kind.
pub struct SpecialDescriptor {
    pub name: &'static str,
    pub destroy: DestroyFn,
    pub format: Option<FormatFn>,
}

impl SpecialDescriptor {
    /// A kind whose payloads are simply dropped.
    pub fn new(name: &'static str) -> SpecialDescriptor {
        SpecialDescriptor {
            name,
            destroy: Box::new(|payload: Box<dyn Any>| drop(payload)),
            format: None,
        }
    }

    pub fn with_destroy(mut self, destroy: impl FnMut(Box<dyn Any>) + 'static) -> Self {
        self.destroy = Box::new(destroy);
        self
    }

    pub fn with_format(mut self, format: impl Fn(&dyn Any) -> String + 'static) -> Self {
        self.format = Some(Box::new(format));
        self
    }
}

impl fmt::Debug for SpecialDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecialDescriptor")
            .field("name", &self.name)
            .field("format", &self.format.is_some())
            .finish()
    }
}

pub(crate) struct SpecialRegistry {
    kinds: Vec<SpecialDescriptor>,
    payloads: SlotMap<PayloadKey, (SpecialKind, Box<dyn Any>)>,
    /// Specials allocated in the young arena since the last minor collection.
    new_specials: Vec<Value>,
    /// Specials living in old space.
    old_specials: Vec<Value>,
}

impl SpecialRegistry {
    pub fn new() -> SpecialRegistry {
        let file = SpecialDescriptor::new("FILE").with_format(|payload| {
            match payload.downcast_ref::<File>() {
                Some(file) => format!("{:?}", file),
                None => "<file>".to_owned(),
            }
        });
        SpecialRegistry {
            kinds: vec![file],
            payloads: SlotMap::with_key(),
            new_specials: vec![],
            old_specials: vec![],
        }
    }

    pub fn register(&mut self, descr: SpecialDescriptor) -> SpecialKind {
        self.kinds.push(descr);
        SpecialKind((self.kinds.len() - 1) as u32)
    }

    fn payload_key(v: Value) -> PayloadKey {
        let raw = unsafe { (*v.body::<SpecialBody>()).payload };
        PayloadKey::from(KeyData::from_ffi(raw))
    }

    fn is_marked(v: Value) -> bool {
        unsafe { (*v.body::<SpecialBody>()).marked != 0 }
    }

    /// Run the destructor of the payload of `v`, if it still has one.
    fn destroy(&mut self, v: Value) -> bool {
        let key = Self::payload_key(v);
        let (kind, payload) = match self.payloads.remove(key) {
            Some(entry) => entry,
            None => return false,
        };
        let descr = &mut self.kinds[kind.0 as usize];
        tracing::trace!(kind = descr.name, value = ?v, "destroying special");
        (descr.destroy)(payload);
        true
    }

    /// Sort the young specials after a minor collection: copied ones move to
    /// the old list, the rest are destroyed. Must run before the arena is
    /// released.
    pub fn after_minor(&mut self, young: &YoungArena) -> usize {
        let mut destroyed = 0;
        for v in std::mem::take(&mut self.new_specials) {
            debug_assert!(young.contains(v));
            match v.forwarded_to() {
                Some(copy) => self.old_specials.push(copy),
                None => destroyed += self.destroy(v) as usize,
            }
        }
        destroyed
    }

    pub fn clear_old_marks(&mut self) {
        for v in &self.old_specials {
            unsafe { (*v.body::<SpecialBody>()).marked = 0 }
        }
    }

    /// Destroy the old specials the marker did not reach.
    pub fn sweep_old(&mut self) -> usize {
        let (live, dead): (Vec<_>, Vec<_>) = std::mem::take(&mut self.old_specials)
            .into_iter()
            .partition(|v| Self::is_marked(*v));
        self.old_specials = live;
        dead.into_iter().filter(|v| self.destroy(*v)).count()
    }

    /// Destroy every payload still alive.
    pub fn destroy_all(&mut self) -> usize {
        self.new_specials.clear();
        self.old_specials.clear();
        let mut destroyed = 0;
        for (_, (kind, payload)) in self.payloads.drain() {
            (self.kinds[kind.0 as usize].destroy)(payload);
            destroyed += 1;
        }
        destroyed
    }

    pub fn live_payloads(&self) -> usize {
        self.payloads.len()
    }
}

impl Runtime {
    pub fn register_special_kind(&mut self, descr: SpecialDescriptor) -> SpecialKind {
        self.specials.register(descr)
    }

    /// Wrap `payload` in a new special value of the given kind.
    pub fn make_special(&mut self, kind: SpecialKind, payload: Box<dyn Any>) -> Value {
        if kind.0 as usize >= self.specials.kinds.len() {
            gc_fatal!(self, "unregistered special kind {}", kind.0);
        }
        let v = self.alloc_value(Magic::Special, 0);
        v.set_discr(self.predef(Predef::DiscrSpecial));
        let key = self.specials.payloads.insert((kind, payload));
        unsafe {
            let body = v.body::<SpecialBody>();
            (*body).kind = kind.0;
            (*body).payload = key.data().as_ffi();
        }
        self.specials.new_specials.push(v);
        v
    }

    pub fn make_file_special(&mut self, file: File) -> Value {
        self.make_special(SpecialKind::FILE, Box::new(file))
    }

    pub fn special_payload<T: Any>(&self, v: Value) -> Option<&T> {
        if !v.is(Magic::Special) {
            return None;
        }
        let (_, payload) = self.specials.payloads.get(SpecialRegistry::payload_key(v))?;
        payload.downcast_ref()
    }

    pub fn special_payload_mut<T: Any>(&mut self, v: Value) -> Option<&mut T> {
        if !v.is(Magic::Special) {
            return None;
        }
        let (_, payload) = self
            .specials
            .payloads
            .get_mut(SpecialRegistry::payload_key(v))?;
        payload.downcast_mut()
    }

    /// A human-readable description of a special value.
    pub fn describe_special(&self, v: Value) -> Option<String> {
        if !v.is(Magic::Special) {
            return None;
        }
        let (kind, payload) = self.specials.payloads.get(SpecialRegistry::payload_key(v))?;
        let descr = &self.specials.kinds[kind.0 as usize];
        Some(match &descr.format {
            Some(format) => format!("{}: {}", descr.name, format(&**payload)),
            None => format!("{} special", descr.name),
        })
    }

    /// Number of special payloads not yet destroyed.
    pub fn live_specials(&self) -> usize {
        self.specials.live_payloads()
    }
}
