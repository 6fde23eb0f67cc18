//! The tagged value model.
//!
//! Every heap value, young or old, starts with a [`ValueHeader`] whose first
//! word is the value's discriminant. The rest of the block is a kind-specific
//! `#[repr(C)]` body, see [`layout`].

pub mod class;
pub mod layout;
#[cfg(test)]
mod test;

use std::fmt;
use std::ptr::NonNull;

use enum_ordinalize::Ordinalize;
use modular_bitfield::prelude::*;

use crate::fatal;
use crate::frame::FrameGuard;
use layout::*;

pub use class::Predef;

/// Size of a machine word.
pub const WORD: usize = std::mem::size_of::<usize>();

/// Alignment (and size granularity) of every heap value.
pub const VALUE_ALIGN: usize = 2 * WORD;

/// A handle to a heap value.
///
/// A `Value` is a plain address. It stays valid across a collection only if it
/// is reachable from a root: a call frame variable, a global, a module, an
/// interned string, or a field of another reachable value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(NonNull<ValueHeader>);

/// A pointer-sized field that may be empty.
pub type Slot = Option<Value>;

/// The code pointer carried by a routine.
///
/// It runs in the frame entered by [`crate::Runtime::apply`]: the frame's current
/// value is the closure being applied and its variables are the arguments.
/// Both are roots, so they stay valid across allocations when re-read from
/// the frame.
pub type RoutineFn = fn(&mut FrameGuard<'_>) -> Slot;

static_assertions::assert_eq_size!(Value, *mut ());
static_assertions::assert_eq_size!(Slot, *mut ());

/// The kind tag of a value.
///
/// Zero is never a valid magic, so a zeroed block is never mistaken for a
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ordinalize)]
#[repr(u16)]
pub enum Magic {
    Object = 1,
    Int = 2,
    MixInt = 3,
    MixLoc = 4,
    Pair = 5,
    List = 6,
    Multiple = 7,
    String = 8,
    StrBuf = 9,
    Routine = 10,
    Closure = 11,
    MapObjects = 12,
    MapStrings = 13,
    BucketLongs = 14,
    Special = 15,
}

impl Magic {
    pub fn is_map(self) -> bool {
        matches!(self, Magic::MapObjects | Magic::MapStrings)
    }
}

#[allow(clippy::all)]
#[bitfield]
#[repr(u16)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderFlags {
    /// The value has been copied out of the young arena; `discr` holds the copy.
    pub forwarded: bool,
    /// Old-space mark bit.
    pub marked: bool,
    #[skip]
    __: B14,
}

/// The common prefix of every heap value.
#[repr(C)]
pub struct ValueHeader {
    pub(crate) discr: Slot,
    pub(crate) magic: u16,
    pub(crate) flags: HeaderFlags,
    pub(crate) len: u32,
}

#[cfg(target_pointer_width = "64")]
static_assertions::assert_eq_size!(ValueHeader, [u64; 2]);

impl Value {
    pub(crate) fn from_header(ptr: NonNull<ValueHeader>) -> Value {
        Value(ptr)
    }

    /// # Safety
    ///
    /// `addr` must be the non-zero address of a value header.
    pub(crate) unsafe fn from_addr(addr: usize) -> Value {
        Value(NonNull::new_unchecked(addr as *mut ValueHeader))
    }

    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    pub(crate) fn header_ptr(self) -> *mut ValueHeader {
        self.0.as_ptr()
    }

    /// View this value as a pointer to the body type `T`.
    ///
    /// Dereferencing the result is only sound if `T` matches the value's magic.
    pub(crate) fn body<T>(self) -> *mut T {
        self.0.as_ptr().cast()
    }

    pub(crate) fn raw_magic(self) -> u16 {
        unsafe { (*self.header_ptr()).magic }
    }

    /// The kind of this value. An undecodable tag means the heap is corrupted.
    pub fn magic(self) -> Magic {
        let raw = self.raw_magic();
        match Magic::from_ordinal(raw) {
            Some(magic) => magic,
            None => fatal::corrupted(self, raw),
        }
    }

    pub fn is(self, magic: Magic) -> bool {
        self.raw_magic() == magic.ordinal()
    }

    /// The discriminant of this value.
    pub fn discr(self) -> Value {
        match unsafe { (*self.header_ptr()).discr } {
            Some(d) => d,
            None => fatal::missing_discr(self),
        }
    }

    pub(crate) fn set_discr(self, discr: Value) {
        unsafe { (*self.header_ptr()).discr = Some(discr) }
    }

    /// Length of the variable part: fields, elements, bytes or capacity
    /// depending on the kind.
    pub fn len(self) -> usize {
        unsafe { (*self.header_ptr()).len as usize }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub(crate) fn flags(self) -> HeaderFlags {
        unsafe { (*self.header_ptr()).flags }
    }

    pub(crate) fn set_flags(self, flags: HeaderFlags) {
        unsafe { (*self.header_ptr()).flags = flags }
    }

    /// If this young value was already copied, return its new address.
    pub(crate) fn forwarded_to(self) -> Option<Value> {
        let header = self.header_ptr();
        unsafe {
            if (*header).flags.forwarded() {
                (*header).discr
            } else {
                None
            }
        }
    }

    /// Overwrite this young value with a break-table entry pointing at `to`.
    pub(crate) fn set_forwarding(self, to: Value) {
        let header = self.header_ptr();
        unsafe {
            (*header).flags.set_forwarded(true);
            (*header).discr = Some(to);
        }
    }
}

// Read accessors. Each returns `None` when the value has another kind.
impl Value {
    pub fn as_int(self) -> Option<i64> {
        unsafe {
            match self.magic() {
                Magic::Int => Some((*self.body::<IntBody>()).num),
                Magic::MixInt => Some((*self.body::<MixIntBody>()).num),
                Magic::MixLoc => Some((*self.body::<MixLocBody>()).num),
                Magic::Object => Some((*self.body::<ObjectBody>()).num as i64),
                _ => None,
            }
        }
    }

    /// The pointer part of a mixed integer or mixed location.
    pub fn mix_value(self) -> Option<Slot> {
        unsafe {
            match self.magic() {
                Magic::MixInt => Some((*self.body::<MixIntBody>()).ptrval),
                Magic::MixLoc => Some((*self.body::<MixLocBody>()).ptrval),
                _ => None,
            }
        }
    }

    pub fn mixloc_location(self) -> Option<u64> {
        self.is(Magic::MixLoc)
            .then(|| unsafe { (*self.body::<MixLocBody>()).loc })
    }

    pub fn pair_head(self) -> Option<Slot> {
        self.is(Magic::Pair)
            .then(|| unsafe { (*self.body::<PairBody>()).head })
    }

    pub fn pair_tail(self) -> Option<Slot> {
        self.is(Magic::Pair)
            .then(|| unsafe { (*self.body::<PairBody>()).tail })
    }

    pub fn list_first(self) -> Option<Slot> {
        self.is(Magic::List)
            .then(|| unsafe { (*self.body::<ListBody>()).first })
    }

    pub fn list_last(self) -> Option<Slot> {
        self.is(Magic::List)
            .then(|| unsafe { (*self.body::<ListBody>()).last })
    }

    /// Number of pairs in a list.
    pub fn list_len(self) -> Option<usize> {
        Some(self.list_pairs()?.count())
    }

    /// The heads of every pair in a list.
    pub fn list_to_vec(self) -> Option<Vec<Slot>> {
        Some(
            self.list_pairs()?
                .map(|pair| unsafe { (*pair.body::<PairBody>()).head })
                .collect(),
        )
    }

    fn list_pairs(self) -> Option<impl Iterator<Item = Value>> {
        let first = self.list_first()?;
        Some(std::iter::successors(first, |pair| unsafe {
            (*pair.body::<PairBody>()).tail
        }))
    }

    pub fn multiple_len(self) -> Option<usize> {
        self.is(Magic::Multiple).then(|| self.len())
    }

    /// The `idx`-th element of a multiple, or `None` if out of bounds.
    pub fn multiple_nth(self, idx: usize) -> Option<Slot> {
        if !self.is(Magic::Multiple) || idx >= self.len() {
            return None;
        }
        unsafe { Some(*multiple_slots(self).add(idx)) }
    }

    pub fn multiple_to_vec(self) -> Option<Vec<Slot>> {
        (0..self.multiple_len()?)
            .map(|idx| self.multiple_nth(idx))
            .collect()
    }

    pub fn object_hash(self) -> Option<u32> {
        self.is(Magic::Object)
            .then(|| unsafe { (*self.body::<ObjectBody>()).hash })
    }

    pub fn object_num(self) -> Option<u32> {
        self.is(Magic::Object)
            .then(|| unsafe { (*self.body::<ObjectBody>()).num })
    }

    /// The `idx`-th field of an object.
    pub fn field(self, idx: usize) -> Option<Slot> {
        if !self.is(Magic::Object) || idx >= self.len() {
            return None;
        }
        unsafe { Some(*object_fields(self).add(idx)) }
    }

    /// The bytes of a string value.
    ///
    /// # Safety
    ///
    /// The returned slice is only valid until the next allocation.
    pub(crate) unsafe fn string_bytes<'a>(self) -> Option<&'a [u8]> {
        if !self.is(Magic::String) {
            return None;
        }
        Some(std::slice::from_raw_parts(string_data(self), self.len()))
    }

    pub fn string_contents(self) -> Option<String> {
        let bytes = unsafe { self.string_bytes()? };
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn strbuf_contents(self) -> Option<String> {
        if !self.is(Magic::StrBuf) {
            return None;
        }
        unsafe {
            let body = self.body::<StrBufBody>();
            let storage = match (*body).storage {
                Some(storage) => storage,
                None => return Some(String::new()),
            };
            let data = string_data(storage).add((*body).start as usize);
            let len = ((*body).end - (*body).start) as usize;
            let bytes = std::slice::from_raw_parts(data, len);
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    pub fn routine_descr(self) -> Option<String> {
        if !self.is(Magic::Routine) {
            return None;
        }
        unsafe { (*self.body::<RoutineBody>()).descr?.string_contents() }
    }

    pub fn routine_const(self, idx: usize) -> Option<Slot> {
        if !self.is(Magic::Routine) || idx >= self.len() {
            return None;
        }
        unsafe { Some(*routine_consts(self).add(idx)) }
    }

    pub fn closure_routine(self) -> Option<Slot> {
        self.is(Magic::Closure)
            .then(|| unsafe { (*self.body::<ClosureBody>()).routine })
    }

    pub fn closure_nth(self, idx: usize) -> Option<Slot> {
        if !self.is(Magic::Closure) || idx >= self.len() {
            return None;
        }
        unsafe { Some(*closure_slots(self).add(idx)) }
    }

    pub fn special_kind(self) -> Option<u32> {
        self.is(Magic::Special)
            .then(|| unsafe { (*self.body::<SpecialBody>()).kind })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Magic::from_ordinal(self.raw_magic()) {
            Some(magic) => write!(f, "{:?}@{:#x}", magic, self.addr()),
            None => write!(f, "?{}@{:#x}", self.raw_magic(), self.addr()),
        }
    }
}
