//! `#[repr(C)]` bodies of every value kind, and the two questions a copying
//! collector asks about a block: how big is it, and where are its pointers.

use std::mem::size_of;
use std::ptr::addr_of_mut;

use super::{Magic, RoutineFn, Slot, Value, ValueHeader, VALUE_ALIGN};

#[repr(C)]
pub struct ObjectBody {
    pub header: ValueHeader,
    /// Identity hash, never zero.
    pub hash: u32,
    /// Object number. For discriminants, the magic of their instances.
    pub num: u32,
    pub fields: [Slot; 0],
}

#[repr(C)]
pub struct IntBody {
    pub header: ValueHeader,
    pub num: i64,
}

#[repr(C)]
pub struct MixIntBody {
    pub header: ValueHeader,
    pub ptrval: Slot,
    pub num: i64,
}

#[repr(C)]
pub struct MixLocBody {
    pub header: ValueHeader,
    pub ptrval: Slot,
    pub num: i64,
    pub loc: u64,
}

#[repr(C)]
pub struct PairBody {
    pub header: ValueHeader,
    pub head: Slot,
    pub tail: Slot,
}

#[repr(C)]
pub struct ListBody {
    pub header: ValueHeader,
    pub first: Slot,
    pub last: Slot,
}

#[repr(C)]
pub struct MultipleBody {
    pub header: ValueHeader,
    pub tab: [Slot; 0],
}

/// String bytes follow the header; `len` counts them, a NUL byte is kept after
/// the last one.
#[repr(C)]
pub struct StringBody {
    pub header: ValueHeader,
    pub bytes: [u8; 0],
}

/// A growable string buffer. The live text is `storage[start..end]`, where
/// `storage` is a String value whose `len` is the buffer capacity.
#[repr(C)]
pub struct StrBufBody {
    pub header: ValueHeader,
    pub storage: Slot,
    pub start: u32,
    pub end: u32,
}

#[repr(C)]
pub struct RoutineBody {
    pub header: ValueHeader,
    pub func: Option<RoutineFn>,
    pub descr: Slot,
    pub consts: [Slot; 0],
}

#[repr(C)]
pub struct ClosureBody {
    pub header: ValueHeader,
    pub routine: Slot,
    pub closed: [Slot; 0],
}

/// A hash map. `entries` is a Multiple of `2 * capacity` slots holding
/// alternating keys and values.
#[repr(C)]
pub struct MapBody {
    pub header: ValueHeader,
    pub count: u32,
    pub _pad: u32,
    pub aux: Slot,
    pub entries: Slot,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct LongEntry {
    pub key: i64,
    pub val: Slot,
}

/// Entries sorted by key; `len` is the capacity, `count` the number used.
#[repr(C)]
pub struct BucketBody {
    pub header: ValueHeader,
    pub aux: Slot,
    pub count: u32,
    pub _pad: u32,
    pub entries: [LongEntry; 0],
}

/// The payload itself lives in the special registry, keyed by `payload`.
#[repr(C)]
pub struct SpecialBody {
    pub header: ValueHeader,
    pub kind: u32,
    pub marked: u32,
    pub payload: u64,
}

pub const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Size in bytes of a block of the given kind and variable length.
pub fn value_size(magic: Magic, len: usize) -> usize {
    let slot = size_of::<Slot>();
    let raw = match magic {
        Magic::Object => size_of::<ObjectBody>() + len * slot,
        Magic::Int => size_of::<IntBody>(),
        Magic::MixInt => size_of::<MixIntBody>(),
        Magic::MixLoc => size_of::<MixLocBody>(),
        Magic::Pair => size_of::<PairBody>(),
        Magic::List => size_of::<ListBody>(),
        Magic::Multiple => size_of::<MultipleBody>() + len * slot,
        Magic::String => size_of::<StringBody>() + len + 1,
        Magic::StrBuf => size_of::<StrBufBody>(),
        Magic::Routine => size_of::<RoutineBody>() + len * slot,
        Magic::Closure => size_of::<ClosureBody>() + len * slot,
        Magic::MapObjects | Magic::MapStrings => size_of::<MapBody>(),
        Magic::BucketLongs => size_of::<BucketBody>() + len * size_of::<LongEntry>(),
        Magic::Special => size_of::<SpecialBody>(),
    };
    align_up(raw, VALUE_ALIGN)
}

pub(crate) unsafe fn object_fields(v: Value) -> *mut Slot {
    addr_of_mut!((*v.body::<ObjectBody>()).fields) as *mut Slot
}

pub(crate) unsafe fn multiple_slots(v: Value) -> *mut Slot {
    addr_of_mut!((*v.body::<MultipleBody>()).tab) as *mut Slot
}

pub(crate) unsafe fn string_data(v: Value) -> *mut u8 {
    addr_of_mut!((*v.body::<StringBody>()).bytes) as *mut u8
}

pub(crate) unsafe fn routine_consts(v: Value) -> *mut Slot {
    addr_of_mut!((*v.body::<RoutineBody>()).consts) as *mut Slot
}

pub(crate) unsafe fn closure_slots(v: Value) -> *mut Slot {
    addr_of_mut!((*v.body::<ClosureBody>()).closed) as *mut Slot
}

pub(crate) unsafe fn bucket_entries(v: Value) -> *mut LongEntry {
    addr_of_mut!((*v.body::<BucketBody>()).entries) as *mut LongEntry
}

/// Call `f` on every pointer slot of `v`, the discriminant first.
///
/// # Safety
///
/// `v` must be a live, non-forwarded value.
pub(crate) unsafe fn for_each_slot(v: Value, mut f: impl FnMut(*mut Slot)) {
    let header = v.header_ptr();
    f(addr_of_mut!((*header).discr));
    let len = v.len();
    let each = |base: *mut Slot, f: &mut dyn FnMut(*mut Slot)| {
        for idx in 0..len {
            f(base.add(idx))
        }
    };
    match v.magic() {
        Magic::Object => each(object_fields(v), &mut f),
        Magic::Int | Magic::String | Magic::Special => {}
        Magic::MixInt => f(addr_of_mut!((*v.body::<MixIntBody>()).ptrval)),
        Magic::MixLoc => f(addr_of_mut!((*v.body::<MixLocBody>()).ptrval)),
        Magic::Pair => {
            let body = v.body::<PairBody>();
            f(addr_of_mut!((*body).head));
            f(addr_of_mut!((*body).tail));
        }
        Magic::List => {
            let body = v.body::<ListBody>();
            f(addr_of_mut!((*body).first));
            f(addr_of_mut!((*body).last));
        }
        Magic::Multiple => each(multiple_slots(v), &mut f),
        Magic::StrBuf => f(addr_of_mut!((*v.body::<StrBufBody>()).storage)),
        Magic::Routine => {
            f(addr_of_mut!((*v.body::<RoutineBody>()).descr));
            each(routine_consts(v), &mut f);
        }
        Magic::Closure => {
            f(addr_of_mut!((*v.body::<ClosureBody>()).routine));
            each(closure_slots(v), &mut f);
        }
        Magic::MapObjects | Magic::MapStrings => {
            let body = v.body::<MapBody>();
            f(addr_of_mut!((*body).aux));
            f(addr_of_mut!((*body).entries));
        }
        Magic::BucketLongs => {
            let body = v.body::<BucketBody>();
            f(addr_of_mut!((*body).aux));
            let entries = bucket_entries(v);
            for idx in 0..(*body).count as usize {
                f(addr_of_mut!((*entries.add(idx)).val));
            }
        }
    }
}
