//! Constructors and mutators.
//!
//! Constructors keep their `Value` arguments in a frame while they allocate.
//! Mutators call [`Runtime::touch`] after storing a pointer.

use crate::value::layout::*;
use crate::value::{Magic, Predef, RoutineFn, Slot, Value};

use super::Runtime;

impl Runtime {
    /// Allocate a non-object value with its predefined discriminant.
    pub(super) fn alloc_with_discr(&mut self, magic: Magic, len: usize) -> Value {
        let v = self.alloc_value(magic, len);
        let discr = match Predef::discr_for(magic) {
            Some(which) => self.predef(which),
            None => gc_fatal!(self, "{:?} has no predefined discriminant", magic),
        };
        v.set_discr(discr);
        v
    }

    pub fn make_int(&mut self, num: i64) -> Value {
        let v = self.alloc_with_discr(Magic::Int, 0);
        unsafe { (*v.body::<IntBody>()).num = num }
        v
    }

    pub fn make_mixint(&mut self, val: impl Into<Slot>, num: i64) -> Value {
        let mut f = self.enter_frame("make_mixint", 1);
        f.set_var(0, val);
        let v = f.alloc_with_discr(Magic::MixInt, 0);
        unsafe {
            let body = v.body::<MixIntBody>();
            (*body).ptrval = f.var(0);
            (*body).num = num;
        }
        v
    }

    pub fn make_mixloc(&mut self, val: impl Into<Slot>, num: i64, loc: u64) -> Value {
        let mut f = self.enter_frame("make_mixloc", 1);
        f.set_var(0, val);
        let v = f.alloc_with_discr(Magic::MixLoc, 0);
        unsafe {
            let body = v.body::<MixLocBody>();
            (*body).ptrval = f.var(0);
            (*body).num = num;
            (*body).loc = loc;
        }
        v
    }

    /// Replace the pointer part of a mixed integer or location.
    pub fn mixint_set(&mut self, mix: Value, val: impl Into<Slot>) {
        let val: Slot = val.into();
        unsafe {
            match mix.magic() {
                Magic::MixInt => (*mix.body::<MixIntBody>()).ptrval = val,
                Magic::MixLoc => (*mix.body::<MixLocBody>()).ptrval = val,
                _ => return,
            }
        }
        self.touch_if_young(mix, val);
    }

    pub fn make_pair(&mut self, head: impl Into<Slot>, tail: impl Into<Slot>) -> Value {
        let mut f = self.enter_frame("make_pair", 2);
        f.set_var(0, head);
        f.set_var(1, tail);
        let v = f.alloc_with_discr(Magic::Pair, 0);
        unsafe {
            let body = v.body::<PairBody>();
            (*body).head = f.var(0);
            (*body).tail = f.var(1);
        }
        v
    }

    pub fn set_pair_head(&mut self, pair: Value, head: impl Into<Slot>) {
        if !pair.is(Magic::Pair) {
            return;
        }
        let head: Slot = head.into();
        unsafe { (*pair.body::<PairBody>()).head = head }
        self.touch_if_young(pair, head);
    }

    pub fn set_pair_tail(&mut self, pair: Value, tail: impl Into<Slot>) {
        if !pair.is(Magic::Pair) {
            return;
        }
        let tail: Slot = tail.into();
        unsafe { (*pair.body::<PairBody>()).tail = tail }
        self.touch_if_young(pair, tail);
    }

    pub fn make_list(&mut self) -> Value {
        self.alloc_with_discr(Magic::List, 0)
    }

    /// Add `val` at the end of `list`.
    pub fn list_append(&mut self, list: Value, val: impl Into<Slot>) {
        if !list.is(Magic::List) {
            return;
        }
        let mut f = self.enter_frame("list_append", 2);
        f.set_var(0, list);
        f.set_var(1, val);
        let val = f.var(1);
        let pair = f.make_pair(val, Slot::None);
        let list = f.value(0);
        match list.list_last().flatten() {
            Some(last) => f.set_pair_tail(last, pair),
            None => unsafe { (*list.body::<ListBody>()).first = Some(pair) },
        }
        unsafe { (*list.body::<ListBody>()).last = Some(pair) }
        f.touch(list);
    }

    /// Add `val` at the front of `list`.
    pub fn list_prepend(&mut self, list: Value, val: impl Into<Slot>) {
        if !list.is(Magic::List) {
            return;
        }
        let mut f = self.enter_frame("list_prepend", 2);
        f.set_var(0, list);
        f.set_var(1, val);
        let (val, first) = (f.var(1), f.value(0).list_first().flatten());
        let pair = f.make_pair(val, first);
        let list = f.value(0);
        unsafe {
            let body = list.body::<ListBody>();
            (*body).first = Some(pair);
            if (*body).last.is_none() {
                (*body).last = Some(pair);
            }
        }
        f.touch(list);
    }

    /// Remove and return the first element of `list`.
    pub fn list_pop_front(&mut self, list: Value) -> Option<Slot> {
        let first = list.list_first()??;
        let next = first.pair_tail()?;
        unsafe {
            let body = list.body::<ListBody>();
            (*body).first = next;
            if next.is_none() {
                (*body).last = None;
            }
        }
        self.touch_if_young(list, next);
        first.pair_head()
    }

    pub fn make_multiple(&mut self, len: usize) -> Value {
        self.alloc_with_discr(Magic::Multiple, len)
    }

    pub fn make_multiple_from(&mut self, elems: &[Slot]) -> Value {
        let mut f = self.enter_frame("make_multiple_from", elems.len());
        for (idx, elem) in elems.iter().enumerate() {
            f.set_var(idx, *elem);
        }
        let v = f.make_multiple(elems.len());
        for idx in 0..elems.len() {
            unsafe { *multiple_slots(v).add(idx) = f.var(idx) }
        }
        v
    }

    /// Store into a multiple. Out-of-range indices are ignored.
    pub fn multiple_put(&mut self, mul: Value, idx: usize, val: impl Into<Slot>) {
        if !mul.is(Magic::Multiple) || idx >= mul.len() {
            return;
        }
        let val: Slot = val.into();
        unsafe { *multiple_slots(mul).add(idx) = val }
        self.touch_if_young(mul, val);
    }

    pub fn make_string(&mut self, s: &str) -> Value {
        let v = self.alloc_with_discr(Magic::String, s.len());
        unsafe { std::ptr::copy_nonoverlapping(s.as_ptr(), string_data(v), s.len()) }
        v
    }

    pub fn make_strbuf(&mut self) -> Value {
        self.alloc_with_discr(Magic::StrBuf, 0)
    }

    /// Append `s` to a string buffer, growing its storage as needed.
    pub fn strbuf_add(&mut self, buf: Value, s: &str) {
        if !buf.is(Magic::StrBuf) || s.is_empty() {
            return;
        }
        let mut f = self.enter_frame("strbuf_add", 1);
        f.set_var(0, buf);
        let (storage, start, end) = unsafe {
            let body = buf.body::<StrBufBody>();
            ((*body).storage, (*body).start as usize, (*body).end as usize)
        };
        let cap = storage.map_or(0, |st| st.len());
        if end + s.len() > cap {
            let used = end - start;
            let new_cap = ((used + s.len()) * 2).max(64);
            let storage = f.alloc_with_discr(Magic::String, new_cap);
            let buf = f.value(0);
            unsafe {
                let body = buf.body::<StrBufBody>();
                if let Some(old) = (*body).storage {
                    std::ptr::copy_nonoverlapping(
                        string_data(old).add(start),
                        string_data(storage),
                        used,
                    );
                }
                (*body).storage = Some(storage);
                (*body).start = 0;
                (*body).end = used as u32;
            }
            f.touch(buf);
        }
        let buf = f.value(0);
        unsafe {
            let body = buf.body::<StrBufBody>();
            let end = (*body).end as usize;
            if let Some(storage) = (*body).storage {
                std::ptr::copy_nonoverlapping(s.as_ptr(), string_data(storage).add(end), s.len());
            }
            (*body).end = (end + s.len()) as u32;
        }
    }

    /// Empty a string buffer, keeping its storage.
    pub fn strbuf_clear(&mut self, buf: Value) {
        if !buf.is(Magic::StrBuf) {
            return;
        }
        unsafe {
            let body = buf.body::<StrBufBody>();
            (*body).start = 0;
            (*body).end = 0;
        }
    }

    pub fn make_routine(&mut self, descr: &str, func: RoutineFn, nconsts: usize) -> Value {
        let mut f = self.enter_frame("make_routine", 1);
        let descr = f.make_string(descr);
        f.set_var(0, descr);
        let v = f.alloc_with_discr(Magic::Routine, nconsts);
        unsafe {
            let body = v.body::<RoutineBody>();
            (*body).func = Some(func);
            (*body).descr = f.var(0);
        }
        v
    }

    pub fn routine_put_const(&mut self, routine: Value, idx: usize, val: impl Into<Slot>) {
        if !routine.is(Magic::Routine) || idx >= routine.len() {
            return;
        }
        let val: Slot = val.into();
        unsafe { *routine_consts(routine).add(idx) = val }
        self.touch_if_young(routine, val);
    }

    pub fn make_closure(&mut self, routine: Value, nclosed: usize) -> Value {
        let mut f = self.enter_frame("make_closure", 1);
        f.set_var(0, routine);
        let v = f.alloc_with_discr(Magic::Closure, nclosed);
        unsafe { (*v.body::<ClosureBody>()).routine = f.var(0) }
        v
    }

    pub fn closure_put(&mut self, closure: Value, idx: usize, val: impl Into<Slot>) {
        if !closure.is(Magic::Closure) || idx >= closure.len() {
            return;
        }
        let val: Slot = val.into();
        unsafe { *closure_slots(closure).add(idx) = val }
        self.touch_if_young(closure, val);
    }

    /// Call the routine of `closure`. Anything but a closure over a routine
    /// with code yields `None`.
    ///
    /// The routine runs in a new frame holding `closure` as its current value
    /// and a copy of `args` as its variables.
    pub fn apply(&mut self, closure: Value, args: &[Slot]) -> Slot {
        let routine = closure.closure_routine()??;
        if !routine.is(Magic::Routine) {
            return None;
        }
        let func = unsafe { (*routine.body::<RoutineBody>()).func }?;
        let mut f = self.enter_frame("apply", args.len());
        f.set_current(closure);
        for (idx, arg) in args.iter().enumerate() {
            f.set_var(idx, *arg);
        }
        func(&mut f)
    }

    /// Store into an object field. Out-of-range indices are ignored.
    pub fn put_field(&mut self, obj: Value, idx: usize, val: impl Into<Slot>) {
        if !obj.is(Magic::Object) || idx >= obj.len() {
            return;
        }
        let val: Slot = val.into();
        unsafe { *object_fields(obj).add(idx) = val }
        self.touch_if_young(obj, val);
    }
}
