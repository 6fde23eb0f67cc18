//! Discriminants, classes and the predefined values every runtime starts with.
//!
//! A discriminant is an object describing other values. Classes are
//! discriminants that also list their ancestors and field names, which makes
//! [`Runtime::is_subclass_of`] a constant-time index.

use enum_ordinalize::Ordinalize;

use super::layout::{multiple_slots, object_fields, string_data};
use super::{Magic, Slot, Value};
use crate::runtime::Runtime;

/// Field index of the name of any named object.
pub const FNAMED_NAME: usize = 0;
/// Field index of a discriminant's method dictionary.
pub const FDISC_METHODICT: usize = 1;
pub const FDISC_SENDER: usize = 2;
/// Field index of a discriminant's super discriminant.
pub const FDISC_SUPER: usize = 3;
/// Field index of a class's ancestor multiple, root first.
pub const FCLASS_ANCESTORS: usize = 4;
/// Field index of a class's field-name multiple.
pub const FCLASS_FIELDS: usize = 5;
pub const FCLASS_DATA: usize = 6;

pub const DISCR_NB_FIELDS: usize = 4;
pub const CLASS_NB_FIELDS: usize = 7;

/// The values created at bootstrap and held as roots for the whole life of a
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predef {
    ClassRoot,
    ClassNamed,
    ClassDiscriminant,
    ClassClass,
    DiscrInteger,
    DiscrMixInt,
    DiscrMixLoc,
    DiscrPair,
    DiscrList,
    DiscrMultiple,
    DiscrString,
    DiscrStrBuf,
    DiscrRoutine,
    DiscrClosure,
    DiscrMapObjects,
    DiscrMapStrings,
    DiscrBucketLongs,
    DiscrSpecial,
}

impl Predef {
    pub const COUNT: usize = 18;

    pub const CLASSES: [Predef; 4] = [
        Predef::ClassRoot,
        Predef::ClassNamed,
        Predef::ClassDiscriminant,
        Predef::ClassClass,
    ];

    pub const DISCRIMINANTS: [Predef; 14] = [
        Predef::DiscrInteger,
        Predef::DiscrMixInt,
        Predef::DiscrMixLoc,
        Predef::DiscrPair,
        Predef::DiscrList,
        Predef::DiscrMultiple,
        Predef::DiscrString,
        Predef::DiscrStrBuf,
        Predef::DiscrRoutine,
        Predef::DiscrClosure,
        Predef::DiscrMapObjects,
        Predef::DiscrMapStrings,
        Predef::DiscrBucketLongs,
        Predef::DiscrSpecial,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Predef::ClassRoot => "CLASS_ROOT",
            Predef::ClassNamed => "CLASS_NAMED",
            Predef::ClassDiscriminant => "CLASS_DISCRIMINANT",
            Predef::ClassClass => "CLASS_CLASS",
            Predef::DiscrInteger => "DISCR_INTEGER",
            Predef::DiscrMixInt => "DISCR_MIXED_INTEGER",
            Predef::DiscrMixLoc => "DISCR_MIXED_LOCATION",
            Predef::DiscrPair => "DISCR_PAIR",
            Predef::DiscrList => "DISCR_LIST",
            Predef::DiscrMultiple => "DISCR_MULTIPLE",
            Predef::DiscrString => "DISCR_STRING",
            Predef::DiscrStrBuf => "DISCR_STRBUF",
            Predef::DiscrRoutine => "DISCR_ROUTINE",
            Predef::DiscrClosure => "DISCR_CLOSURE",
            Predef::DiscrMapObjects => "DISCR_MAP_OBJECTS",
            Predef::DiscrMapStrings => "DISCR_MAP_STRINGS",
            Predef::DiscrBucketLongs => "DISCR_BUCKET_LONGS",
            Predef::DiscrSpecial => "DISCR_SPECIAL",
        }
    }

    /// The magic of the values a predefined discriminant describes.
    pub fn instance_magic(self) -> Magic {
        match self {
            Predef::ClassRoot
            | Predef::ClassNamed
            | Predef::ClassDiscriminant
            | Predef::ClassClass => Magic::Object,
            Predef::DiscrInteger => Magic::Int,
            Predef::DiscrMixInt => Magic::MixInt,
            Predef::DiscrMixLoc => Magic::MixLoc,
            Predef::DiscrPair => Magic::Pair,
            Predef::DiscrList => Magic::List,
            Predef::DiscrMultiple => Magic::Multiple,
            Predef::DiscrString => Magic::String,
            Predef::DiscrStrBuf => Magic::StrBuf,
            Predef::DiscrRoutine => Magic::Routine,
            Predef::DiscrClosure => Magic::Closure,
            Predef::DiscrMapObjects => Magic::MapObjects,
            Predef::DiscrMapStrings => Magic::MapStrings,
            Predef::DiscrBucketLongs => Magic::BucketLongs,
            Predef::DiscrSpecial => Magic::Special,
        }
    }

    /// The predefined discriminant of non-object values of kind `magic`.
    pub fn discr_for(magic: Magic) -> Option<Predef> {
        Predef::DISCRIMINANTS
            .iter()
            .copied()
            .find(|p| p.instance_magic() == magic)
    }
}

const NAMED_FIELDS: [&str; 1] = ["named_name"];
const DISCR_FIELDS: [&str; 4] = ["named_name", "disc_methodict", "disc_sender", "disc_super"];
const CLASS_FIELDS: [&str; 7] = [
    "named_name",
    "disc_methodict",
    "disc_sender",
    "disc_super",
    "class_ancestors",
    "class_fields",
    "class_data",
];

// Bootstrap. Everything here is allocated straight into old space, so no
// rooting is needed between allocations.
impl Runtime {
    pub(crate) fn bootstrap_predefined(&mut self) {
        let object_num = Magic::Object.ordinal() as u32;
        let classes = Predef::CLASSES.map(|_| self.alloc_old_value(Magic::Object, CLASS_NB_FIELDS));
        let class_class = classes[3];
        for (which, class) in Predef::CLASSES.iter().zip(classes) {
            self.init_object(class, class_class, object_num);
            self.set_predef(*which, class);
        }
        let class_discriminant = classes[2];
        for which in Predef::DISCRIMINANTS {
            let discr = self.alloc_old_value(Magic::Object, DISCR_NB_FIELDS);
            let num = which.instance_magic().ordinal() as u32;
            self.init_object(discr, class_discriminant, num);
            self.set_predef(which, discr);
        }

        // Strings and multiples need their discriminants, so names come last.
        for which in Predef::DISCRIMINANTS {
            let name = self.old_string(which.name());
            unsafe { *object_fields(self.predef(which)).add(FNAMED_NAME) = Some(name) }
        }
        let field_lists: [&[&str]; 4] = [&[], &NAMED_FIELDS, &DISCR_FIELDS, &CLASS_FIELDS];
        for (depth, class) in classes.iter().enumerate() {
            let name = self.old_string(Predef::CLASSES[depth].name());
            let ancestors = self.old_multiple(&classes[..depth]);
            let names = field_lists[depth]
                .iter()
                .map(|n| Some(self.old_string(n)))
                .collect::<Vec<_>>();
            let fields = self.old_multiple_slots(&names);
            let superclass = depth.checked_sub(1).map(|d| classes[d]);
            unsafe {
                let f = object_fields(*class);
                *f.add(FNAMED_NAME) = Some(name);
                *f.add(FDISC_SUPER) = superclass;
                *f.add(FCLASS_ANCESTORS) = Some(ancestors);
                *f.add(FCLASS_FIELDS) = Some(fields);
            }
        }
    }

    fn old_string(&mut self, s: &str) -> Value {
        let v = self.alloc_old_value(Magic::String, s.len());
        v.set_discr(self.predef(Predef::DiscrString));
        unsafe { std::ptr::copy_nonoverlapping(s.as_ptr(), string_data(v), s.len()) }
        v
    }

    fn old_multiple(&mut self, elems: &[Value]) -> Value {
        let slots = elems.iter().map(|v| Some(*v)).collect::<Vec<_>>();
        self.old_multiple_slots(&slots)
    }

    fn old_multiple_slots(&mut self, elems: &[Slot]) -> Value {
        let v = self.alloc_old_value(Magic::Multiple, elems.len());
        v.set_discr(self.predef(Predef::DiscrMultiple));
        unsafe { std::ptr::copy_nonoverlapping(elems.as_ptr(), multiple_slots(v), elems.len()) }
        v
    }
}

// Reflection.
impl Runtime {
    /// Whether `v` is a class: an object whose discriminant is `CLASS_CLASS`.
    pub fn is_class(&self, v: Value) -> bool {
        v.is(Magic::Object)
            && v.discr() == self.predef(Predef::ClassClass)
            && v.len() >= CLASS_NB_FIELDS
    }

    /// Whether `sub` is `sup` or one of its subclasses.
    ///
    /// Never fails: anything that is not a class is simply not a subclass.
    pub fn is_subclass_of(&self, sub: Value, sup: Value) -> bool {
        if sub == sup {
            return true;
        }
        if !self.is_class(sub) || !self.is_class(sup) {
            return false;
        }
        if sup == self.predef(Predef::ClassRoot) {
            return true;
        }
        let (sub_anc, sup_anc) = match (
            sub.field(FCLASS_ANCESTORS).flatten(),
            sup.field(FCLASS_ANCESTORS).flatten(),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };
        // `sup` appears in the ancestors of `sub` exactly at its own depth.
        let depth = sup_anc.len();
        depth < sub_anc.len() && sub_anc.multiple_nth(depth).flatten() == Some(sup)
    }

    /// Whether the discriminant of `v` is `class` or one of its subclasses.
    pub fn is_a(&self, v: Value, class: Value) -> bool {
        self.is_subclass_of(v.discr(), class)
    }

    pub fn class_name(&self, class: Value) -> Option<String> {
        class.field(FNAMED_NAME)??.string_contents()
    }

    pub fn class_super(&self, class: Value) -> Slot {
        if !self.is_class(class) {
            return None;
        }
        class.field(FDISC_SUPER).flatten()
    }

    /// Field names of a class, inherited ones first.
    pub fn class_field_names(&self, class: Value) -> Option<Vec<String>> {
        if !self.is_class(class) {
            return None;
        }
        class
            .field(FCLASS_FIELDS)??
            .multiple_to_vec()?
            .into_iter()
            .map(|name| name?.string_contents())
            .collect()
    }

    /// Create a class named `name` deriving from `superclass`, with the
    /// superclass's fields followed by `new_fields`.
    ///
    /// Returns `None` if `superclass` is not a class.
    pub fn make_class(
        &mut self,
        name: &str,
        superclass: Value,
        new_fields: &[&str],
    ) -> Option<Value> {
        if !self.is_class(superclass) {
            return None;
        }
        let mut f = self.enter_frame("make_class", 4);
        f.set_var(0, superclass);

        let sup_ancestors = superclass.field(FCLASS_ANCESTORS)??.len();
        let ancestors = f.make_multiple(sup_ancestors + 1);
        f.set_var(1, ancestors);
        let superclass = f.value(0);
        let sup_ancestors = superclass.field(FCLASS_ANCESTORS)??;
        for idx in 0..sup_ancestors.len() {
            let anc = sup_ancestors.multiple_nth(idx)?;
            f.multiple_put(ancestors, idx, anc);
        }
        f.multiple_put(ancestors, sup_ancestors.len(), superclass);

        let inherited = superclass.field(FCLASS_FIELDS)??.len();
        let fields = f.make_multiple(inherited + new_fields.len());
        f.set_var(2, fields);
        let sup_fields = f.value(0).field(FCLASS_FIELDS)??;
        for idx in 0..inherited {
            let field_name = sup_fields.multiple_nth(idx)?;
            f.multiple_put(fields, idx, field_name);
        }
        for (idx, field_name) in new_fields.iter().enumerate() {
            let s = f.make_string(field_name);
            let fields = f.value(2);
            f.multiple_put(fields, inherited + idx, s);
        }

        let class_name = f.make_string(name);
        f.set_var(3, class_name);
        let class = f.alloc_value(Magic::Object, CLASS_NB_FIELDS);
        let class_class = f.predef(Predef::ClassClass);
        f.init_object(class, class_class, Magic::Object.ordinal() as u32);
        for (idx, var) in [(FNAMED_NAME, 3), (FDISC_SUPER, 0), (FCLASS_ANCESTORS, 1), (FCLASS_FIELDS, 2)] {
            let slot = f.var(var);
            f.put_field(class, idx, slot);
        }
        tracing::trace!(name, fields = inherited + new_fields.len(), "class created");
        Some(class)
    }

    /// Create an instance of `class` with every field empty.
    pub fn make_instance(&mut self, class: Value) -> Option<Value> {
        if !self.is_class(class) {
            return None;
        }
        let nfields = class.field(FCLASS_FIELDS)??.len();
        let mut f = self.enter_frame("make_instance", 1);
        f.set_var(0, class);
        let obj = f.alloc_value(Magic::Object, nfields);
        let class = f.value(0);
        f.init_object(obj, class, 0);
        Some(obj)
    }

    /// Bind `selector` to `method` in the method dictionary of `discr`,
    /// creating the dictionary if needed.
    pub fn put_method(&mut self, discr: Value, selector: Value, method: Value) {
        let mut f = self.enter_frame("put_method", 3);
        f.set_var(0, discr);
        f.set_var(1, selector);
        f.set_var(2, method);
        let dict = match discr.field(FDISC_METHODICT).flatten() {
            Some(dict) => dict,
            None => {
                let dict = f.make_map_objects(8);
                let discr = f.value(0);
                f.put_field(discr, FDISC_METHODICT, dict);
                dict
            }
        };
        let (selector, method) = (f.value(1), f.value(2));
        f.map_objects_put(dict, selector, method);
    }

    /// Find the method bound to `selector` in `discr` or its supers.
    pub fn lookup_method(&self, discr: Value, selector: Value) -> Slot {
        let mut cur = Some(discr);
        while let Some(d) = cur {
            if !d.is(Magic::Object) {
                return None;
            }
            if let Some(dict) = d.field(FDISC_METHODICT).flatten() {
                if let Some(method) = self.map_objects_get(dict, selector) {
                    return Some(method);
                }
            }
            cur = d.field(FDISC_SUPER).flatten();
        }
        None
    }

    /// Apply the method `selector` of the receiver's discriminant, passing the
    /// receiver as the first argument.
    pub fn send(&mut self, receiver: Value, selector: Value, args: &[Slot]) -> Slot {
        let method = self.lookup_method(receiver.discr(), selector)?;
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(Some(receiver));
        all.extend_from_slice(args);
        self.apply(method, &all)
    }
}
