use enum_ordinalize::Ordinalize;
use pretty_assertions::assert_eq;
use test_env_log::test;

use super::layout::{for_each_slot, value_size};
use super::{Magic, Predef, Slot, Value};
use crate::{GcConfig, Runtime};

fn runtime() -> Runtime {
    Runtime::new(GcConfig::default()).expect("failed to create runtime")
}

#[test]
fn test_magic_tags() {
    assert_eq!(Magic::from_ordinal(0), None, "zero is never a magic");
    assert_eq!(Magic::from_ordinal(2), Some(Magic::Int));
    assert_eq!(Magic::from_ordinal(16), None);
    assert!(Magic::MapStrings.is_map());
    assert!(!Magic::BucketLongs.is_map());
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_value_sizes() {
    let sizes = [
        (Magic::Int, 0),
        (Magic::Pair, 0),
        (Magic::Multiple, 3),
        (Magic::String, 3),
        (Magic::Object, 7),
        (Magic::MixLoc, 0),
        (Magic::BucketLongs, 2),
        (Magic::Special, 0),
    ]
    .iter()
    .map(|&(magic, len)| value_size(magic, len))
    .collect::<Vec<_>>();
    assert_eq!(sizes, vec![32, 32, 48, 32, 80, 48, 64, 32]);
}

#[test]
fn test_slots_visited() {
    let mut rt = runtime();
    let count = |v: Value| {
        let mut n = 0;
        unsafe { for_each_slot(v, |_| n += 1) }
        n
    };

    let int = rt.make_int(1);
    assert_eq!(count(int), 1, "only the discriminant");
    let pair = rt.make_pair(int, Slot::None);
    assert_eq!(count(pair), 3);
    let mul = rt.make_multiple(3);
    assert_eq!(count(mul), 4);

    let bucket = rt.make_bucket_longs(8);
    let bucket = rt.bucket_put(bucket, 1, int);
    let bucket = rt.bucket_put(bucket, 2, int);
    assert_eq!(count(bucket), 4, "discriminant, aux and the used entries");
}

#[test]
fn test_predefined_values() {
    let rt = runtime();
    let class_class = rt.predef(Predef::ClassClass);
    assert_eq!(class_class.discr(), class_class);
    for which in Predef::CLASSES {
        let class = rt.predef(which);
        assert!(rt.is_class(class), "{} is a class", which.name());
        assert_eq!(rt.class_name(class).as_deref(), Some(which.name()));
    }
    let class_discriminant = rt.predef(Predef::ClassDiscriminant);
    for which in Predef::DISCRIMINANTS {
        let discr = rt.predef(which);
        assert!(!rt.is_class(discr), "{} is not a class", which.name());
        assert_eq!(discr.discr(), class_discriminant);
        assert_eq!(
            discr.object_num(),
            Some(which.instance_magic().ordinal() as u32)
        );
        assert_eq!(rt.class_name(discr).as_deref(), Some(which.name()));
    }
}

#[test]
fn test_values_get_their_discriminant() {
    let mut rt = runtime();
    let int = rt.make_int(3);
    assert_eq!(int.discr(), rt.predef(Predef::DiscrInteger));
    let s = rt.make_string("x");
    assert_eq!(s.discr(), rt.predef(Predef::DiscrString));
    assert_eq!(Predef::discr_for(Magic::Object), None);
    assert_eq!(Predef::discr_for(Magic::Closure), Some(Predef::DiscrClosure));
}

#[test]
fn test_predefined_class_fields() {
    let rt = runtime();
    let names = rt
        .class_field_names(rt.predef(Predef::ClassClass))
        .expect("not a class");
    assert_eq!(
        names,
        vec![
            "named_name",
            "disc_methodict",
            "disc_sender",
            "disc_super",
            "class_ancestors",
            "class_fields",
            "class_data",
        ]
    );
    assert_eq!(
        rt.class_field_names(rt.predef(Predef::ClassRoot)),
        Some(vec![])
    );
    assert_eq!(rt.class_super(rt.predef(Predef::ClassRoot)), None);
    assert_eq!(
        rt.class_super(rt.predef(Predef::ClassNamed)),
        Some(rt.predef(Predef::ClassRoot))
    );
}

#[test]
fn test_subclass_predicate() {
    let mut rt = runtime();
    let root = rt.predef(Predef::ClassRoot);
    let named = rt.predef(Predef::ClassNamed);
    let a = rt.make_class("CLASS_A", named, &["a_x"]).expect("class a");
    let b = rt.make_class("CLASS_B", a, &["b_y"]).expect("class b");
    let c = rt.make_class("CLASS_C", named, &[]).expect("class c");

    assert!(rt.is_subclass_of(b, a));
    assert!(rt.is_subclass_of(b, named));
    assert!(rt.is_subclass_of(b, root));
    assert!(rt.is_subclass_of(a, a), "reflexive");
    assert!(!rt.is_subclass_of(a, b));
    assert!(!rt.is_subclass_of(named, a));
    assert!(!rt.is_subclass_of(b, c), "siblings are unrelated");

    let int = rt.make_int(1);
    assert!(!rt.is_subclass_of(int, a), "not a class");
    assert!(!rt.is_subclass_of(b, rt.predef(Predef::DiscrInteger)));
    assert!(rt.is_subclass_of(int, int));

    assert_eq!(rt.class_super(b), Some(a));
    assert_eq!(rt.class_name(b).as_deref(), Some("CLASS_B"));
    assert_eq!(
        rt.class_field_names(b).expect("not a class"),
        vec!["named_name", "a_x", "b_y"]
    );
}

#[test]
fn test_make_class_rejects_non_class() {
    let mut rt = runtime();
    let int = rt.make_int(0);
    assert_eq!(rt.make_class("CLASS_BAD", int, &[]), None);
    assert_eq!(rt.make_instance(int), None);
}

#[test]
fn test_instances() {
    let mut rt = Runtime::new(GcConfig::default().with_minor_size_kw(1)).expect("runtime");
    let named = rt.predef(Predef::ClassNamed);
    let mut f = rt.enter_frame("instances", 2);
    let a = f.make_class("CLASS_A", named, &["a_x", "a_y"]).expect("class a");
    f.set_var(0, a);
    let obj = f.make_instance(a).expect("instance");
    f.set_var(1, obj);
    assert_eq!(obj.len(), 3);
    assert_eq!(obj.field(2), Some(None));
    assert_eq!(obj.field(3), None);

    let s = f.make_string("y");
    let obj = f.value(1);
    f.put_field(obj, 2, s);
    f.full_collect();

    let (a, obj) = (f.value(0), f.value(1));
    assert!(f.is_a(obj, a));
    assert!(f.is_a(obj, named));
    assert!(!f.is_a(obj, f.predef(Predef::ClassClass)));
    let y = obj.field(2).flatten().expect("field lost");
    assert_eq!(y.string_contents().as_deref(), Some("y"));
}

#[test]
fn test_object_hash_survives_copy() {
    let mut rt = runtime();
    let root = rt.predef(Predef::ClassRoot);
    let mut f = rt.enter_frame("hash", 1);
    let obj = f.make_instance(root).expect("instance");
    f.set_var(0, obj);
    let hash = obj.object_hash().expect("not an object");
    assert_ne!(hash, 0);
    f.full_collect();
    let obj = f.value(0);
    assert!(!f.is_young(obj));
    assert_eq!(obj.object_hash(), Some(hash));
}

#[test]
#[should_panic(expected = "bad magic")]
fn test_corrupted_header_is_fatal() {
    let mut rt = runtime();
    let v = rt.make_int(0);
    unsafe { (*v.header_ptr()).magic = 99 }
    v.magic();
}
