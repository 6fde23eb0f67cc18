use std::panic::{catch_unwind, AssertUnwindSafe};

use pretty_assertions::assert_eq;
use test_env_log::test;

use crate::value::{Predef, Slot};
use crate::{CollectKind, FrameGuard, GcConfig, Runtime};

fn runtime() -> Runtime {
    Runtime::new(GcConfig::default()).expect("failed to create runtime")
}

fn small_runtime() -> Runtime {
    Runtime::new(GcConfig::default().with_minor_size_kw(1)).expect("failed to create runtime")
}

fn ints(slots: Vec<Slot>) -> Vec<Option<i64>> {
    slots
        .into_iter()
        .map(|slot| slot.and_then(|v| v.as_int()))
        .collect()
}

#[test]
fn test_frames_unlink_on_early_return() {
    fn fallible(rt: &mut Runtime, input: &str) -> Result<i64, String> {
        let mut f = rt.enter_frame("fallible", 1);
        let n = f.make_int(7);
        f.set_var(0, n);
        let offset: i64 = input.parse().map_err(|_| format!("bad input {}", input))?;
        Ok(f.value(0).as_int().unwrap_or(0) + offset)
    }

    let mut rt = runtime();
    assert_eq!(fallible(&mut rt, "x"), Err("bad input x".to_owned()));
    assert_eq!(rt.frame_depth(), 0);
    assert_eq!(fallible(&mut rt, "1"), Ok(8));
    assert_eq!(rt.frame_depth(), 0);
}

#[test]
fn test_frames_unlink_on_unwind() {
    let mut rt = runtime();
    let result = catch_unwind(AssertUnwindSafe(|| {
        let _f = rt.enter_frame("unwinding", 2);
        panic!("unwinding through a frame");
    }));
    assert!(result.is_err());
    assert_eq!(rt.frame_depth(), 0);
}

#[test]
fn test_leaked_frames_are_repaired() {
    let mut rt = runtime();
    let mut outer = rt.enter_frame("outer", 0);
    std::mem::forget(outer.enter_frame("leaked", 1));
    assert_eq!(outer.frame_depth(), 2);
    drop(outer);
    assert_eq!(rt.frame_depth(), 0);
}

#[test]
fn test_backtrace_is_innermost_first() {
    let mut rt = runtime();
    let mut outer = rt.enter_frame("outer", 0);
    let inner = outer.enter_frame("inner", 0);
    assert_eq!(inner.backtrace(), vec!["inner", "outer"]);
}

#[test]
fn test_lists() {
    let mut rt = small_runtime();
    let mut f = rt.enter_frame("lists", 1);
    let list = f.make_list();
    f.set_var(0, list);
    assert_eq!(list.list_len(), Some(0));
    for i in 1..=3 {
        let n = f.make_int(i);
        let list = f.value(0);
        f.list_append(list, n);
    }
    let zero = f.make_int(0);
    let list = f.value(0);
    f.list_prepend(list, zero);
    let list = f.value(0);
    assert_eq!(
        ints(list.list_to_vec().expect("not a list")),
        vec![Some(0), Some(1), Some(2), Some(3)]
    );

    let first = f.list_pop_front(list).expect("empty list");
    assert_eq!(first.and_then(|v| v.as_int()), Some(0));
    f.collect(0, CollectKind::MinorOnly);
    let list = f.value(0);
    assert_eq!(
        ints(list.list_to_vec().expect("not a list")),
        vec![Some(1), Some(2), Some(3)]
    );

    for _ in 0..3 {
        f.list_pop_front(list);
    }
    assert_eq!(f.list_pop_front(list), None);
    assert_eq!(list.list_len(), Some(0));
    assert_eq!(list.list_last(), Some(None));
}

#[test]
fn test_multiples() {
    let mut rt = runtime();
    let a = rt.make_int(1);
    let b = rt.make_int(2);
    let mul = rt.make_multiple_from(&[Some(a), None, Some(b)]);
    assert_eq!(mul.multiple_len(), Some(3));
    assert_eq!(mul.multiple_nth(1), Some(None));
    assert_eq!(mul.multiple_nth(3), None);

    rt.multiple_put(mul, 1, a);
    rt.multiple_put(mul, 7, a);
    assert_eq!(
        ints(mul.multiple_to_vec().expect("not a multiple")),
        vec![Some(1), Some(1), Some(2)]
    );
}

#[test]
fn test_mixed_integers() {
    let mut rt = runtime();
    let s = rt.make_string("label");
    let mix = rt.make_mixint(s, 7);
    assert_eq!(mix.as_int(), Some(7));
    assert_eq!(mix.mix_value(), Some(Some(s)));

    let loc = rt.make_mixloc(Slot::None, 3, 0xbeef);
    assert_eq!(loc.as_int(), Some(3));
    assert_eq!(loc.mixloc_location(), Some(0xbeef));
    rt.mixint_set(loc, s);
    assert_eq!(loc.mix_value(), Some(Some(s)));
    assert_eq!(s.mixloc_location(), None);
}

#[test]
fn test_strbuf_grows_across_collections() {
    let mut rt = small_runtime();
    let mut f = rt.enter_frame("strbuf", 1);
    let buf = f.make_strbuf();
    f.set_var(0, buf);
    assert_eq!(buf.strbuf_contents().as_deref(), Some(""));

    let mut expected = String::new();
    for i in 0..200 {
        let piece = format!("{},", i);
        expected.push_str(&piece);
        let buf = f.value(0);
        f.strbuf_add(buf, &piece);
        f.make_int(i);
        f.make_int(-i);
    }
    assert!(f.stats().minor_collections > 0);
    let buf = f.value(0);
    assert_eq!(buf.strbuf_contents(), Some(expected));

    f.strbuf_clear(buf);
    assert_eq!(buf.strbuf_contents().as_deref(), Some(""));
    f.strbuf_add(buf, "again");
    assert_eq!(buf.strbuf_contents().as_deref(), Some("again"));
}

#[test]
fn test_string_maps() {
    let mut rt = small_runtime();
    let mut f = rt.enter_frame("string_maps", 1);
    let map = f.make_map_strings(4);
    f.set_var(0, map);
    for i in 0..200 {
        let n = f.make_int(i);
        let map = f.value(0);
        f.map_strings_put(map, &format!("k{}", i), n);
    }
    assert!(f.stats().minor_collections > 0);

    let map = f.value(0);
    assert_eq!(f.map_count(map), Some(200));
    assert!(f.map_capacity(map).unwrap_or(0) >= 200);
    for i in 0..200 {
        let got = f.map_strings_get(map, &format!("k{}", i));
        assert_eq!(got.and_then(|v| v.as_int()), Some(i), "key k{}", i);
    }

    for i in (0..200).step_by(2) {
        let removed = f.map_strings_remove(map, &format!("k{}", i));
        assert_eq!(removed.and_then(|v| v.as_int()), Some(i));
    }
    f.full_collect();
    let map = f.value(0);
    assert_eq!(f.map_count(map), Some(100));
    assert_eq!(f.map_entries(map).map(|e| e.len()), Some(100));
    for i in 0..200 {
        let got = f.map_strings_get(map, &format!("k{}", i));
        let expected = if i % 2 == 0 { None } else { Some(i) };
        assert_eq!(got.and_then(|v| v.as_int()), expected, "key k{}", i);
    }
}

#[test]
fn test_string_map_overwrite() {
    let mut rt = runtime();
    let map = rt.make_map_strings(2);
    let one = rt.make_int(1);
    let two = rt.make_int(2);
    rt.map_strings_put(map, "key", one);
    rt.map_strings_put(map, "key", two);
    assert_eq!(rt.map_count(map), Some(1));
    assert_eq!(rt.map_strings_get(map, "key"), Some(two));
    assert_eq!(rt.map_strings_get(map, "other"), None);
    assert_eq!(rt.map_strings_remove(map, "other"), None);

    rt.set_map_aux(map, one);
    assert_eq!(rt.map_aux(map), Some(one));
}

#[test]
fn test_object_maps() {
    let mut rt = small_runtime();
    let root = rt.predef(Predef::ClassRoot);
    let mut f = rt.enter_frame("object_maps", 2);
    let keys = f.make_multiple(50);
    f.set_var(0, keys);
    for i in 0..50 {
        let key = f.make_instance(root).expect("instance");
        let keys = f.value(0);
        f.multiple_put(keys, i, key);
    }
    let map = f.make_map_objects(0);
    f.set_var(1, map);
    for i in 0..50 {
        let n = f.make_int(i as i64);
        let (keys, map) = (f.value(0), f.value(1));
        let key = keys.multiple_nth(i).flatten().expect("key");
        f.map_objects_put(map, key, n);
    }
    f.full_collect();

    let (keys, map) = (f.value(0), f.value(1));
    let key = |i: usize| keys.multiple_nth(i).flatten().expect("key");
    assert_eq!(f.map_count(map), Some(50));
    for i in 0..50 {
        let got = f.map_objects_get(map, key(i));
        assert_eq!(got.and_then(|v| v.as_int()), Some(i as i64));
    }
    let removed = f.map_objects_remove(map, key(10));
    assert_eq!(removed.and_then(|v| v.as_int()), Some(10));
    assert_eq!(f.map_objects_get(map, key(10)), None);
    assert_eq!(
        f.map_objects_get(map, key(11)).and_then(|v| v.as_int()),
        Some(11)
    );

    let int = f.make_int(0);
    let map = f.value(1);
    f.map_objects_put(map, int, int);
    assert_eq!(f.map_count(map), Some(49), "non-object keys are ignored");
}

#[test]
fn test_buckets() {
    let mut rt = small_runtime();
    let mut f = rt.enter_frame("buckets", 1);
    let bucket = f.make_bucket_longs(2);
    f.set_var(0, bucket);
    for key in [5, 1, 9, 3, 7] {
        let v = f.make_int(key * 10);
        let bucket = f.value(0);
        let bucket = f.bucket_put(bucket, key, v);
        f.set_var(0, bucket);
    }
    let bucket = f.value(0);
    assert!(bucket.len() >= 5);
    let keys = f
        .bucket_entries(bucket)
        .expect("not a bucket")
        .into_iter()
        .map(|(key, _)| key)
        .collect::<Vec<_>>();
    assert_eq!(keys, vec![1, 3, 5, 7, 9]);

    f.collect(0, CollectKind::MinorOnly);
    let bucket = f.value(0);
    assert_eq!(f.bucket_get(bucket, 9).and_then(|v| v.as_int()), Some(90));
    assert_eq!(f.bucket_get(bucket, 4), None);

    let removed = f.bucket_remove(bucket, 5);
    assert_eq!(removed.and_then(|v| v.as_int()), Some(50));
    assert_eq!(f.bucket_count(bucket), Some(4));
    assert_eq!(f.bucket_get(bucket, 5), None);
    assert_eq!(f.bucket_remove(bucket, 5), None);
}

#[test]
fn test_full_bucket_returns_grown_copy() {
    let mut rt = runtime();
    let bucket = rt.make_bucket_longs(1);
    let label = rt.make_string("aux");
    rt.set_bucket_aux(bucket, label);
    let one = rt.make_int(1);
    let same = rt.bucket_put(bucket, 1, one);
    assert_eq!(same, bucket);

    let two = rt.make_int(2);
    let grown = rt.bucket_put(bucket, 2, two);
    assert_ne!(grown, bucket);
    assert_eq!(rt.bucket_count(bucket), Some(1), "full bucket unchanged");
    assert_eq!(rt.bucket_count(grown), Some(2));
    assert_eq!(grown.len(), 2);
    assert_eq!(rt.bucket_aux(grown), Some(label));
    assert_eq!(rt.bucket_get(grown, 1), Some(one));
    assert_eq!(rt.bucket_get(grown, 2), Some(two));
}

fn add_closed(f: &mut FrameGuard<'_>) -> Slot {
    if f.var_count() != 1 {
        return None;
    }
    let base = f.current()?.closure_nth(0)??.as_int()?;
    let arg = f.var(0)?.as_int()?;
    Some(f.make_int(base + arg))
}

/// Like `add_closed`, but collects before looking at the closure and the
/// argument.
fn collect_then_add_closed(f: &mut FrameGuard<'_>) -> Slot {
    f.collect(0, CollectKind::MinorOnly);
    let (closure, arg) = (f.current()?, f.var(0)?);
    assert!(!f.is_young(closure));
    assert!(!f.is_young(arg));
    let base = closure.closure_nth(0)??.as_int()?;
    Some(f.make_int(base + arg.as_int()?))
}

fn receiver_class_name(f: &mut FrameGuard<'_>) -> Slot {
    let receiver = f.var(0)?;
    let name = f.class_name(receiver.discr())?;
    Some(f.make_string(&name))
}

fn collect_then_receiver_class_name(f: &mut FrameGuard<'_>) -> Slot {
    f.collect(0, CollectKind::MinorOnly);
    receiver_class_name(f)
}

#[test]
fn test_apply_closure() {
    let mut rt = runtime();
    let routine = rt.make_routine("add_closed", add_closed, 0);
    assert_eq!(routine.routine_descr().as_deref(), Some("add_closed"));
    let closure = rt.make_closure(routine, 1);
    let base = rt.make_int(40);
    rt.closure_put(closure, 0, base);

    let two = rt.make_int(2);
    let result = rt.apply(closure, &[Some(two)]);
    assert_eq!(result.and_then(|v| v.as_int()), Some(42));
    assert_eq!(rt.apply(closure, &[]), None);
    assert_eq!(rt.apply(routine, &[Some(two)]), None, "not a closure");
    assert_eq!(rt.frame_depth(), 0);
}

#[test]
fn test_send_walks_superclasses() {
    let mut rt = runtime();
    let named = rt.predef(Predef::ClassNamed);
    let a = rt.make_class("CLASS_A", named, &[]).expect("class a");
    let b = rt.make_class("CLASS_B", a, &[]).expect("class b");
    let routine = rt.make_routine("receiver_class_name", receiver_class_name, 0);
    let method = rt.make_closure(routine, 0);
    let selector = rt.intern("class_name");
    rt.put_method(a, selector, method);

    let obj = rt.make_instance(b).expect("instance");
    assert_eq!(rt.lookup_method(b, selector), Some(method));
    let result = rt.send(obj, selector, &[]);
    assert_eq!(
        result.and_then(|v| v.string_contents()).as_deref(),
        Some("CLASS_B")
    );

    let unknown = rt.intern("unknown");
    assert_eq!(rt.send(obj, unknown, &[]), None);
}

#[test]
fn test_apply_roots_closure_and_arguments() {
    let mut rt = runtime();
    let routine = rt.make_routine("collect_then_add_closed", collect_then_add_closed, 0);
    let closure = rt.make_closure(routine, 1);
    let base = rt.make_int(40);
    rt.closure_put(closure, 0, base);
    let two = rt.make_int(2);

    let result = rt.apply(closure, &[Some(two)]);
    assert_eq!(rt.stats().minor_collections, 1);
    assert_eq!(result.and_then(|v| v.as_int()), Some(42));
    assert_eq!(rt.frame_depth(), 0);
}

#[test]
fn test_send_roots_receiver() {
    let mut rt = runtime();
    let named = rt.predef(Predef::ClassNamed);
    let a = rt.make_class("CLASS_A", named, &[]).expect("class a");
    let routine = rt.make_routine(
        "collect_then_receiver_class_name",
        collect_then_receiver_class_name,
        0,
    );
    let method = rt.make_closure(routine, 0);
    let selector = rt.intern("class_name");
    rt.put_method(a, selector, method);
    let obj = rt.make_instance(a).expect("instance");
    assert!(rt.is_young(obj));

    // Nothing but the send itself keeps the receiver alive.
    let result = rt.send(obj, selector, &[]);
    assert_eq!(rt.stats().minor_collections, 1);
    assert_eq!(
        result.and_then(|v| v.string_contents()).as_deref(),
        Some("CLASS_A")
    );
}

#[test]
fn test_interning() {
    let mut rt = small_runtime();
    let a = rt.intern("name");
    assert_eq!(rt.intern("name"), a);
    assert_eq!(rt.interned_count(), 1);

    rt.collect(0, CollectKind::MinorOnly);
    let moved = rt.interned("name").expect("interned value lost");
    assert!(!rt.is_young(moved));
    rt.full_collect();
    assert_eq!(rt.interned("name"), Some(moved));
    assert_eq!(moved.string_contents().as_deref(), Some("name"));
    assert_eq!(rt.intern("name"), moved);

    assert!(rt.unintern("name"));
    assert!(!rt.unintern("name"));
    assert_eq!(rt.interned("name"), None);
    assert_eq!(rt.interned_count(), 0);
}

#[test]
fn test_file_special_description() {
    let mut rt = runtime();
    let file = std::fs::File::open("Cargo.toml").expect("open manifest");
    let sp = rt.make_file_special(file);
    let descr = rt.describe_special(sp).expect("not a special");
    assert!(descr.starts_with("FILE: "), "{}", descr);
    assert!(rt.special_payload::<std::fs::File>(sp).is_some());
    assert!(rt.special_payload::<String>(sp).is_none());

    let kind = rt.register_special_kind(crate::SpecialDescriptor::new("PLAIN"));
    let plain = rt.make_special(kind, Box::new(1u8));
    assert_eq!(rt.describe_special(plain).as_deref(), Some("PLAIN special"));
    assert_eq!(plain.special_kind(), Some(kind.index()));
    let int = rt.make_int(0);
    assert_eq!(rt.describe_special(int), None);
}

#[test]
fn test_special_payload_mut() {
    let mut rt = runtime();
    let kind = rt.register_special_kind(crate::SpecialDescriptor::new("COUNTER"));
    let sp = rt.make_special(kind, Box::new(0u32));
    *rt.special_payload_mut::<u32>(sp).expect("payload") += 5;
    assert_eq!(rt.special_payload::<u32>(sp), Some(&5));
}
