//! Hash maps keyed by objects or strings, and sorted buckets keyed by
//! integers.
//!
//! Maps use open addressing with linear probing over an entries Multiple of
//! alternating keys and values, so the collector sees them as ordinary
//! values. Removal shifts later entries back instead of leaving tombstones.

use std::hash::Hasher;
use std::ptr;

use fnv::FnvHasher;

use crate::value::layout::*;
use crate::value::{Magic, Slot, Value};

use super::Runtime;

const MIN_MAP_CAPACITY: usize = 4;

enum Probe {
    Found(usize),
    Vacant(usize),
}

fn text_hash(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

/// Hash of a key already stored in a map of the given kind.
fn stored_key_hash(kind: Magic, key: Value) -> u64 {
    match kind {
        Magic::MapStrings => text_hash(unsafe { key.string_bytes() }.unwrap_or_default()),
        _ => key.object_hash().unwrap_or(0) as u64,
    }
}

fn map_body(map: Value) -> Option<*mut MapBody> {
    map.magic().is_map().then(|| map.body::<MapBody>())
}

fn entries_of(map: Value) -> Option<Value> {
    unsafe { (*map_body(map)?).entries }
}

unsafe fn entry_key(entries: Value, idx: usize) -> Slot {
    *multiple_slots(entries).add(2 * idx)
}

unsafe fn set_entry(entries: Value, idx: usize, key: Slot, val: Slot) {
    let slots = multiple_slots(entries);
    *slots.add(2 * idx) = key;
    *slots.add(2 * idx + 1) = val;
}

/// Find `hash`'s entry among `entries`, using `matches` on the stored keys.
fn probe(entries: Value, hash: u64, matches: impl Fn(Value) -> bool) -> Option<Probe> {
    let cap = entries.len() / 2;
    let mask = cap - 1;
    let mut idx = hash as usize & mask;
    for _ in 0..cap {
        match unsafe { entry_key(entries, idx) } {
            None => return Some(Probe::Vacant(idx)),
            Some(key) if matches(key) => return Some(Probe::Found(idx)),
            Some(_) => idx = (idx + 1) & mask,
        }
    }
    None
}

fn find_object(map: Value, key: Value) -> Option<(Value, usize)> {
    let entries = entries_of(map)?;
    match probe(entries, key.object_hash()? as u64, |k| k == key)? {
        Probe::Found(idx) => Some((entries, idx)),
        Probe::Vacant(_) => None,
    }
}

fn find_string(map: Value, s: &str) -> Option<(Value, usize)> {
    let entries = entries_of(map)?;
    let matches = |k: Value| unsafe { k.string_bytes() } == Some(s.as_bytes());
    match probe(entries, text_hash(s.as_bytes()), matches)? {
        Probe::Found(idx) => Some((entries, idx)),
        Probe::Vacant(_) => None,
    }
}

impl Runtime {
    fn make_map(&mut self, magic: Magic, capacity: usize) -> Value {
        let cap = capacity.max(MIN_MAP_CAPACITY).next_power_of_two();
        let mut f = self.enter_frame("make_map", 1);
        let map = f.alloc_with_discr(magic, 0);
        f.set_var(0, map);
        let entries = f.make_multiple(2 * cap);
        let map = f.value(0);
        unsafe { (*map.body::<MapBody>()).entries = Some(entries) }
        f.touch(map);
        map
    }

    /// A map keyed by object identity, with room for `capacity` entries
    /// before it grows.
    pub fn make_map_objects(&mut self, capacity: usize) -> Value {
        self.make_map(Magic::MapObjects, capacity)
    }

    /// A map keyed by string contents.
    pub fn make_map_strings(&mut self, capacity: usize) -> Value {
        self.make_map(Magic::MapStrings, capacity)
    }

    pub fn map_count(&self, map: Value) -> Option<usize> {
        Some(unsafe { (*map_body(map)?).count } as usize)
    }

    pub fn map_capacity(&self, map: Value) -> Option<usize> {
        Some(entries_of(map)?.len() / 2)
    }

    pub fn map_aux(&self, map: Value) -> Slot {
        unsafe { (*map_body(map)?).aux }
    }

    pub fn set_map_aux(&mut self, map: Value, aux: impl Into<Slot>) {
        if let Some(body) = map_body(map) {
            let aux: Slot = aux.into();
            unsafe { (*body).aux = aux }
            self.touch_if_young(map, aux);
        }
    }

    /// Make room for one more entry in `map`, doubling its entries when the
    /// load factor would exceed three quarters.
    fn map_grow(&mut self, map: Value) {
        let (count, cap) = match (self.map_count(map), self.map_capacity(map)) {
            (Some(count), Some(cap)) => (count, cap),
            _ => return,
        };
        if (count + 1) * 4 <= cap * 3 {
            return;
        }
        let mut f = self.enter_frame("map_grow", 1);
        f.set_var(0, map);
        let new_entries = f.make_multiple(4 * cap);
        let map = f.value(0);
        let kind = map.magic();
        if let Some(old_entries) = entries_of(map) {
            for idx in 0..cap {
                let (key, val) = unsafe {
                    let slots = multiple_slots(old_entries);
                    (*slots.add(2 * idx), *slots.add(2 * idx + 1))
                };
                let key = match key {
                    Some(key) => key,
                    None => continue,
                };
                let hash = stored_key_hash(kind, key);
                if let Some(Probe::Vacant(slot)) = probe(new_entries, hash, |_| false) {
                    unsafe { set_entry(new_entries, slot, Some(key), val) }
                }
            }
        }
        unsafe { (*map.body::<MapBody>()).entries = Some(new_entries) }
        f.touch(map);
        tracing::trace!(map = ?map, count, new_capacity = 2 * cap, "map grown");
    }

    /// Store `key` into the vacant entry `idx`, or overwrite a found one.
    fn map_store(&mut self, map: Value, entries: Value, probe: Probe, key: Value, val: Slot) {
        match probe {
            Probe::Found(idx) => unsafe { *multiple_slots(entries).add(2 * idx + 1) = val },
            Probe::Vacant(idx) => unsafe {
                set_entry(entries, idx, Some(key), val);
                (*map.body::<MapBody>()).count += 1;
            },
        }
        self.touch_if_young(entries, Some(key));
        self.touch_if_young(entries, val);
    }

    /// Clear entry `idx` and shift back the entries of its probe run.
    fn map_remove_at(&mut self, map: Value, entries: Value, idx: usize) -> Slot {
        let kind = map.magic();
        let mask = entries.len() / 2 - 1;
        let slots = unsafe { multiple_slots(entries) };
        let removed = unsafe { *slots.add(2 * idx + 1) };
        unsafe { set_entry(entries, idx, None, None) };

        let (mut hole, mut cur) = (idx, idx);
        loop {
            cur = (cur + 1) & mask;
            let key = match unsafe { entry_key(entries, cur) } {
                Some(key) => key,
                None => break,
            };
            let home = stored_key_hash(kind, key) as usize & mask;
            // An entry stays put if its home lies cyclically in (hole, cur].
            let stays = if hole <= cur {
                hole < home && home <= cur
            } else {
                hole < home || home <= cur
            };
            if !stays {
                unsafe {
                    let val = *slots.add(2 * cur + 1);
                    set_entry(entries, hole, Some(key), val);
                    set_entry(entries, cur, None, None);
                }
                hole = cur;
            }
        }
        unsafe { (*map.body::<MapBody>()).count -= 1 }
        removed
    }

    pub fn map_objects_get(&self, map: Value, key: Value) -> Slot {
        if !map.is(Magic::MapObjects) {
            return None;
        }
        let (entries, idx) = find_object(map, key)?;
        unsafe { *multiple_slots(entries).add(2 * idx + 1) }
    }

    /// Bind `key` to `val`. Keys must be objects; anything else is ignored.
    pub fn map_objects_put(&mut self, map: Value, key: Value, val: impl Into<Slot>) {
        if !map.is(Magic::MapObjects) || !key.is(Magic::Object) {
            return;
        }
        let mut f = self.enter_frame("map_objects_put", 3);
        f.set_var(0, map);
        f.set_var(1, key);
        f.set_var(2, val);
        f.map_grow(map);
        let (map, key, val) = (f.value(0), f.value(1), f.var(2));
        let entries = match entries_of(map) {
            Some(entries) => entries,
            None => return,
        };
        let hash = key.object_hash().unwrap_or(0) as u64;
        match probe(entries, hash, |k| k == key) {
            Some(found) => f.map_store(map, entries, found, key, val),
            None => gc_fatal!(f, "map {:?} has no vacant entry", map),
        }
    }

    pub fn map_objects_remove(&mut self, map: Value, key: Value) -> Slot {
        if !map.is(Magic::MapObjects) {
            return None;
        }
        let (entries, idx) = find_object(map, key)?;
        self.map_remove_at(map, entries, idx)
    }

    pub fn map_strings_get(&self, map: Value, key: &str) -> Slot {
        if !map.is(Magic::MapStrings) {
            return None;
        }
        let (entries, idx) = find_string(map, key)?;
        unsafe { *multiple_slots(entries).add(2 * idx + 1) }
    }

    /// Bind the string `key` to `val`. A new key is stored as a fresh String
    /// value.
    pub fn map_strings_put(&mut self, map: Value, key: &str, val: impl Into<Slot>) {
        if !map.is(Magic::MapStrings) {
            return;
        }
        let mut f = self.enter_frame("map_strings_put", 3);
        f.set_var(0, map);
        f.set_var(1, val);
        let val = f.var(1);
        if let Some((entries, idx)) = find_string(map, key) {
            unsafe { *multiple_slots(entries).add(2 * idx + 1) = val }
            f.touch_if_young(entries, val);
            return;
        }
        let key_value = f.make_string(key);
        f.set_var(2, key_value);
        let map = f.value(0);
        f.map_grow(map);
        let (map, val, key_value) = (f.value(0), f.var(1), f.value(2));
        let entries = match entries_of(map) {
            Some(entries) => entries,
            None => return,
        };
        match probe(entries, text_hash(key.as_bytes()), |_| false) {
            Some(vacant) => f.map_store(map, entries, vacant, key_value, val),
            None => gc_fatal!(f, "map {:?} has no vacant entry", map),
        }
    }

    pub fn map_strings_remove(&mut self, map: Value, key: &str) -> Slot {
        if !map.is(Magic::MapStrings) {
            return None;
        }
        let (entries, idx) = find_string(map, key)?;
        self.map_remove_at(map, entries, idx)
    }

    /// Every bound key and value of a map, in entry order.
    pub fn map_entries(&self, map: Value) -> Option<Vec<(Value, Slot)>> {
        let entries = entries_of(map)?;
        let slots = unsafe { multiple_slots(entries) };
        Some(
            (0..entries.len() / 2)
                .filter_map(|idx| unsafe {
                    let key = (*slots.add(2 * idx))?;
                    Some((key, *slots.add(2 * idx + 1)))
                })
                .collect(),
        )
    }
}

fn bucket_search(bucket: Value, key: i64) -> Result<usize, usize> {
    let count = unsafe { (*bucket.body::<BucketBody>()).count } as usize;
    let entries = unsafe { std::slice::from_raw_parts(bucket_entries(bucket), count) };
    entries.binary_search_by_key(&key, |entry| entry.key)
}

// Buckets of long integers.
impl Runtime {
    /// An empty bucket with room for `capacity` entries.
    pub fn make_bucket_longs(&mut self, capacity: usize) -> Value {
        self.alloc_with_discr(Magic::BucketLongs, capacity.max(1))
    }

    pub fn bucket_count(&self, bucket: Value) -> Option<usize> {
        bucket
            .is(Magic::BucketLongs)
            .then(|| unsafe { (*bucket.body::<BucketBody>()).count } as usize)
    }

    pub fn bucket_get(&self, bucket: Value, key: i64) -> Slot {
        if !bucket.is(Magic::BucketLongs) {
            return None;
        }
        let idx = bucket_search(bucket, key).ok()?;
        unsafe { (*bucket_entries(bucket).add(idx)).val }
    }

    /// Bind `key` to `val` in `bucket`.
    ///
    /// A full bucket is left unchanged and a larger copy holding the new
    /// binding is returned instead; callers must use the returned bucket.
    pub fn bucket_put(&mut self, bucket: Value, key: i64, val: impl Into<Slot>) -> Value {
        let val: Slot = val.into();
        if !bucket.is(Magic::BucketLongs) {
            return bucket;
        }
        let count = unsafe { (*bucket.body::<BucketBody>()).count } as usize;
        let at = match bucket_search(bucket, key) {
            Ok(idx) => {
                unsafe { (*bucket_entries(bucket).add(idx)).val = val }
                self.touch_if_young(bucket, val);
                return bucket;
            }
            Err(at) => at,
        };
        if count < bucket.len() {
            unsafe {
                let entries = bucket_entries(bucket);
                ptr::copy(entries.add(at), entries.add(at + 1), count - at);
                *entries.add(at) = LongEntry { key, val };
                (*bucket.body::<BucketBody>()).count += 1;
            }
            self.touch_if_young(bucket, val);
            return bucket;
        }

        let mut f = self.enter_frame("bucket_put", 2);
        f.set_var(0, bucket);
        f.set_var(1, val);
        let grown = f.alloc_with_discr(Magic::BucketLongs, 2 * count);
        let (old, val) = (f.value(0), f.var(1));
        unsafe {
            let (src, dst) = (bucket_entries(old), bucket_entries(grown));
            ptr::copy_nonoverlapping(src, dst, at);
            *dst.add(at) = LongEntry { key, val };
            ptr::copy_nonoverlapping(src.add(at), dst.add(at + 1), count - at);
            let body = grown.body::<BucketBody>();
            (*body).count = (count + 1) as u32;
            (*body).aux = (*old.body::<BucketBody>()).aux;
        }
        tracing::trace!(count = count + 1, capacity = 2 * count, "bucket grown");
        grown
    }

    pub fn bucket_remove(&mut self, bucket: Value, key: i64) -> Slot {
        if !bucket.is(Magic::BucketLongs) {
            return None;
        }
        let idx = bucket_search(bucket, key).ok()?;
        let removed = unsafe {
            let body = bucket.body::<BucketBody>();
            let entries = bucket_entries(bucket);
            let removed = (*entries.add(idx)).val;
            let count = (*body).count as usize;
            ptr::copy(entries.add(idx + 1), entries.add(idx), count - idx - 1);
            *entries.add(count - 1) = LongEntry { key: 0, val: None };
            (*body).count -= 1;
            removed
        };
        removed
    }

    pub fn bucket_aux(&self, bucket: Value) -> Slot {
        if !bucket.is(Magic::BucketLongs) {
            return None;
        }
        unsafe { (*bucket.body::<BucketBody>()).aux }
    }

    pub fn set_bucket_aux(&mut self, bucket: Value, aux: impl Into<Slot>) {
        if !bucket.is(Magic::BucketLongs) {
            return;
        }
        let aux: Slot = aux.into();
        unsafe { (*bucket.body::<BucketBody>()).aux = aux }
        self.touch_if_young(bucket, aux);
    }

    /// The bindings of a bucket, in key order.
    pub fn bucket_entries(&self, bucket: Value) -> Option<Vec<(i64, Slot)>> {
        let count = self.bucket_count(bucket)?;
        let entries = unsafe { std::slice::from_raw_parts(bucket_entries(bucket), count) };
        Some(entries.iter().map(|entry| (entry.key, entry.val)).collect())
    }
}
