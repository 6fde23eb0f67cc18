use std::fmt;
use std::time::Instant;

use super::forward::Forwarder;
use super::mark::Marker;
use super::old::MajorHooks;
use super::roots::RootSet;
use super::young::{next_arena_size, YoungArena};
use crate::runtime::Runtime;
use crate::special::SpecialRegistry;

/// How far a collection may go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectKind {
    /// Only collect the young generation.
    MinorOnly,
    /// Collect the young generation, then the old one if a trigger fires.
    AllowMajor,
    /// Collect both generations.
    NeedMajor,
}

/// Why a full collection ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MajorTrigger {
    /// Explicitly requested with [`CollectKind::NeedMajor`].
    Asked,
    /// `full_period` minor collections happened since the last one.
    Periodic,
    /// The young allocation volume reached `full_threshold_kw`.
    Threshold,
    /// The volume copied to old space reached `copied_threshold_kw`.
    CopiedVolume,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    pub minor_collections: u64,
    pub major_collections: u64,
    pub asked_majors: u64,
    pub periodic_majors: u64,
    pub threshold_majors: u64,
    pub copied_volume_majors: u64,

    pub minors_since_major: u64,
    pub young_bytes_since_major: u64,
    pub copied_bytes_since_major: u64,

    pub total_young_bytes: u64,
    pub total_copied_bytes: u64,
    pub total_copied_values: u64,
    pub specials_destroyed: u64,
}

impl fmt::Display for GcStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "minor collections: {}",
            self.minor_collections
        )?;
        writeln!(
            f,
            "major collections: {} (asked {}, periodic {}, threshold {}, copied volume {})",
            self.major_collections,
            self.asked_majors,
            self.periodic_majors,
            self.threshold_majors,
            self.copied_volume_majors
        )?;
        writeln!(
            f,
            "young bytes: {} total, {} since last major",
            self.total_young_bytes, self.young_bytes_since_major
        )?;
        writeln!(
            f,
            "copied: {} values, {} bytes total, {} bytes since last major",
            self.total_copied_values, self.total_copied_bytes, self.copied_bytes_since_major
        )?;
        write!(f, "specials destroyed: {}", self.specials_destroyed)
    }
}

impl Runtime {
    /// Run a minor collection making room for at least `requested` bytes,
    /// followed by a full collection if `kind` allows it and a trigger fires.
    ///
    /// Collecting while collection is forbidden, or from inside a collection,
    /// is fatal.
    pub fn collect(&mut self, requested: usize, kind: CollectKind) {
        if self.collection_forbidden() {
            gc_fatal!(self, "collection requested while collection is forbidden");
        }
        if self.collecting {
            gc_fatal!(self, "collection requested during a collection");
        }
        self.collecting = true;
        let mut guard = scopeguard::guard(self, |rt: &mut Runtime| rt.collecting = false);
        let rt: &mut Runtime = &mut guard;

        rt.minor_collection(requested);
        let triggers = rt.major_triggers(kind);
        if !triggers.is_empty() {
            rt.major_collection(&triggers);
        }
    }

    /// Shorthand for a full collection.
    pub fn full_collect(&mut self) {
        self.collect(0, CollectKind::NeedMajor)
    }

    fn minor_collection(&mut self, requested: usize) {
        let started = Instant::now();
        let used = self.young.used();
        let store_entries = self.young.store_len();

        let mut fwd = Forwarder::new(&self.young, &mut *self.old);
        self.roots.forward(&mut fwd);
        for touched in self.young.store_entries() {
            let touched = fwd.forward_value(touched);
            fwd.scan_fields(touched);
        }
        fwd.drain();
        let copied_bytes = fwd.copied_bytes();
        let copied_values = fwd.copied_values();
        drop(fwd);

        let destroyed = self.specials.after_minor(&self.young);
        let next_size = next_arena_size(requested, self.config.minor_size_bytes());
        self.young = YoungArena::new(next_size);

        let stats = &mut self.stats;
        stats.minor_collections += 1;
        stats.minors_since_major += 1;
        stats.young_bytes_since_major += used as u64;
        stats.copied_bytes_since_major += copied_bytes as u64;
        stats.total_young_bytes += used as u64;
        stats.total_copied_bytes += copied_bytes as u64;
        stats.total_copied_values += copied_values as u64;
        stats.specials_destroyed += destroyed as u64;
        tracing::debug!(
            used,
            store_entries,
            copied_values,
            copied_bytes,
            specials_destroyed = destroyed,
            next_size,
            elapsed = ?started.elapsed(),
            "minor collection"
        );
    }

    fn major_triggers(&self, kind: CollectKind) -> Vec<MajorTrigger> {
        let mut triggers = vec![];
        if kind == CollectKind::MinorOnly {
            return triggers;
        }
        if kind == CollectKind::NeedMajor {
            triggers.push(MajorTrigger::Asked);
        }
        let period = self.config.full_period as u64;
        if period > 0 && self.stats.minors_since_major >= period {
            triggers.push(MajorTrigger::Periodic);
        }
        if self.stats.young_bytes_since_major >= self.config.full_threshold_bytes() as u64 {
            triggers.push(MajorTrigger::Threshold);
        }
        if self.stats.copied_bytes_since_major >= self.config.copied_threshold_bytes() as u64 {
            triggers.push(MajorTrigger::CopiedVolume);
        }
        triggers
    }

    fn major_collection(&mut self, triggers: &[MajorTrigger]) {
        let started = Instant::now();
        for trigger in triggers {
            match trigger {
                MajorTrigger::Asked => self.stats.asked_majors += 1,
                MajorTrigger::Periodic => self.stats.periodic_majors += 1,
                MajorTrigger::Threshold => self.stats.threshold_majors += 1,
                MajorTrigger::CopiedVolume => self.stats.copied_volume_majors += 1,
            }
        }
        let live_before = self.old.live_objects();

        self.specials.clear_old_marks();
        let mut hooks = MajorRoots {
            roots: &mut self.roots,
            specials: &mut self.specials,
            destroyed: 0,
        };
        self.old.collect(&mut hooks);
        let destroyed = hooks.destroyed;

        let stats = &mut self.stats;
        stats.major_collections += 1;
        stats.minors_since_major = 0;
        stats.young_bytes_since_major = 0;
        stats.copied_bytes_since_major = 0;
        stats.specials_destroyed += destroyed as u64;
        tracing::debug!(
            ?triggers,
            live_before,
            live_after = self.old.live_objects(),
            specials_destroyed = destroyed,
            elapsed = ?started.elapsed(),
            "major collection"
        );
    }
}

/// The runtime's side of a full collection.
struct MajorRoots<'a> {
    roots: &'a mut RootSet,
    specials: &'a mut SpecialRegistry,
    destroyed: usize,
}

impl MajorHooks for MajorRoots<'_> {
    fn mark_roots(&mut self, marker: &mut Marker) {
        self.roots.mark(marker);
    }

    fn before_sweep(&mut self) {
        self.destroyed += self.specials.sweep_old();
    }
}
