//! The generational collector.
//!
//! Minor collections copy every reachable young value into old space, then
//! start over with a fresh young arena. Full collections are delegated to the
//! [`old::OldSpace`], which marks from the same roots and sweeps.

pub mod collect;
pub mod forward;
pub mod mark;
pub mod old;
pub mod roots;
pub mod young;

pub use collect::{CollectKind, GcStats, MajorTrigger};
pub use forward::Forwarder;
pub use mark::Marker;
pub use old::{MajorHooks, OldSpace, SweepHeap};
pub use roots::GlobalIndex;
pub use young::ArenaCursors;
