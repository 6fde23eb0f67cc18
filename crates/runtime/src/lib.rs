//! A generational copying collector and the tagged object model it manages.
//!
//! All state lives in a [`Runtime`]. Values are born in a young arena, copied
//! to a non-moving old space by minor collections, and reclaimed from there by
//! full collections.

#[macro_use]
mod fatal;
pub mod config;
pub mod error;
pub mod frame;
pub mod gc;
pub mod intern;
pub mod module;
pub mod runtime;
pub mod special;
pub mod value;

pub use config::GcConfig;
pub use error::ConfigError;
pub use frame::{FrameGuard, FrameKey};
pub use gc::{CollectKind, GcStats, GlobalIndex, MajorTrigger};
pub use module::{Module, ModuleCapabilities, ModuleDescriptor, ModuleIndex, StaticModule};
pub use runtime::{NoCollect, Runtime};
pub use special::{SpecialDescriptor, SpecialKind};
pub use value::{Magic, Predef, RoutineFn, Slot, Value};
