//! Loaded modules and the roots they hold.

use std::any::Any;

use smol_str::SmolStr;

use crate::gc::forward::Forwarder;
use crate::gc::mark::Marker;
use crate::runtime::Runtime;
use crate::value::Slot;

bitflags::bitflags! {
    /// Which collector callbacks a module wants.
    pub struct ModuleCapabilities: u8 {
        /// Called on every minor collection to forward the module's roots.
        const FORWARD = 0b01;
        /// Called on every full collection to mark the module's roots.
        const MARK = 0b10;
    }
}

/// Identification of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: SmolStr,
    pub version: SmolStr,
    /// Checksum of the sources the module was built from.
    pub checksum: Option<SmolStr>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<SmolStr>, version: impl Into<SmolStr>) -> ModuleDescriptor {
        ModuleDescriptor {
            name: name.into(),
            version: version.into(),
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<SmolStr>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// A loaded module.
///
/// The collector calls [`Module::forward`] and [`Module::mark`] only if the
/// corresponding capability is set.
pub trait Module {
    fn descriptor(&self) -> &ModuleDescriptor;

    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::empty()
    }

    fn forward(&mut self, _fwd: &mut Forwarder) {}

    fn mark(&mut self, _marker: &mut Marker) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Index of a loaded module, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleIndex(usize);

/// A module whose only state is a vector of global slots.
pub struct StaticModule {
    descriptor: ModuleDescriptor,
    pub globals: Vec<Slot>,
}

impl StaticModule {
    pub fn new(descriptor: ModuleDescriptor, nglobals: usize) -> StaticModule {
        StaticModule {
            descriptor,
            globals: vec![None; nglobals],
        }
    }
}

impl Module for StaticModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::FORWARD | ModuleCapabilities::MARK
    }

    fn forward(&mut self, fwd: &mut Forwarder) {
        self.globals.iter_mut().for_each(|slot| fwd.forward(slot));
    }

    fn mark(&mut self, marker: &mut Marker) {
        self.globals.iter().for_each(|slot| marker.mark(*slot));
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
pub(crate) struct ModuleRegistry {
    modules: Vec<Box<dyn Module>>,
}

impl ModuleRegistry {
    pub fn forward(&mut self, fwd: &mut Forwarder) {
        for module in &mut self.modules {
            if module.capabilities().contains(ModuleCapabilities::FORWARD) {
                module.forward(fwd);
            }
        }
    }

    pub fn mark(&mut self, marker: &mut Marker) {
        for module in &mut self.modules {
            if module.capabilities().contains(ModuleCapabilities::MARK) {
                module.mark(marker);
            }
        }
    }

    pub fn names(&self) -> Vec<SmolStr> {
        self.modules
            .iter()
            .map(|module| module.descriptor().name.clone())
            .collect()
    }
}

impl Runtime {
    pub fn load_module(&mut self, module: Box<dyn Module>) -> ModuleIndex {
        let descr = module.descriptor();
        tracing::debug!(
            name = %descr.name,
            version = %descr.version,
            checksum = ?descr.checksum,
            "module loaded"
        );
        self.roots.modules.modules.push(module);
        ModuleIndex(self.roots.modules.modules.len() - 1)
    }

    pub fn module_mut(&mut self, idx: ModuleIndex) -> Option<&mut dyn Module> {
        let module = self.roots.modules.modules.get_mut(idx.0)?;
        Some(&mut **module)
    }

    /// The module at `idx`, if it has type `T`.
    pub fn module_as<T: Module + 'static>(&mut self, idx: ModuleIndex) -> Option<&mut T> {
        self.module_mut(idx)?.as_any_mut().downcast_mut()
    }

    /// Names of the loaded modules, in load order.
    pub fn module_names(&self) -> Vec<SmolStr> {
        self.roots.modules.names()
    }
}
