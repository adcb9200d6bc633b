//! Lazy registry of native modules.
//!
//! Scripts reach native capabilities through `require(name)`. The first
//! require of a name runs the module's constructor with a handle back to
//! the registry, so a module can require its own dependencies during
//! construction; later requires return the memoized script object without
//! reconstructing. Teardown runs in reverse construction order, which by
//! construction respects the same dependency ordering.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use jsbridge_core::{Engine, JsError, JsResult, JsVal, RootGuard};

/// Builds a module: returns the script-visible object and optional native
/// state. Receives the registry so dependencies can be required first.
pub type ModuleConstructor =
    fn(&mut Engine, &Rc<RefCell<ModuleRegistry>>) -> JsResult<ModuleInstance>;

/// Tears native state down at registry destruction.
pub type ModuleDestructor = fn(&mut Engine, &Rc<dyn Any>);

/// Static description of one requirable module.
#[derive(Clone)]
pub struct ModuleDescriptor {
    pub name: &'static str,
    pub construct: ModuleConstructor,
    pub destroy: Option<ModuleDestructor>,
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A constructed module: its script object plus whatever native state the
/// constructor wants other modules to find through [`ModuleRegistry::get`].
pub struct ModuleInstance {
    pub object: JsVal,
    pub state: Option<Rc<dyn Any>>,
}

enum Entry {
    /// Constructor currently running; hit again only on a dependency cycle.
    Constructing,
    Ready(ModuleInstance),
}

/// Per-script-thread module registry.
///
/// At most one live instance exists per name; module objects stay rooted
/// for the registry's lifetime.
pub struct ModuleRegistry {
    descriptors: Vec<ModuleDescriptor>,
    entries: FxHashMap<&'static str, Entry>,
    order: Vec<&'static str>,
    guard: RootGuard,
}

impl ModuleRegistry {
    pub fn new(engine: &Engine, descriptors: Vec<ModuleDescriptor>) -> Self {
        Self {
            descriptors,
            entries: FxHashMap::default(),
            order: Vec::new(),
            guard: engine.root_guard(),
        }
    }

    /// Construct-or-return the module `name`.
    ///
    /// An associated function rather than a method: the registry borrow is
    /// dropped before the constructor runs, so the constructor can call
    /// back in for its dependencies.
    pub fn require(
        registry: &Rc<RefCell<Self>>,
        engine: &mut Engine,
        name: &str,
    ) -> JsResult<JsVal> {
        {
            let reg = registry.borrow();
            match reg.entries.get(name) {
                Some(Entry::Ready(instance)) => return Ok(instance.object),
                Some(Entry::Constructing) => {
                    return Err(JsError::Internal(format!(
                        "circular dependency while constructing module \"{name}\""
                    )));
                }
                None => {}
            }
        }

        let Some(descriptor) = registry
            .borrow()
            .descriptors
            .iter()
            .find(|d| d.name == name)
            .cloned()
        else {
            return Err(JsError::BadArgs(format!("unknown module: {name}")));
        };

        debug!(module = descriptor.name, "constructing module");
        registry
            .borrow_mut()
            .entries
            .insert(descriptor.name, Entry::Constructing);
        let result = (descriptor.construct)(engine, registry);

        let mut reg = registry.borrow_mut();
        match result {
            Ok(instance) => {
                let object = instance.object;
                reg.guard.own(object);
                reg.entries.insert(descriptor.name, Entry::Ready(instance));
                reg.order.push(descriptor.name);
                Ok(object)
            }
            Err(err) => {
                reg.entries.remove(name);
                Err(err)
            }
        }
    }

    /// Non-initializing lookup of another module's live native state.
    ///
    /// Returns `None` when the module was never required; a dependent
    /// module decides for itself whether that is fatal.
    pub fn get(&self, name: &str) -> Option<Rc<dyn Any>> {
        match self.entries.get(name) {
            Some(Entry::Ready(instance)) => instance.state.clone(),
            _ => None,
        }
    }

    /// Typed variant of [`ModuleRegistry::get`].
    pub fn get_as<T: Any>(&self, name: &str) -> Option<Rc<T>> {
        self.get(name).and_then(|state| state.downcast::<T>().ok())
    }

    /// Run every destructor in reverse construction order and release the
    /// module object roots.
    pub fn destroy_all(registry: &Rc<RefCell<Self>>, engine: &mut Engine) {
        loop {
            let torn_down = {
                let mut reg = registry.borrow_mut();
                let Some(name) = reg.order.pop() else { break };
                let destroy = reg
                    .descriptors
                    .iter()
                    .find(|d| d.name == name)
                    .and_then(|d| d.destroy);
                match reg.entries.remove(name) {
                    Some(Entry::Ready(instance)) => {
                        reg.guard.disown(instance.object);
                        debug!(module = name, "destroying module");
                        Some((instance, destroy))
                    }
                    _ => None,
                }
            };
            if let Some((instance, Some(destroy))) = torn_down {
                if let Some(state) = &instance.state {
                    destroy(engine, state);
                }
            }
        }
    }
}
