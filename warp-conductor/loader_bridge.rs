//! The loader bridge: a fixed, enumerated set of hooks into the framework's own statically
//! linked image (the conductor pointer, the ifunc list, the initial stack pointer, and the
//! jump-table dispatch callback). Populated exactly once at startup; mutation afterward is
//! forbidden by construction — there is no setter, only [`LoaderBridge::init`].

use std::sync::OnceLock;

use warp_chunk::{
   JumpTableId,
   ModuleId,
};

static REGISTRY: OnceLock<LoaderBridge> = OnceLock::new();

/// The fixed surface the framework's own runtime image exposes to itself, under well-known
/// symbol names, independent of whatever Program it happens to be rewriting.
#[derive(Debug, Clone)]
pub struct LoaderBridge {
   /// The module holding the framework's own statically linked image, when one was loaded.
   pub framework_module: Option<ModuleId>,
   /// The jump table used to dispatch indirect calls the framework itself injected.
   pub dispatch_table: Option<JumpTableId>,
   /// The stack pointer captured at process startup, before any rewriting took effect.
   pub initial_stack_pointer: u64,
}

impl LoaderBridge {
   /// Populates the process-wide registry. Returns the value already installed if called more
   /// than once — setup runs exactly once per process, and a second call is a caller bug, not
   /// something worth panicking over.
   pub fn init(bridge: LoaderBridge) -> &'static LoaderBridge {
      REGISTRY.get_or_init(|| bridge)
   }

   /// The installed registry, if [`LoaderBridge::init`] has run.
   #[must_use]
   pub fn get() -> Option<&'static LoaderBridge> {
      REGISTRY.get()
   }
}
