//! The visitor/pass framework: per-variant dispatch over the chunk tree with a default
//! recursive descent, and the mutation-safe iteration a pass needs to add or remove chunks
//! while walking their parent's current children.

mod snapshot;
pub use snapshot::snapshot;

mod visitor;
pub use visitor::{
   accept_data_region,
   accept_data_section,
   accept_function,
   accept_function_list,
   accept_jump_table,
   accept_module,
   Visitor,
};

/// Marker trait for [`Visitor`] implementations used to mutate the tree, as opposed to
/// read-only inspection. Carries no extra methods — mutation is already legal through `&mut
/// Program` in every `visit_*` signature — but lets call sites and doc comments say "pass"
/// instead of "visitor" where that's the intent, matching §4.4's distinction.
pub trait Pass: Visitor {}

impl<T: Visitor> Pass for T {}
