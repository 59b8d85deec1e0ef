//! Address assignment: the fixpoint that gives every function a final address and the sandbox
//! abstraction its resulting bytes are written into.

mod sandbox;
pub use sandbox::{
   FileSandbox,
   LoaderSandbox,
   Sandbox,
};

mod assign;
pub use assign::reassign;

mod finalize;
pub use finalize::finalize;
