//! Error handling utilities shared by every `warp-*` crate.

mod error;
pub use error::{
   Contextful,
   Error,
   Result,
};

mod kind;
pub use kind::Kind;

#[doc(hidden)]
pub mod private {
   pub use anyhow;
}

/// Creates an [`Error`] from the provided string literal or format arguments.
#[macro_export]
macro_rules! error {
   ($($t:tt)*) => {
      $crate::Error::from($crate::private::anyhow::anyhow!($($t)*))
   };
}

/// Boils down to `return Err(error!(...))`.
#[macro_export]
macro_rules! bail {
   ($($t:tt)*) => {
      return Err($crate::error!($($t)*))
   };
}
