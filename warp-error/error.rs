use std::{
   fmt,
   result,
   sync::Arc,
};

use yansi::Paint as _;

/// A type alias for concise use of [`Error`].
pub type Result<T> = result::Result<T, Error>;

/// The error type. Stores an error chain that can be appended to with [`Contextful`]. Formats
/// the whole chain, most-recent cause last, when printed with [`fmt::Debug`] — which is what
/// `fn main() -> warp_error::Result<()>` invokes via `std::process::Termination`'s blanket
/// impl for `Result<T, E: Debug>`.
#[derive(Clone)]
pub struct Error(Arc<anyhow::Error>);

impl<E> From<E> for Error
where
   E: std::error::Error + Send + Sync + 'static,
{
   fn from(error: E) -> Self {
      Self(Arc::new(anyhow::Error::new(error)))
   }
}

impl fmt::Display for Error {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}", self.0)
   }
}

impl fmt::Debug for Error {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut chain = self.0.chain().rev().peekable();

      while let Some(cause) = chain.next() {
         let header = if chain.peek().is_none() { "error:" } else { "cause:" };

         writeln!(f, "{header} {cause}", header = header.red().bold())?;
      }

      Ok(())
   }
}

impl std::error::Error for Error {}

/// The type of the context accepted by [`Contextful`].
pub trait Context: fmt::Display + Send + Sync + 'static {}
impl<T: fmt::Display + Send + Sync + 'static> Context for T {}

/// Adds context to a fallible operation's error chain, mirroring `anyhow::Context` but
/// producing our own [`Error`] so call sites never need to name `anyhow` directly.
pub trait Contextful<T> {
   fn context(self, context: impl Context) -> Result<T>;

   fn with_context<C: Context>(self, context: impl FnOnce() -> C) -> Result<T>;
}

impl<T> Contextful<T> for Option<T> {
   fn context(self, context: impl Context) -> Result<T> {
      self.ok_or_else(|| Error(Arc::new(anyhow::Error::msg(context.to_string()))))
   }

   fn with_context<C: Context>(self, context: impl FnOnce() -> C) -> Result<T> {
      self.ok_or_else(|| Error(Arc::new(anyhow::Error::msg(context().to_string()))))
   }
}

impl<T, E> Contextful<T> for result::Result<T, E>
where
   E: std::error::Error + Send + Sync + 'static,
{
   fn context(self, context: impl Context) -> Result<T> {
      self.map_err(|error| Error(Arc::new(anyhow::Error::new(error).context(context.to_string()))))
   }

   fn with_context<C: Context>(self, context: impl FnOnce() -> C) -> Result<T> {
      self.map_err(|error| Error(Arc::new(anyhow::Error::new(error).context(context().to_string()))))
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::Kind;

   #[test]
   fn chain_prints_most_recent_cause_last() {
      let base: Result<()> = Err(Kind::Query("main".into()).into());
      let wrapped = base.context("resolving shell argument");

      let rendered = format!("{:?}", wrapped.unwrap_err());
      assert!(rendered.contains("resolving shell argument"));
      assert!(rendered.contains("no chunk matches"));
   }
}
