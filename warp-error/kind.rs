use std::path::PathBuf;

/// The closed set of error kinds the core engine can produce.
///
/// Every fallible operation in `warp-conductor`, `warp-layout` and `warp-elf` returns a
/// `Result<T, Kind>`; at the boundary where an operation's result crosses into the shell it is
/// folded into the ambient [`crate::Error`] via [`Contextful`](crate::Contextful).
#[derive(thiserror::Error, Debug)]
pub enum Kind {
   /// Malformed ELF or relocation. Fatal for the affected module, but other modules may
   /// continue loading.
   #[error("{file}: malformed input at offset {offset:#x}: {reason}")]
   Parse {
      file:   PathBuf,
      offset: u64,
      reason: String,
   },

   /// A required `SymbolOnlyLink` could not be satisfied. Fatal only if the link is reached
   /// during emission.
   #[error("unresolved symbol `{symbol}` referenced from {source_path}")]
   Resolution { source_path: String, symbol: String },

   /// Address assignment did not converge. Should be impossible; indicates an ISA-encoding
   /// bug in a linked semantic's size function.
   #[error("layout did not converge after {iterations} iterations (instruction at {chunk} kept growing)")]
   Layout { iterations: usize, chunk: String },

   /// A `DeferredValue` dependency cycle, or an I/O failure while writing the output stream.
   #[error("emission failed: {0}")]
   Emission(String),

   /// A lookup by name or address found nothing. Non-fatal.
   #[error("no chunk matches `{0}`")]
   Query(String),

   /// Wrong argument count or format to a shell command. Non-fatal.
   #[error("usage: {0}")]
   Usage(String),
}
