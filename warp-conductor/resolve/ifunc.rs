//! Phase 5: IFunc selector setup. Registers the selector function for each indirect-function
//! symbol; actual resolution (choosing which implementation a call ends up hitting) is deferred
//! to the first call, which this core does not simulate — it only records the registration, for
//! the emitted binary's loader to act on.

use warp_chunk::FunctionId;

/// One GNU indirect-function symbol: the resolver that gets called once, at load time, to pick
/// the real implementation.
#[derive(Debug, Clone)]
pub struct IFuncEntry {
   pub symbol:   String,
   pub selector: FunctionId,
}

/// Idempotent by construction: the caller rebuilds this list fresh from the symbol table every
/// time rather than mutating link state, so running the phase twice just recomputes the same
/// list.
#[must_use]
pub fn run(ifunc_symbols: &[(String, FunctionId)]) -> Vec<IFuncEntry> {
   ifunc_symbols
      .iter()
      .map(|(symbol, selector)| IFuncEntry {
         symbol: symbol.clone(),
         selector: *selector,
      })
      .collect()
}
