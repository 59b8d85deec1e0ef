//! Phase 3: weak symbol resolution. A `SymbolOnlyLink` marked weak is matched against the
//! first strong definition found scanning modules in link order; if none exists the link is
//! left as `SymbolOnly` — a documented, deliberately unresolved reference, not an error.

use std::collections::HashMap;

use warp_chunk::{
   ChunkRef,
   DataVariableId,
   InstructionId,
   Link,
   Program,
};
use warp_visit::Visitor;

struct WeakResolution<'a> {
   strong_symbols: &'a HashMap<String, ChunkRef>,
}

impl Visitor for WeakResolution<'_> {
   fn visit_instruction(&mut self, program: &mut Program, id: InstructionId) {
      if let Some(target) = self.resolve(program.instruction(id).semantic.link()) {
         program.instruction_mut(id).semantic.set_link(Link::Normal(target));
      }
   }

   fn visit_data_variable(&mut self, program: &mut Program, id: DataVariableId) {
      if let Some(target) = self.resolve(program.data_variable(id).link.as_ref()) {
         program.data_variable_mut(id).link = Some(Link::Normal(target));
      }
   }
}

impl WeakResolution<'_> {
   fn resolve(&self, link: Option<&Link>) -> Option<ChunkRef> {
      let Some(Link::SymbolOnly { symbol, weak: true }) = link else {
         return None;
      };
      self.strong_symbols.get(symbol).copied()
   }
}

/// `strong_symbols` is the conductor's index of the first strong, defined symbol of each name,
/// scanning modules in link order — built once and reused by every idempotent re-run of this
/// phase.
pub fn run(program: &mut Program, strong_symbols: &HashMap<String, ChunkRef>) {
   let mut pass = WeakResolution { strong_symbols };

   for module_id in program.modules().to_vec() {
      let function_list = program.module(module_id).function_list();
      pass.visit_function_list(program, function_list);

      for region in program.module(module_id).data_regions().to_vec() {
         pass.visit_data_region(program, region);
      }
   }
}
