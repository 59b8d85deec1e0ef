//! Phase 1: PLT resolution. Every call whose `SymbolOnlyLink` names a symbol served by a local
//! PLT stub is rewound to a `PLTLink`; the stub itself keeps its own unresolved link to the
//! dynamic symbol until the real loader (or a `LoaderBridgeLink`) binds it at runtime.

use std::collections::HashMap;

use warp_chunk::{
   InstructionId,
   Link,
   PltTrampolineId,
   Program,
};
use warp_visit::Visitor;

struct PltResolution {
   trampolines_by_symbol: HashMap<String, PltTrampolineId>,
}

impl Visitor for PltResolution {
   fn visit_instruction(&mut self, program: &mut Program, id: InstructionId) {
      let Some(Link::SymbolOnly { symbol, .. }) = program.instruction(id).semantic.link() else {
         return;
      };

      if let Some(&trampoline) = self.trampolines_by_symbol.get(symbol) {
         program.instruction_mut(id).semantic.set_link(Link::Plt(trampoline));
      }
   }
}

/// Idempotent: once a link has been rewritten to `Link::Plt`, it no longer matches
/// `Link::SymbolOnly` and this phase leaves it alone on a second run.
pub fn run(program: &mut Program) {
   for module_id in program.modules().to_vec() {
      let trampolines_by_symbol = program
         .module(module_id)
         .plt_trampolines()
         .iter()
         .map(|&id| (program.plt_trampoline(id).symbol.clone(), id))
         .collect();

      let mut pass = PltResolution { trampolines_by_symbol };
      let function_list = program.module(module_id).function_list();
      pass.visit_function_list(program, function_list);
   }
}
