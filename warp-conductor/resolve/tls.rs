//! Phase 2: TLS resolution. Operands naming a thread-local symbol become `TLSDataOffsetLink`s
//! carrying the module's own TLS offset for that symbol, looked up from the per-module table
//! the conductor built while parsing the dynamic/TLS symbol entries.

use std::collections::HashMap;

use warp_chunk::{
   DataVariableId,
   InstructionId,
   Link,
   ModuleId,
   Program,
};
use warp_visit::Visitor;

struct TlsResolution<'a> {
   module:  ModuleId,
   offsets: &'a HashMap<String, u64>,
}

impl Visitor for TlsResolution<'_> {
   fn visit_instruction(&mut self, program: &mut Program, id: InstructionId) {
      self.resolve(program.instruction(id).semantic.link().cloned(), |link| {
         program.instruction_mut(id).semantic.set_link(link);
      });
   }

   fn visit_data_variable(&mut self, program: &mut Program, id: DataVariableId) {
      self.resolve(program.data_variable(id).link.clone(), |link| {
         program.data_variable_mut(id).link = Some(link);
      });
   }
}

impl TlsResolution<'_> {
   fn resolve(&self, link: Option<Link>, mut set: impl FnMut(Link)) {
      let Some(Link::SymbolOnly { symbol, .. }) = link else {
         return;
      };

      if let Some(&offset) = self.offsets.get(&symbol) {
         set(Link::TlsDataOffset {
            module: self.module,
            offset,
         });
      }
   }
}

/// `tls_offsets` maps a module's own TLS symbol names to their offset within that module's
/// thread-local image, as built by the conductor while parsing the symbol table.
pub fn run(program: &mut Program, tls_offsets: &HashMap<ModuleId, HashMap<String, u64>>) {
   for module_id in program.modules().to_vec() {
      let Some(offsets) = tls_offsets.get(&module_id) else {
         continue;
      };

      let mut pass = TlsResolution {
         module: module_id,
         offsets,
      };

      let function_list = program.module(module_id).function_list();
      pass.visit_function_list(program, function_list);

      for region in program.module(module_id).data_regions().to_vec() {
         pass.visit_data_region(program, region);
      }
   }
}
