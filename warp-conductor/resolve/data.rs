//! Phase 6: data pointer fixup. Any `SymbolOnlyLink` still attached to a `DataVariable` — one
//! the earlier phases had no reason to touch, because it names neither a PLT, TLS, weak, nor
//! vtable-shaped symbol — is resolved to a `NormalLink` or `DataOffsetLink` by direct name
//! match against the conductor's whole-program symbol index.

use std::collections::HashMap;

use warp_chunk::{
   ChunkRef,
   Link,
   Program,
};

pub fn run(program: &mut Program, symbol_index: &HashMap<String, ChunkRef>) {
   for module_id in program.modules().to_vec() {
      for region_id in program.module(module_id).data_regions().to_vec() {
         for section_id in program.data_region(region_id).sections().to_vec() {
            for variable_id in program.data_section(section_id).variables().to_vec() {
               let Some(Link::SymbolOnly { symbol, weak: false }) = &program.data_variable(variable_id).link else {
                  continue;
               };

               if let Some(&target) = symbol_index.get(symbol) {
                  program.data_variable_mut(variable_id).link = Some(Link::Normal(target));
               }
            }
         }
      }
   }
}
