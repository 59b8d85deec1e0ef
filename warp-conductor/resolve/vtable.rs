//! Phase 4: vtable resolution. Every unlinked, pointer-sized slot in read-only data whose bytes
//! equal a known function's address is a vtable entry; it becomes a `NormalLink` to that
//! function.

use std::collections::HashMap;

use warp_chunk::{
   ChunkRef,
   FunctionId,
   Link,
   Program,
};

pub fn run(program: &mut Program, function_addresses: &HashMap<u64, FunctionId>) {
   for module_id in program.modules().to_vec() {
      for region_id in program.module(module_id).data_regions().to_vec() {
         if program.data_region(region_id).writable {
            continue;
         }

         for section_id in program.data_region(region_id).sections().to_vec() {
            for variable_id in program.data_section(section_id).variables().to_vec() {
               let variable = program.data_variable(variable_id);
               if variable.link.is_some() || variable.bytes.len() != 8 {
                  continue;
               }

               let candidate = u64::from_le_bytes(variable.bytes[..8].try_into().expect("checked length"));
               if let Some(&function) = function_addresses.get(&candidate) {
                  program.data_variable_mut(variable_id).link = Some(Link::Normal(ChunkRef::Function(function)));
               }
            }
         }
      }
   }
}
