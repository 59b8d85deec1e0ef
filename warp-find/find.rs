//! `ChunkFind`: address-probe lookup that descends the tree picking, at each level, the child
//! whose `[address, address+size)` range contains the probe address.

use warp_chunk::{
   ChunkRef,
   ModuleId,
   Program,
};

/// Descends from `root` choosing the containing child at each level, returning the deepest
/// chunk whose range contains `address`, or `root` itself if none of its children do (but it
/// does). Returns `None` if `address` falls outside `root`'s own range.
#[must_use]
pub fn find_innermost_containing(program: &Program, root: ChunkRef, address: u64) -> Option<ChunkRef> {
   if !contains(program, root, address) {
      return None;
   }

   let mut current = root;
   loop {
      match descend(program, current, address) {
         Some(child) => current = child,
         None => return Some(current),
      }
   }
}

fn contains(program: &Program, target: ChunkRef, address: u64) -> bool {
   let base = program.chunk_address(target);
   let size = size_of(program, target).max(1);
   address >= base && address < base.saturating_add(size)
}

fn size_of(program: &Program, target: ChunkRef) -> u64 {
   match target {
      ChunkRef::Module(_) => u64::MAX,
      ChunkRef::Function(id) => program.function_size(id),
      ChunkRef::Block(id) => program.block_size(id),
      ChunkRef::Instruction(id) => program.instruction_size(id),
      ChunkRef::DataRegion(id) => program.data_region_size(id),
      ChunkRef::DataSection(id) => program.data_section_size(id),
      ChunkRef::DataVariable(id) => program.data_variable_size(id),
      ChunkRef::JumpTable(id) => program.jump_table_size(id),
      ChunkRef::PltTrampoline(_) | ChunkRef::JumpTableEntry(_) | ChunkRef::Marker(_) => 1,
   }
}

/// One step down: the first child (of whichever kind `target` has) whose range contains
/// `address`, or `None` if `target` is a leaf or none of its children match.
fn descend(program: &Program, target: ChunkRef, address: u64) -> Option<ChunkRef> {
   match target {
      ChunkRef::Module(id) => {
         let list = program.module(id).function_list();
         if let Some(function) = binary_search_functions(program, list, address) {
            return Some(ChunkRef::Function(function));
         }

         program
            .module(id)
            .data_regions()
            .iter()
            .find(|&&region| contains(program, ChunkRef::DataRegion(region), address))
            .map(|&region| ChunkRef::DataRegion(region))
      },
      ChunkRef::Function(id) => program
         .function(id)
         .blocks()
         .iter()
         .find(|&&block| contains(program, ChunkRef::Block(block), address))
         .map(|&block| ChunkRef::Block(block)),
      ChunkRef::Block(id) => program
         .block(id)
         .instructions()
         .iter()
         .find(|&&instruction| contains(program, ChunkRef::Instruction(instruction), address))
         .map(|&instruction| ChunkRef::Instruction(instruction)),
      ChunkRef::DataRegion(id) => program
         .data_region(id)
         .sections()
         .iter()
         .find(|&&section| contains(program, ChunkRef::DataSection(section), address))
         .map(|&section| ChunkRef::DataSection(section)),
      ChunkRef::DataSection(id) => program
         .data_section(id)
         .variables()
         .iter()
         .find(|&&variable| contains(program, ChunkRef::DataVariable(variable), address))
         .map(|&variable| ChunkRef::DataVariable(variable)),
      ChunkRef::Instruction(_)
      | ChunkRef::DataVariable(_)
      | ChunkRef::PltTrampoline(_)
      | ChunkRef::JumpTable(_)
      | ChunkRef::JumpTableEntry(_)
      | ChunkRef::Marker(_) => None,
   }
}

/// Binary search over a module's function list, which `warp_chunk::Program::insert_function`
/// maintains in address order.
fn binary_search_functions(program: &Program, list: warp_chunk::FunctionListId, address: u64) -> Option<warp_chunk::FunctionId> {
   let functions = program.function_list(list).functions();
   let index = functions
      .binary_search_by_key(&address, |&function| program.function_address(function))
      .unwrap_or_else(|insertion| insertion.saturating_sub(1));

   let candidate = *functions.get(index)?;
   contains(program, ChunkRef::Function(candidate), address).then_some(candidate)
}

/// Name/address resolution over a whole [`Program`]: `ChunkFind2` from the design notes.
pub struct ChunkFind2;

impl ChunkFind2 {
   /// Resolves an exact function-name match within `module`.
   #[must_use]
   pub fn function_by_name(program: &Program, module: ModuleId, name: &str) -> Option<warp_chunk::FunctionId> {
      let list = program.module(module).function_list();
      program
         .function_list(list)
         .functions()
         .iter()
         .copied()
         .find(|&function| program.function(function).name == name)
   }

   /// Resolves a function by address via binary search over `module`'s sorted function list.
   #[must_use]
   pub fn function_by_address(program: &Program, module: ModuleId, address: u64) -> Option<warp_chunk::FunctionId> {
      let list = program.module(module).function_list();
      binary_search_functions(program, list, address)
   }
}

#[cfg(test)]
mod tests {
   use warp_chunk::{
      Position,
      Semantic,
   };

   use super::*;

   fn sample_program() -> (Program, ModuleId, warp_chunk::FunctionId, warp_chunk::InstructionId) {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0x1000), false);
      let list = program.module(module).function_list();
      let function = program.insert_function(list, "start".into(), Position::Absolute(0x1000));
      let block = program.push_block(function);
      let instruction = program.insert_instruction(block, 0, Semantic::Raw(smallvec::smallvec![0x90; 4]));
      (program, module, function, instruction)
   }

   #[test]
   fn finds_the_instruction_containing_a_probe_address() {
      let (program, module, _function, instruction) = sample_program();
      let found = find_innermost_containing(&program, ChunkRef::Module(module), 0x1002);
      assert_eq!(found, Some(ChunkRef::Instruction(instruction)));
   }

   #[test]
   fn out_of_range_probes_find_nothing() {
      let (program, module, ..) = sample_program();
      assert_eq!(find_innermost_containing(&program, ChunkRef::Module(module), 0x9999), None);
   }

   #[test]
   fn chunk_find2_resolves_by_name_and_by_address() {
      let (program, module, function, _instruction) = sample_program();
      assert_eq!(ChunkFind2::function_by_name(&program, module, "start"), Some(function));
      assert_eq!(ChunkFind2::function_by_address(&program, module, 0x1002), Some(function));
      assert_eq!(ChunkFind2::function_by_name(&program, module, "missing"), None);
   }
}
