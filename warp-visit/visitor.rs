use warp_chunk::{
   BlockId,
   DataRegionId,
   DataSectionId,
   DataVariableId,
   FunctionId,
   FunctionListId,
   JumpTableEntryId,
   JumpTableId,
   MarkerId,
   ModuleId,
   PltTrampolineId,
   Program,
};

use crate::snapshot;

/// Declares one `visit_*` method per chunk variant; the default implementation descends into
/// that chunk's children. Overriding a method and not calling the matching `accept_*` free
/// function stops the descent there — the usual way a pass scopes itself to, say, only
/// `Instruction`s without touching data regions.
pub trait Visitor {
   fn visit_module(&mut self, program: &mut Program, id: ModuleId) {
      accept_module(self, program, id);
   }

   fn visit_function_list(&mut self, program: &mut Program, id: FunctionListId) {
      accept_function_list(self, program, id);
   }

   fn visit_function(&mut self, program: &mut Program, id: FunctionId) {
      accept_function(self, program, id);
   }

   fn visit_block(&mut self, program: &mut Program, id: BlockId) {
      for instruction in snapshot(program.block(id).instructions()) {
         if program.instruction_exists(instruction) {
            self.visit_instruction(program, instruction);
         }
      }
   }

   fn visit_instruction(&mut self, _program: &mut Program, _id: warp_chunk::InstructionId) {}

   fn visit_data_region(&mut self, program: &mut Program, id: DataRegionId) {
      accept_data_region(self, program, id);
   }

   fn visit_data_section(&mut self, program: &mut Program, id: DataSectionId) {
      accept_data_section(self, program, id);
   }

   fn visit_data_variable(&mut self, _program: &mut Program, _id: DataVariableId) {}

   fn visit_marker(&mut self, _program: &mut Program, _id: MarkerId) {}

   fn visit_plt_trampoline(&mut self, _program: &mut Program, _id: PltTrampolineId) {}

   fn visit_jump_table(&mut self, program: &mut Program, id: JumpTableId) {
      accept_jump_table(self, program, id);
   }

   fn visit_jump_table_entry(&mut self, _program: &mut Program, _id: JumpTableEntryId) {}
}

/// Default descent for a module: its function list, every data region, every marker, every PLT
/// trampoline, and every jump table, in that order. A pass overriding `visit_module` and
/// wanting the default behaviour too should call this explicitly.
pub fn accept_module<V: Visitor + ?Sized>(visitor: &mut V, program: &mut Program, id: ModuleId) {
   let function_list = program.module(id).function_list();
   visitor.visit_function_list(program, function_list);

   for region in snapshot(program.module(id).data_regions()) {
      if program.data_region_exists(region) {
         visitor.visit_data_region(program, region);
      }
   }

   for marker in snapshot(program.module(id).markers()) {
      if program.marker_exists(marker) {
         visitor.visit_marker(program, marker);
      }
   }

   for trampoline in snapshot(program.module(id).plt_trampolines()) {
      if program.plt_trampoline_exists(trampoline) {
         visitor.visit_plt_trampoline(program, trampoline);
      }
   }

   for table in snapshot(program.module(id).jump_tables()) {
      if program.jump_table_exists(table) {
         visitor.visit_jump_table(program, table);
      }
   }
}

pub fn accept_function_list<V: Visitor + ?Sized>(visitor: &mut V, program: &mut Program, id: FunctionListId) {
   for function in snapshot(program.function_list(id).functions()) {
      if program.function_exists(function) {
         visitor.visit_function(program, function);
      }
   }
}

pub fn accept_function<V: Visitor + ?Sized>(visitor: &mut V, program: &mut Program, id: FunctionId) {
   for block in snapshot(program.function(id).blocks()) {
      if program.block_exists(block) {
         visitor.visit_block(program, block);
      }
   }
}

pub fn accept_data_region<V: Visitor + ?Sized>(visitor: &mut V, program: &mut Program, id: DataRegionId) {
   for section in snapshot(program.data_region(id).sections()) {
      if program.data_section_exists(section) {
         visitor.visit_data_section(program, section);
      }
   }
}

pub fn accept_data_section<V: Visitor + ?Sized>(visitor: &mut V, program: &mut Program, id: DataSectionId) {
   for variable in snapshot(program.data_section(id).variables()) {
      if program.data_variable_exists(variable) {
         visitor.visit_data_variable(program, variable);
      }
   }
}

pub fn accept_jump_table<V: Visitor + ?Sized>(visitor: &mut V, program: &mut Program, id: JumpTableId) {
   for entry in snapshot(program.jump_table(id).entries()) {
      if program.jump_table_entry_exists(entry) {
         visitor.visit_jump_table_entry(program, entry);
      }
   }
}

#[cfg(test)]
mod tests {
   use warp_chunk::{
      Position,
      Semantic,
   };

   use super::*;

   struct CountInstructions(usize);

   impl Visitor for CountInstructions {
      fn visit_instruction(&mut self, _program: &mut Program, _id: warp_chunk::InstructionId) {
         self.0 += 1;
      }
   }

   #[test]
   fn default_descent_reaches_every_instruction() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0), false);
      let list = program.module(module).function_list();
      let function = program.insert_function(list, "f".into(), Position::AfterPreviousSibling);
      let block = program.push_block(function);
      program.insert_instruction(block, 0, Semantic::Raw(smallvec::smallvec![0x90]));
      program.insert_instruction(block, 1, Semantic::Raw(smallvec::smallvec![0x90]));

      let mut counter = CountInstructions(0);
      counter.visit_module(&mut program, module);
      assert_eq!(counter.0, 2);
   }

   struct InsertOneMore {
      block:   warp_chunk::BlockId,
      visited: usize,
   }

   impl Visitor for InsertOneMore {
      fn visit_instruction(&mut self, program: &mut Program, _id: warp_chunk::InstructionId) {
         self.visited += 1;
         program.insert_instruction(self.block, 0, Semantic::Raw(smallvec::smallvec![0xCC]));
      }
   }

   #[test]
   fn inserting_during_traversal_does_not_visit_the_new_sibling_this_pass() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0), false);
      let list = program.module(module).function_list();
      let function = program.insert_function(list, "f".into(), Position::AfterPreviousSibling);
      let block = program.push_block(function);
      program.insert_instruction(block, 0, Semantic::Raw(smallvec::smallvec![0x90]));

      let mut pass = InsertOneMore { block, visited: 0 };
      pass.visit_block(&mut program, block);

      assert_eq!(pass.visited, 1);
      assert_eq!(program.block(block).instructions().len(), 2);
   }
}
