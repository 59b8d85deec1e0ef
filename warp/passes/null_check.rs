//! Indirect-call null-pointer detector: every computed branch through a [`Link::JumpTable`]
//! gets a guard call to `warp_null_check` inserted immediately before it, resolved like any
//! other external call once a module providing that symbol is loaded.

use std::cell::Cell;

use warp_chunk::{
   BranchForm,
   Link,
   Program,
   Semantic,
};
use warp_visit::Visitor;

#[derive(Debug, Default)]
pub struct NullCheckPass {
   pub guarded: usize,
}

impl Visitor for NullCheckPass {
   fn visit_instruction(&mut self, program: &mut Program, id: warp_chunk::InstructionId) {
      let is_indirect = matches!(
         &program.instruction(id).semantic,
         Semantic::LinkedControlFlow {
            link: Link::JumpTable(_),
            ..
         }
      );
      if !is_indirect {
         return;
      }

      let block = program.instruction_block(id);
      let index = program.block(block).instructions().iter().position(|&candidate| candidate == id).unwrap_or(0);

      program.insert_instruction(block, index, Semantic::LinkedControlFlow {
         form: BranchForm::X86NearRel32 {
            opcode:     [0xE8, 0],
            opcode_len: 1,
         },
         link: Link::SymbolOnly { symbol: "warp_null_check".into(), weak: true },
         widened: Cell::new(false),
      });

      self.guarded += 1;
   }
}

#[cfg(test)]
mod tests {
   use warp_chunk::{
      Position,
   };

   use super::*;

   #[test]
   fn guards_are_inserted_before_jump_table_dispatches() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0), false);
      let table = program.push_jump_table(module, Position::Absolute(0x3000));

      let list = program.module(module).function_list();
      let function = program.insert_function(list, "dispatch".into(), Position::AfterPreviousSibling);
      let block = program.push_block(function);
      program.insert_instruction(block, 0, Semantic::LinkedControlFlow {
         form:    BranchForm::X86NearRel32 {
            opcode:     [0xE9, 0],
            opcode_len: 1,
         },
         link:    Link::JumpTable(table),
         widened: Cell::new(false),
      });

      let mut pass = NullCheckPass::default();
      pass.visit_block(&mut program, block);

      assert_eq!(pass.guarded, 1);
      assert_eq!(program.block(block).instructions().len(), 2);
   }
}
