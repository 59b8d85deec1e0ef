//! Logging-instrumentation pass: wraps each direct call site with a probe that calls
//! `warp_log_call`, resolved like any other external call once a module providing that symbol
//! is loaded.

use std::cell::Cell;

use warp_chunk::{
   BranchForm,
   Link,
   Program,
   Semantic,
};
use warp_visit::Visitor;

/// Inserts a probe call immediately before every direct call site it visits. `inserted` counts
/// how many probes were added, for the shell to report back to the user.
#[derive(Debug, Default)]
pub struct LoggingPass {
   pub inserted: usize,
}

impl Visitor for LoggingPass {
   fn visit_instruction(&mut self, program: &mut Program, id: warp_chunk::InstructionId) {
      let is_direct_call = matches!(
         &program.instruction(id).semantic,
         Semantic::LinkedControlFlow {
            form: BranchForm::X86NearRel32 { opcode: [0xE8, _], .. },
            ..
         }
      );
      if !is_direct_call {
         return;
      }

      let block = program.instruction_block(id);
      let index = program.block(block).instructions().iter().position(|&candidate| candidate == id).unwrap_or(0);

      program.insert_instruction(block, index, Semantic::LinkedControlFlow {
         form: BranchForm::X86NearRel32 {
            opcode: [0xE8, 0],
            opcode_len: 1,
         },
         link: Link::SymbolOnly { symbol: "warp_log_call".into(), weak: true },
         widened: Cell::new(false),
      });

      self.inserted += 1;
   }
}

#[cfg(test)]
mod tests {
   use warp_chunk::{
      ChunkRef,
      Position,
   };

   use super::*;

   #[test]
   fn probes_are_inserted_before_every_direct_call() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0), false);
      let list = program.module(module).function_list();
      let callee = program.insert_function(list, "callee".into(), Position::Absolute(0x2000));
      program.push_block(callee);

      let caller = program.insert_function(list, "caller".into(), Position::AfterPreviousSibling);
      let block = program.push_block(caller);
      program.insert_instruction(block, 0, Semantic::LinkedControlFlow {
         form:    BranchForm::X86NearRel32 {
            opcode:     [0xE8, 0],
            opcode_len: 1,
         },
         link:    Link::Normal(ChunkRef::Function(callee)),
         widened: Cell::new(false),
      });

      let mut pass = LoggingPass::default();
      pass.visit_block(&mut program, block);

      assert_eq!(pass.inserted, 1);
      assert_eq!(program.block(block).instructions().len(), 2);
   }
}
