//! Context-switch pass: saves the caller-saved registers `rax`, `rcx`, `rdx` around every
//! instrumented call site (identified the same way [`crate::passes::LoggingPass`] identifies
//! one — a direct call whose opcode byte is `0xE8`), so an instrumentation probe inserted
//! ahead of it can't clobber the caller's live values.

use warp_chunk::{
   BranchForm,
   Program,
   Semantic,
};
use warp_visit::Visitor;

const PUSH_RAX: u8 = 0x50;
const PUSH_RCX: u8 = 0x51;
const PUSH_RDX: u8 = 0x52;
const POP_RDX: u8 = 0x5A;
const POP_RCX: u8 = 0x59;
const POP_RAX: u8 = 0x58;

#[derive(Debug, Default)]
pub struct ContextSwitchPass {
   pub wrapped: usize,
}

impl Visitor for ContextSwitchPass {
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

      program.insert_instruction(block, index + 1, raw(&[POP_RDX, POP_RCX, POP_RAX]));
      program.insert_instruction(block, index, raw(&[PUSH_RAX, PUSH_RCX, PUSH_RDX]));

      self.wrapped += 1;
   }
}

fn raw(bytes: &[u8]) -> Semantic {
   Semantic::Raw(warp_chunk::Bytes::from_slice(bytes))
}

#[cfg(test)]
mod tests {
   use std::cell::Cell;

   use warp_chunk::{
      ChunkRef,
      Link,
      Position,
   };

   use super::*;

   #[test]
   fn calls_are_wrapped_with_a_save_and_restore() {
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

      let mut pass = ContextSwitchPass::default();
      pass.visit_block(&mut program, block);

      assert_eq!(pass.wrapped, 1);
      assert_eq!(program.block(block).instructions().len(), 3);
   }
}
