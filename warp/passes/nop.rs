//! Nop inserter: appends one single-byte `nop` after every instruction it visits. The simplest
//! possible pass, useful mainly to exercise the insert-during-traversal contract (§4.4) and the
//! layout fixpoint's monotonic growth.

use warp_chunk::{
   Program,
   Semantic,
};
use warp_visit::Visitor;

#[derive(Debug, Default)]
pub struct NopPass {
   pub inserted: usize,
}

impl Visitor for NopPass {
   fn visit_instruction(&mut self, program: &mut Program, id: warp_chunk::InstructionId) {
      let block = program.instruction_block(id);
      let index = program.block(block).instructions().iter().position(|&candidate| candidate == id).unwrap_or(0);

      program.insert_instruction(block, index + 1, Semantic::Raw(warp_chunk::Bytes::from_slice(&[0x90])));
      self.inserted += 1;
   }
}

#[cfg(test)]
mod tests {
   use warp_chunk::Position;

   use super::*;

   #[test]
   fn a_nop_follows_every_original_instruction() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0), false);
      let list = program.module(module).function_list();
      let function = program.insert_function(list, "f".into(), Position::AfterPreviousSibling);
      let block = program.push_block(function);
      program.insert_instruction(block, 0, Semantic::Raw(warp_chunk::Bytes::from_slice(&[0x90; 4])));
      program.insert_instruction(block, 1, Semantic::Raw(warp_chunk::Bytes::from_slice(&[0x90; 2])));

      let original_size = program.function_size(function);

      let mut pass = NopPass::default();
      pass.visit_block(&mut program, block);

      assert_eq!(pass.inserted, 2);
      assert_eq!(program.function_size(function), original_size + 2);
   }
}
