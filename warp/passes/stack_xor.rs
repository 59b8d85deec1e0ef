//! Return-address hardener: XORs the return address a function's prologue pushes with a fixed
//! constant, and XORs it back in the epilogue, so an attacker with an arbitrary-write primitive
//! can't easily overwrite it with a usable value.

use warp_chunk::{
   Decoded,
   FunctionId,
   Program,
   Semantic,
};
use warp_visit::Visitor;

/// `xor qword ptr [rsp], 0x28`.
const XOR_RETURN_ADDRESS: &[u8] = &[0x48, 0x83, 0x34, 0x24, 0x28];

#[derive(Debug, Default)]
pub struct StackXorPass {
   pub hardened: usize,
}

impl StackXorPass {
   fn guard(&mut self, program: &mut Program, function: FunctionId) {
      let Some(&first_block) = program.function(function).blocks().first() else {
         return;
      };

      let push_index = program
         .block(first_block)
         .instructions()
         .iter()
         .position(|&id| is_mnemonic(program, id, "push"));
      if let Some(index) = push_index {
         program.insert_instruction(first_block, index + 1, xor_instruction());
      }

      for &block in program.function(function).blocks().to_vec().iter() {
         let pop_index = program.block(block).instructions().iter().position(|&id| is_mnemonic(program, id, "pop"));
         if let Some(index) = pop_index {
            program.insert_instruction(block, index, xor_instruction());
         }
      }

      self.hardened += 1;
   }
}

impl Visitor for StackXorPass {
   fn visit_function(&mut self, program: &mut Program, id: FunctionId) {
      self.guard(program, id);
   }
}

fn xor_instruction() -> Semantic {
   Semantic::Disassembled(Decoded {
      mnemonic: "xor".into(),
      bytes:    warp_chunk::Bytes::from_slice(XOR_RETURN_ADDRESS),
   })
}

fn is_mnemonic(program: &Program, id: warp_chunk::InstructionId, prefix: &str) -> bool {
   matches!(&program.instruction(id).semantic, Semantic::Disassembled(decoded) if decoded.mnemonic.starts_with(prefix))
}

#[cfg(test)]
mod tests {
   use warp_chunk::Position;

   use super::*;

   fn push_rbp() -> Semantic {
      Semantic::Disassembled(Decoded {
         mnemonic: "push r5".into(),
         bytes:    warp_chunk::Bytes::from_slice(&[0x55]),
      })
   }

   fn pop_rbp() -> Semantic {
      Semantic::Disassembled(Decoded {
         mnemonic: "pop r5".into(),
         bytes:    warp_chunk::Bytes::from_slice(&[0x5D]),
      })
   }

   #[test]
   fn xor_guards_are_inserted_around_the_saved_return_address() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0), false);
      let list = program.module(module).function_list();
      let function = program.insert_function(list, "f".into(), Position::AfterPreviousSibling);
      let block = program.push_block(function);
      program.insert_instruction(block, 0, push_rbp());
      program.insert_instruction(block, 1, pop_rbp());

      let mut pass = StackXorPass::default();
      pass.visit_function(&mut program, function);

      assert_eq!(pass.hardened, 1);
      assert_eq!(program.block(block).instructions().len(), 4);
   }
}
