//! Stack-frame extender: adds `N` bytes to a function's frame by inserting a `sub rsp, N` right
//! after entry and a matching `add rsp, N` before every `ret`.

use warp_chunk::{
   Decoded,
   FunctionId,
   Program,
   Semantic,
};
use warp_visit::Visitor;

#[derive(Debug)]
pub struct FrameExtendPass {
   pub extra_bytes: u8,
   pub extended:    usize,
}

impl FrameExtendPass {
   #[must_use]
   pub fn new(extra_bytes: u8) -> Self {
      Self {
         extra_bytes,
         extended: 0,
      }
   }
}

impl Visitor for FrameExtendPass {
   fn visit_function(&mut self, program: &mut Program, id: FunctionId) {
      let Some(&first_block) = program.function(id).blocks().first() else {
         return;
      };

      program.insert_instruction(first_block, 0, sub_rsp(self.extra_bytes));

      for &block in program.function(id).blocks().to_vec().iter() {
         let ret_indices: Vec<_> = program
            .block(block)
            .instructions()
            .iter()
            .enumerate()
            .filter(|&(_, &instruction)| is_ret(program, instruction))
            .map(|(index, _)| index)
            .collect();

         for index in ret_indices.into_iter().rev() {
            program.insert_instruction(block, index, add_rsp(self.extra_bytes));
         }
      }

      self.extended += 1;
   }
}

fn sub_rsp(bytes: u8) -> Semantic {
   Semantic::Disassembled(Decoded {
      mnemonic: "sub".into(),
      bytes:    warp_chunk::Bytes::from_slice(&[0x48, 0x83, 0xEC, bytes]),
   })
}

fn add_rsp(bytes: u8) -> Semantic {
   Semantic::Disassembled(Decoded {
      mnemonic: "add".into(),
      bytes:    warp_chunk::Bytes::from_slice(&[0x48, 0x83, 0xC4, bytes]),
   })
}

fn is_ret(program: &Program, id: warp_chunk::InstructionId) -> bool {
   matches!(&program.instruction(id).semantic, Semantic::Disassembled(decoded) if decoded.mnemonic == "ret")
}

#[cfg(test)]
mod tests {
   use warp_chunk::Position;

   use super::*;

   fn ret() -> Semantic {
      Semantic::Disassembled(Decoded {
         mnemonic: "ret".into(),
         bytes:    warp_chunk::Bytes::from_slice(&[0xC3]),
      })
   }

   #[test]
   fn a_sub_and_matching_add_surround_the_frame() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0), false);
      let list = program.module(module).function_list();
      let function = program.insert_function(list, "f".into(), Position::AfterPreviousSibling);
      let block = program.push_block(function);
      program.insert_instruction(block, 0, ret());

      let mut pass = FrameExtendPass::new(0x20);
      pass.visit_function(&mut program, function);

      assert_eq!(pass.extended, 1);
      assert_eq!(program.block(block).instructions().len(), 3);
   }
}
