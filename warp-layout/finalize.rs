//! Finalization: once `assign::reassign` has converged, every function's instructions are
//! written into a [`Sandbox`] at their assigned addresses.

use warp_chunk::{
   ModuleId,
   Program,
};
use warp_error::Result;

use crate::sandbox::Sandbox;

/// Writes every function belonging to `modules` into `sandbox`, in function-address order. Does
/// not touch data regions or markers — those are the emission pipeline's (`warp-elf`)
/// responsibility, since they participate in section layout rather than the code sandbox.
pub fn finalize(program: &Program, modules: &[ModuleId], sandbox: &mut dyn Sandbox) -> Result<()> {
   for &module_id in modules {
      let list = program.module(module_id).function_list();

      for &function_id in program.function_list(list).functions() {
         for &block_id in program.function(function_id).blocks() {
            for &instruction_id in program.block(block_id).instructions() {
               let address = program.instruction_address(instruction_id);
               let instruction = program.instruction(instruction_id);
               let target = instruction.semantic.link().and_then(|link| program.link_target_address(link));

               let mut bytes = Vec::new();
               instruction.semantic.write_into(&mut bytes, address, target)?;
               sandbox.write_at(address, &bytes);
            }
         }
      }
   }

   Ok(())
}

#[cfg(test)]
mod tests {
   use warp_chunk::Position;

   use super::*;
   use crate::sandbox::LoaderSandbox;

   #[test]
   fn finalize_writes_every_instruction_at_its_assigned_address() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0x1000), false);
      let list = program.module(module).function_list();
      let function = program.insert_function(list, "f".into(), Position::AfterPreviousSibling);
      let block = program.push_block(function);
      program.insert_instruction(block, 0, warp_chunk::Semantic::Raw(smallvec::smallvec![0x90, 0x90]));

      program.set_function_address(function, 0x1000);

      let mut sandbox = LoaderSandbox::new(0x1000);
      finalize(&program, &[module], &mut sandbox).unwrap();

      assert_eq!(sandbox.into_bytes(), vec![0x90, 0x90]);
   }
}
