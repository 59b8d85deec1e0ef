//! Address assignment: walks every function in deterministic module/function order, laying it
//! out at the sandbox's next aligned cursor position, then re-checks every linked semantic's
//! encoded size against the addresses that resulted. Repeats until nothing widened.

use tracing::debug;
use warp_chunk::Program;
use warp_error::{
   Kind,
   Result,
};

/// Functions are aligned to this boundary; matches the default `.text` alignment the `object`
/// crate's ELF writer uses for executable sections.
const FUNCTION_ALIGNMENT: u64 = 16;

/// A fixpoint rarely needs more than a couple of passes (each widening only flips one
/// conditional branch's encoding once, and widenings never reverse); this bounds a genuine
/// ISA-encoding bug rather than slow but legitimate convergence.
const MAX_ITERATIONS: usize = 64;

/// Assigns absolute addresses to every function in every module, starting each module at the
/// base given in `bases` (module, base address), in the order `bases` lists them. Returns once
/// the fixpoint has converged — no linked semantic widened in the final pass — or
/// `Kind::Layout` if it hasn't after `MAX_ITERATIONS`.
pub fn reassign(program: &mut Program, bases: &[(warp_chunk::ModuleId, u64)]) -> Result<()> {
   for &(module_id, base) in bases {
      program.set_module_address(module_id, base);
   }

   for iteration in 0..MAX_ITERATIONS {
      let mut cursor_by_module: std::collections::HashMap<_, _> =
         bases.iter().map(|&(module, base)| (module, base)).collect();
      let mut widened_any = false;

      for &(module_id, _) in bases {
         let cursor = cursor_by_module.get_mut(&module_id).expect("seeded above");
         let list = program.module(module_id).function_list();

         for &function_id in program.function_list(list).functions().to_vec().iter() {
            *cursor = align_up(*cursor, FUNCTION_ALIGNMENT);
            program.set_function_address(function_id, *cursor);

            for &block_id in program.function(function_id).blocks().to_vec().iter() {
               for &instruction_id in program.block(block_id).instructions().to_vec().iter() {
                  let address = program.instruction_address(instruction_id);
                  let instruction = program.instruction(instruction_id);
                  let Some(link) = instruction.semantic.link() else {
                     continue;
                  };

                  let Some(target) = program.link_target_address(link) else {
                     continue;
                  };

                  if instruction.semantic.widen_if_needed(address, target) {
                     program.touch_block(block_id);
                     widened_any = true;
                  }
               }
            }

            *cursor += program.function_size(function_id);
         }
      }

      debug!(iteration, widened_any, "layout fixpoint pass");
      if !widened_any {
         return Ok(());
      }
   }

   Err(Kind::Layout {
      iterations: MAX_ITERATIONS,
      chunk:      "function layout".into(),
   }
   .into())
}

fn align_up(value: u64, alignment: u64) -> u64 {
   let remainder = value % alignment;
   if remainder == 0 {
      value
   } else {
      value + (alignment - remainder)
   }
}

#[cfg(test)]
mod tests {
   use warp_chunk::{
      Link,
      Position,
      Semantic,
   };

   use super::*;

   #[test]
   fn functions_are_laid_out_contiguously_and_aligned() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0), false);
      let list = program.module(module).function_list();

      let f1 = program.insert_function(list, "a".into(), Position::AfterPreviousSibling);
      let b1 = program.push_block(f1);
      program.insert_instruction(b1, 0, Semantic::Raw(smallvec::smallvec![0x90; 3]));

      let f2 = program.insert_function(list, "b".into(), Position::AfterPreviousSibling);
      let b2 = program.push_block(f2);
      program.insert_instruction(b2, 0, Semantic::Raw(smallvec::smallvec![0x90; 3]));

      reassign(&mut program, &[(module, 0x1000)]).unwrap();

      assert_eq!(program.function_address(f1), 0x1000);
      assert_eq!(program.function_address(f2), 0x1010);
   }

   #[test]
   fn widening_a_short_branch_is_reflected_in_later_addresses() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0), false);
      let list = program.module(module).function_list();

      let caller = program.insert_function(list, "caller".into(), Position::AfterPreviousSibling);
      let block = program.push_block(caller);
      let branch = program.insert_instruction(block, 0, Semantic::LinkedControlFlow {
         form:    warp_chunk::BranchForm::X86ShortRel8 { condition: 4 },
         link:    Link::SymbolOnly {
            symbol: "far_away".into(),
            weak:   false,
         },
         widened: std::cell::Cell::new(false),
      });

      let far_function = program.insert_function(list, "far_away".into(), Position::Absolute(0x10000));
      program.push_block(far_function);

      program.instruction_mut(branch).semantic.set_link(Link::Normal(warp_chunk::ChunkRef::Function(far_function)));

      reassign(&mut program, &[(module, 0x1000)]).unwrap();

      assert_eq!(program.instruction_size(branch), 6);
   }
}
