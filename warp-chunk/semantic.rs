//! Instruction semantics: the payload an [`crate::Instruction`] owns, and the minimal
//! relative-branch re-encoding needed to keep a linked control transfer correct after its
//! target moves.
//!
//! The encoder here is deliberately small — it knows just enough about x86-64 and AArch64
//! branch shapes to keep the layout fixpoint (see `warp-layout`) and the example passes
//! honest. It stands in for a real disassembler/assembler, which is an external collaborator
//! per the shell/ELF interfaces, not something this crate re-implements.

use std::cell::Cell;

use smallvec::SmallVec;
use warp_error::{
   Kind,
   Result,
};

use crate::link::Link;

/// Inline byte buffer sized for the longest x86-64 instruction (15 bytes).
pub type Bytes = SmallVec<[u8; 15]>;

/// A decoded instruction retained alongside its original bytes, for inspection without
/// committing to a link.
#[derive(Debug, Clone)]
pub struct Decoded {
   pub mnemonic: String,
   pub bytes: Bytes,
}

/// The shape of a linked control-transfer instruction: which opcode bytes carry the
/// displacement, and how wide that displacement field is allowed to grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchForm {
   /// x86-64 short conditional jump: `0x7x rel8`.
   X86ShortRel8 { condition: u8 },
   /// x86-64 call/jmp with a 32-bit relative displacement; `opcode` holds the 1 or 2 bytes that
   /// precede the displacement (`opcode_len` tells how many are significant).
   X86NearRel32 { opcode: [u8; 2], opcode_len: u8 },
   /// AArch64 unconditional or conditional branch: a fixed 4-byte word with a 26-bit (or
   /// narrower) signed immediate packed into `fixed_bits`'s low bits.
   Aarch64Rel26 { fixed_bits: u32 },
}

impl BranchForm {
   #[must_use]
   pub fn short_size(&self) -> u64 {
      match *self {
         BranchForm::X86ShortRel8 { .. } => 2,
         BranchForm::X86NearRel32 { opcode_len, .. } => u64::from(opcode_len) + 4,
         BranchForm::Aarch64Rel26 { .. } => 4,
      }
   }

   #[must_use]
   pub fn long_size(&self) -> u64 {
      match *self {
         // Promoted short-Jcc becomes `0x0F 0x8x rel32`: 2 opcode bytes + 4-byte displacement.
         BranchForm::X86ShortRel8 { .. } => 6,
         BranchForm::X86NearRel32 { opcode_len, .. } => u64::from(opcode_len) + 4,
         BranchForm::Aarch64Rel26 { .. } => 4,
      }
   }

   fn fits_short(&self, displacement: i64) -> bool {
      match self {
         BranchForm::X86ShortRel8 { .. } => i8::try_from(displacement).is_ok(),
         BranchForm::X86NearRel32 { .. } => true,
         BranchForm::Aarch64Rel26 { .. } => (-(1_i64 << 25)..(1_i64 << 25)).contains(&displacement),
      }
   }

   fn encode(&self, buffer: &mut Vec<u8>, displacement: i64, widened: bool) {
      match *self {
         BranchForm::X86ShortRel8 { condition } => {
            if widened {
               buffer.push(0x0F);
               buffer.push(0x80 | (condition & 0x0F));
               buffer.extend_from_slice(&(displacement as i32).to_le_bytes());
            } else {
               buffer.push(0x70 | (condition & 0x0F));
               buffer.push(displacement as i8 as u8);
            }
         },
         BranchForm::X86NearRel32 { opcode, opcode_len } => {
            buffer.extend_from_slice(&opcode[..opcode_len as usize]);
            buffer.extend_from_slice(&(displacement as i32).to_le_bytes());
         },
         BranchForm::Aarch64Rel26 { fixed_bits } => {
            let imm26 = (displacement >> 2) as u32 & 0x03FF_FFFF;
            buffer.extend_from_slice(&(fixed_bits | imm26).to_le_bytes());
         },
      }
   }
}

/// What an [`crate::Instruction`] owns: either literal bytes, a decoded-but-unlinked form, or a
/// link to a control-flow or data target whose displacement is recomputed on every emit.
#[derive(Debug, Clone)]
pub enum Semantic {
   /// Literal opcode bytes; no symbolic reference.
   Raw(Bytes),
   /// Decoded fields retained alongside the original bytes; inspected but not linked.
   Disassembled(Decoded),
   /// A control transfer whose target is resolved through `link`. `widened` latches once the
   /// displacement no longer fits the short encoding and never resets — the layout fixpoint
   /// relies on that monotonicity to guarantee convergence.
   LinkedControlFlow {
      form:    BranchForm,
      link:    Link,
      widened: Cell<bool>,
   },
   /// A memory operand whose displacement resolves through `link`; `width` is the encoded
   /// field's byte width (4 for a 32-bit displacement, 8 for an absolute pointer-sized slot).
   LinkedData { link: Link, width: u8 },
}

impl Semantic {
   #[must_use]
   pub fn link(&self) -> Option<&Link> {
      match self {
         Semantic::LinkedControlFlow { link, .. } | Semantic::LinkedData { link, .. } => Some(link),
         Semantic::Raw(_) | Semantic::Disassembled(_) => None,
      }
   }

   /// Replaces the link of a linked semantic. A no-op on `Raw`/`Disassembled` semantics — callers
   /// that need to turn an unlinked instruction into a linked one replace the whole `Semantic`.
   pub fn set_link(&mut self, new_link: Link) {
      match self {
         Semantic::LinkedControlFlow { link, .. } | Semantic::LinkedData { link, .. } => *link = new_link,
         Semantic::Raw(_) | Semantic::Disassembled(_) => {},
      }
   }

   /// Current committed encoded size.
   #[must_use]
   pub fn size(&self) -> u64 {
      match self {
         Semantic::Raw(bytes) => bytes.len() as u64,
         Semantic::Disassembled(decoded) => decoded.bytes.len() as u64,
         Semantic::LinkedControlFlow { form, widened, .. } => {
            if widened.get() {
               form.long_size()
            } else {
               form.short_size()
            }
         },
         Semantic::LinkedData { width, .. } => u64::from(*width),
      }
   }

   /// One step of the layout fixpoint (§4.5 of the design): given the instruction's current
   /// emission address and its link's resolved target address, widen the encoding if the
   /// current one no longer fits. Returns `true` if a widening occurred, so the caller knows to
   /// run another fixpoint iteration.
   pub fn widen_if_needed(&self, current_address: u64, target_address: u64) -> bool {
      let Semantic::LinkedControlFlow { form, widened, .. } = self else {
         return false;
      };
      if widened.get() {
         return false;
      }

      let displacement = target_address as i64 - (current_address as i64 + form.short_size() as i64);
      if form.fits_short(displacement) {
         false
      } else {
         widened.set(true);
         true
      }
   }

   /// Emits this semantic's bytes at `current_address`, resolving `target_address` (already
   /// looked up by the caller from this semantic's [`Link`]) into the displacement or pointer
   /// field. Fails with [`Kind::Resolution`] if a linked semantic has no resolved target —
   /// emitting such a semantic indicates a missed resolution phase.
   pub fn write_into(&self, buffer: &mut Vec<u8>, current_address: u64, target_address: Option<u64>) -> Result<()> {
      match self {
         Semantic::Raw(bytes) => {
            buffer.extend_from_slice(bytes);
            Ok(())
         },
         Semantic::Disassembled(decoded) => {
            buffer.extend_from_slice(&decoded.bytes);
            Ok(())
         },
         Semantic::LinkedControlFlow { form, widened, link } => {
            let target = target_address.ok_or_else(|| unresolved(link))?;
            let size = if widened.get() { form.long_size() } else { form.short_size() };
            let displacement = target as i64 - (current_address as i64 + size as i64);
            form.encode(buffer, displacement, widened.get());
            Ok(())
         },
         Semantic::LinkedData { width, link } => {
            let target = target_address.ok_or_else(|| unresolved(link))?;
            match width {
               4 => buffer.extend_from_slice(&(target as u32).to_le_bytes()),
               8 => buffer.extend_from_slice(&target.to_le_bytes()),
               other => buffer.extend_from_slice(&target.to_le_bytes()[..*other as usize]),
            }
            Ok(())
         },
      }
   }
}

fn unresolved(link: &Link) -> Kind {
   let symbol = match link {
      Link::SymbolOnly { symbol, .. } | Link::LoaderBridge(symbol) => symbol.clone(),
      other => format!("{other:?}"),
   };

   Kind::Resolution {
      source_path: String::new(),
      symbol,
   }
}
