//! The disassembler collaborator: bytes in, decoded instructions out. Like [`crate::ElfMap`],
//! this is a trait boundary — [`MinimalDecoder`] is a stand-in covering only the instruction
//! subset the example passes and tests need (calls, jumps, conditional branches, push/pop,
//! simple ALU), not a general-purpose x86-64/AArch64 disassembler.

use warp_chunk::{
   BranchForm,
   Decoded,
};

/// One decoded instruction: its address, encoded length, a human-readable form, and its raw
/// bytes.
pub struct DecodedInstruction {
   pub address: u64,
   pub length:  usize,
   pub decoded: Decoded,
   /// Set when the instruction is a relative branch this implementation recognizes, so the
   /// caller can turn it into `Semantic::LinkedControlFlow` once the target is resolved.
   pub branch_form: Option<BranchForm>,
}

impl DecodedInstruction {
   /// The absolute target address statically encoded in this instruction's displacement, for
   /// branch-shaped instructions. Used once, at parse time, to seed a `Link` before any
   /// rewriting has had a chance to move anything.
   #[must_use]
   pub fn branch_target(&self) -> Option<u64> {
      let form = self.branch_form?;
      let next_address = self.address + self.length as u64;

      let displacement = match form {
         BranchForm::X86ShortRel8 { .. } => i64::from(*self.decoded.bytes.last()? as i8),
         BranchForm::X86NearRel32 { opcode_len, .. } => {
            let bytes = self.decoded.bytes.get(opcode_len as usize..opcode_len as usize + 4)?;
            i64::from(i32::from_le_bytes(bytes.try_into().ok()?))
         },
         BranchForm::Aarch64Rel26 { .. } => return None,
      };

      Some((next_address as i64 + displacement) as u64)
   }
}

pub trait Disassembler {
   /// Decodes every instruction in `bytes`, which starts at `base_address`. Implementations
   /// stop at the first byte sequence they can't decode and return what they got so far; the
   /// conductor logs a warning and falls back to treating the remainder as `Semantic::Raw`.
   fn disassemble(&self, bytes: &[u8], base_address: u64) -> Vec<DecodedInstruction>;
}

/// A tiny x86-64 decoder recognizing: `call rel32`, `jmp rel32`, `jmp short rel8`, `jcc short
/// rel8`, `push r64`, `pop r64`, `ret`, `nop`, and a handful of single-byte ALU forms. Anything
/// else is reported as a one-byte-at-a-time `Raw`-equivalent decode so the caller always makes
/// forward progress.
#[derive(Debug, Default)]
pub struct MinimalDecoder;

impl Disassembler for MinimalDecoder {
   fn disassemble(&self, bytes: &[u8], base_address: u64) -> Vec<DecodedInstruction> {
      let mut instructions = Vec::new();
      let mut cursor = 0usize;

      while cursor < bytes.len() {
         let remaining = &bytes[cursor..];
         let (length, mnemonic, branch_form) = decode_one(remaining, base_address + cursor as u64);

         instructions.push(DecodedInstruction {
            address: base_address + cursor as u64,
            length,
            decoded: Decoded {
               mnemonic,
               bytes: warp_chunk::Bytes::from_slice(&remaining[..length]),
            },
            branch_form,
         });

         cursor += length;
      }

      instructions
   }
}

fn decode_one(bytes: &[u8], _address: u64) -> (usize, String, Option<BranchForm>) {
   match bytes.first().copied() {
      Some(0xE8) if bytes.len() >= 5 => (5, "call".into(), Some(BranchForm::X86NearRel32 {
         opcode: [0xE8, 0],
         opcode_len: 1,
      })),
      Some(0xE9) if bytes.len() >= 5 => (5, "jmp".into(), Some(BranchForm::X86NearRel32 {
         opcode: [0xE9, 0],
         opcode_len: 1,
      })),
      Some(0xEB) if bytes.len() >= 2 => (2, "jmp short".into(), None),
      Some(condition @ 0x70..=0x7F) if bytes.len() >= 2 => {
         (2, format!("j{condition:#x} short"), Some(BranchForm::X86ShortRel8 {
            condition: condition & 0x0F,
         }))
      },
      Some(opcode @ 0x50..=0x57) => (1, format!("push r{}", opcode - 0x50), None),
      Some(opcode @ 0x58..=0x5F) => (1, format!("pop r{}", opcode - 0x58), None),
      Some(0xC3) => (1, "ret".into(), None),
      Some(0x90) => (1, "nop".into(), None),
      Some(byte) => (1, format!("db {byte:#04x}"), None),
      None => (0, String::new(), None),
   }
}
