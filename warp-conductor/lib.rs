//! Drives a [`warp_chunk::Program`] through load, parse and resolve. The heaviest crate in the
//! workspace: it owns the trait boundaries to the outside world ([`ElfMap`], [`Disassembler`])
//! and the ordered resolution phases that turn raw symbol references into concrete links.

mod elf_map;
pub use elf_map::{
   Binding,
   DynamicTag,
   ElfMap,
   ObjectElfMap,
   Relocation,
   Section,
   Segment,
   SegmentFlags,
   Symbol,
};

mod disassembler;
pub use disassembler::{
   DecodedInstruction,
   Disassembler,
   MinimalDecoder,
};

mod loader_bridge;
pub use loader_bridge::LoaderBridge;

mod diagnostic;
pub use diagnostic::{
   Diagnostic,
   Severity,
};

pub mod resolve;

mod conductor;
pub use conductor::Conductor;
