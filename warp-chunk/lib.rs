//! The chunk tree and link graph: a mutable, navigable intermediate representation of a
//! program built from one or more loaded ELF images.

mod index;
pub use index::{
   BlockId,
   ChunkRef,
   DataRegionId,
   DataSectionId,
   DataVariableId,
   FunctionId,
   FunctionListId,
   InstructionId,
   JumpTableEntryId,
   JumpTableId,
   MarkerId,
   ModuleId,
   PltTrampolineId,
};

mod position;
pub use position::{
   Generation,
   Position,
};

mod semantic;
pub use semantic::{
   BranchForm,
   Bytes,
   Decoded,
   Semantic,
};

mod link;
pub use link::Link;

mod function;
pub use function::{
   Block,
   Function,
   FunctionList,
   Instruction,
};

mod data;
pub use data::{
   DataRegion,
   DataSection,
   DataVariable,
};

mod misc;
pub use misc::{
   JumpTable,
   JumpTableEntry,
   Marker,
   PltTrampoline,
};

mod program;
pub use program::{
   CheckViolation,
   Module,
   Program,
};
