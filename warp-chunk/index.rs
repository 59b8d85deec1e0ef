//! Typed arena indices.
//!
//! Every concrete chunk kind is stored in its own [`slotmap::SlotMap`] and addressed by its own
//! key type, mirroring `ByteIndex`/`ValueIndex` style indexing: a [`FunctionId`] can never be
//! mistaken for a [`BlockId`] at the type level, even though both are backed by the same
//! generational-index machinery.

slotmap::new_key_type! {
   pub struct ModuleId;
   pub struct FunctionListId;
   pub struct FunctionId;
   pub struct BlockId;
   pub struct InstructionId;
   pub struct PltTrampolineId;
   pub struct JumpTableId;
   pub struct JumpTableEntryId;
   pub struct DataRegionId;
   pub struct DataSectionId;
   pub struct DataVariableId;
   pub struct MarkerId;
}

/// Any addressable chunk that can be the target of a [`crate::Link`] or the root of a
/// [`crate::ChunkFind`]-style query. Deliberately excludes list chunks (`FunctionList` and
/// friends), which are never link targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkRef {
   Module(ModuleId),
   Function(FunctionId),
   Block(BlockId),
   Instruction(InstructionId),
   PltTrampoline(PltTrampolineId),
   JumpTable(JumpTableId),
   JumpTableEntry(JumpTableEntryId),
   DataRegion(DataRegionId),
   DataSection(DataSectionId),
   DataVariable(DataVariableId),
   Marker(MarkerId),
}

macro_rules! from_id {
   ($variant:ident, $id:ty) => {
      impl From<$id> for ChunkRef {
         fn from(id: $id) -> Self {
            ChunkRef::$variant(id)
         }
      }
   };
}

from_id!(Module, ModuleId);
from_id!(Function, FunctionId);
from_id!(Block, BlockId);
from_id!(Instruction, InstructionId);
from_id!(PltTrampoline, PltTrampolineId);
from_id!(JumpTable, JumpTableId);
from_id!(JumpTableEntry, JumpTableEntryId);
from_id!(DataRegion, DataRegionId);
from_id!(DataSection, DataSectionId);
from_id!(DataVariable, DataVariableId);
from_id!(Marker, MarkerId);
