//! The symbolic link graph: one-directional, weakly-targeted edges from a semantic to whatever
//! it refers to. Links are owned by the source semantic and are never shared; a target is
//! referenced by index only, so deleting the target is the target's problem, not the link's —
//! re-homing or invalidating inbound links on deletion is the deleter's responsibility.

use crate::index::{
   ChunkRef,
   DataRegionId,
   JumpTableId,
   MarkerId,
   ModuleId,
   PltTrampolineId,
};

/// A symbolic reference from a code or data location to a target chunk, symbol, or offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Link {
   /// Direct reference to a target chunk.
   Normal(ChunkRef),
   /// Reference to a local PLT stub; the stub carries its own outbound link to the dynamic
   /// symbol it eventually resolves.
   Plt(PltTrampolineId),
   /// Reference to a jump table, for indirect (computed) branches.
   JumpTable(JumpTableId),
   /// Pre-resolution placeholder: a relocation that names a symbol not yet tied to a chunk.
   SymbolOnly { symbol: String, weak: bool },
   /// Reference to a byte offset inside a data region, resolved to an address at emission time.
   DataOffset { region: DataRegionId, offset: u64 },
   /// Reference to a synthetic named address.
   Marker(MarkerId),
   /// Reference to an offset inside a module's thread-local image.
   TlsDataOffset { module: ModuleId, offset: u64 },
   /// Reference to a named hook in the framework's own statically linked image, late-bound
   /// through the loader bridge registry rather than through ordinary module resolution.
   LoaderBridge(String),
}

impl Link {
   /// `true` once a `SymbolOnly` placeholder has been replaced by a concrete link variant.
   #[must_use]
   pub fn is_resolved(&self) -> bool {
      !matches!(self, Link::SymbolOnly { .. })
   }

   /// The chunk this link ultimately targets, when it targets exactly one chunk rather than a
   /// bare symbol name or bridge hook.
   #[must_use]
   pub fn target(&self) -> Option<ChunkRef> {
      match *self {
         Link::Normal(target) => Some(target),
         Link::Plt(id) => Some(ChunkRef::PltTrampoline(id)),
         Link::JumpTable(id) => Some(ChunkRef::JumpTable(id)),
         Link::Marker(id) => Some(ChunkRef::Marker(id)),
         Link::DataOffset { region, .. } => Some(ChunkRef::DataRegion(region)),
         Link::SymbolOnly { .. } | Link::TlsDataOffset { .. } | Link::LoaderBridge(_) => None,
      }
   }
}
