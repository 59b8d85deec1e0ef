//! Positional arithmetic and lazy address recomputation.
//!
//! Every chunk caches its last-computed absolute address together with the generation counter
//! of whatever it depends on (its parent, for `RelativeToParent`; nothing, for `Absolute`). A
//! mutation bumps the depended-upon [`Generation`]; a stale cache recomputes on next read. This
//! bounds recomputation to chunks actually queried after a mutation, rather than eagerly
//! walking the whole tree.

use std::cell::Cell;

/// Where a chunk sits in address space relative to its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
   /// A fixed address, independent of parent or siblings.
   Absolute(u64),
   /// An offset within the parent's own address range.
   RelativeToParent(u64),
   /// Immediately after the previous child of the same parent (or at the parent's start
   /// address, if this is the first child).
   AfterPreviousSibling,
}

/// A counter a container chunk bumps whenever the layout of its children changes: insertion,
/// removal, reordering, or a resize of one of them. Children cache their resolved address
/// against the generation they last observed.
#[derive(Debug, Default)]
pub struct Generation(Cell<u64>);

impl Generation {
   #[must_use]
   pub fn get(&self) -> u64 {
      self.0.get()
   }

   pub fn bump(&self) {
      self.0.set(self.0.get().wrapping_add(1));
   }
}

#[derive(Debug, Default)]
pub(crate) struct Cache(Cell<Option<(u64, u64)>>);

impl Cache {
   fn get(&self, current_generation: u64) -> Option<u64> {
      match self.0.get() {
         Some((seen, address)) if seen == current_generation => Some(address),
         _ => None,
      }
   }

   fn set(&self, generation: u64, address: u64) {
      self.0.set(Some((generation, address)));
   }

   /// Invalidates the cache unconditionally; used when a chunk is re-homed to a new parent or
   /// moved to a new sibling index, where the old generation number could coincidentally still
   /// match.
   pub(crate) fn invalidate(&self) {
      self.0.set(None);
   }
}

/// Implemented by every positioned chunk; lets [`resolve_address`] stay generic over the
/// concrete chunk structs living in [`crate::function`], [`crate::data`] and [`crate::misc`].
pub(crate) trait Positioned {
   fn raw_position(&self) -> Position;
   fn cache(&self) -> &Cache;
}

/// Resolves a chunk's absolute address, consulting and refreshing its cache as needed.
///
/// `parent_generation` is the current generation counter of the chunk's parent (or list
/// container); `parent_address` and `previous_sibling_end` are evaluated lazily — only the one
/// relevant to this chunk's [`Position`] ever runs.
pub(crate) fn resolve_address<T: Positioned>(
   node: &T,
   parent_generation: u64,
   parent_address: impl FnOnce() -> u64,
   previous_sibling_end: impl FnOnce() -> u64,
) -> u64 {
   if let Position::Absolute(address) = node.raw_position() {
      return address;
   }

   if let Some(cached) = node.cache().get(parent_generation) {
      return cached;
   }

   let address = match node.raw_position() {
      Position::Absolute(address) => address,
      Position::RelativeToParent(offset) => parent_address() + offset,
      Position::AfterPreviousSibling => previous_sibling_end(),
   };

   node.cache().set(parent_generation, address);
   address
}
