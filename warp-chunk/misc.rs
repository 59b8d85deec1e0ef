//! Standalone chunk kinds that don't fit the code or data hierarchies: synthetic markers, PLT
//! trampolines, and computed-branch jump tables.

use crate::{
   index::{
      JumpTableEntryId,
      JumpTableId,
      MarkerId,
      ModuleId,
      PltTrampolineId,
   },
   link::Link,
   position::{
      Cache,
      Generation,
      Position,
      Positioned,
   },
   program::Program,
};

/// A synthetic named address: a section boundary, a linker symbol like `_end`, or any other
/// address a pass wants to name without attaching code or data to it.
#[derive(Debug)]
pub struct Marker {
   pub(crate) parent: ModuleId,
   position: Position,
   cache: Cache,
   pub name: String,
}

impl Marker {
   pub(crate) fn new(parent: ModuleId, name: String, position: Position) -> Self {
      Self {
         parent,
         position,
         cache: Cache::default(),
         name,
      }
   }
}

impl Positioned for Marker {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

/// A stub resolving one external symbol through the dynamic loader's procedure linkage table.
#[derive(Debug)]
pub struct PltTrampoline {
   pub(crate) parent: ModuleId,
   position: Position,
   cache: Cache,
   pub symbol: String,
   /// The stub's own outbound reference to the dynamic symbol it resolves; usually a
   /// `Link::SymbolOnly` until the dynamic loader's GOT slot is known.
   pub target: Link,
}

impl PltTrampoline {
   pub(crate) fn new(parent: ModuleId, symbol: String, position: Position) -> Self {
      Self {
         parent,
         position,
         cache: Cache::default(),
         target: Link::SymbolOnly { symbol: symbol.clone(), weak: false },
         symbol,
      }
   }
}

impl Positioned for PltTrampoline {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

/// A computed-branch dispatch table: one [`JumpTableEntry`] per case.
#[derive(Debug)]
pub struct JumpTable {
   pub(crate) parent: ModuleId,
   pub(crate) children: Vec<JumpTableEntryId>,
   pub(crate) generation: Generation,
   position: Position,
   cache: Cache,
}

impl JumpTable {
   pub(crate) fn new(parent: ModuleId, position: Position) -> Self {
      Self {
         parent,
         children: Vec::new(),
         generation: Generation::default(),
         position,
         cache: Cache::default(),
      }
   }

   #[must_use]
   pub fn entries(&self) -> &[JumpTableEntryId] {
      &self.children
   }
}

impl Positioned for JumpTable {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

/// One slot of a [`JumpTable`]: a pointer-sized link to the case's target.
#[derive(Debug)]
pub struct JumpTableEntry {
   pub(crate) parent: JumpTableId,
   position: Position,
   cache: Cache,
   pub target: Link,
}

impl JumpTableEntry {
   pub(crate) fn new(parent: JumpTableId, position: Position, target: Link) -> Self {
      Self {
         parent,
         position,
         cache: Cache::default(),
         target,
      }
   }
}

impl Positioned for JumpTableEntry {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

/// Pointer-sized jump table entries (one relocated address per case) on every architecture this
/// crate targets.
const JUMP_TABLE_ENTRY_SIZE: u64 = 8;

impl Program {
   #[must_use]
   pub fn marker_exists(&self, id: MarkerId) -> bool {
      self.markers.contains_key(id)
   }

   #[must_use]
   pub fn plt_trampoline_exists(&self, id: PltTrampolineId) -> bool {
      self.plt_trampolines.contains_key(id)
   }

   #[must_use]
   pub fn jump_table_exists(&self, id: JumpTableId) -> bool {
      self.jump_tables.contains_key(id)
   }

   #[must_use]
   pub fn jump_table_entry_exists(&self, id: JumpTableEntryId) -> bool {
      self.jump_table_entries.contains_key(id)
   }

   #[must_use]
   pub fn marker(&self, id: MarkerId) -> &Marker {
      &self.markers[id]
   }

   #[must_use]
   pub fn marker_address(&self, id: MarkerId) -> u64 {
      let marker = &self.markers[id];
      crate::position::resolve_address(
         marker,
         self.modules[marker.parent].generation().get(),
         || self.module_address(marker.parent),
         || self.module_address(marker.parent),
      )
   }

   pub fn push_marker(&mut self, module_id: ModuleId, name: String, position: Position) -> MarkerId {
      let marker = Marker::new(module_id, name, position);
      let id = self.markers.insert(marker);
      self.modules[module_id].markers.push(id);
      id
   }

   #[must_use]
   pub fn plt_trampoline(&self, id: PltTrampolineId) -> &PltTrampoline {
      &self.plt_trampolines[id]
   }

   #[must_use]
   pub fn plt_trampoline_mut(&mut self, id: PltTrampolineId) -> &mut PltTrampoline {
      &mut self.plt_trampolines[id]
   }

   #[must_use]
   pub fn plt_trampoline_address(&self, id: PltTrampolineId) -> u64 {
      let trampoline = &self.plt_trampolines[id];
      crate::position::resolve_address(
         trampoline,
         self.modules[trampoline.parent].generation().get(),
         || self.module_address(trampoline.parent),
         || self.module_address(trampoline.parent),
      )
   }

   pub fn push_plt_trampoline(&mut self, module_id: ModuleId, symbol: String, position: Position) -> PltTrampolineId {
      let trampoline = PltTrampoline::new(module_id, symbol, position);
      let id = self.plt_trampolines.insert(trampoline);
      self.modules[module_id].plt_trampolines.push(id);
      id
   }

   #[must_use]
   pub fn jump_table(&self, id: JumpTableId) -> &JumpTable {
      &self.jump_tables[id]
   }

   #[must_use]
   pub fn jump_table_address(&self, id: JumpTableId) -> u64 {
      let table = &self.jump_tables[id];
      crate::position::resolve_address(
         table,
         self.modules[table.parent].generation().get(),
         || self.module_address(table.parent),
         || self.module_address(table.parent),
      )
   }

   #[must_use]
   pub fn jump_table_size(&self, id: JumpTableId) -> u64 {
      self.jump_tables[id].children.len() as u64 * JUMP_TABLE_ENTRY_SIZE
   }

   pub fn push_jump_table(&mut self, module_id: ModuleId, position: Position) -> JumpTableId {
      let table = JumpTable::new(module_id, position);
      let id = self.jump_tables.insert(table);
      self.modules[module_id].jump_tables.push(id);
      id
   }

   #[must_use]
   pub fn jump_table_entry(&self, id: JumpTableEntryId) -> &JumpTableEntry {
      &self.jump_table_entries[id]
   }

   #[must_use]
   pub fn jump_table_entry_address(&self, id: JumpTableEntryId) -> u64 {
      let entry = &self.jump_table_entries[id];
      let table = &self.jump_tables[entry.parent];

      crate::position::resolve_address(
         entry,
         table.generation.get(),
         || self.jump_table_address(entry.parent),
         || match table.children.iter().position(|&candidate| candidate == id) {
            Some(index) => self.jump_table_address(entry.parent) + index as u64 * JUMP_TABLE_ENTRY_SIZE,
            None => self.jump_table_address(entry.parent),
         },
      )
   }

   pub fn push_jump_table_entry(&mut self, table_id: JumpTableId, target: Link) -> JumpTableEntryId {
      let entry = JumpTableEntry::new(table_id, Position::AfterPreviousSibling, target);
      let id = self.jump_table_entries.insert(entry);

      let table = &mut self.jump_tables[table_id];
      table.children.push(id);
      table.generation.bump();

      id
   }
}
