//! The root of the chunk tree: one [`Program`] per rewrite session, holding one [`Module`] per
//! loaded ELF image (the main executable, the framework's own image, and each shared library).

use std::path::PathBuf;

use slotmap::SlotMap;

use crate::{
   data::{
      DataRegion,
      DataSection,
      DataVariable,
   },
   function::{
      Block,
      Function,
      FunctionList,
      Instruction,
   },
   index::{
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
   },
   misc::{
      JumpTable,
      JumpTableEntry,
      Marker,
      PltTrampoline,
   },
   position::{
      Cache,
      Generation,
      Position,
      Positioned,
   },
};

/// A dependency entry discovered via `DT_NEEDED`; not every dependency is necessarily loaded
/// into a [`Module`] (resolution may fail to locate the file on disk).
#[derive(Debug, Clone)]
pub struct Library {
   pub soname: String,
   pub path:   Option<PathBuf>,
   pub module: Option<ModuleId>,
}

/// The IR representation of one loaded ELF image.
#[derive(Debug)]
pub struct Module {
   pub(crate) generation: Generation,
   position: Position,
   cache: Cache,
   pub name: String,
   pub is_framework_self: bool,

   pub(crate) function_list: FunctionListId,
   pub(crate) plt_trampolines: Vec<PltTrampolineId>,
   pub(crate) jump_tables: Vec<JumpTableId>,
   pub(crate) data_regions: Vec<DataRegionId>,
   pub(crate) markers: Vec<MarkerId>,
}

impl Module {
   pub(crate) fn generation(&self) -> &Generation {
      &self.generation
   }

   #[must_use]
   pub fn function_list(&self) -> FunctionListId {
      self.function_list
   }

   #[must_use]
   pub fn plt_trampolines(&self) -> &[PltTrampolineId] {
      &self.plt_trampolines
   }

   #[must_use]
   pub fn jump_tables(&self) -> &[JumpTableId] {
      &self.jump_tables
   }

   #[must_use]
   pub fn data_regions(&self) -> &[DataRegionId] {
      &self.data_regions
   }

   #[must_use]
   pub fn markers(&self) -> &[MarkerId] {
      &self.markers
   }
}

impl Positioned for Module {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

/// A violation found by [`Program::check`]: a debug-only consistency walk, mirroring the
/// original's own `Conductor::check` sanity pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckViolation {
   /// A `Link::SymbolOnly` survived in a module that participates in emission.
   UnresolvedSymbol { module: ModuleId, symbol: String },
   /// A link's target index does not exist in its arena.
   DanglingTarget { description: String },
}

/// The root of the chunk tree. Owns one arena per concrete chunk kind; every cross-reference
/// inside the tree is an index into one of these, never an owning pointer.
#[derive(Debug, Default)]
pub struct Program {
   pub(crate) modules: SlotMap<ModuleId, Module>,
   pub(crate) module_order: Vec<ModuleId>,
   pub(crate) libraries: Vec<Library>,

   pub(crate) function_lists: SlotMap<FunctionListId, FunctionList>,
   pub(crate) functions: SlotMap<FunctionId, Function>,
   pub(crate) blocks: SlotMap<BlockId, Block>,
   pub(crate) instructions: SlotMap<InstructionId, Instruction>,

   pub(crate) plt_trampolines: SlotMap<PltTrampolineId, PltTrampoline>,
   pub(crate) jump_tables: SlotMap<JumpTableId, JumpTable>,
   pub(crate) jump_table_entries: SlotMap<JumpTableEntryId, JumpTableEntry>,

   pub(crate) data_regions: SlotMap<DataRegionId, DataRegion>,
   pub(crate) data_sections: SlotMap<DataSectionId, DataSection>,
   pub(crate) data_variables: SlotMap<DataVariableId, DataVariable>,

   pub(crate) markers: SlotMap<MarkerId, Marker>,
}

impl Program {
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   /// Creates a new, empty module at `position` (typically `Position::Absolute(base)` for a
   /// module loaded at a fixed address) and appends it to the load order.
   pub fn push_module(&mut self, name: String, position: Position, is_framework_self: bool) -> ModuleId {
      let id = self.modules.insert(Module {
         generation: Generation::default(),
         position,
         cache: Cache::default(),
         name,
         is_framework_self,
         function_list: FunctionListId::default(),
         plt_trampolines: Vec::new(),
         jump_tables: Vec::new(),
         data_regions: Vec::new(),
         markers: Vec::new(),
      });

      let function_list = self.function_lists.insert(FunctionList::new(id));
      self.modules[id].function_list = function_list;

      self.module_order.push(id);
      id
   }

   #[must_use]
   pub fn module(&self, id: ModuleId) -> &Module {
      &self.modules[id]
   }

   #[must_use]
   pub fn module_address(&self, id: ModuleId) -> u64 {
      let Position::Absolute(address) = self.modules[id].raw_position() else {
         // A module not yet given an absolute base has no meaningful address; callers querying
         // this before `reassign` has run are asking a question the Program can't yet answer.
         return 0;
      };
      address
   }

   /// Sets a module's absolute base address, bumping its generation so every function, data
   /// region and marker beneath it recomputes on next read. Used by `warp-layout`'s sandbox
   /// finalization.
   pub fn set_module_address(&mut self, id: ModuleId, address: u64) {
      let module = &mut self.modules[id];
      module.position = Position::Absolute(address);
      module.cache.invalidate();
      module.generation.bump();
   }

   /// Modules in load order: the framework's own image first (when present), then the main
   /// executable, then shared libraries in link order.
   #[must_use]
   pub fn modules(&self) -> &[ModuleId] {
      &self.module_order
   }

   #[must_use]
   pub fn libraries(&self) -> &[Library] {
      &self.libraries
   }

   pub fn push_library(&mut self, library: Library) {
      self.libraries.push(library);
   }

   /// Walks every link-bearing chunk in every module and reports violations: unresolved
   /// `SymbolOnly` links in modules that participate in emission, and links whose target index
   /// has been removed from its arena. A debug aid, not run on every mutation.
   #[must_use]
   pub fn check(&self) -> Vec<CheckViolation> {
      let mut violations = Vec::new();

      for &module_id in &self.module_order {
         let module = &self.modules[module_id];

         for &region_id in &module.data_regions {
            for &section_id in &self.data_regions[region_id].children {
               for &variable_id in &self.data_sections[section_id].children {
                  let variable = &self.data_variables[variable_id];
                  if let Some(link) = &variable.link {
                     self.check_link(module_id, link, &mut violations);
                  }
               }
            }
         }

         let list = &self.function_lists[module.function_list];
         for &function_id in &list.children {
            for &block_id in &self.functions[function_id].children {
               for &instruction_id in &self.blocks[block_id].children {
                  if let Some(link) = self.instructions[instruction_id].semantic.link() {
                     self.check_link(module_id, link, &mut violations);
                  }
               }
            }
         }
      }

      violations
   }

   fn check_link(&self, module_id: ModuleId, link: &crate::link::Link, violations: &mut Vec<CheckViolation>) {
      use crate::link::Link;

      match link {
         Link::SymbolOnly { symbol, .. } => {
            violations.push(CheckViolation::UnresolvedSymbol {
               module: module_id,
               symbol: symbol.clone(),
            });
         },
         Link::Normal(target) => {
            if !self.chunk_exists(*target) {
               violations.push(CheckViolation::DanglingTarget {
                  description: format!("{target:?}"),
               });
            }
         },
         Link::Plt(id) if !self.plt_trampolines.contains_key(*id) => {
            violations.push(CheckViolation::DanglingTarget {
               description: format!("Plt({id:?})"),
            });
         },
         Link::JumpTable(id) if !self.jump_tables.contains_key(*id) => {
            violations.push(CheckViolation::DanglingTarget {
               description: format!("JumpTable({id:?})"),
            });
         },
         Link::Marker(id) if !self.markers.contains_key(*id) => {
            violations.push(CheckViolation::DanglingTarget {
               description: format!("Marker({id:?})"),
            });
         },
         Link::DataOffset { region, .. } if !self.data_regions.contains_key(*region) => {
            violations.push(CheckViolation::DanglingTarget {
               description: format!("DataOffset({region:?})"),
            });
         },
         Link::Plt(_)
         | Link::JumpTable(_)
         | Link::Marker(_)
         | Link::DataOffset { .. }
         | Link::TlsDataOffset { .. }
         | Link::LoaderBridge(_) => {},
      }
   }

   /// The current address of any addressable chunk, regardless of kind. Used by the layout
   /// fixpoint and the emission pipeline to resolve a link's target without matching on every
   /// `ChunkRef` variant at each call site.
   #[must_use]
   pub fn chunk_address(&self, target: ChunkRef) -> u64 {
      match target {
         ChunkRef::Module(id) => self.module_address(id),
         ChunkRef::Function(id) => self.function_address(id),
         ChunkRef::Block(id) => self.block_address(id),
         ChunkRef::Instruction(id) => self.instruction_address(id),
         ChunkRef::PltTrampoline(id) => self.plt_trampoline_address(id),
         ChunkRef::JumpTable(id) => self.jump_table_address(id),
         ChunkRef::JumpTableEntry(id) => self.jump_table_entry_address(id),
         ChunkRef::DataRegion(id) => self.data_region_address(id),
         ChunkRef::DataSection(id) => self.data_section_address(id),
         ChunkRef::DataVariable(id) => self.data_variable_address(id),
         ChunkRef::Marker(id) => self.marker_address(id),
      }
   }

   /// The absolute address a [`crate::link::Link`] resolves to, when it names exactly one
   /// address. `TlsDataOffset` and `SymbolOnly` links have no absolute address (the former is
   /// resolved relative to a thread pointer at runtime, the latter isn't resolved at all) and
   /// `LoaderBridge` hooks are resolved by the framework's own loader, not by this Program.
   #[must_use]
   pub fn link_target_address(&self, link: &crate::link::Link) -> Option<u64> {
      use crate::link::Link;

      match link {
         Link::DataOffset { region, offset } => Some(self.data_region_address(*region) + offset),
         Link::SymbolOnly { .. } | Link::TlsDataOffset { .. } | Link::LoaderBridge(_) => None,
         other => other.target().map(|target| self.chunk_address(target)),
      }
   }

   fn chunk_exists(&self, target: ChunkRef) -> bool {
      match target {
         ChunkRef::Module(id) => self.modules.contains_key(id),
         ChunkRef::Function(id) => self.functions.contains_key(id),
         ChunkRef::Block(id) => self.blocks.contains_key(id),
         ChunkRef::Instruction(id) => self.instructions.contains_key(id),
         ChunkRef::PltTrampoline(id) => self.plt_trampolines.contains_key(id),
         ChunkRef::JumpTable(id) => self.jump_tables.contains_key(id),
         ChunkRef::JumpTableEntry(id) => self.jump_table_entries.contains_key(id),
         ChunkRef::DataRegion(id) => self.data_regions.contains_key(id),
         ChunkRef::DataSection(id) => self.data_sections.contains_key(id),
         ChunkRef::DataVariable(id) => self.data_variables.contains_key(id),
         ChunkRef::Marker(id) => self.markers.contains_key(id),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      link::Link,
      semantic::Semantic,
   };

   #[test]
   fn function_after_previous_sibling_addresses_are_contiguous() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0x1000), false);
      let list = program.module(module).function_list();

      let f1 = program.insert_function(list, "a".into(), Position::AfterPreviousSibling);
      let b1 = program.push_block(f1);
      program.insert_instruction(b1, 0, Semantic::Raw(smallvec::smallvec![0x90; 4]));

      let f2 = program.insert_function(list, "b".into(), Position::AfterPreviousSibling);
      let b2 = program.push_block(f2);
      program.insert_instruction(b2, 0, Semantic::Raw(smallvec::smallvec![0x90; 2]));

      assert_eq!(program.function_address(f1), 0x1000);
      assert_eq!(program.function_size(f1), 4);
      assert_eq!(program.function_address(f2), 0x1004);
      assert_eq!(program.function_size(f2), 2);
   }

   #[test]
   fn resizing_an_earlier_instruction_shifts_later_addresses() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0), false);
      let list = program.module(module).function_list();
      let function = program.insert_function(list, "f".into(), Position::AfterPreviousSibling);
      let block = program.push_block(function);

      let first = program.insert_instruction(block, 0, Semantic::Raw(smallvec::smallvec![0x90; 2]));
      let second = program.insert_instruction(block, 1, Semantic::Raw(smallvec::smallvec![0x90; 2]));
      assert_eq!(program.instruction_address(second), 2);

      program.instruction_mut(first).semantic = Semantic::Raw(smallvec::smallvec![0x90; 10]);
      program.touch_block(block);
      assert_eq!(program.instruction_address(second), 10);
   }

   #[test]
   fn check_reports_unresolved_symbol_only_links() {
      let mut program = Program::new();
      let module = program.push_module("main".into(), Position::Absolute(0), false);
      let region = program.push_data_region(module, ".data".into(), Position::AfterPreviousSibling, true);
      let section = program.push_data_section(region, ".data".into());
      let variable = program.push_data_variable(section, vec![0; 8]);
      program.data_variable_mut(variable).link = Some(Link::SymbolOnly {
         symbol: "environ".into(),
         weak:   false,
      });

      let violations = program.check();
      assert!(matches!(
         violations.as_slice(),
         [CheckViolation::UnresolvedSymbol { symbol, .. }] if symbol == "environ"
      ));
   }
}
