//! The data side of the chunk hierarchy: `DataRegion -> DataSection -> DataVariable`.

use crate::{
   index::{
      DataRegionId,
      DataSectionId,
      DataVariableId,
      ModuleId,
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

/// A loadable segment's worth of initialized (or zero-filled) memory.
#[derive(Debug)]
pub struct DataRegion {
   pub(crate) parent: ModuleId,
   pub(crate) children: Vec<DataSectionId>,
   pub(crate) generation: Generation,
   position: Position,
   cache: Cache,
   pub name: String,
   pub writable: bool,
}

impl DataRegion {
   pub(crate) fn new(parent: ModuleId, name: String, position: Position, writable: bool) -> Self {
      Self {
         parent,
         children: Vec::new(),
         generation: Generation::default(),
         position,
         cache: Cache::default(),
         name,
         writable,
      }
   }

   #[must_use]
   pub fn sections(&self) -> &[DataSectionId] {
      &self.children
   }
}

impl Positioned for DataRegion {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

/// A contiguous run of variables inside a [`DataRegion`] (one per original ELF section that
/// contributed to the region, e.g. `.data` vs. `.rodata`).
#[derive(Debug)]
pub struct DataSection {
   pub(crate) parent: DataRegionId,
   pub(crate) children: Vec<DataVariableId>,
   pub(crate) generation: Generation,
   position: Position,
   cache: Cache,
   pub name: String,
}

impl DataSection {
   pub(crate) fn new(parent: DataRegionId, name: String, position: Position) -> Self {
      Self {
         parent,
         children: Vec::new(),
         generation: Generation::default(),
         position,
         cache: Cache::default(),
         name,
      }
   }

   #[must_use]
   pub fn variables(&self) -> &[DataVariableId] {
      &self.children
   }
}

impl Positioned for DataSection {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

/// A single variable-sized slot inside a [`DataSection`], optionally bound to a [`Link`] (e.g.
/// a relocated data pointer).
#[derive(Debug)]
pub struct DataVariable {
   pub(crate) parent: DataSectionId,
   position: Position,
   cache: Cache,
   pub bytes: Vec<u8>,
   pub link: Option<Link>,
}

impl DataVariable {
   pub(crate) fn new(parent: DataSectionId, position: Position, bytes: Vec<u8>) -> Self {
      Self {
         parent,
         position,
         cache: Cache::default(),
         bytes,
         link: None,
      }
   }
}

impl Positioned for DataVariable {
   fn raw_position(&self) -> Position {
      self.position
   }

   fn cache(&self) -> &Cache {
      &self.cache
   }
}

impl Program {
   #[must_use]
   pub fn data_region_exists(&self, id: DataRegionId) -> bool {
      self.data_regions.contains_key(id)
   }

   #[must_use]
   pub fn data_section_exists(&self, id: DataSectionId) -> bool {
      self.data_sections.contains_key(id)
   }

   #[must_use]
   pub fn data_variable_exists(&self, id: DataVariableId) -> bool {
      self.data_variables.contains_key(id)
   }

   #[must_use]
   pub fn data_region(&self, id: DataRegionId) -> &DataRegion {
      &self.data_regions[id]
   }

   #[must_use]
   pub fn data_region_address(&self, id: DataRegionId) -> u64 {
      let region = &self.data_regions[id];
      crate::position::resolve_address(
         region,
         self.modules[region.parent].generation().get(),
         || self.module_address(region.parent),
         || self.module_address(region.parent),
      )
   }

   #[must_use]
   pub fn data_region_size(&self, id: DataRegionId) -> u64 {
      self.data_regions[id]
         .children
         .iter()
         .map(|&section| self.data_section_size(section))
         .sum()
   }

   pub fn push_data_region(&mut self, module_id: ModuleId, name: String, position: Position, writable: bool) -> DataRegionId {
      let region = DataRegion::new(module_id, name, position, writable);
      let id = self.data_regions.insert(region);
      self.modules[module_id].data_regions.push(id);
      id
   }

   #[must_use]
   pub fn data_section(&self, id: DataSectionId) -> &DataSection {
      &self.data_sections[id]
   }

   #[must_use]
   pub fn data_section_address(&self, id: DataSectionId) -> u64 {
      let section = &self.data_sections[id];
      let region = &self.data_regions[section.parent];

      crate::position::resolve_address(
         section,
         region.generation.get(),
         || self.data_region_address(section.parent),
         || match region.children.iter().position(|&candidate| candidate == id) {
            Some(0) | None => self.data_region_address(section.parent),
            Some(index) => {
               let previous = region.children[index - 1];
               self.data_section_address(previous) + self.data_section_size(previous)
            },
         },
      )
   }

   #[must_use]
   pub fn data_section_size(&self, id: DataSectionId) -> u64 {
      self.data_sections[id]
         .children
         .iter()
         .map(|&variable| self.data_variable_size(variable))
         .sum()
   }

   pub fn push_data_section(&mut self, region_id: DataRegionId, name: String) -> DataSectionId {
      let section = DataSection::new(region_id, name, Position::AfterPreviousSibling);
      let id = self.data_sections.insert(section);

      let region = &mut self.data_regions[region_id];
      region.children.push(id);
      region.generation.bump();

      id
   }

   #[must_use]
   pub fn data_variable(&self, id: DataVariableId) -> &DataVariable {
      &self.data_variables[id]
   }

   #[must_use]
   pub fn data_variable_mut(&mut self, id: DataVariableId) -> &mut DataVariable {
      &mut self.data_variables[id]
   }

   #[must_use]
   pub fn data_variable_address(&self, id: DataVariableId) -> u64 {
      let variable = &self.data_variables[id];
      let section = &self.data_sections[variable.parent];

      crate::position::resolve_address(
         variable,
         section.generation.get(),
         || self.data_section_address(variable.parent),
         || match section.children.iter().position(|&candidate| candidate == id) {
            Some(0) | None => self.data_section_address(variable.parent),
            Some(index) => {
               let previous = section.children[index - 1];
               self.data_variable_address(previous) + self.data_variable_size(previous)
            },
         },
      )
   }

   #[must_use]
   pub fn data_variable_size(&self, id: DataVariableId) -> u64 {
      self.data_variables[id].bytes.len() as u64
   }

   pub fn push_data_variable(&mut self, section_id: DataSectionId, bytes: Vec<u8>) -> DataVariableId {
      let variable = DataVariable::new(section_id, Position::AfterPreviousSibling, bytes);
      let id = self.data_variables.insert(variable);

      let section = &mut self.data_sections[section_id];
      section.children.push(id);
      section.generation.bump();

      id
   }
}
