//! The ELF64 `Generator`: assembles a well-formed ELF64 image from already-finalized section
//! bytes, following the `object` crate's own two-phase reserve/write protocol for its
//! `write::elf::Writer` — reserve every offset first (so sections that need to refer to each
//! other's final position, like the section header table's `sh_name` string offsets, can be
//! computed deferred), then write everything in file order.

use object::{
   write::elf::{
      FileHeader,
      ProgramHeader,
      SectionHeader as ObjectSectionHeader,
      Writer,
   },
   Endianness,
};
use warp_error::{
   Kind,
   Result,
};

use crate::{
   deferred::DeferredId,
   section::SectionList,
};

/// One loadable segment's worth of already-finalized bytes, as produced by
/// `warp_layout::finalize`.
pub struct LoadableSegment {
   pub vaddr:   u64,
   pub flags:   u32,
   pub align:   u64,
   pub content: Vec<u8>,
}

/// Builds a single ELF64 output image from already-finalized section and segment bytes — the
/// layout fixpoint and `warp_layout::finalize` have already run by the time a `Generator` sees
/// them.
pub struct Generator {
   entry:    u64,
   is_pie:   bool,
   segments: Vec<LoadableSegment>,
   sections: Vec<(String, u32, u64, u64, u64, Vec<u8>, u32, u32, u64)>,
}

impl Generator {
   #[must_use]
   pub fn new(entry: u64, is_pie: bool) -> Self {
      Self {
         entry,
         is_pie,
         segments: Vec::new(),
         sections: Vec::new(),
      }
   }

   pub fn add_segment(&mut self, segment: LoadableSegment) {
      self.segments.push(segment);
   }

   /// Adds a section with already-resolved content. `(name, sh_type, sh_flags, addr, align,
   /// bytes)`.
   pub fn add_section(&mut self, name: impl Into<String>, kind: u32, flags: u64, addr: u64, align: u64, bytes: Vec<u8>) {
      self.add_section_linked(name, kind, flags, addr, align, bytes, 0, 0, 0);
   }

   /// Adds a section carrying `sh_link`/`sh_info`/`sh_entsize` (e.g. `.symtab`'s link to its
   /// string table and its fixed 24-byte entry size).
   #[allow(clippy::too_many_arguments)]
   pub fn add_section_linked(
      &mut self,
      name: impl Into<String>,
      kind: u32,
      flags: u64,
      addr: u64,
      align: u64,
      bytes: Vec<u8>,
      link: u32,
      info: u32,
      entsize: u64,
   ) {
      self.sections.push((name.into(), kind, flags, addr, align, bytes, link, info, entsize));
   }

   /// Populates the generator's sections from a [`SectionList`] whose bodies were registered
   /// with a [`crate::DeferredRegistry`] and have since been resolved — the section-ordering and
   /// content-dependency bookkeeping lives in those two types; this just flattens the result into
   /// the form the `object` writer protocol below consumes directly. A section's `sh_link` is
   /// resolved from its `SectionRef` to the final section-table index (one past the null
   /// section, matching the insertion order `write` below emits).
   pub fn add_sections_from(&mut self, sections: &SectionList, resolved: &indexmap::IndexMap<DeferredId, Vec<u8>>) {
      for section in sections.iter() {
         let bytes = resolved.get(&section.body).cloned().unwrap_or_default();
         let link = section.header.link.map_or(0, |reference| reference.0 as u32 + 1);
         self.add_section_linked(
            section.name.clone(),
            section.header.kind,
            section.header.flags,
            section.header.addr,
            section.header.align,
            bytes,
            link,
            section.header.info,
            section.header.entsize,
         );
      }
   }

   /// Emits the ELF64 image: file header, program headers, section contents in order, then the
   /// section header table, mirroring the emission order laid out for regeneration.
   pub fn write(&self) -> Result<Vec<u8>> {
      tracing::info!(segments = self.segments.len(), sections = self.sections.len(), "emitting ELF64 image");

      let mut buffer = Vec::new();
      let mut writer = Writer::new(Endianness::Little, true, &mut buffer);

      writer.reserve_file_header();
      writer.reserve_program_headers(self.segments.len() as u32);

      let mut section_offsets = Vec::with_capacity(self.sections.len());
      for (_, _, _, _, align, bytes, ..) in &self.sections {
         let offset = writer.reserve(bytes.len(), (*align).max(1) as usize);
         section_offsets.push(offset);
      }

      writer.reserve_null_section_index();
      let mut name_ids = Vec::with_capacity(self.sections.len());
      for (name, ..) in &self.sections {
         name_ids.push(writer.add_section_name(name.as_bytes()));
         writer.reserve_section_index();
      }
      writer.reserve_shstrtab_section_index();
      writer.reserve_shstrtab();
      writer.reserve_section_headers();

      writer.write_file_header(&FileHeader {
         os_abi:     object::elf::ELFOSABI_NONE,
         abi_version: 0,
         e_type:     if self.is_pie { object::elf::ET_DYN } else { object::elf::ET_EXEC },
         e_machine:  object::elf::EM_X86_64,
         e_entry:    self.entry,
         e_flags:    0,
      }).map_err(|error| Kind::Emission(error.to_string()))?;

      for segment in &self.segments {
         writer.write_program_header(&ProgramHeader {
            p_type:   object::elf::PT_LOAD,
            p_flags:  segment.flags,
            p_offset: 0,
            p_vaddr:  segment.vaddr,
            p_paddr:  segment.vaddr,
            p_filesz: segment.content.len() as u64,
            p_memsz:  segment.content.len() as u64,
            p_align:  segment.align,
         });
      }

      for ((_, _, _, _, align, bytes, ..), offset) in self.sections.iter().zip(&section_offsets) {
         writer.pad_until(*offset);
         let _ = align;
         writer.write(bytes);
      }

      writer.write_null_section_header();
      for (((name, kind, flags, addr, _, bytes, link, info, entsize), offset), name_id) in
         self.sections.iter().zip(&section_offsets).zip(&name_ids)
      {
         writer.write_section_header(&ObjectSectionHeader {
            name:      *name_id,
            sh_type:   *kind,
            sh_flags:  *flags,
            sh_addr:   *addr,
            sh_offset: *offset as u64,
            sh_size:   bytes.len() as u64,
            sh_link:   *link,
            sh_info:   *info,
            sh_addralign: 1,
            sh_entsize: *entsize,
         });
      }
      writer.write_shstrtab_section_header();
      writer.write_shstrtab();

      Ok(buffer)
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      deferred::DeferredRegistry,
      section::SectionHeader,
   };

   #[test]
   fn write_produces_a_buffer_starting_with_the_elf_magic() {
      let mut deferred = DeferredRegistry::new();
      let text = deferred.register(4, vec![], |_| vec![0x90, 0x90, 0xC3, 0xC3]);

      let mut sections = SectionList::new();
      sections.push(".text".into(), SectionHeader {
         kind: object::elf::SHT_PROGBITS,
         flags: u64::from(object::elf::SHF_ALLOC | object::elf::SHF_EXECINSTR),
         addr: 0x1000,
         link: None,
         info: 0,
         align: 16,
         entsize: 0,
      }, text);

      let resolved = deferred.resolve_all().unwrap();

      let mut generator = Generator::new(0x1000, false);
      generator.add_segment(LoadableSegment {
         vaddr:   0x1000,
         flags:   object::elf::PF_R | object::elf::PF_X,
         align:   0x1000,
         content: vec![0x90, 0x90, 0xC3, 0xC3],
      });
      generator.add_sections_from(&sections, &resolved);

      let bytes = generator.write().unwrap();
      assert_eq!(&bytes[..4], &object::elf::ELFMAG);
   }
}
