//! The `ElfMap` collaborator: an abstract view over a parsed ELF image. The core conductor
//! never parses ELF bytes itself; [`ObjectElfMap`] is the concrete, runnable default built on
//! the `object` crate, but callers may substitute their own implementation (e.g. one backed by
//! a live `/proc/<pid>/maps` snapshot rather than a file).

use std::path::Path;

use object::{
   elf,
   Object as _,
   ObjectSection as _,
   ObjectSegment as _,
   ObjectSymbol as _,
};
use warp_error::{
   Contextful as _,
   Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentFlags {
   pub read:    bool,
   pub write:   bool,
   pub execute: bool,
}

#[derive(Debug, Clone)]
pub struct Segment {
   pub vaddr:  u64,
   pub filesz: u64,
   pub memsz:  u64,
   pub flags:  SegmentFlags,
   pub data:   Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Section {
   pub name:   String,
   pub kind:   u32,
   pub addr:   u64,
   pub offset: u64,
   pub size:   u64,
   pub link:   u32,
   pub info:   u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
   Local,
   Global,
   Weak,
}

#[derive(Debug, Clone)]
pub struct Symbol {
   pub name:         String,
   pub value:        u64,
   pub size:         u64,
   pub binding:      Binding,
   pub is_function:  bool,
   pub is_undefined: bool,
   /// `true` for a thread-local symbol (`STT_TLS`); its `value` is the offset into the owning
   /// module's TLS image rather than a virtual address.
   pub is_tls:       bool,
   /// `true` for a GNU indirect-function symbol (`STT_GNU_IFUNC`); `value` is the address of the
   /// resolver, not the eventual callee.
   pub is_ifunc:     bool,
   pub section_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Relocation {
   pub offset:       u64,
   pub kind:         u32,
   pub symbol_index: Option<usize>,
   pub addend:       i64,
}

#[derive(Debug, Clone)]
pub enum DynamicTag {
   Needed(String),
   SoName(String),
}

/// An abstract parsed ELF image: loadable segments, sections, symbols, relocations and dynamic
/// tags, without committing the conductor to any one parsing crate.
pub trait ElfMap {
   fn segments(&self) -> &[Segment];
   fn sections(&self) -> &[Section];
   fn symbols(&self) -> &[Symbol];
   fn relocations(&self) -> &[Relocation];
   fn dynamic_tags(&self) -> &[DynamicTag];
   fn entry(&self) -> u64;
   fn is_pie(&self) -> bool;
}

/// The default `ElfMap`, built by reading a real ELF64 file through the `object` crate.
#[derive(Debug)]
pub struct ObjectElfMap {
   segments:   Vec<Segment>,
   sections:   Vec<Section>,
   symbols:    Vec<Symbol>,
   relocations: Vec<Relocation>,
   dynamic_tags: Vec<DynamicTag>,
   entry:      u64,
   is_pie:     bool,
}

impl ObjectElfMap {
   pub fn load(path: &Path) -> Result<Self> {
      let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
      Self::parse(&bytes).with_context(|| format!("parsing {}", path.display()))
   }

   pub fn parse(bytes: &[u8]) -> Result<Self> {
      let file = object::File::parse(bytes).map_err(|error| {
         warp_error::Kind::Parse {
            file:   std::path::PathBuf::new(),
            offset: 0,
            reason: error.to_string(),
         }
      })?;

      let segments = file
         .segments()
         .map(|segment| {
            let (_, filesz) = segment.file_range();
            Segment {
               vaddr:  segment.address(),
               filesz,
               memsz:  segment.size(),
               flags:  segment_flags(&segment),
               data:   segment.data().unwrap_or_default().to_vec(),
            }
         })
         .collect();

      let sections = file
         .sections()
         .map(|section| {
            Section {
               name:   section.name().unwrap_or_default().to_owned(),
               kind:   section_kind_tag(&section),
               addr:   section.address(),
               offset: section.file_range().map_or(0, |(offset, _)| offset),
               size:   section.size(),
               link:   0,
               info:   0,
            }
         })
         .collect();

      let symbols = file
         .symbols()
         .map(|symbol| {
            Symbol {
               name:          symbol.name().unwrap_or_default().to_owned(),
               value:         symbol.address(),
               size:          symbol.size(),
               binding:       if symbol.is_weak() {
                  Binding::Weak
               } else if symbol.is_global() {
                  Binding::Global
               } else {
                  Binding::Local
               },
               is_function:   symbol.kind() == object::SymbolKind::Text,
               is_undefined:  symbol.is_undefined(),
               is_tls:        symbol.kind() == object::SymbolKind::Tls,
               is_ifunc:      is_gnu_ifunc(&symbol),
               section_index: symbol.section().index().map(|index| index.0),
            }
         })
         .collect();

      let mut relocations = Vec::new();
      for section in file.sections() {
         for (offset, relocation) in section.relocations() {
            relocations.push(Relocation {
               offset,
               kind: relocation.flags().into_raw_type(),
               symbol_index: match relocation.target() {
                  object::RelocationTarget::Symbol(index) => Some(index.0),
                  _ => None,
               },
               addend: relocation.addend(),
            });
         }
      }

      let dynamic_tags = parse_dynamic_tags(&file);

      Ok(Self {
         segments,
         sections,
         symbols,
         relocations,
         dynamic_tags,
         entry: file.entry(),
         is_pie: file.kind() == object::ObjectKind::Dynamic,
      })
   }
}

impl ElfMap for ObjectElfMap {
   fn segments(&self) -> &[Segment] {
      &self.segments
   }

   fn sections(&self) -> &[Section] {
      &self.sections
   }

   fn symbols(&self) -> &[Symbol] {
      &self.symbols
   }

   fn relocations(&self) -> &[Relocation] {
      &self.relocations
   }

   fn dynamic_tags(&self) -> &[DynamicTag] {
      &self.dynamic_tags
   }

   fn entry(&self) -> u64 {
      self.entry
   }

   fn is_pie(&self) -> bool {
      self.is_pie
   }
}

fn segment_flags(segment: &object::Segment) -> SegmentFlags {
   let flags = match segment.flags() {
      object::SegmentFlags::Elf { p_flags } => p_flags,
      _ => 0,
   };

   SegmentFlags {
      read:    flags & elf::PF_R != 0,
      write:   flags & elf::PF_W != 0,
      execute: flags & elf::PF_X != 0,
   }
}

/// `STT_GNU_IFUNC` (10) is a GNU extension the portable `SymbolKind` enum doesn't model; it's
/// only visible through the raw ELF `st_info` byte.
fn is_gnu_ifunc(symbol: &object::Symbol) -> bool {
   match symbol.flags() {
      object::SymbolFlags::Elf { st_info, .. } => st_info & 0x0F == elf::STT_GNU_IFUNC,
      _ => false,
   }
}

fn section_kind_tag(section: &object::Section) -> u32 {
   match section.kind() {
      object::SectionKind::Text => elf::SHT_PROGBITS,
      object::SectionKind::Data | object::SectionKind::ReadOnlyData => elf::SHT_PROGBITS,
      object::SectionKind::UninitializedData => elf::SHT_NOBITS,
      _ => elf::SHT_NULL,
   }
}

/// Reads `DT_NEEDED`/`DT_SONAME` entries straight out of the raw `.dynamic`/`.dynstr` sections —
/// the generic `Object` trait has no format-agnostic dynamic-tag iterator, and going through the
/// ELF-class-specific reader just to get two tag kinds isn't worth the extra type parameter.
fn parse_dynamic_tags(file: &object::File) -> Vec<DynamicTag> {
   const DT_NULL: i64 = 0;
   const DT_NEEDED: i64 = 1;
   const DT_SONAME: i64 = 14;

   let Some(dynamic) = file.section_by_name(".dynamic") else {
      return Vec::new();
   };
   let Some(dynstr) = file.section_by_name(".dynstr") else {
      return Vec::new();
   };
   let (Ok(dynamic_bytes), Ok(dynstr_bytes)) = (dynamic.data(), dynstr.data()) else {
      return Vec::new();
   };

   let mut tags = Vec::new();
   for entry in dynamic_bytes.chunks_exact(16) {
      let tag = i64::from_le_bytes(entry[0..8].try_into().expect("chunk is 16 bytes"));
      let val = u64::from_le_bytes(entry[8..16].try_into().expect("chunk is 16 bytes"));

      match tag {
         DT_NULL => break,
         DT_NEEDED => {
            if let Some(name) = read_dynstr(dynstr_bytes, val as usize) {
               tags.push(DynamicTag::Needed(name));
            }
         },
         DT_SONAME => {
            if let Some(name) = read_dynstr(dynstr_bytes, val as usize) {
               tags.push(DynamicTag::SoName(name));
            }
         },
         _ => {},
      }
   }

   tags
}

fn read_dynstr(table: &[u8], offset: usize) -> Option<String> {
   let slice = table.get(offset..)?;
   let end = slice.iter().position(|&byte| byte == 0)?;
   String::from_utf8(slice[..end].to_vec()).ok()
}
