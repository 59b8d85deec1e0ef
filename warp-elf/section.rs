//! `Section2`: a named output section with a header and a deferred body, collected into a
//! `SectionList` that preserves insertion order and resolves a section's index by name.

use crate::deferred::DeferredId;

/// A forward reference to another section, resolved to its final section-table index only once
/// every section has been added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRef(pub usize);

/// The fixed fields of an ELF section header whose values are known before the body's bytes
/// are; `sh_name` and `sh_offset` are filled in by `SectionList::finalize_headers` once the
/// string table and file layout are settled.
#[derive(Debug, Clone)]
pub struct SectionHeader {
   pub kind:      u32,
   pub flags:     u64,
   pub addr:      u64,
   pub link:      Option<SectionRef>,
   pub info:      u32,
   pub align:     u64,
   pub entsize:   u64,
}

pub struct Section2 {
   pub name:   String,
   pub header: SectionHeader,
   pub body:   DeferredId,
}

/// Preserves insertion order (the order sections are emitted in) and maps names and `SectionRef`
/// indices back to entries.
#[derive(Default)]
pub struct SectionList {
   sections: Vec<Section2>,
   by_name:  indexmap::IndexMap<String, usize>,
}

impl SectionList {
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   pub fn push(&mut self, name: String, header: SectionHeader, body: DeferredId) -> SectionRef {
      let index = self.sections.len();
      self.by_name.insert(name.clone(), index);
      self.sections.push(Section2 { name, header, body });
      SectionRef(index)
   }

   #[must_use]
   pub fn index_of(&self, name: &str) -> Option<SectionRef> {
      self.by_name.get(name).copied().map(|index| SectionRef(index))
   }

   #[must_use]
   pub fn iter(&self) -> impl Iterator<Item = &Section2> {
      self.sections.iter()
   }

   #[must_use]
   pub fn len(&self) -> usize {
      self.sections.len()
   }

   #[must_use]
   pub fn is_empty(&self) -> bool {
      self.sections.is_empty()
   }

   #[must_use]
   pub fn get(&self, reference: SectionRef) -> &Section2 {
      &self.sections[reference.0]
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::deferred::DeferredRegistry;

   #[test]
   fn index_of_resolves_a_section_pushed_earlier() {
      let mut deferred = DeferredRegistry::new();
      let body = deferred.register(0, vec![], |_| vec![]);

      let mut sections = SectionList::new();
      sections.push(".text".into(), SectionHeader {
         kind: 1,
         flags: 0,
         addr: 0,
         link: None,
         info: 0,
         align: 16,
         entsize: 0,
      }, body);

      assert_eq!(sections.index_of(".text"), Some(SectionRef(0)));
      assert_eq!(sections.index_of(".data"), None);
   }
}
