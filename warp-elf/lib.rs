//! ELF regeneration: deferred content, section bookkeeping, and the two output backends
//! (`Generator` for a real ELF64 file, `BinGen` for a flat memory image).

mod deferred;
pub use deferred::{
   DeferredId,
   DeferredRegistry,
};

mod section;
pub use section::{
   Section2,
   SectionHeader,
   SectionList,
   SectionRef,
};

mod generator;
pub use generator::{
   Generator,
   LoadableSegment,
};

mod bingen;
pub use bingen::BinGen;
