//! The conductor: drives load → parse → resolve across every module of a [`Program`].

use std::{
   cell::Cell,
   collections::{
      BTreeMap,
      HashMap,
      HashSet,
   },
};

use tracing::{
   info,
   warn,
};
use warp_chunk::{
   ChunkRef,
   FunctionId,
   InstructionId,
   Link,
   ModuleId,
   Position,
   Program,
   Semantic,
};
use warp_find::find_innermost_containing;
use warp_visit::Visitor;

use crate::{
   diagnostic::Diagnostic,
   disassembler::Disassembler,
   elf_map::{
      Binding,
      ElfMap,
   },
   resolve,
   resolve::ifunc::IFuncEntry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Phase {
   Plt,
   Tls,
   Weak,
   Vtable,
   IFunc,
   Data,
}

/// Drives the load/parse/resolve lifecycle over a single [`Program`]. Owns the side tables the
/// resolution phases need (symbol indices, TLS offsets, ifunc registrations) that don't belong
/// in the chunk tree itself.
#[derive(Default)]
pub struct Conductor {
   program:      Program,
   diagnostics:  Vec<Diagnostic>,
   completed:    HashSet<Phase>,

   tls_offsets:        HashMap<ModuleId, HashMap<String, u64>>,
   function_addresses: HashMap<u64, FunctionId>,
   symbol_index:       HashMap<String, ChunkRef>,
   ifunc_symbols:      Vec<(String, FunctionId)>,
   ifuncs:             Vec<IFuncEntry>,
}

impl Conductor {
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   #[must_use]
   pub fn program(&self) -> &Program {
      &self.program
   }

   pub fn program_mut(&mut self) -> &mut Program {
      &mut self.program
   }

   #[must_use]
   pub fn diagnostics(&self) -> &[Diagnostic] {
      &self.diagnostics
   }

   #[must_use]
   pub fn ifuncs(&self) -> &[IFuncEntry] {
      &self.ifuncs
   }

   /// Loads one ELF image: creates its `Module`, populates `DataRegion`s from writable loadable
   /// segments, builds every `Function` from the symbol table *before* disassembling any of
   /// them (so a call to a function at a higher address than its caller still resolves),
   /// derives PLT trampolines/TLS offsets/ifunc registrations, disassembles each function's
   /// bytes, and finally walks the relocation table to attach `SymbolOnlyLink`s directly to the
   /// instructions and data variables they target.
   pub fn load(
      &mut self,
      elf: &dyn ElfMap,
      name: String,
      is_framework_self: bool,
      decoder: &dyn Disassembler,
   ) -> ModuleId {
      info!(module = %name, "loading module");
      let module_id = self.program.push_module(name, Position::Absolute(0), is_framework_self);

      for segment in elf.segments() {
         if segment.memsz == 0 || segment.flags.execute {
            continue;
         }

         let region = self.program.push_data_region(
            module_id,
            format!("region@{:#x}", segment.vaddr),
            Position::Absolute(segment.vaddr),
            segment.flags.write,
         );
         let section = self.program.push_data_section(region, "data".into());

         let mut offset = 0usize;
         while offset < segment.memsz as usize {
            let width = 8.min(segment.memsz as usize - offset);
            let mut chunk = segment.data.get(offset..(offset + width).min(segment.data.len())).unwrap_or(&[]).to_vec();
            chunk.resize(width, 0);
            self.program.push_data_variable(section, chunk);
            offset += width;
         }
      }

      let mut symbols: Vec<_> = elf
         .symbols()
         .iter()
         .filter(|symbol| (symbol.is_function || symbol.is_ifunc) && !symbol.is_undefined)
         .collect();
      symbols.sort_by_key(|symbol| symbol.value);

      let list = self.program.module(module_id).function_list();

      // Pass 1: create every function and register its address/name up front, so pass 2's
      // disassembly can resolve a call to *any* local function regardless of symbol order.
      let mut functions = Vec::with_capacity(symbols.len());
      let mut ifunc_symbols = Vec::new();
      for symbol in &symbols {
         let function = self.program.insert_function(list, symbol.name.clone(), Position::Absolute(symbol.value));
         self.function_addresses.insert(symbol.value, function);
         self.symbol_index.insert(symbol.name.clone(), ChunkRef::Function(function));
         if symbol.is_ifunc {
            ifunc_symbols.push((symbol.name.clone(), function));
         }
         functions.push(function);
      }
      if !ifunc_symbols.is_empty() {
         self.register_ifunc_symbols(ifunc_symbols);
      }

      let tls_offsets: HashMap<String, u64> =
         elf.symbols().iter().filter(|symbol| symbol.is_tls).map(|symbol| (symbol.name.clone(), symbol.value)).collect();
      if !tls_offsets.is_empty() {
         self.register_tls_offsets(module_id, tls_offsets);
      }

      // PLT trampolines: one per undefined function symbol a relocation actually references,
      // skipping names that turned out to be defined locally by another loaded module already.
      let mut seen_trampolines = HashSet::new();
      for relocation in elf.relocations() {
         let Some(symbol) = relocation.symbol_index.and_then(|index| elf.symbols().get(index)) else {
            continue;
         };
         if !symbol.is_function || !symbol.is_undefined || symbol.name.is_empty() {
            continue;
         }
         if self.symbol_index.contains_key(&symbol.name) || !seen_trampolines.insert(symbol.name.clone()) {
            continue;
         }

         self.program.push_plt_trampoline(module_id, symbol.name.clone(), Position::Absolute(relocation.offset));
      }

      // Pass 2: disassemble now that every direct local call target is known, tracking each
      // instruction's address so the relocation pass below can find it again.
      let mut instruction_ranges: BTreeMap<u64, (u64, InstructionId)> = BTreeMap::new();
      for (symbol, &function) in symbols.iter().zip(functions.iter()) {
         let Some(segment) = elf
            .segments()
            .iter()
            .find(|segment| segment.flags.execute && symbol.value >= segment.vaddr && symbol.value < segment.vaddr + segment.memsz)
         else {
            self.diagnostics.push(Diagnostic::warning(
               Some(module_id),
               format!("no executable segment backs function `{}`", symbol.name),
            ));
            continue;
         };

         let start = (symbol.value - segment.vaddr) as usize;
         let length = if symbol.size > 0 { symbol.size as usize } else { 16 };
         let end = (start + length).min(segment.data.len());
         let Some(bytes) = segment.data.get(start..end) else {
            continue;
         };

         let block = self.program.push_block(function);
         for instruction in decoder.disassemble(bytes, symbol.value) {
            let semantic = match instruction.branch_form {
               Some(form) => {
                  let link = instruction
                     .branch_target()
                     .and_then(|target| self.function_addresses.get(&target).copied())
                     .map(|target| Link::Normal(ChunkRef::Function(target)))
                     .unwrap_or_else(|| Link::SymbolOnly {
                        symbol: format!("sub_{:x}", instruction.branch_target().unwrap_or(0)),
                        weak:   false,
                     });

                  Semantic::LinkedControlFlow { form, link, widened: Cell::new(false) }
               },
               None => Semantic::Disassembled(instruction.decoded),
            };

            let instruction_id = self.program.insert_instruction(block, usize::MAX, semantic);
            instruction_ranges.insert(instruction.address, (instruction.address + instruction.length as u64, instruction_id));
         }
      }

      // Load step 4: convert static relocations into `SymbolOnlyLink`s attached directly to the
      // instruction or data variable they patch, overriding any placeholder link disassembly
      // guessed from a bare branch target.
      for relocation in elf.relocations() {
         let Some(symbol) = relocation.symbol_index.and_then(|index| elf.symbols().get(index)) else {
            continue;
         };
         if symbol.name.is_empty() {
            continue;
         }

         let link = Link::SymbolOnly { symbol: symbol.name.clone(), weak: symbol.binding == Binding::Weak };

         let containing_instruction = instruction_ranges
            .range(..=relocation.offset)
            .next_back()
            .filter(|(_, &(end, _))| relocation.offset < end);
         if let Some((_, &(_, instruction_id))) = containing_instruction {
            self.program.instruction_mut(instruction_id).semantic.set_link(link);
            continue;
         }

         if let Some(ChunkRef::DataVariable(variable_id)) =
            find_innermost_containing(&self.program, ChunkRef::Module(module_id), relocation.offset)
         {
            self.program.data_variable_mut(variable_id).link = Some(link);
         }
      }

      module_id
   }

   /// Registers a module's TLS symbol offsets, discovered while parsing its symbol table by
   /// the caller (an `ElfMap`-specific detail this crate doesn't prescribe).
   pub fn register_tls_offsets(&mut self, module: ModuleId, offsets: HashMap<String, u64>) {
      self.tls_offsets.insert(module, offsets);
   }

   /// Registers a module's indirect-function symbols, to be turned into `IFuncEntry`s by
   /// [`Conductor::resolve_ifunc`].
   pub fn register_ifunc_symbols(&mut self, symbols: Vec<(String, FunctionId)>) {
      self.ifunc_symbols.extend(symbols);
   }

   pub fn resolve_plt(&mut self) {
      resolve::plt::run(&mut self.program);
      self.completed.insert(Phase::Plt);
   }

   pub fn resolve_tls(&mut self) {
      resolve::tls::run(&mut self.program, &self.tls_offsets);
      self.completed.insert(Phase::Tls);
   }

   pub fn resolve_weak(&mut self) {
      resolve::weak::run(&mut self.program, &self.symbol_index);
      self.completed.insert(Phase::Weak);
   }

   pub fn resolve_vtable(&mut self) {
      resolve::vtable::run(&mut self.program, &self.function_addresses);
      self.completed.insert(Phase::Vtable);
   }

   pub fn resolve_ifunc(&mut self) {
      self.ifuncs = resolve::ifunc::run(&self.ifunc_symbols);
      self.completed.insert(Phase::IFunc);
   }

   pub fn resolve_data(&mut self) {
      resolve::data::run(&mut self.program, &self.symbol_index);
      self.completed.insert(Phase::Data);
   }

   /// Runs every resolution phase in the mandated order. Safe to call more than once: every
   /// phase is individually idempotent.
   pub fn resolve_all(&mut self) {
      self.resolve_plt();
      self.resolve_tls();
      self.resolve_weak();
      self.resolve_vtable();
      self.resolve_ifunc();
      self.resolve_data();

      let remaining = self.program.check().len();
      if remaining > 0 {
         warn!(unresolved = remaining, "resolution left unresolved links behind");
      }
   }

   /// Applies `visitor` to every module. `include_framework_self` is mandatory — there is no
   /// default, per the decision recorded for this call's one-time ambiguity.
   pub fn accept_in_all_modules<V: Visitor>(&mut self, visitor: &mut V, include_framework_self: bool) {
      for module_id in self.program.modules().to_vec() {
         if !include_framework_self && self.program.module(module_id).is_framework_self {
            continue;
         }

         visitor.visit_module(&mut self.program, module_id);
      }
   }
}
