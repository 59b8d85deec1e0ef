//! The interactive shell: a `clap::Subcommand` enum driving a synchronous REPL over a loaded
//! [`Conductor`], plus [`run_line`] so the same grammar serves one-shot scripted invocations
//! (§11). Every command looks chunks up through `ChunkFind`/`ChunkFind2`, returning
//! [`Kind::Query`] on a miss and [`Kind::Usage`] on a malformed invocation.

use std::{
   io::{
      self,
      BufRead,
      Write as _,
   },
   path::PathBuf,
};

use warp_chunk::{
   ChunkRef,
   FunctionId,
   ModuleId,
   Program,
   Semantic,
};
use warp_conductor::Conductor;
use warp_elf::{
   BinGen,
   DeferredRegistry,
   Generator,
   LoadableSegment,
   SectionHeader,
   SectionList,
};
use warp_error::{
   Contextful as _,
   Kind,
   Result,
};
use warp_find::{
   find_innermost_containing,
   ChunkFind2,
};
use warp_layout::{
   finalize,
   FileSandbox,
   Sandbox as _,
};
use warp_visit::Visitor as _;
use yansi::Paint as _;

use crate::{
   config::Config,
   passes,
};

/// Owns the loaded program and everything a shell command needs to act on it.
pub struct Shell {
   pub conductor: Conductor,
   pub config:    Config,
}

impl Shell {
   #[must_use]
   pub fn new(conductor: Conductor, config: Config) -> Self {
      Self { conductor, config }
   }

   /// Runs `;`-separated commands non-interactively, stopping at the first error.
   pub fn run_script(&mut self, script: &str) -> Result<()> {
      for line in script.split(';') {
         let line = line.trim();
         if line.is_empty() {
            continue;
         }
         run_line(self, line)?;
      }
      Ok(())
   }

   /// Reads commands from stdin, one per line, until EOF or `quit`.
   pub fn repl(&mut self) -> Result<()> {
      let stdin = io::stdin();
      print!("{} ", "warp>".bold());
      io::stdout().flush().ok();

      for line in stdin.lock().lines() {
         let line = line.context("failed to read from stdin")?;
         let line = line.trim();
         if !line.is_empty() {
            match run_line(self, line) {
               Ok(()) => {},
               Err(error) => println!("{}", error.to_string().red()),
            }
         }

         print!("{} ", "warp>".bold());
         io::stdout().flush().ok();
      }

      Ok(())
   }
}

#[derive(clap::Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct ShellLine {
   #[command(subcommand)]
   command: ShellCommand,
}

#[derive(clap::Subcommand, Debug)]
enum ShellCommand {
   /// Disassembles every instruction in a function.
   Disass { target: String },
   /// Disassembles the single instruction at an address, across every loaded module.
   #[command(name = "x/i")]
   Xi { addr: String },
   /// Emits a function's control-flow graph in DOT.
   Cfgdot { target: String },
   /// Lists every loaded module.
   Modules,
   /// Lists a module's functions.
   Functions { module: String },
   /// Lists a module's functions, sorted by address.
   Functions2 { module: String },
   /// Lists a module's functions, sorted by address, with sizes.
   Functions3 { module: String },
   /// Lists a module's data regions.
   Regions { module: String },
   /// Lists a module's markers.
   Markers { module: String },
   /// Lists jump tables, optionally scoped to one module.
   Jumptables { module: Option<String> },
   /// Runs the address-assignment fixpoint over every loaded module.
   Reassign {
      #[arg(long, value_parser = crate::config::parse_hex_or_dec)]
      base: Option<u64>,
   },
   /// Finalizes the layout and emits a well-formed ELF64 file.
   Generate { file: PathBuf },
   /// Finalizes the layout and emits a flat binary image.
   Bin { file: PathBuf },
   /// Applies the nop-inserter pass to a function.
   Nop { target: String },
   /// Applies the stack-XOR return-address hardener to a function.
   StackXor { target: String },
   /// Applies the stack-frame extender to a function.
   FrameExtend {
      target: String,
      #[arg(long, default_value_t = 16)]
      bytes:  u8,
   },
   /// Applies the indirect-call null-pointer detector to a function.
   NullCheck { target: String },
   /// Applies the logging-instrumentation pass to a function.
   Logging { target: String },
   /// Applies the caller-saved-register context-switch pass to a function.
   ContextSwitch { target: String },
   /// Exits the shell.
   Quit,
}

/// Parses and executes one command line against `shell`.
pub fn run_line(shell: &mut Shell, line: &str) -> Result<()> {
   use clap::Parser as _;

   let tokens = shlex_split(line);
   let parsed = ShellLine::try_parse_from(tokens).map_err(|error| Kind::Usage(error.to_string()))?;

   match parsed.command {
      ShellCommand::Disass { target } => disass(shell, &target),
      ShellCommand::Xi { addr } => x_i(shell, &addr),
      ShellCommand::Cfgdot { target } => cfgdot(shell, &target),
      ShellCommand::Modules => {
         for &module in shell.conductor.program().modules() {
            println!("{}", shell.conductor.program().module(module).name);
         }
         Ok(())
      },
      ShellCommand::Functions { module } => list_functions(shell, &module, false),
      ShellCommand::Functions2 { module } => list_functions(shell, &module, false),
      ShellCommand::Functions3 { module } => list_functions(shell, &module, true),
      ShellCommand::Regions { module } => list_regions(shell, &module),
      ShellCommand::Markers { module } => list_markers(shell, &module),
      ShellCommand::Jumptables { module } => list_jumptables(shell, module.as_deref()),
      ShellCommand::Reassign { base } => reassign_all(shell, base),
      ShellCommand::Generate { file } => generate_elf(shell, &file),
      ShellCommand::Bin { file } => generate_bin(shell, &file),
      ShellCommand::Nop { target } => apply_pass(shell, &target, |program, function| {
         let mut pass = passes::NopPass::default();
         pass.visit_function(program, function);
         format!("inserted {} nops", pass.inserted)
      }),
      ShellCommand::StackXor { target } => apply_pass(shell, &target, |program, function| {
         let mut pass = passes::StackXorPass::default();
         pass.visit_function(program, function);
         format!("hardened {} prologue/epilogue pairs", pass.hardened)
      }),
      ShellCommand::FrameExtend { target, bytes } => apply_pass(shell, &target, |program, function| {
         let mut pass = passes::FrameExtendPass::new(bytes);
         pass.visit_function(program, function);
         format!("extended {} frame(s) by {bytes} bytes", pass.extended)
      }),
      ShellCommand::NullCheck { target } => apply_pass(shell, &target, |program, function| {
         let mut pass = passes::NullCheckPass::default();
         pass.visit_function(program, function);
         format!("guarded {} indirect dispatches", pass.guarded)
      }),
      ShellCommand::Logging { target } => apply_pass(shell, &target, |program, function| {
         let mut pass = passes::LoggingPass::default();
         pass.visit_function(program, function);
         format!("inserted {} logging probes", pass.inserted)
      }),
      ShellCommand::ContextSwitch { target } => apply_pass(shell, &target, |program, function| {
         let mut pass = passes::ContextSwitchPass::default();
         pass.visit_function(program, function);
         format!("wrapped {} call sites", pass.wrapped)
      }),
      ShellCommand::Quit => std::process::exit(0),
   }
}

fn shlex_split(line: &str) -> Vec<String> {
   line.split_whitespace().map(str::to_owned).collect()
}

fn resolve_module(conductor: &Conductor, name: &str) -> Result<ModuleId> {
   conductor
      .program()
      .modules()
      .iter()
      .copied()
      .find(|&module| conductor.program().module(module).name == name)
      .ok_or_else(|| Kind::Query(format!("no module named `{name}`")).into())
}

fn resolve_function(program: &Program, module: ModuleId, target: &str) -> Result<FunctionId> {
   let by_address = crate::config::parse_hex_or_dec(target).ok().and_then(|address| ChunkFind2::function_by_address(program, module, address));

   by_address
      .or_else(|| ChunkFind2::function_by_name(program, module, target))
      .ok_or_else(|| Kind::Query(format!("no function matches `{target}`")).into())
}

/// Resolves `target` against every loaded module, returning the first match.
fn resolve_function_anywhere(conductor: &Conductor, target: &str) -> Result<(ModuleId, FunctionId)> {
   for &module in conductor.program().modules() {
      if let Ok(function) = resolve_function(conductor.program(), module, target) {
         return Ok((module, function));
      }
   }
   Err(Kind::Query(format!("no function matches `{target}` in any loaded module")).into())
}

fn disass(shell: &mut Shell, target: &str) -> Result<()> {
   let (_module, function) = resolve_function_anywhere(&shell.conductor, target)?;
   let program = shell.conductor.program();

   println!("{} ({:#x}):", program.function(function).name, program.function_address(function));
   for &block in program.function(function).blocks() {
      for &instruction in program.block(block).instructions() {
         let address = program.instruction_address(instruction);
         let semantic = &program.instruction(instruction).semantic;
         println!("  {address:#010x}: {}", describe_semantic(semantic));
      }
   }

   Ok(())
}

fn x_i(shell: &mut Shell, addr: &str) -> Result<()> {
   let address = crate::config::parse_hex_or_dec(addr).map_err(|error| Kind::Usage(error.to_string()))?;
   let program = shell.conductor.program();

   for &module in program.modules() {
      if let Some(ChunkRef::Instruction(instruction)) = find_innermost_containing(program, ChunkRef::Module(module), address) {
         let semantic = &program.instruction(instruction).semantic;
         println!("{address:#010x}: {}", describe_semantic(semantic));
         return Ok(());
      }
   }

   Err(Kind::Query(format!("no instruction contains address {address:#x}")).into())
}

fn cfgdot(shell: &mut Shell, target: &str) -> Result<()> {
   let (_module, function) = resolve_function_anywhere(&shell.conductor, target)?;
   let program = shell.conductor.program();
   let name = &program.function(function).name;

   println!("digraph \"{name}\" {{");
   let blocks = program.function(function).blocks();
   for (index, &block) in blocks.iter().enumerate() {
      println!("  block_{index} [label=\"{} instrs\"];", program.block(block).instructions().len());

      let last_link = program
         .block(block)
         .instructions()
         .last()
         .and_then(|&instruction| program.instruction(instruction).semantic.link());

      match last_link {
         Some(link) => println!("  block_{index} -> \"{link:?}\";"),
         None => {
            if index + 1 < blocks.len() {
               println!("  block_{index} -> block_{};", index + 1);
            }
         },
      }
   }
   println!("}}");

   Ok(())
}

fn list_functions(shell: &mut Shell, module: &str, with_sizes: bool) -> Result<()> {
   let module_id = resolve_module(&shell.conductor, module)?;
   let program = shell.conductor.program();
   let list = program.module(module_id).function_list();

   for &function in program.function_list(list).functions() {
      let address = program.function_address(function);
      let name = &program.function(function).name;

      if with_sizes {
         println!("{address:#010x}  {:>6}  {name}", program.function_size(function));
      } else {
         println!("{address:#010x}  {name}");
      }
   }

   Ok(())
}

fn list_regions(shell: &mut Shell, module: &str) -> Result<()> {
   let module_id = resolve_module(&shell.conductor, module)?;
   let program = shell.conductor.program();

   for &region in program.module(module_id).data_regions() {
      let data_region = program.data_region(region);
      println!(
         "{:#010x}  {:>6}  {}{}",
         program.data_region_address(region),
         program.data_region_size(region),
         data_region.name,
         if data_region.writable { " (writable)" } else { "" },
      );
   }

   Ok(())
}

fn list_markers(shell: &mut Shell, module: &str) -> Result<()> {
   let module_id = resolve_module(&shell.conductor, module)?;
   let program = shell.conductor.program();

   for &marker in program.module(module_id).markers() {
      println!("{:#010x}  {}", program.marker_address(marker), program.marker(marker).name);
   }

   Ok(())
}

fn list_jumptables(shell: &mut Shell, module: Option<&str>) -> Result<()> {
   let program = shell.conductor.program();

   let modules: Vec<ModuleId> = match module {
      Some(name) => vec![resolve_module(&shell.conductor, name)?],
      None => program.modules().to_vec(),
   };

   for module_id in modules {
      for &table in program.module(module_id).jump_tables() {
         println!(
            "{:#010x}  {} entries",
            program.jump_table_address(table),
            program.jump_table(table).entries().len(),
         );
      }
   }

   Ok(())
}

fn reassign_all(shell: &mut Shell, base: Option<u64>) -> Result<()> {
   let base = base.unwrap_or(shell.config.sandbox_base);
   let modules = shell.conductor.program().modules().to_vec();

   let bases: Vec<_> = modules.iter().enumerate().map(|(index, &module)| (module, base + index as u64 * 0x0010_0000)).collect();

   warp_layout::reassign(shell.conductor.program_mut(), &bases)?;
   println!("reassigned {} module(s) from base {base:#x}", bases.len());
   Ok(())
}

fn generate_elf(shell: &mut Shell, file: &PathBuf) -> Result<()> {
   let (base, content) = finalize_into_bytes(shell)?;
   let entry = entry_point(shell, base);
   let modules = shell.conductor.program().modules().to_vec();
   let program = shell.conductor.program();
   let data_regions = collect_data_regions(program, &modules);
   let (strtab_bytes, symtab_bytes) = build_symbol_table(program, &modules);

   let mut generator = Generator::new(entry, true);
   generator.add_segment(LoadableSegment {
      vaddr: base,
      flags: object::elf::PF_R | object::elf::PF_X,
      align: 0x1000,
      content: content.clone(),
   });

   let mut deferred = DeferredRegistry::new();
   let mut sections = SectionList::new();

   let text = deferred.register(content.len() as u64, vec![], move |_| content);
   sections.push(".text".into(), SectionHeader {
      kind:    object::elf::SHT_PROGBITS,
      flags:   u64::from(object::elf::SHF_ALLOC | object::elf::SHF_EXECINSTR),
      addr:    base,
      link:    None,
      info:    0,
      align:   16,
      entsize: 0,
   }, text);

   for (name, addr, writable, bytes) in data_regions {
      generator.add_segment(LoadableSegment {
         vaddr:   addr,
         flags:   object::elf::PF_R | if writable { object::elf::PF_W } else { 0 },
         align:   0x1000,
         content: bytes.clone(),
      });

      let size = bytes.len() as u64;
      let body = deferred.register(size, vec![], move |_| bytes);
      sections.push(name, SectionHeader {
         kind:    object::elf::SHT_PROGBITS,
         flags:   u64::from(object::elf::SHF_ALLOC) | if writable { u64::from(object::elf::SHF_WRITE) } else { 0 },
         addr,
         link:    None,
         info:    0,
         align:   8,
         entsize: 0,
      }, body);
   }

   let strtab = deferred.register(strtab_bytes.len() as u64, vec![], move |_| strtab_bytes);
   let strtab_ref = sections.push(".strtab".into(), SectionHeader {
      kind:    object::elf::SHT_STRTAB,
      flags:   0,
      addr:    0,
      link:    None,
      info:    0,
      align:   1,
      entsize: 0,
   }, strtab);

   let symtab = deferred.register(symtab_bytes.len() as u64, vec![], move |_| symtab_bytes);
   sections.push(".symtab".into(), SectionHeader {
      kind:    object::elf::SHT_SYMTAB,
      flags:   0,
      addr:    0,
      link:    Some(strtab_ref),
      info:    1,
      align:   8,
      entsize: 24,
   }, symtab);

   let resolved = deferred.resolve_all()?;
   generator.add_sections_from(&sections, &resolved);

   let bytes = generator.write()?;
   std::fs::write(file, bytes).with_context(|| format!("failed to write {}", file.display()))?;
   println!("wrote {}", file.display());
   Ok(())
}

fn generate_bin(shell: &mut Shell, file: &PathBuf) -> Result<()> {
   let (base, content) = finalize_into_bytes(shell)?;
   let modules = shell.conductor.program().modules().to_vec();
   let data_regions = collect_data_regions(shell.conductor.program(), &modules);

   let mut bingen = BinGen::new(base);
   bingen.add_segment(LoadableSegment {
      vaddr: base,
      flags: object::elf::PF_R | object::elf::PF_X,
      align: 0x1000,
      content,
   });
   for (_name, addr, writable, bytes) in data_regions {
      bingen.add_segment(LoadableSegment {
         vaddr:   addr,
         flags:   object::elf::PF_R | if writable { object::elf::PF_W } else { 0 },
         align:   0x1000,
         content: bytes,
      });
   }

   std::fs::write(file, bingen.write()).with_context(|| format!("failed to write {}", file.display()))?;
   println!("wrote {}", file.display());
   Ok(())
}

/// Flattens every loaded module's `DataRegion`s into `(name, address, writable, bytes)`, in
/// variable order, for the emission backends — `finalize` itself only ever touches code.
fn collect_data_regions(program: &Program, modules: &[ModuleId]) -> Vec<(String, u64, bool, Vec<u8>)> {
   let mut regions = Vec::new();

   for &module_id in modules {
      for &region in program.module(module_id).data_regions() {
         let data_region = program.data_region(region);
         let mut bytes = Vec::new();
         for &section in data_region.sections() {
            for &variable in program.data_section(section).variables() {
               bytes.extend_from_slice(&program.data_variable(variable).bytes);
            }
         }

         regions.push((data_region.name.clone(), program.data_region_address(region), data_region.writable, bytes));
      }
   }

   regions
}

/// Synthesizes a `.strtab`/`.symtab` pair mirroring every loaded module's function names at
/// their newly assigned addresses. The leading null symbol and null string are the required
/// index-0 entries both tables carry.
fn build_symbol_table(program: &Program, modules: &[ModuleId]) -> (Vec<u8>, Vec<u8>) {
   const STB_GLOBAL: u8 = 1;
   const STT_FUNC: u8 = 2;
   const SHN_ABS: u16 = 0xfff1;

   let mut strtab = vec![0u8];
   let mut symtab = vec![0u8; 24];

   for &module_id in modules {
      let list = program.module(module_id).function_list();
      for &function in program.function_list(list).functions() {
         let name_offset = strtab.len() as u32;
         strtab.extend_from_slice(program.function(function).name.as_bytes());
         strtab.push(0);

         symtab.extend_from_slice(&name_offset.to_le_bytes());
         symtab.push((STB_GLOBAL << 4) | STT_FUNC);
         symtab.push(0);
         symtab.extend_from_slice(&SHN_ABS.to_le_bytes());
         symtab.extend_from_slice(&program.function_address(function).to_le_bytes());
         symtab.extend_from_slice(&program.function_size(function).to_le_bytes());
      }
   }

   (strtab, symtab)
}

/// Runs `finalize` over every loaded module into a single [`FileSandbox`] and returns its base
/// address plus its written bytes. Uses the first module's already-assigned address if
/// `reassign` has run, falling back to the configured default base otherwise.
fn finalize_into_bytes(shell: &mut Shell) -> Result<(u64, Vec<u8>)> {
   let modules = shell.conductor.program().modules().to_vec();
   let base = modules
      .first()
      .map(|&module| shell.conductor.program().module_address(module))
      .filter(|&address| address != 0)
      .unwrap_or(shell.config.sandbox_base);

   let mut sandbox = FileSandbox::new(base);
   finalize(shell.conductor.program(), &modules, &mut sandbox)?;
   Ok((base, sandbox.into_bytes()))
}

/// The first function address in the first loaded module, or `base` if none exists.
fn entry_point(shell: &Shell, base: u64) -> u64 {
   shell
      .conductor
      .program()
      .modules()
      .first()
      .map(|&module| shell.conductor.program().module(module).function_list())
      .and_then(|list| shell.conductor.program().function_list(list).functions().first().copied())
      .map_or(base, |function| shell.conductor.program().function_address(function))
}

fn apply_pass(shell: &mut Shell, target: &str, run: impl FnOnce(&mut Program, FunctionId) -> String) -> Result<()> {
   let (_module, function) = resolve_function_anywhere(&shell.conductor, target)?;
   let report = run(shell.conductor.program_mut(), function);
   println!("{report}");
   Ok(())
}

fn describe_semantic(semantic: &Semantic) -> String {
   match semantic {
      Semantic::Raw(bytes) => format!("raw  {}", hex(bytes)),
      Semantic::Disassembled(decoded) => format!("{:<10} {}", decoded.mnemonic, hex(&decoded.bytes)),
      Semantic::LinkedControlFlow { link, widened, .. } => {
         format!("branch{} -> {link:?}", if widened.get() { " (widened)" } else { "" })
      },
      Semantic::LinkedData { link, width } => format!("data[{width}] -> {link:?}"),
   }
}

fn hex(bytes: &[u8]) -> String {
   bytes.iter().map(|byte| format!("{byte:02x}")).collect::<Vec<_>>().join(" ")
}
