//! Dev-only companion binary: regression-checks the disassembly/resolution pipeline against
//! fixture ELF binaries, the same way a snapshot test would, but with a diff-tool-assisted
//! review step instead of a bare `assert_eq!`.

use std::{
   fs,
   path::{
      Path,
      PathBuf,
   },
   process,
};

use clap::Parser as _;
use warp_conductor::{
   Conductor,
   MinimalDecoder,
   ObjectElfMap,
};
use warp_error::{
   Contextful as _,
   Result,
};
use which::which;

#[derive(clap::Parser)]
struct Cli {
   #[command(subcommand)]
   command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
enum Command {
   Check {
      /// Whether to immediately exit after the first mismatch.
      #[arg(long, global = true)]
      fail_fast: bool,

      #[command(subcommand)]
      command: Check,
   },
}

/// Checks a crate's fixture data for correctness.
#[derive(clap::Subcommand, Debug, Clone)]
enum Check {
   /// Compares every `.elf` fixture's resolved disassembly dump against its `.expect` file.
   Disassembly {
      /// Directory holding the `.elf`/`.expect` fixture pairs.
      #[arg(long, default_value = "warp-conductor/fixtures")]
      dir: PathBuf,

      /// Overwrites `.expect` files that don't match the actual dump instead of failing.
      #[arg(long, conflicts_with = "fail_fast")]
      overwrite: bool,
   },
}

fn main() -> Result<()> {
   let cli = Cli::parse();

   match cli.command {
      Command::Check {
         fail_fast,
         command: Check::Disassembly { dir, overwrite },
      } => check_disassembly(&dir, fail_fast, overwrite),
   }
}

fn check_disassembly(dir: &Path, fail_fast: bool, overwrite: bool) -> Result<()> {
   let mut fail_count: usize = 0;

   let diff_tool = which("difft").or_else(|_| which("diff")).context("failed to find a diff tool")?;

   let entries = match fs::read_dir(dir) {
      Ok(entries) => entries,
      Err(_) => {
         eprintln!("no fixture directory at {}, nothing to check", dir.display());
         return Ok(());
      },
   };

   for entry in entries {
      let elf_path = entry.context("failed to read fixture directory entry")?.path();
      if elf_path.extension().is_none_or(|extension| extension != "elf") {
         continue;
      }
      let expect_path = elf_path.with_extension("expect");

      let actual = dump_fixture(&elf_path)?;
      let name = elf_path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("<fixture>");

      let expected = fs::read_to_string(&expect_path).unwrap_or_default();
      if expected == actual {
         eprintln!("{name}: matches");
         continue;
      }

      eprintln!("{name}: dump has changed, diffing expected vs actual");

      let scratch = expect_path.with_extension("actual");
      fs::write(&scratch, &actual).context("failed to write scratch dump for diffing")?;

      let _ = process::Command::new(&diff_tool).arg(&expect_path).arg(&scratch).status();
      let _ = fs::remove_file(&scratch);

      if overwrite {
         eprintln!("overwriting old fixture...");
         fs::write(&expect_path, &actual).with_context(|| format!("failed to overwrite {}", expect_path.display()))?;
      }

      fail_count += 1;
      if fail_fast {
         warp_error::bail!("failed fast");
      }
   }

   if fail_count > 0 {
      if !fail_fast {
         eprintln!("dump has changed for {fail_count} fixture(s)");
      }
      warp_error::bail!("exiting due to {fail_count} previous mismatches");
   }

   Ok(())
}

/// Loads one fixture, runs it through the mandated load/resolve phases, and renders a stable
/// textual dump of every function's disassembled instructions.
fn dump_fixture(elf_path: &Path) -> Result<String> {
   let elf = ObjectElfMap::load(elf_path).with_context(|| format!("failed to load {}", elf_path.display()))?;
   let decoder = MinimalDecoder;

   let mut conductor = Conductor::new();
   let name = elf_path.file_name().map_or_else(|| elf_path.display().to_string(), |name| name.to_string_lossy().into_owned());
   conductor.load(&elf, name, false, &decoder);
   conductor.resolve_all();

   let program = conductor.program();
   let mut dump = String::new();

   for &module in program.modules() {
      let list = program.module(module).function_list();
      for &function in program.function_list(list).functions() {
         dump.push_str(&format!("fn {} @ {:#x}\n", program.function(function).name, program.function_address(function)));
         for &block in program.function(function).blocks() {
            for &instruction in program.block(block).instructions() {
               dump.push_str(&format!(
                  "  {:#010x}: {:?}\n",
                  program.instruction_address(instruction),
                  program.instruction(instruction).semantic
               ));
            }
         }
      }
   }

   Ok(dump)
}

#[cfg(test)]
mod tests {
   use clap::CommandFactory as _;

   use super::Cli;

   #[test]
   fn cli() {
      Cli::command().debug_assert();
   }
}
