//! `warp`: loads an ELF executable into a [`warp_conductor::Conductor`], runs the mandated
//! resolution phases, then either runs a `;`-separated one-shot script or drops into the
//! interactive shell (§11).

use std::path::PathBuf;

use clap::Parser;
use tracing::warn;
use warp_conductor::{
   Conductor,
   Disassembler,
   DynamicTag,
   ElfMap,
   MinimalDecoder,
   ObjectElfMap,
};
use warp_error::{
   Contextful as _,
   Result,
};

use warp::{
   config::{
      Config,
      ConfigOverrides,
   },
   shell::Shell,
};

/// A mutable-IR binary analysis and transformation shell.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
   /// Path to the ELF executable to load.
   path: PathBuf,

   /// Runs this `;`-separated sequence of shell commands non-interactively instead of starting
   /// the REPL.
   #[arg(long)]
   script: Option<String>,

   /// Directory searched for each `DT_NEEDED` dependency's image, by file name; repeatable,
   /// tried in order given. Dependencies not found in any directory are skipped with a warning.
   #[arg(long = "lib-dir")]
   lib_dirs: Vec<PathBuf>,

   /// Also loads the framework's own image as a module, with `is_framework_self: true`, so
   /// passes that need `Conductor::accept_in_all_modules(.., true)` have something to act on.
   #[arg(long)]
   framework_image: Option<PathBuf>,

   #[command(flatten)]
   overrides: ConfigOverrides,
}

fn main() -> Result<()> {
   let cli = Cli::parse();
   let config = Config::load(&cli.overrides)?;
   warp::init(&config.log_filter);

   let decoder = MinimalDecoder;
   let mut conductor = Conductor::new();

   let elf = ObjectElfMap::load(&cli.path).with_context(|| format!("failed to load {}", cli.path.display()))?;
   let name = cli.path.file_name().map_or_else(|| cli.path.display().to_string(), |name| name.to_string_lossy().into_owned());
   let needed: Vec<String> = elf
      .dynamic_tags()
      .iter()
      .filter_map(|tag| match tag {
         DynamicTag::Needed(name) => Some(name.clone()),
         DynamicTag::SoName(_) => None,
      })
      .collect();
   conductor.load(&elf, name, false, &decoder);

   if let Some(framework_image) = &cli.framework_image {
      let framework_elf = ObjectElfMap::load(framework_image)
         .with_context(|| format!("failed to load framework image {}", framework_image.display()))?;
      conductor.load(&framework_elf, "<framework>".into(), true, &decoder);
   }

   load_dependencies(&mut conductor, &needed, &cli.lib_dirs, &decoder);

   conductor.resolve_all();

   let mut shell = Shell::new(conductor, config);

   match cli.script {
      Some(script) => shell.run_script(&script),
      None => shell.repl(),
   }
}

/// Loads each `DT_NEEDED` name found in `lib_dirs`, by file name, in the order the directories
/// were given. A dependency absent from every directory is logged and skipped rather than
/// treated as fatal — the main executable may still be usable without it.
fn load_dependencies(conductor: &mut Conductor, needed: &[String], lib_dirs: &[PathBuf], decoder: &dyn Disassembler) {
   for name in needed {
      let Some(path) = lib_dirs.iter().map(|dir| dir.join(name)).find(|candidate| candidate.is_file()) else {
         warn!(dependency = %name, "dependency not found in any --lib-dir, skipping");
         continue;
      };

      match ObjectElfMap::load(&path) {
         Ok(elf) => {
            conductor.load(&elf, name.clone(), false, decoder);
         },
         Err(error) => warn!(dependency = %name, %error, "failed to load dependency"),
      }
   }
}

#[cfg(test)]
mod tests {
   use clap::CommandFactory as _;

   use super::Cli;

   #[test]
   fn cli_definition_is_valid() {
      Cli::command().debug_assert();
   }
}
