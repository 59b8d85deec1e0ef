//! Layered configuration: built-in defaults, then an optional `warp.toml` in the working
//! directory, then `WARP_`-prefixed environment variables, then explicit CLI flags — read once
//! at startup, in that order, each layer overriding the last.

use std::{
   env,
   fs,
   num::ParseIntError,
};

use warp_error::{
   Contextful as _,
   Result,
};

/// The output architecture a sandbox/emission pipeline targets. `MinimalDecoder` only actually
/// recognizes x86-64 branch shapes today; this knob exists so the layering is in place before
/// an `Aarch64Rel26`-aware decoder lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
   X86_64,
   Aarch64,
}

impl Default for Architecture {
   fn default() -> Self {
      Architecture::X86_64
   }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
   /// Default sandbox base address, used when a shell `reassign` invocation omits `--base`.
   pub sandbox_base: u64,
   pub architecture: Architecture,
   /// `tracing_subscriber::EnvFilter` directive string.
   pub log_filter: String,
   /// Whether `accept_in_all_modules` defaults to including the framework's own image when a
   /// shell command omits the flag. The framework's accept call itself has no default (§9); this
   /// only controls what the shell passes when the user doesn't say.
   pub include_framework_self: bool,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         sandbox_base: 0x4000_0000,
         architecture: Architecture::default(),
         log_filter: "warp=info".into(),
         include_framework_self: false,
      }
   }
}

/// CLI-flag overrides for [`Config`], flattened into the top-level `clap::Parser`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigOverrides {
   /// Overrides the sandbox base address. Accepts `0x`-prefixed hex or plain decimal.
   #[arg(long, value_parser = parse_hex_or_dec)]
   pub sandbox_base: Option<u64>,

   /// Overrides the `tracing` filter string.
   #[arg(long)]
   pub log_filter: Option<String>,

   /// Overrides whether the framework's own image participates in `accept_in_all_modules` by
   /// default.
   #[arg(long)]
   pub include_framework_self: Option<bool>,
}

impl Config {
   /// Builds the fully layered configuration.
   pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
      let mut config = match fs::read_to_string("warp.toml") {
         Ok(contents) => toml::from_str(&contents).context("failed to parse warp.toml")?,
         Err(_) => Config::default(),
      };

      if let Ok(value) = env::var("WARP_SANDBOX_BASE") {
         config.sandbox_base = parse_hex_or_dec(&value).context("WARP_SANDBOX_BASE must be a number")?;
      }
      if let Ok(value) = env::var("WARP_LOG_FILTER") {
         config.log_filter = value;
      }
      if let Ok(value) = env::var("WARP_INCLUDE_FRAMEWORK_SELF") {
         config.include_framework_self = value == "1" || value.eq_ignore_ascii_case("true");
      }

      if let Some(base) = overrides.sandbox_base {
         config.sandbox_base = base;
      }
      if let Some(filter) = &overrides.log_filter {
         config.log_filter = filter.clone();
      }
      if let Some(flag) = overrides.include_framework_self {
         config.include_framework_self = flag;
      }

      Ok(config)
   }
}

pub(crate) fn parse_hex_or_dec(value: &str) -> std::result::Result<u64, ParseIntError> {
   let value = value.trim();
   match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
      Some(hex) => u64::from_str_radix(hex, 16),
      None => value.parse(),
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn parses_hex_and_decimal_bases() {
      assert_eq!(parse_hex_or_dec("0x1000").unwrap(), 0x1000);
      assert_eq!(parse_hex_or_dec("4096").unwrap(), 4096);
   }

   #[test]
   fn cli_overrides_win_over_defaults() {
      let overrides = ConfigOverrides {
         sandbox_base: Some(0x8000_0000),
         log_filter: None,
         include_framework_self: None,
      };

      let mut config = Config::default();
      if let Some(base) = overrides.sandbox_base {
         config.sandbox_base = base;
      }

      assert_eq!(config.sandbox_base, 0x8000_0000);
   }
}
