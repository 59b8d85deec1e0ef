//! The `warp` facade: wires the `warp-chunk`/`warp-conductor`/`warp-layout`/`warp-elf`/
//! `warp-find` crates together behind a CLI and an interactive shell, and hosts a handful of
//! example passes demonstrating the visitor/pass contract.

pub mod config;
pub mod passes;
pub mod shell;

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber filtered by `filter` (an `EnvFilter` directive string, e.g.
/// `"warp=debug"`). Safe to call more than once; later calls are no-ops, matching
/// `tracing_subscriber`'s own idempotent `try_init`.
pub fn init(filter: &str) {
   let _ = tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warp=info")))
      .try_init();
}
