//! Chunk lookup: resolving an address or name to the chunk it names, for the shell and for
//! passes.

mod find;
pub use find::{
   find_innermost_containing,
   ChunkFind2,
};
