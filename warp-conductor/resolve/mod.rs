//! The six resolution phases (§4.3): ordered, idempotent, each converting raw
//! `Link::SymbolOnly` placeholders within its domain into a concrete link variant.

pub mod data;
pub mod ifunc;
pub mod plt;
pub mod tls;
pub mod vtable;
pub mod weak;
