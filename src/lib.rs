//! kx - memory and lookup primitives for compiler-style programs
//!
//! This crate provides the allocation and deduplication layer that front-ends,
//! interpreters and other single-threaded tools build on:
//! - An allocator capability (`Allocator`) selected statically through generics
//! - A system allocator over the platform's aligned allocation family
//! - A chunked downward bump arena with batch-only reclamation
//! - An open-addressing hash table with tombstones and linear probing
//! - A growable vector, a string buffer, a bit set and a string interner
//!   composed from the above

#[macro_use]
pub mod fatal;

pub mod allocator;
pub mod bitset;
pub mod intern;
pub mod logging;
pub mod string;
pub mod table;
pub mod vector;

// Re-export core types
pub use allocator::{AllocError, Allocator, Arena, Layout, SystemAlloc};
pub use bitset::BitSet;
pub use intern::Interner;
pub use string::StringBuf;
pub use table::{HashTable, KeyOps};
pub use vector::Vector;
