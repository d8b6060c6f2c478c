//! Heap nodes, symbols and garbage collection
pub mod check;
pub mod collect;
pub mod header;
pub mod heap;
pub mod mark;
pub mod series;
pub mod symbol;
