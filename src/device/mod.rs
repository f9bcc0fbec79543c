//! Device-level collaborators of the interpreter core.
//!
//! The core itself only executes instructions; everything byte-addressable
//! lives here behind the [`memory::Memory`] trait.

pub mod memory;
