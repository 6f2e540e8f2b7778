//! # Trigger Substrate Specification
//!
//! Core types of the guarded-cell execution substrate that generated code
//! targets.
//!
//! ## Model
//! - A single bank of 32-bit memory words, addressed by [`WordIndex`]
//! - Cells: a conjunction of guards, an ordered list of actions and exactly
//!   one mutable successor pointer (the cell's *link word*)
//! - Guards compare a (masked) word against a constant, optionally through one
//!   level of address indirection
//! - Actions set/add/subtract a (masked) word by a constant or by the current
//!   value of another word
//! - Control transfer exists only by writing link words

pub mod cell;
pub mod config;
pub mod error;
pub mod program;

pub use cell::{
    Action, Cell, CellId, Comparison, Condition, Modifier, Operand, Target, WordIndex, FULL_MASK,
    LINK_HALT,
};
pub use config::{ConfigError, Layout};
pub use error::{Result, SpecError};
pub use program::{Program, Subroutine, MAGIC, VERSION};

/// Bytes per memory word
pub const WORD_BYTES: u32 = 4;

/// Bits per memory word
pub const WORD_BITS: u32 = 32;
