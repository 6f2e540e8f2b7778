//! # Trigger Disassembler
//!
//! Human-readable listings of finished guarded-cell programs.
//!
//! A listing shows the layout, the initial image and one line per cell.
//! Cells that start or end a shared network carry the network's name as a
//! label. Registers are printed as `r<n>`, link words as `link(c<n>)`.
//!
//! ## Example
//!
//! ```rust
//! use trig_disassembler::disassemble;
//! use trig_spec::Program;
//!
//! let program = Program::new();
//! let listing = disassemble(&program).unwrap();
//! assert!(listing.contains("0 cells"));
//! ```

pub mod disassembler;
pub mod error;
pub mod formatter;

pub use disassembler::{disassemble, disassemble_bytes, write_listing};
pub use error::{DisassemblerError, Result};
pub use formatter::{format_action, format_cell, format_condition};

#[cfg(test)]
mod tests {
    use super::*;
    use trig_spec::{Program, SpecError};

    #[test]
    fn test_empty_program() {
        let output = disassemble(&Program::new()).unwrap();
        assert!(output.contains("; entry: none"));
        assert!(output.contains("0 cells, 0 networks"));
    }

    #[test]
    fn test_error_variants() {
        let err = DisassemblerError::from(SpecError::Truncated(3));
        assert_eq!(err.to_string(), "Invalid program: Truncated program: 3 bytes");
    }
}
