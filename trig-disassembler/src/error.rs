//! Disassembler errors

use thiserror::Error;
use trig_spec::SpecError;

#[derive(Debug, Error)]
pub enum DisassemblerError {
    #[error("Invalid program: {0}")]
    Spec(#[from] SpecError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DisassemblerError>;
