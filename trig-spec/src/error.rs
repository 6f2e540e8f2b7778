//! # Error Types for the trigger substrate

use crate::cell::CellId;
use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    // Configuration errors
    #[error("Invalid layout: {0}")]
    InvalidConfig(#[from] ConfigError),

    // Program format errors
    #[error("Invalid program magic: expected 0x54524743, got {0:#010x}")]
    InvalidMagic(u32),

    #[error("Invalid program version: expected {expected:#010x}, found {found:#010x}")]
    InvalidVersion { expected: u32, found: u32 },

    #[error("Truncated program: {0} bytes")]
    Truncated(usize),

    #[error("Program decode failed: {0}")]
    Decode(#[from] bincode::Error),

    // Structural errors
    #[error("Cell {cell} refers to missing cell {missing}")]
    UnknownCell { cell: CellId, missing: CellId },

    #[error("Entry cell {0} does not exist")]
    InvalidEntry(CellId),

    #[error("Program has {count} cells, layout allows {limit}")]
    TooManyCells { count: usize, limit: u32 },

    #[error("Initial image writes link word {word:#010x}")]
    ImageTouchesLinks { word: u32 },

    #[error("Subroutine {name} has no cell {cell}")]
    InvalidSubroutine { name: String, cell: CellId },

    // General errors
    #[error("{0}")]
    Other(String),
}

impl SpecError {
    /// Errors caused by a malformed program rather than a malformed byte stream
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SpecError::UnknownCell { .. }
                | SpecError::InvalidEntry(_)
                | SpecError::TooManyCells { .. }
                | SpecError::ImageTouchesLinks { .. }
                | SpecError::InvalidSubroutine { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SpecError>;
