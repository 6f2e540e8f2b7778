//! Runtime error types

use thiserror::Error;
use trig_spec::{CellId, SpecError};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Spec error: {0}")]
    SpecError(#[from] SpecError),

    #[error("Link word of {cell} holds {value:#x}, which names no cell")]
    InvalidLink { cell: CellId, value: u32 },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_link_display() {
        let err = RuntimeError::InvalidLink {
            cell: CellId(4),
            value: 0x99,
        };
        assert_eq!(err.to_string(), "Link word of c4 holds 0x99, which names no cell");
    }

    #[test]
    fn test_spec_error_from() {
        let err: RuntimeError = SpecError::InvalidEntry(CellId(2)).into();
        assert!(err.to_string().contains("Entry cell c2"));
    }

    #[test]
    fn test_other_display() {
        let err = RuntimeError::Other("custom error message".to_string());
        assert_eq!(err.to_string(), "custom error message");
    }
}
