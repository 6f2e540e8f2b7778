//! Code generation errors
//!
//! Every error is fatal to the generation pass. Callers report them as
//! diagnostics of the authored script; the generated program never sees them.

use thiserror::Error;
use trig_spec::SpecError;

use crate::emitter::ForwardId;

/// Coarse classification of a [`CodegenError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Alignment or range violation in a declaration or access
    Range,
    /// Operand combination with no generator
    Unsupported,
    /// Addressing or register space exhausted
    Capacity,
    /// Misuse of the emitter itself
    Internal,
}

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("Malaligned member: byte offset {offset} with size {size} crosses a word boundary")]
    Malaligned { offset: u32, size: u32 },

    #[error("Sub-word offset {sub} is out of range for a {bytes}-byte field")]
    OffsetOutOfRange { sub: u32, bytes: u32 },

    #[error("Stride {stride} is smaller than member size {size}")]
    StrideTooSmall { stride: u32, size: u32 },

    #[error("Invalid stride {0}")]
    InvalidStride(u32),

    #[error("Not implemented: {0}")]
    Unimplemented(String),

    #[error("Index space too large: maximum index {max_value} exceeds capacity {capacity}")]
    CapacityExceeded { max_value: u32, capacity: u32 },

    #[error("{record}.{member} is not supported on this target")]
    Unsupported { record: String, member: String },

    #[error("{record} has no member named {member}")]
    UnknownMember { record: String, member: String },

    #[error("Value {value} out of range (max {max})")]
    ValueOutOfRange { value: u32, max: u32 },

    #[error("Masked reader requested with an empty mask")]
    EmptyMask,

    #[error("Bit {bit} shifted by {shift} leaves the word")]
    ShiftOutOfRange { bit: u32, shift: i32 },

    #[error("Register region exhausted after {0} registers")]
    RegistersExhausted(u32),

    #[error("Forward reference {0:?} was never bound")]
    UnboundForward(ForwardId),

    #[error("Forward reference {0:?} is already bound")]
    ForwardAlreadyBound(ForwardId),

    #[error("Network {0} invoked while it is being generated")]
    Reentrant(String),

    #[error("Spec error: {0}")]
    Spec(#[from] SpecError),
}

impl CodegenError {
    pub fn category(&self) -> ErrorCategory {
        use CodegenError::*;
        match self {
            Malaligned { .. }
            | OffsetOutOfRange { .. }
            | StrideTooSmall { .. }
            | InvalidStride(_)
            | ValueOutOfRange { .. }
            | EmptyMask
            | ShiftOutOfRange { .. } => ErrorCategory::Range,
            Unimplemented(_) | Unsupported { .. } | UnknownMember { .. } => {
                ErrorCategory::Unsupported
            }
            CapacityExceeded { .. } | RegistersExhausted(_) => ErrorCategory::Capacity,
            UnboundForward(_) | ForwardAlreadyBound(_) | Reentrant(_) | Spec(_) => {
                ErrorCategory::Internal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CodegenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodegenError::Unsupported {
            record: "Unit".to_string(),
            member: "shield".to_string(),
        };
        assert_eq!(err.to_string(), "Unit.shield is not supported on this target");

        let err = CodegenError::CapacityExceeded {
            max_value: 2047,
            capacity: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Index space too large: maximum index 2047 exceeds capacity 1024"
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            CodegenError::Malaligned { offset: 3, size: 2 }.category(),
            ErrorCategory::Range
        );
        assert_eq!(
            CodegenError::Unimplemented("x".into()).category(),
            ErrorCategory::Unsupported
        );
        assert_eq!(CodegenError::RegistersExhausted(4).category(), ErrorCategory::Capacity);
        assert_eq!(CodegenError::Reentrant("r".into()).category(), ErrorCategory::Internal);
    }
}
