//! Member descriptors.
//!
//! A member names a field of a record by byte offset, kind and layout. A
//! struct member sits at a fixed offset from the record's base word; an
//! array member is one element of a table, found at `offset + index * stride`.
//! Descriptors are checked when declared and never change afterwards.

use std::fmt;

use crate::error::{CodegenError, Result};
use crate::field::Width;

/// Logical type of a member
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Dword,
    Word,
    Byte,
    /// Bit 0 of a byte
    Bool,
    /// Bit 1 of a byte
    Bit1,
    /// Integer of `width` whose valid values are `0..=max`
    Enum { width: Width, max: u32 },
    /// Packed coordinates: x in the low half-word, y in the high one
    Position,
    PositionX,
    PositionY,
}

impl MemberKind {
    /// Width of the storage holding the member
    pub fn width(self) -> Width {
        match self {
            MemberKind::Dword | MemberKind::Position => Width::Dword,
            MemberKind::Word | MemberKind::PositionX | MemberKind::PositionY => Width::Word,
            MemberKind::Byte | MemberKind::Bool | MemberKind::Bit1 => Width::Byte,
            MemberKind::Enum { width, .. } => width,
        }
    }

    pub fn size(self) -> u32 {
        self.width().bytes()
    }

    /// Bit a flag kind lives in, within its byte
    pub fn flag_bit(self) -> Option<u32> {
        match self {
            MemberKind::Bool => Some(0),
            MemberKind::Bit1 => Some(1),
            _ => None,
        }
    }

    /// Largest constant a write may store
    pub fn max_value(self) -> u32 {
        match self {
            MemberKind::Enum { width, max } => max.min(width.mask()),
            MemberKind::Bool | MemberKind::Bit1 => u32::MAX,
            kind => kind.width().mask(),
        }
    }

    /// Constant as it is stored: flags collapse to 0 or 1, everything else
    /// must fit
    pub fn cast(self, value: u32) -> Result<u32> {
        if self.flag_bit().is_some() {
            return Ok((value != 0) as u32);
        }
        let max = self.max_value();
        if value > max {
            return Err(CodegenError::ValueOutOfRange { value, max });
        }
        Ok(value)
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Dword => write!(f, "dword"),
            MemberKind::Word => write!(f, "word"),
            MemberKind::Byte => write!(f, "byte"),
            MemberKind::Bool => write!(f, "bool"),
            MemberKind::Bit1 => write!(f, "bit1"),
            MemberKind::Enum { width, max } => write!(f, "enum<{}, {}>", width, max),
            MemberKind::Position => write!(f, "position"),
            MemberKind::PositionX => write!(f, "position.x"),
            MemberKind::PositionY => write!(f, "position.y"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemberLayout {
    Struct,
    Array { stride: u32 },
    /// Not available on this target; accessing it is an error
    Unsupported,
    NotImplemented,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub offset: u32,
    pub kind: MemberKind,
    pub layout: MemberLayout,
}

impl Member {
    /// Struct member at byte `offset` from the record's base
    pub fn field(offset: u32, kind: MemberKind) -> Result<Self> {
        check_alignment(offset, kind)?;
        Ok(Self {
            offset,
            kind,
            layout: MemberLayout::Struct,
        })
    }

    /// Array member with elements packed back to back
    pub fn array(offset: u32, kind: MemberKind) -> Result<Self> {
        Self::array_with_stride(offset, kind, kind.size())
    }

    pub fn array_with_stride(offset: u32, kind: MemberKind, stride: u32) -> Result<Self> {
        if stride == 0 {
            return Err(CodegenError::InvalidStride(stride));
        }
        let size = kind.size();
        if stride < size {
            return Err(CodegenError::StrideTooSmall { stride, size });
        }
        // every element must start aligned when the kind needs it
        if kind == MemberKind::Position && stride % 4 != 0 {
            return Err(CodegenError::Malaligned {
                offset: offset + stride,
                size,
            });
        }
        if stride % 4 == 0 {
            check_alignment(offset, kind)?;
        }
        Ok(Self {
            offset,
            kind,
            layout: MemberLayout::Array { stride },
        })
    }

    pub fn unsupported(kind: MemberKind) -> Self {
        Self {
            offset: 0,
            kind,
            layout: MemberLayout::Unsupported,
        }
    }

    pub fn not_implemented(kind: MemberKind) -> Self {
        Self {
            offset: 0,
            kind,
            layout: MemberLayout::NotImplemented,
        }
    }
}

fn check_alignment(offset: u32, kind: MemberKind) -> Result<()> {
    let size = kind.size();
    let misaligned = match kind {
        MemberKind::Position => offset % 4 != 0,
        _ => offset % 4 + size > 4,
    };
    if misaligned {
        return Err(CodegenError::Malaligned { offset, size });
    }
    Ok(())
}
