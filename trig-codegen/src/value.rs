//! Registers and generation-time values

use std::fmt;
use trig_spec::{Operand, Target, WordIndex};

/// Dynamically allocated 32-bit holder.
///
/// A register is identified by the word it occupies. Caches keyed on a
/// register key on that identity, never on the value it holds at runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(WordIndex);

impl Register {
    pub(crate) fn new(word: WordIndex) -> Self {
        Register(word)
    }

    #[inline]
    pub fn word(self) -> WordIndex {
        self.0
    }

    #[inline]
    pub fn target<C>(self) -> Target<C> {
        Target::Word(self.0)
    }

    #[inline]
    pub fn operand<C>(self) -> Operand<C> {
        Operand::Word(self.0)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg@{:#x}", self.0)
    }
}

/// Either a generation-time constant or a register read at runtime
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Const(u32),
    Reg(Register),
}

impl Value {
    #[inline]
    pub fn operand<C>(self) -> Operand<C> {
        match self {
            Value::Const(v) => Operand::Const(v),
            Value::Reg(r) => r.operand(),
        }
    }

    #[inline]
    pub fn as_const(self) -> Option<u32> {
        match self {
            Value::Const(v) => Some(v),
            Value::Reg(_) => None,
        }
    }

    /// Target addressing the word whose index this value holds
    #[inline]
    pub fn word_target<C>(self) -> Target<C> {
        match self {
            Value::Const(w) => Target::Word(w),
            Value::Reg(r) => Target::Indirect(r.word()),
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Const(v)
    }
}

impl From<Register> for Value {
    fn from(r: Register) -> Self {
        Value::Reg(r)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(v) => write!(f, "{}", v),
            Value::Reg(r) => write!(f, "{}", r),
        }
    }
}
