//! Guarded cells: guards, actions and successor links.
//!
//! Cell-valued fields are generic over `C` so that code generators can refer
//! to cells that do not exist yet (forward references) and resolve them into
//! concrete [`CellId`]s once the target cells are emitted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dword-granular memory address
pub type WordIndex = u32;

/// Mask selecting every bit of a word
pub const FULL_MASK: u32 = 0xFFFF_FFFF;

/// Link word value meaning "halt after this cell"
pub const LINK_HALT: u32 = 0;

/// Stable index of a cell inside a program arena
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub u32);

impl CellId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Value a link word holds when it points at this cell
    #[inline]
    pub fn link_value(self) -> u32 {
        self.0 + 1
    }

    /// Decode a link word value; `None` means halt
    #[inline]
    pub fn from_link_value(value: u32) -> Option<Self> {
        value.checked_sub(1).map(CellId)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Guard comparison
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    AtLeast,
    AtMost,
    Exactly,
}

impl Comparison {
    #[inline]
    pub fn holds(self, lhs: u32, rhs: u32) -> bool {
        match self {
            Comparison::AtLeast => lhs >= rhs,
            Comparison::AtMost => lhs <= rhs,
            Comparison::Exactly => lhs == rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::AtLeast => ">=",
            Comparison::AtMost => "<=",
            Comparison::Exactly => "==",
        }
    }
}

/// Action modifier
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    SetTo,
    Add,
    Subtract,
}

impl Modifier {
    /// Apply the modifier to `old`, touching only the bits selected by `mask`.
    ///
    /// Add and subtract wrap at 32 bits before masking, so a masked add behaves
    /// like an add on the sub-field modulo its width.
    #[inline]
    pub fn apply(self, old: u32, operand: u32, mask: u32) -> u32 {
        let updated = match self {
            Modifier::SetTo => operand,
            Modifier::Add => old.wrapping_add(operand),
            Modifier::Subtract => old.wrapping_sub(operand),
        };
        (old & !mask) | (updated & mask)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Modifier::SetTo => "=",
            Modifier::Add => "+=",
            Modifier::Subtract => "-=",
        }
    }
}

/// Word addressed by a guard or an action
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target<C = CellId> {
    /// Absolute word
    Word(WordIndex),
    /// The word whose index is currently stored in the given word
    Indirect(WordIndex),
    /// Successor link word of a cell
    Link(C),
}

impl<C> Target<C> {
    pub fn map_cells<D, E>(self, f: &mut impl FnMut(C) -> Result<D, E>) -> Result<Target<D>, E> {
        Ok(match self {
            Target::Word(w) => Target::Word(w),
            Target::Indirect(w) => Target::Indirect(w),
            Target::Link(c) => Target::Link(f(c)?),
        })
    }
}

/// Value operand of an action
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand<C = CellId> {
    Const(u32),
    /// Value held by the word when the action runs
    Word(WordIndex),
    /// Encoded pointer to a cell, suitable for storing into a link word
    Link(C),
}

impl<C> Operand<C> {
    pub fn map_cells<D, E>(self, f: &mut impl FnMut(C) -> Result<D, E>) -> Result<Operand<D>, E> {
        Ok(match self {
            Operand::Const(v) => Operand::Const(v),
            Operand::Word(w) => Operand::Word(w),
            Operand::Link(c) => Operand::Link(f(c)?),
        })
    }
}

/// Guard predicate: `(word & mask) <comparison> value`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition<C = CellId> {
    pub target: Target<C>,
    pub comparison: Comparison,
    pub value: u32,
    pub mask: u32,
}

impl<C> Condition<C> {
    pub fn new(target: Target<C>, comparison: Comparison, value: u32) -> Self {
        Self::masked(target, comparison, value, FULL_MASK)
    }

    pub fn masked(target: Target<C>, comparison: Comparison, value: u32, mask: u32) -> Self {
        Self {
            target,
            comparison,
            value,
            mask,
        }
    }

    /// True when the given bit of the target word is set
    pub fn bit_set(target: Target<C>, bit: u32) -> Self {
        Self::masked(target, Comparison::AtLeast, 1, 1 << bit)
    }

    pub fn map_cells<D, E>(self, f: &mut impl FnMut(C) -> Result<D, E>) -> Result<Condition<D>, E> {
        Ok(Condition {
            target: self.target.map_cells(f)?,
            comparison: self.comparison,
            value: self.value,
            mask: self.mask,
        })
    }
}

/// Masked write to a word
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action<C = CellId> {
    pub target: Target<C>,
    pub modifier: Modifier,
    pub operand: Operand<C>,
    pub mask: u32,
}

impl<C> Action<C> {
    pub fn new(target: Target<C>, modifier: Modifier, operand: Operand<C>) -> Self {
        Self::masked(target, modifier, operand, FULL_MASK)
    }

    pub fn masked(target: Target<C>, modifier: Modifier, operand: Operand<C>, mask: u32) -> Self {
        Self {
            target,
            modifier,
            operand,
            mask,
        }
    }

    pub fn set(target: Target<C>, operand: Operand<C>) -> Self {
        Self::new(target, Modifier::SetTo, operand)
    }

    pub fn add(target: Target<C>, operand: Operand<C>) -> Self {
        Self::new(target, Modifier::Add, operand)
    }

    pub fn subtract(target: Target<C>, operand: Operand<C>) -> Self {
        Self::new(target, Modifier::Subtract, operand)
    }

    /// Redirect `cell`'s successor pointer to `to`
    pub fn set_link(cell: C, to: C) -> Self {
        Self::set(Target::Link(cell), Operand::Link(to))
    }

    pub fn map_cells<D, E>(self, f: &mut impl FnMut(C) -> Result<D, E>) -> Result<Action<D>, E> {
        Ok(Action {
            target: self.target.map_cells(f)?,
            modifier: self.modifier,
            operand: self.operand.map_cells(f)?,
            mask: self.mask,
        })
    }
}

/// One guarded instruction cell
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    /// Initial successor; `None` halts
    pub next: Option<CellId>,
}

impl Cell {
    /// Every cell this one refers to, through its link or its guards/actions
    pub fn referenced_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        let from_conditions = self.conditions.iter().filter_map(|c| match c.target {
            Target::Link(id) => Some(id),
            _ => None,
        });
        let from_actions = self.actions.iter().flat_map(|a| {
            let target = match a.target {
                Target::Link(id) => Some(id),
                _ => None,
            };
            let operand = match a.operand {
                Operand::Link(id) => Some(id),
                _ => None,
            };
            target.into_iter().chain(operand)
        });
        self.next.into_iter().chain(from_conditions).chain(from_actions)
    }
}
