//! Cell execution

use crate::memory::Memory;
use trig_spec::{Action, Cell, Condition, Layout, Operand, Target, WordIndex};

/// Word a target currently designates
#[inline]
pub fn resolve_target(target: Target, memory: &Memory, layout: &Layout) -> WordIndex {
    match target {
        Target::Word(w) => w,
        Target::Indirect(w) => memory.read(w),
        Target::Link(cell) => layout.link_word(cell),
    }
}

#[inline]
pub fn resolve_operand(operand: Operand, memory: &Memory) -> u32 {
    match operand {
        Operand::Const(v) => v,
        Operand::Word(w) => memory.read(w),
        Operand::Link(cell) => cell.link_value(),
    }
}

pub fn holds(condition: &Condition, memory: &Memory, layout: &Layout) -> bool {
    let word = resolve_target(condition.target, memory, layout);
    let value = memory.read(word) & condition.mask;
    condition.comparison.holds(value, condition.value)
}

pub fn apply(action: &Action, memory: &mut Memory, layout: &Layout) {
    // operand is read before the target so a word may be modified by itself
    let operand = resolve_operand(action.operand, memory);
    let word = resolve_target(action.target, memory, layout);
    memory.modify(word, action.modifier, operand, action.mask);
}

/// Run one cell. Returns whether its guards held.
///
/// Guards are all evaluated against memory as it was on entry; actions then
/// run in order, each observing the effects of the ones before it.
pub fn execute(cell: &Cell, memory: &mut Memory, layout: &Layout) -> bool {
    if !cell.conditions.iter().all(|c| holds(c, memory, layout)) {
        return false;
    }
    for action in &cell.actions {
        apply(action, memory, layout);
    }
    true
}
