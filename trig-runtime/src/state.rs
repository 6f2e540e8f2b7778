//! Interpreter state

use std::collections::{HashMap, HashSet};
use trig_spec::{CellId, Program};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// A cell's link word held the halt value
    Halted,
    /// Out of steps
    StepLimit,
    /// A shared network was entered while it was already active
    Reentered { subroutine: String, cell: CellId },
}

/// Activity tracking for the program's shared networks
#[derive(Debug, Clone, Default)]
pub struct SubroutineTracker {
    names: Vec<String>,
    bodies: Vec<HashSet<CellId>>,
    entries: HashMap<CellId, Vec<usize>>,
    exits: HashMap<CellId, Vec<usize>>,
    active: Vec<bool>,
}

impl SubroutineTracker {
    pub fn new(program: &Program) -> Self {
        let mut tracker = Self::default();
        for (i, sub) in program.subroutines.iter().enumerate() {
            tracker.names.push(sub.name.clone());
            let mut body: HashSet<CellId> = sub.body.iter().copied().collect();
            body.extend(sub.entries.iter().copied());
            body.insert(sub.exit);
            tracker.bodies.push(body);
            for &entry in &sub.entries {
                tracker.entries.entry(entry).or_default().push(i);
            }
            tracker.exits.entry(sub.exit).or_default().push(i);
            tracker.active.push(false);
        }
        tracker
    }

    /// Record control arriving at `cell` from `from`.
    ///
    /// Returns the name of a subroutine that was entered while active.
    pub fn enter(&mut self, from: Option<CellId>, cell: CellId) -> Option<&str> {
        let subs = self.entries.get(&cell)?;
        for &s in subs {
            let inside = from.map_or(false, |f| self.bodies[s].contains(&f));
            if inside {
                continue;
            }
            if self.active[s] {
                return Some(&self.names[s]);
            }
            self.active[s] = true;
        }
        None
    }

    /// Record `cell` having run
    pub fn leave(&mut self, cell: CellId) {
        if let Some(subs) = self.exits.get(&cell) {
            for &s in subs {
                self.active[s] = false;
            }
        }
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.names
            .iter()
            .zip(&self.active)
            .any(|(n, &active)| active && n == name)
    }
}

/// Interpreter state
#[derive(Debug, Clone)]
pub struct VMState {
    /// Cell about to run
    pub current: Option<CellId>,

    /// Cell that ran last
    pub previous: Option<CellId>,

    /// Number of cells run
    pub steps: u64,

    pub halt_reason: Option<HaltReason>,
}

impl VMState {
    pub fn new(entry: Option<CellId>) -> Self {
        let mut state = Self {
            current: entry,
            previous: None,
            steps: 0,
            halt_reason: None,
        };
        if entry.is_none() {
            state.halt(HaltReason::Halted);
        }
        state
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halt_reason.is_some()
    }

    pub fn halt(&mut self, reason: HaltReason) {
        self.current = None;
        self.halt_reason = Some(reason);
    }

    /// Move to the next cell, or halt when there is none
    pub fn advance(&mut self, next: Option<CellId>) {
        self.previous = self.current;
        self.steps += 1;
        match next {
            Some(cell) => self.current = Some(cell),
            None => self.halt(HaltReason::Halted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trig_spec::Subroutine;

    fn program_with_subroutine() -> Program {
        let mut program = Program::new();
        program.cells.resize(4, Default::default());
        program.subroutines.push(Subroutine {
            name: "reader".to_string(),
            entries: vec![CellId(1)],
            body: vec![CellId(1), CellId(2)],
            exit: CellId(2),
        });
        program
    }

    #[test]
    fn test_enter_and_leave() {
        let program = program_with_subroutine();
        let mut tracker = SubroutineTracker::new(&program);

        assert_eq!(tracker.enter(Some(CellId(0)), CellId(1)), None);
        assert!(tracker.is_active("reader"));
        tracker.leave(CellId(2));
        assert!(!tracker.is_active("reader"));
        assert_eq!(tracker.enter(Some(CellId(3)), CellId(1)), None);
    }

    #[test]
    fn test_reentry_detected() {
        let program = program_with_subroutine();
        let mut tracker = SubroutineTracker::new(&program);

        assert_eq!(tracker.enter(None, CellId(1)), None);
        assert_eq!(tracker.enter(Some(CellId(3)), CellId(1)), Some("reader"));
    }

    #[test]
    fn test_internal_jump_is_not_reentry() {
        let program = program_with_subroutine();
        let mut tracker = SubroutineTracker::new(&program);

        tracker.enter(Some(CellId(0)), CellId(1));
        assert_eq!(tracker.enter(Some(CellId(2)), CellId(1)), None);
    }

    #[test]
    fn test_empty_program_starts_halted() {
        let state = VMState::new(None);
        assert!(state.is_halted());
        assert_eq!(state.halt_reason, Some(HaltReason::Halted));
    }
}
