//! Reference interpreter

use crate::error::{Result, RuntimeError};
use crate::execute::execute;
use crate::memory::Memory;
use crate::state::{HaltReason, SubroutineTracker, VMState};
use trig_spec::{CellId, Program, WordIndex};

/// VM configuration
#[derive(Debug, Clone)]
pub struct VMConfig {
    /// Maximum number of cells to run before halting
    pub max_steps: u64,

    /// Log every executed cell at trace level
    pub trace: bool,

    /// Halt when a shared network is entered while active
    pub check_reentrancy: bool,
}

impl Default for VMConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            trace: false,
            check_reentrancy: true,
        }
    }
}

/// Execution result
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Number of cells run
    pub steps: u64,

    /// Reason for halting
    pub halt_reason: HaltReason,

    /// Final memory contents
    pub memory: Memory,
}

impl ExecutionResult {
    pub fn read(&self, word: WordIndex) -> u32 {
        self.memory.read(word)
    }
}

/// Trigger program interpreter
pub struct VM {
    program: Program,
    state: VMState,
    memory: Memory,
    subroutines: SubroutineTracker,
    config: VMConfig,
}

impl VM {
    /// Create a VM for a validated program
    pub fn new(program: Program, config: VMConfig) -> Result<Self> {
        program.validate()?;
        let memory = Memory::from_program(&program);
        let subroutines = SubroutineTracker::new(&program);
        let state = VMState::new(program.entry);
        Ok(Self {
            program,
            state,
            memory,
            subroutines,
            config,
        })
    }

    /// Store a word before running
    pub fn poke(&mut self, word: WordIndex, value: u32) {
        self.memory.write(word, value);
    }

    pub fn peek(&self, word: WordIndex) -> u32 {
        self.memory.read(word)
    }

    /// Run until halt
    pub fn run(mut self) -> Result<ExecutionResult> {
        if let Some(entry) = self.state.current {
            if let Some(reason) = self.check_entry(None, entry) {
                self.state.halt(reason);
            }
        }

        while let Some(cell_id) = self.state.current {
            if self.state.steps >= self.config.max_steps {
                self.state.halt(HaltReason::StepLimit);
                break;
            }

            let cell = self
                .program
                .cell(cell_id)
                .ok_or_else(|| RuntimeError::Other(format!("Missing cell {}", cell_id)))?;
            let fired = execute(cell, &mut self.memory, &self.program.layout);

            if self.config.trace {
                tracing::trace!(step = self.state.steps, cell = %cell_id, fired, "step");
            }

            self.subroutines.leave(cell_id);
            let next = self.next_cell(cell_id)?;
            self.state.advance(next);

            if let Some(next) = next {
                if let Some(reason) = self.check_entry(Some(cell_id), next) {
                    self.state.halt(reason);
                }
            }
        }

        let halt_reason = self.state.halt_reason.clone().unwrap_or(HaltReason::Halted);
        tracing::debug!(steps = self.state.steps, ?halt_reason, "program halted");

        Ok(ExecutionResult {
            steps: self.state.steps,
            halt_reason,
            memory: self.memory,
        })
    }

    fn check_entry(&mut self, from: Option<CellId>, cell: CellId) -> Option<HaltReason> {
        let name = self.subroutines.enter(from, cell)?;
        if !self.config.check_reentrancy {
            return None;
        }
        tracing::debug!(subroutine = name, %cell, "shared network reentered");
        Some(HaltReason::Reentered {
            subroutine: name.to_string(),
            cell,
        })
    }

    /// Successor read from the cell's link word after its actions ran
    fn next_cell(&self, cell: CellId) -> Result<Option<CellId>> {
        let value = self.memory.read(self.program.layout.link_word(cell));
        match CellId::from_link_value(value) {
            None => Ok(None),
            Some(next) if next.index() < self.program.cells.len() => Ok(Some(next)),
            Some(_) => Err(RuntimeError::InvalidLink { cell, value }),
        }
    }

    pub fn state(&self) -> &VMState {
        &self.state
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }
}
