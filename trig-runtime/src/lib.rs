//! # Trigger Runtime
//!
//! Reference interpreter for guarded-cell programs.
//!
//! Each step runs one cell: if all of its guards hold, its actions run in
//! order; then the cell's link word is read to find the successor. Because
//! the link is read after the actions, a cell may redirect itself.
//!
//! ## Example
//!
//! ```rust,no_run
//! use trig_runtime::{VM, VMConfig};
//! use trig_spec::Program;
//!
//! let program = Program::new();
//! let vm = VM::new(program, VMConfig::default()).unwrap();
//! let result = vm.run().unwrap();
//! println!("Steps: {}", result.steps);
//! ```

pub mod error;
pub mod execute;
pub mod memory;
pub mod state;
pub mod vm;

pub use error::RuntimeError;
pub use memory::Memory;
pub use state::{HaltReason, SubroutineTracker, VMState};
pub use vm::{ExecutionResult, VMConfig, VM};

/// Simple execution helper
///
/// Loads `inputs` into memory, runs the program and returns the final state.
pub fn run(
    program: trig_spec::Program,
    inputs: &[(trig_spec::WordIndex, u32)],
) -> Result<ExecutionResult, RuntimeError> {
    let mut vm = VM::new(program, VMConfig::default())?;
    for &(word, value) in inputs {
        vm.poke(word, value);
    }
    vm.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trig_spec::{Action, Cell, CellId, Operand, Program, Target};

    #[test]
    fn test_vmconfig_default() {
        let config = VMConfig::default();
        assert_eq!(config.max_steps, 1_000_000);
        assert!(!config.trace);
        assert!(config.check_reentrancy);
    }

    #[test]
    fn test_run_helper() {
        let mut program = Program::new();
        program.cells.push(Cell {
            actions: vec![Action::add(Target::Word(2), Operand::Word(1))],
            ..Cell::default()
        });
        program.entry = Some(CellId(0));

        let result = run(program, &[(1, 5), (2, 3)]).unwrap();
        assert_eq!(result.read(2), 8);
        assert_eq!(result.halt_reason, HaltReason::Halted);
    }
}
