//! Control transfer on the successor-pointer substrate.
//!
//! A cell always continues at whatever its link word holds after its actions
//! ran, so branching means patching link words. A conditional branch is a
//! pair of cells: the first resets the second's link to the fallthrough,
//! the second redirects its own link when its guards hold.

use trig_spec::{Action, Comparison, Condition, Operand};

use crate::emitter::{CellRef, Emitter, Next, PendingCondition};
use crate::error::Result;
use crate::value::{Register, Value};

impl Emitter {
    /// Continue at `target` when every condition holds
    pub fn jump_if(&mut self, conditions: Vec<PendingCondition>, target: CellRef) -> Result<()> {
        let branch = self.forward();
        let fall = self.forward();
        self.emit(
            vec![],
            vec![Action::set_link(branch.into(), fall.into())],
        );
        let cell = self.emit_with_next(
            conditions,
            vec![Action::set_link(branch.into(), target)],
            Next::To(fall.into()),
        );
        self.bind(branch, cell)?;
        self.bind_next(fall);
        Ok(())
    }

    /// Dispatch on the runtime value of `selector`.
    ///
    /// `body` is generated once per case; control then continues after the
    /// switch. A selector matching no case skips every body.
    pub fn switch<F>(&mut self, selector: Register, cases: &[u32], mut body: F) -> Result<()>
    where
        F: FnMut(&mut Self, u32) -> Result<()>,
    {
        let end = self.forward();
        let dispatch = self.forward();
        let labels: Vec<_> = cases.iter().map(|_| self.forward()).collect();

        self.emit(vec![], vec![Action::set_link(dispatch.into(), end.into())]);
        for (&case, &label) in cases.iter().zip(&labels) {
            self.emit(
                vec![Condition::new(selector.target(), Comparison::Exactly, case)],
                vec![Action::set_link(dispatch.into(), label.into())],
            );
        }
        let cell = self.emit_with_next(vec![], vec![], Next::To(end.into()));
        self.bind(dispatch, cell)?;

        for (&case, &label) in cases.iter().zip(&labels) {
            self.bind_next(label);
            body(self, case)?;
            self.jump(end.into());
        }
        self.bind_next(end);
        Ok(())
    }

    /// Generate `body` for a sub-word offset: directly for a constant,
    /// through a [`switch`](Self::switch) over `cases` for a register.
    pub fn for_each_sub<F>(&mut self, sub: Value, cases: &[u32], mut body: F) -> Result<()>
    where
        F: FnMut(&mut Self, u32) -> Result<()>,
    {
        match sub {
            Value::Const(s) => body(self, s),
            Value::Reg(reg) => self.switch(reg, cases, body),
        }
    }

    /// `a + b`, folded when both are constants
    pub fn add(&mut self, a: Value, b: Value) -> Result<Value> {
        match (a, b) {
            (Value::Const(x), Value::Const(y)) => Ok(Value::Const(x.wrapping_add(y))),
            (a, Value::Const(0)) | (Value::Const(0), a) => Ok(a),
            (a, b) => {
                let reg = self.alloc_register()?;
                self.emit(
                    vec![],
                    vec![
                        Action::set(reg.target(), a.operand()),
                        Action::add(reg.target(), b.operand()),
                    ],
                );
                Ok(Value::Reg(reg))
            }
        }
    }

    /// Fresh register holding `value`
    pub fn copy(&mut self, value: Value) -> Result<Register> {
        let reg = self.alloc_register()?;
        self.assign(reg, value);
        Ok(reg)
    }

    pub fn assign(&mut self, dest: Register, value: Value) {
        self.emit(vec![], vec![Action::set(dest.target(), value.operand())]);
    }

    /// Fresh register, 1 when every condition holds and 0 otherwise
    pub fn test(&mut self, conditions: Vec<PendingCondition>) -> Result<Register> {
        let reg = self.alloc_register()?;
        self.emit(vec![], vec![Action::set(reg.target(), Operand::Const(0))]);
        self.emit(conditions, vec![Action::set(reg.target(), Operand::Const(1))]);
        Ok(reg)
    }
}
