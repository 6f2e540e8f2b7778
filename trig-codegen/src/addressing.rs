//! Byte pointers and word addresses.
//!
//! A byte pointer is `word_index * 4 + sub_offset`. For a constant the split
//! is plain arithmetic. For a register the split needs a divide-by-4 reader,
//! so each pointer register gets a small routine, built on first use, that
//! remembers the last pointer it split and only runs the divider when the
//! pointer changed since.

use trig_spec::{Action, CellId, Comparison, Condition, Modifier, FULL_MASK};

use crate::emitter::{Emitter, Next};
use crate::error::Result;
use crate::field::Width;
use crate::value::{Register, Value};

#[derive(Clone, Debug)]
pub(crate) struct PointerCache {
    entry: CellId,
    exit: CellId,
    index: Register,
    offset: Register,
}

fn pointer_network_name(ptr: Register) -> String {
    format!("ptr@{:#x}", ptr.word())
}

impl Emitter {
    /// Split a byte pointer into `(word index, sub-word offset)`
    pub fn to_index_offset(&mut self, ptr: Value) -> Result<(Value, Value)> {
        let ptr = match ptr {
            Value::Const(p) => return Ok((Value::Const(p / 4), Value::Const(p % 4))),
            Value::Reg(r) => r,
        };
        let cache = self.pointer_cache(ptr)?;
        self.call(
            &pointer_network_name(ptr),
            cache.entry.into(),
            cache.exit.into(),
            vec![],
        )?;

        let index = self.alloc_register()?;
        let offset = self.alloc_register()?;
        self.emit(
            vec![],
            vec![
                Action::set(index.target(), cache.index.operand()),
                Action::set(offset.target(), cache.offset.operand()),
            ],
        );
        Ok((Value::Reg(index), Value::Reg(offset)))
    }

    fn pointer_cache(&mut self, ptr: Register) -> Result<PointerCache> {
        if let Some(cache) = self.pointers.get(&ptr) {
            tracing::trace!(%ptr, "pointer cache reused");
            return Ok(cache.clone());
        }

        let quotient = |b: u32| b >> 2;
        let remainder = |b: u32| b & 3;
        let divider =
            self.build_masked_reader(FULL_MASK, &[(0, &quotient), (0, &remainder)], true)?;

        let last = self.alloc_register()?;
        let diff = self.alloc_register()?;
        let index = self.alloc_register()?;
        let offset = self.alloc_register()?;

        // all four start at zero, which is already the split of pointer 0
        let name = pointer_network_name(ptr);
        let (entry, exit) = self.network(&name, |em| {
            let exit = em.forward();
            let entry = em.emit(
                vec![],
                vec![
                    Action::set(diff.target(), ptr.operand()),
                    Action::subtract(diff.target(), last.operand()),
                    Action::set(last.target(), ptr.operand()),
                ],
            );
            em.jump_if(
                vec![Condition::new(diff.target(), Comparison::Exactly, 0)],
                exit.into(),
            )?;
            em.invoke_reader_into(&divider, Value::Const(ptr.word()), &[index, offset])?;
            let exit_cell = em.emit_with_next(vec![], vec![], Next::Halt);
            em.bind(exit, exit_cell)?;
            Ok((entry, exit_cell))
        })?;
        self.set_network_exit(&name, exit.into());
        tracing::debug!(%ptr, "built pointer cache");

        let cache = PointerCache {
            entry,
            exit,
            index,
            offset,
        };
        self.pointers.insert(ptr, cache.clone());
        Ok(cache)
    }

    /// Read a field at a byte pointer
    pub fn read_ptr(&mut self, width: Width, ptr: Value) -> Result<Register> {
        let (index, offset) = self.to_index_offset(ptr)?;
        self.read_field(width, index, offset)
    }

    /// Write a field at a byte pointer
    pub fn write_ptr(&mut self, width: Width, ptr: Value, value: Value) -> Result<()> {
        self.modify_ptr(width, ptr, Modifier::SetTo, value)
    }

    pub fn modify_ptr(
        &mut self,
        width: Width,
        ptr: Value,
        modifier: Modifier,
        value: Value,
    ) -> Result<()> {
        let (index, offset) = self.to_index_offset(ptr)?;
        self.modify_field(width, index, offset, modifier, value)
    }

    /// Store `ptr` split into `index` and `offset`, for callers that own the
    /// destination registers
    pub fn split_pointer_into(
        &mut self,
        ptr: Value,
        index: Register,
        offset: Register,
    ) -> Result<()> {
        let (i, o) = self.to_index_offset(ptr)?;
        self.emit(
            vec![],
            vec![
                Action::set(index.target(), i.operand()),
                Action::set(offset.target(), o.operand()),
            ],
        );
        Ok(())
    }
}
