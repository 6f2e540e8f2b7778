//! Mask-driven reader networks.
//!
//! A reader decodes any number of outputs from one source word in a single
//! scan over the set bits of a mask. Each output starts from an initial value
//! and receives a precomputed contribution for every mask bit set in the
//! source. Readers are memoized on the mask and the materialized
//! contributions, so two requests that decode the same thing share one
//! network.

use std::collections::HashMap;
use trig_spec::{Action, CellId, Comparison, Condition, Operand, Target};

use crate::emitter::{Emitter, Next, PendingAction};
use crate::error::{CodegenError, Result};
use crate::field::{is_consecutive, lsb_index};
use crate::value::{Register, Value};

/// Contribution of a mask bit, given the bit's value (`1 << bit`)
pub type BitTransform<'a> = &'a dyn Fn(u32) -> u32;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ReaderKey {
    mask: u32,
    /// `(init, contribution per set bit in ascending order)` per output
    outputs: Vec<(u32, Vec<u32>)>,
    check_empty: bool,
}

/// Call handle of a reader network
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderHandle {
    index: usize,
    entry: CellId,
    exit: CellId,
    outputs: Vec<Register>,
}

impl ReaderHandle {
    pub fn network_name(&self) -> String {
        format!("reader#{}", self.index)
    }

    /// Registers the network leaves its results in
    pub fn outputs(&self) -> &[Register] {
        &self.outputs
    }
}

#[derive(Debug, Default)]
pub(crate) struct ReaderCache {
    readers: HashMap<ReaderKey, ReaderHandle>,
}

fn set_bits(mask: u32) -> impl Iterator<Item = u32> {
    (0..32).filter(move |b| mask & (1 << b) != 0)
}

impl Emitter {
    /// Number of distinct reader networks built so far
    pub fn reader_count(&self) -> usize {
        self.readers.readers.len()
    }

    /// Build, or fetch, the reader for `mask` and `outputs`.
    ///
    /// With `check_empty`, a source word with no mask bit set skips the scan
    /// and leaves every output at its initial value.
    pub fn build_masked_reader(
        &mut self,
        mask: u32,
        outputs: &[(u32, BitTransform<'_>)],
        check_empty: bool,
    ) -> Result<ReaderHandle> {
        if mask == 0 {
            return Err(CodegenError::EmptyMask);
        }
        let key = ReaderKey {
            mask,
            outputs: outputs
                .iter()
                .map(|&(init, f)| (init, set_bits(mask).map(|b| f(1 << b)).collect()))
                .collect(),
            check_empty,
        };
        if let Some(handle) = self.readers.readers.get(&key) {
            tracing::trace!(mask, reader = handle.index, "reader reused");
            return Ok(handle.clone());
        }

        let index = self.readers.readers.len();
        let registers = outputs
            .iter()
            .map(|_| self.alloc_register())
            .collect::<Result<Vec<_>>>()?;
        let name = format!("reader#{}", index);
        let src = Target::Indirect(self.shared.cursor.word());

        let (entry, exit) = self.network(&name, |em| {
            let init_actions: Vec<PendingAction> = registers
                .iter()
                .zip(&key.outputs)
                .map(|(r, &(init, _))| Action::set(r.target(), Operand::Const(init)))
                .collect();

            let exit_fwd = em.forward();
            let check = if check_empty {
                let check_fwd = em.forward();
                let mut actions = init_actions.clone();
                actions.push(Action::set_link(check_fwd.into(), exit_fwd.into()));
                let cell = em.emit(
                    vec![Condition::masked(src, Comparison::Exactly, 0, mask)],
                    actions,
                );
                em.bind(check_fwd, cell)?;
                Some(cell)
            } else {
                None
            };

            let init = em.emit(vec![], init_actions);
            for (i, bit) in set_bits(mask).enumerate() {
                let adds: Vec<PendingAction> = registers
                    .iter()
                    .zip(&key.outputs)
                    .filter(|(_, (_, contributions))| contributions[i] != 0)
                    .map(|(r, (_, contributions))| {
                        Action::add(r.target(), Operand::Const(contributions[i]))
                    })
                    .collect();
                // a bit contributing nothing to any output needs no cell
                if adds.is_empty() {
                    continue;
                }
                em.emit(vec![Condition::bit_set(src, bit)], adds);
            }

            let restore = check
                .map(|c| vec![Action::set_link(c.into(), init.into())])
                .unwrap_or_default();
            let exit = em.emit_with_next(vec![], restore, Next::Halt);
            em.bind(exit_fwd, exit)?;
            Ok((check.unwrap_or(init), exit))
        })?;
        self.set_network_exit(&name, exit.into());

        tracing::debug!(
            mask,
            outputs = registers.len(),
            check_empty,
            reader = index,
            "built masked reader"
        );
        let handle = ReaderHandle {
            index,
            entry,
            exit,
            outputs: registers,
        };
        self.readers.readers.insert(key, handle.clone());
        Ok(handle)
    }

    /// Run a reader on the word at `addr`, copying its outputs into fresh registers
    pub fn invoke_reader(&mut self, handle: &ReaderHandle, addr: Value) -> Result<Vec<Register>> {
        let dests = handle
            .outputs
            .iter()
            .map(|_| self.alloc_register())
            .collect::<Result<Vec<_>>>()?;
        self.invoke_reader_into(handle, addr, &dests)?;
        Ok(dests)
    }

    pub fn invoke_reader_into(
        &mut self,
        handle: &ReaderHandle,
        addr: Value,
        dests: &[Register],
    ) -> Result<()> {
        let setup = vec![Action::set(self.shared.cursor.target(), addr.operand())];
        self.call(&handle.network_name(), handle.entry.into(), handle.exit.into(), setup)?;
        let copies = dests
            .iter()
            .zip(&handle.outputs)
            .map(|(d, o)| Action::set(d.target(), o.operand()))
            .collect();
        self.emit(vec![], copies);
        Ok(())
    }

    /// `word & mask`, bits kept in place
    pub fn mask_read(&mut self, addr: Value, mask: u32) -> Result<Register> {
        if mask == 0 {
            return Err(CodegenError::EmptyMask);
        }
        if is_consecutive(mask) {
            let dest = self.alloc_register()?;
            self.read_consecutive(addr, 0, mask, 0, dest, true)?;
            return Ok(dest);
        }
        let handle = self.build_masked_reader(mask, &[(0, &|b: u32| b)], false)?;
        self.single_output(&handle, addr)
    }

    /// The bits of `mask` packed into the low bits of a fresh register
    pub fn extract(&mut self, addr: Value, mask: u32) -> Result<Register> {
        if mask == 0 {
            return Err(CodegenError::EmptyMask);
        }
        if is_consecutive(mask) {
            let dest = self.alloc_register()?;
            let shift = -(lsb_index(mask) as i32);
            self.read_consecutive(addr, 0, mask, shift, dest, true)?;
            return Ok(dest);
        }
        let pack = move |b: u32| 1u32 << (mask & (b - 1)).count_ones();
        let handle = self.build_masked_reader(mask, &[(0, &pack)], false)?;
        self.single_output(&handle, addr)
    }

    fn single_output(&mut self, handle: &ReaderHandle, addr: Value) -> Result<Register> {
        let regs = self.invoke_reader(handle, addr)?;
        regs.first().copied().ok_or(CodegenError::EmptyMask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trig_runtime::{ExecutionResult, HaltReason, VMConfig, VM};

    const DATA: u32 = 0x200;

    fn run(em: Emitter, inputs: &[(u32, u32)]) -> ExecutionResult {
        let program = em.finish().unwrap();
        let mut vm = VM::new(program, VMConfig::default()).unwrap();
        for &(w, v) in inputs {
            vm.poke(w, v);
        }
        let result = vm.run().unwrap();
        assert_eq!(result.halt_reason, HaltReason::Halted);
        result
    }

    #[test]
    fn test_identical_requests_share_a_reader() {
        let mut em = Emitter::default();
        let high = |b: u32| b >> 16;
        let first = em.build_masked_reader(0xFFFF_0000, &[(0, &high)], false).unwrap();
        let networks = em.network_count();
        let cells = em.cell_count();

        let second = em.build_masked_reader(0xFFFF_0000, &[(0, &high)], false).unwrap();
        assert_eq!(first, second);
        assert_eq!(em.reader_count(), 1);
        assert_eq!(em.network_count(), networks);
        assert_eq!(em.cell_count(), cells);

        let a = em.invoke_reader(&first, Value::Const(DATA)).unwrap();
        let b = em.invoke_reader(&second, Value::Const(DATA)).unwrap();
        let result = run(em, &[(DATA, 0xABCD_1234)]);
        assert_eq!(result.read(a[0].word()), 0xABCD);
        assert_eq!(result.read(b[0].word()), 0xABCD);
    }

    #[test]
    fn test_different_transforms_build_new_reader() {
        let mut em = Emitter::default();
        let a = em.build_masked_reader(0xFF, &[(0, &|b: u32| b)], false).unwrap();
        let b = em.build_masked_reader(0xFF, &[(1, &|b: u32| b)], false).unwrap();
        let c = em.build_masked_reader(0xFF, &[(0, &|b: u32| b)], true).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(em.reader_count(), 3);
    }

    #[test]
    fn test_two_outputs_in_one_pass() {
        let mut em = Emitter::default();
        let low = |b: u32| b & 0xFFFF;
        let high = |b: u32| b >> 16;
        let handle = em
            .build_masked_reader(0xFFFF_FFFF, &[(0, &low), (0, &high)], false)
            .unwrap();
        let regs = em.invoke_reader(&handle, Value::Const(DATA)).unwrap();
        let result = run(em, &[(DATA, 0x0064_00C8)]);
        assert_eq!(result.read(regs[0].word()), 200);
        assert_eq!(result.read(regs[1].word()), 100);
    }

    #[test]
    fn test_empty_fast_path_assigns_initial_values() {
        let build = || {
            let mut em = Emitter::default();
            let count = |b: u32| if b != 0 { 1 } else { 0 };
            let handle = em.build_masked_reader(0xF0, &[(7, &count)], true).unwrap();
            let regs = em.invoke_reader(&handle, Value::Const(DATA)).unwrap();
            (em, regs[0])
        };

        let (em, reg) = build();
        let result = run(em, &[(DATA, 0x0F)]);
        assert_eq!(result.read(reg.word()), 7);

        let (em, reg) = build();
        let result = run(em, &[(DATA, 0x5F)]);
        assert_eq!(result.read(reg.word()), 9);
    }

    #[test]
    fn test_fast_path_restores_for_next_call() {
        let mut em = Emitter::default();
        let handle = em.build_masked_reader(0xFF, &[(0, &|b: u32| b)], true).unwrap();
        let first = em.invoke_reader(&handle, Value::Const(DATA)).unwrap();
        let second = em.invoke_reader(&handle, Value::Const(DATA + 1)).unwrap();
        let result = run(em, &[(DATA + 1, 0x42)]);
        assert_eq!(result.read(first[0].word()), 0);
        assert_eq!(result.read(second[0].word()), 0x42);
    }

    #[test]
    fn test_zero_contributions_emit_no_cell() {
        let mut em = Emitter::default();
        let before = em.cell_count();
        // only bit 4 contributes
        em.build_masked_reader(0xFF, &[(0, &|b: u32| b & 0x10)], false).unwrap();
        // init, one bit cell, exit
        assert_eq!(em.cell_count() - before, 3);
    }

    #[test]
    fn test_mask_read_and_extract() {
        let mut em = Emitter::default();
        let in_place = em.mask_read(Value::Const(DATA), 0x0F0F_0000).unwrap();
        let packed = em.extract(Value::Const(DATA), 0x0F0F_0000).unwrap();
        let aligned = em.extract(Value::Const(DATA), 0x0000_FF00).unwrap();
        let result = run(em, &[(DATA, 0x1A2B_3C4D)]);
        assert_eq!(result.read(in_place.word()), 0x0A0B_0000);
        assert_eq!(result.read(packed.word()), 0xAB);
        assert_eq!(result.read(aligned.word()), 0x3C);
    }

    #[test]
    fn test_empty_mask_rejected() {
        let mut em = Emitter::default();
        assert!(matches!(
            em.build_masked_reader(0, &[(0, &|b: u32| b)], false),
            Err(CodegenError::EmptyMask)
        ));
        assert!(matches!(em.extract(Value::Const(DATA), 0), Err(CodegenError::EmptyMask)));
    }
}
