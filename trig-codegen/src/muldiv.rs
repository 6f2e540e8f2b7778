//! Stride division.
//!
//! Array elements whose stride is not 4 bytes need `index * stride` split
//! into a word index and a sub-word offset at runtime. A divider network
//! does this for every stride of a [`StrideSet`] in one scan over the bits
//! of the index, from the highest bit needed down to bit 0. Each bit cell
//! adds precomputed quotient and remainder contributions; a remainder that
//! reaches 4 is carried into its quotient after the scan.
//!
//! Each index register gets its own routine around the divider. The routine
//! skips the division when the register still holds the value it divided
//! last time. Asking a register for a stride it does not cover yet grows its
//! stride set and regenerates the routine in place: the routine's entry and
//! exit are forwards that are rebound, so call sites emitted earlier follow.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use trig_spec::{Action, CellId, Comparison, Condition, Operand};

use crate::emitter::{Emitter, ForwardId, Next, PendingAction, PendingCondition};
use crate::error::{CodegenError, Result};
use crate::value::{Register, Value};

/// Strides sharing one divider network
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrideSet(BTreeSet<u32>);

impl StrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stride: u32) -> bool {
        self.0.insert(stride)
    }

    pub fn contains(&self, stride: u32) -> bool {
        self.0.contains(&stride)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    fn divider_name(&self) -> String {
        format!("divider{}", self)
    }
}

impl FromIterator<u32> for StrideSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        StrideSet(iter.into_iter().collect())
    }
}

impl fmt::Display for StrideSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, k) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", k)?;
        }
        write!(f, "}}")
    }
}

/// Quotient and, for strides that are not a multiple of 4, remainder of
/// `index * stride / 4`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StrideOutputs {
    pub quotient: Register,
    pub remainder: Option<Register>,
}

impl StrideOutputs {
    fn alloc(em: &mut Emitter, stride: u32) -> Result<Self> {
        let quotient = em.alloc_register()?;
        let remainder = if stride % 4 != 0 {
            Some(em.alloc_register()?)
        } else {
            None
        };
        Ok(Self {
            quotient,
            remainder,
        })
    }
}

#[derive(Clone, Debug)]
pub(crate) struct DividerNetwork {
    strides: StrideSet,
    input: Register,
    accumulators: BTreeMap<u32, StrideOutputs>,
    /// Bit cells indexed by bit; each continues at the cell one bit below
    bits: Vec<CellId>,
    exit: CellId,
}

impl DividerNetwork {
    fn top(&self) -> u32 {
        self.bits.len() as u32 - 1
    }
}

fn bit_cell(
    input: Register,
    accumulators: &BTreeMap<u32, StrideOutputs>,
    bit: u32,
) -> (Vec<PendingCondition>, Vec<PendingAction>) {
    let mut actions = Vec::new();
    for (&k, acc) in accumulators {
        let scaled = (k as u64) << bit;
        let quotient = (scaled >> 2) as u32;
        if quotient != 0 {
            actions.push(Action::add(acc.quotient.target(), Operand::Const(quotient)));
        }
        if let Some(r) = acc.remainder {
            let remainder = (scaled & 3) as u32;
            if remainder != 0 {
                actions.push(Action::add(r.target(), Operand::Const(remainder)));
            }
        }
    }
    (vec![Condition::bit_set(input.target(), bit)], actions)
}

/// Per-register stride routine
#[derive(Clone, Debug)]
pub(crate) struct RegisterStrides {
    strides: StrideSet,
    outputs: BTreeMap<u32, StrideOutputs>,
    max_value: u32,
    generation: u32,
    entry: ForwardId,
    exit: ForwardId,
    last: Register,
    diff: Register,
}

fn routine_name(index: Register) -> String {
    format!("strides@{:#x}", index.word())
}

/// Largest index value a routine must divide for `index_max`
fn max_value_for(index_max: u32) -> u32 {
    let bits = (32 - index_max.leading_zeros()).max(1);
    if bits >= 32 {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

impl Emitter {
    /// Number of distinct divider networks built so far
    pub fn divider_count(&self) -> usize {
        self.dividers.len()
    }

    /// Strides currently covered by the routine of `index`
    pub fn register_strides(&self, index: Register) -> Option<&StrideSet> {
        self.strides.get(&index).map(|r| &r.strides)
    }

    /// Times the routine of `index` has been generated
    pub fn stride_generation(&self, index: Register) -> u32 {
        self.strides.get(&index).map_or(0, |r| r.generation)
    }

    fn divider(&mut self, strides: &StrideSet, top: u32) -> Result<DividerNetwork> {
        match self.dividers.get(strides).cloned() {
            Some(divider) if divider.top() >= top => {
                tracing::trace!(%strides, top, "divider reused");
                Ok(divider)
            }
            Some(mut divider) => {
                self.extend_divider(&mut divider, top)?;
                self.dividers.insert(strides.clone(), divider.clone());
                Ok(divider)
            }
            None => {
                let divider = self.build_divider(strides, top)?;
                self.dividers.insert(strides.clone(), divider.clone());
                Ok(divider)
            }
        }
    }

    fn build_divider(&mut self, strides: &StrideSet, top: u32) -> Result<DividerNetwork> {
        let input = self.alloc_register()?;
        let mut accumulators = BTreeMap::new();
        for k in strides.iter() {
            accumulators.insert(k, StrideOutputs::alloc(self, k)?);
        }

        let name = strides.divider_name();
        let (bits, exit) = self.network(&name, |em| {
            let mut bits: Vec<CellId> = (0..=top)
                .rev()
                .map(|x| {
                    let (conditions, actions) = bit_cell(input, &accumulators, x);
                    em.emit(conditions, actions)
                })
                .collect();
            bits.reverse();

            for acc in accumulators.values() {
                let Some(r) = acc.remainder else { continue };
                em.emit(
                    vec![Condition::new(r.target(), Comparison::AtLeast, 4)],
                    vec![
                        Action::subtract(r.target(), Operand::Const(4)),
                        Action::add(acc.quotient.target(), Operand::Const(1)),
                    ],
                );
            }
            let exit = em.emit_with_next(vec![], vec![], Next::Halt);
            Ok((bits, exit))
        })?;
        self.set_network_exit(&name, exit.into());

        tracing::debug!(%strides, top, cells = bits.len(), "built divider");
        Ok(DividerNetwork {
            strides: strides.clone(),
            input,
            accumulators,
            bits,
            exit,
        })
    }

    /// Prepend cells for the bits above the divider's current top
    fn extend_divider(&mut self, divider: &mut DividerNetwork, top: u32) -> Result<()> {
        let from = divider.top() + 1;
        let below = divider.bits[divider.top() as usize];
        let input = divider.input;
        let accumulators = &divider.accumulators;

        let cells = self.network(&divider.strides.divider_name(), |em| {
            let cells: Vec<CellId> = (from..=top)
                .rev()
                .map(|x| {
                    let (conditions, actions) = bit_cell(input, accumulators, x);
                    em.emit(conditions, actions)
                })
                .collect();
            if let Some(&lowest) = cells.last() {
                em.set_next(lowest, Next::To(below.into()));
            }
            Ok(cells)
        })?;

        tracing::debug!(strides = %divider.strides, from, top, "extended divider");
        divider.bits.extend(cells.into_iter().rev());
        Ok(())
    }

    /// Make sure the routine of `index` covers `stride` for values up to
    /// the one derived from `index_max`, regenerating it when it does not.
    fn stride_routine(
        &mut self,
        index: Register,
        stride: u32,
        index_max: u32,
    ) -> Result<RegisterStrides> {
        let max_value = max_value_for(index_max);
        let capacity = self.options.array_capacity;
        if max_value >= capacity {
            return Err(CodegenError::CapacityExceeded {
                max_value,
                capacity,
            });
        }

        let mut routine = match self.strides.get(&index).cloned() {
            Some(r) if r.strides.contains(stride) && r.max_value >= max_value => {
                tracing::trace!(%index, stride, "stride routine reused");
                return Ok(r);
            }
            Some(r) => r,
            None => RegisterStrides {
                strides: StrideSet::new(),
                outputs: BTreeMap::new(),
                max_value: 0,
                generation: 0,
                entry: self.forward(),
                exit: self.forward(),
                last: self.alloc_register()?,
                diff: self.alloc_register()?,
            },
        };
        routine.strides.insert(stride);
        routine.max_value = routine.max_value.max(max_value);
        if !routine.outputs.contains_key(&stride) {
            let outputs = StrideOutputs::alloc(self, stride)?;
            routine.outputs.insert(stride, outputs);
        }

        self.generate_stride_routine(index, &mut routine)?;
        self.strides.insert(index, routine.clone());
        Ok(routine)
    }

    fn generate_stride_routine(
        &mut self,
        index: Register,
        routine: &mut RegisterStrides,
    ) -> Result<()> {
        let top = 31 - routine.max_value.leading_zeros();
        let divider = self.divider(&routine.strides, top)?;
        let divider_name = divider.strides.divider_name();
        let name = routine_name(index);
        self.reset_network(&name);

        let (last, diff) = (routine.last, routine.diff);
        let outputs = &routine.outputs;
        let (entry, exit) = self.network(&name, |em| {
            let exit_fwd = em.forward();
            let entry = em.emit(
                vec![],
                vec![
                    Action::set(diff.target(), index.operand()),
                    Action::subtract(diff.target(), last.operand()),
                    Action::set(last.target(), index.operand()),
                ],
            );
            em.jump_if(
                vec![Condition::new(diff.target(), Comparison::Exactly, 0)],
                exit_fwd.into(),
            )?;

            let mut setup = vec![Action::set(divider.input.target(), index.operand())];
            for acc in divider.accumulators.values() {
                setup.push(Action::set(acc.quotient.target(), Operand::Const(0)));
                if let Some(r) = acc.remainder {
                    setup.push(Action::set(r.target(), Operand::Const(0)));
                }
            }
            let divider_entry = divider.bits[top as usize];
            em.call(&divider_name, divider_entry.into(), divider.exit.into(), setup)?;

            let mut copies = Vec::new();
            for (k, out) in outputs {
                let acc = divider
                    .accumulators
                    .get(k)
                    .ok_or(CodegenError::InvalidStride(*k))?;
                copies.push(Action::set(out.quotient.target(), acc.quotient.operand()));
                if let (Some(dst), Some(src)) = (out.remainder, acc.remainder) {
                    copies.push(Action::set(dst.target(), src.operand()));
                }
            }
            em.emit(vec![], copies);

            let exit = em.emit_with_next(vec![], vec![], Next::Halt);
            em.bind(exit_fwd, exit)?;
            Ok((entry, exit))
        })?;

        self.rebind(routine.entry, entry);
        self.rebind(routine.exit, exit);
        self.set_network_exit(&name, routine.exit.into());
        routine.generation += 1;

        tracing::debug!(
            %index,
            strides = %routine.strides,
            max_value = routine.max_value,
            generation = routine.generation,
            "generated stride routine"
        );
        Ok(())
    }

    /// Registers holding `index * stride` split into quotient and remainder by 4.
    ///
    /// The registers belong to the routine of `index` and are overwritten by
    /// its next run; copy them before emitting anything else that may divide
    /// the same register.
    pub fn divide_stride(
        &mut self,
        index: Register,
        stride: u32,
        index_max: u32,
    ) -> Result<StrideOutputs> {
        if stride == 0 {
            return Err(CodegenError::InvalidStride(stride));
        }
        let routine = self.stride_routine(index, stride, index_max)?;
        self.call(
            &routine_name(index),
            routine.entry.into(),
            routine.exit.into(),
            vec![],
        )?;
        routine
            .outputs
            .get(&stride)
            .copied()
            .ok_or(CodegenError::InvalidStride(stride))
    }

    /// `(word index, sub-word offset)` of the byte at `offset + index * stride`,
    /// relative to word 0.
    pub fn resolve_stride_address(
        &mut self,
        index: Register,
        offset: u32,
        stride: u32,
        index_max: u32,
    ) -> Result<(Value, Value)> {
        match stride {
            0 => Err(CodegenError::InvalidStride(stride)),
            4 => {
                let word = self.add(Value::Reg(index), Value::Const(offset / 4))?;
                Ok((word, Value::Const(offset % 4)))
            }
            _ => {
                let outputs = self.divide_stride(index, stride, index_max)?;
                let word = self.alloc_register()?;
                let mut actions = vec![Action::set(word.target(), outputs.quotient.operand())];
                if offset / 4 != 0 {
                    actions.push(Action::add(word.target(), Operand::Const(offset / 4)));
                }

                let Some(remainder) = outputs.remainder else {
                    self.emit(vec![], actions);
                    return Ok((Value::Reg(word), Value::Const(offset % 4)));
                };
                let sub = self.alloc_register()?;
                actions.push(Action::set(sub.target(), remainder.operand()));
                if offset % 4 != 0 {
                    actions.push(Action::add(sub.target(), Operand::Const(offset % 4)));
                }
                self.emit(vec![], actions);
                if offset % 4 != 0 {
                    self.emit(
                        vec![Condition::new(sub.target(), Comparison::AtLeast, 4)],
                        vec![
                            Action::subtract(sub.target(), Operand::Const(4)),
                            Action::add(word.target(), Operand::Const(1)),
                        ],
                    );
                }
                Ok((Value::Reg(word), Value::Reg(sub)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trig_runtime::{ExecutionResult, HaltReason, VMConfig, VM};
    use trig_spec::Program;

    fn run(program: Program, inputs: &[(u32, u32)]) -> ExecutionResult {
        let mut vm = VM::new(program, VMConfig::default()).unwrap();
        for &(w, v) in inputs {
            vm.poke(w, v);
        }
        let result = vm.run().unwrap();
        assert_eq!(result.halt_reason, HaltReason::Halted);
        result
    }

    fn read(result: &ExecutionResult, value: Value) -> u32 {
        match value {
            Value::Const(c) => c,
            Value::Reg(r) => result.read(r.word()),
        }
    }

    #[test]
    fn test_stride_set_display() {
        let set: StrideSet = [8, 3, 5].into_iter().collect();
        assert_eq!(set.to_string(), "{3,5,8}");
        assert_eq!(set.len(), 3);
        assert!(set.contains(5));
    }

    #[test]
    fn test_max_value() {
        assert_eq!(max_value_for(0), 1);
        assert_eq!(max_value_for(1), 1);
        assert_eq!(max_value_for(5), 7);
        assert_eq!(max_value_for(1023), 1023);
        assert_eq!(max_value_for(1024), 2047);
    }

    #[test]
    fn test_stride_eight() {
        let mut em = Emitter::default();
        let index = em.alloc_register().unwrap();
        let out = em.divide_stride(index, 8, 15).unwrap();
        assert_eq!(out.remainder, None);
        let program = em.finish().unwrap();

        let result = run(program, &[(index.word(), 5)]);
        assert_eq!(result.read(out.quotient.word()), 10);
    }

    #[test]
    fn test_growth_keeps_existing_stride() {
        let mut em = Emitter::default();
        let index = em.alloc_register().unwrap();
        let eight = em.divide_stride(index, 8, 15).unwrap();
        assert_eq!(em.stride_generation(index), 1);
        let three = em.divide_stride(index, 3, 15).unwrap();
        assert_eq!(em.stride_generation(index), 2);
        assert_eq!(em.register_strides(index).map(|s| s.to_string()).as_deref(), Some("{3,8}"));
        // an existing stride keeps its output registers
        assert_eq!(em.divide_stride(index, 8, 15).unwrap(), eight);
        assert_eq!(em.stride_generation(index), 2);
        let program = em.finish().unwrap();

        let result = run(program, &[(index.word(), 5)]);
        assert_eq!(result.read(eight.quotient.word()), 10);
        // 15 = 3 * 4 + 3
        assert_eq!(result.read(three.quotient.word()), 3);
        assert_eq!(three.remainder.map(|r| result.read(r.word())), Some(3));
    }

    #[test]
    fn test_remainder_carry() {
        let mut em = Emitter::default();
        let index = em.alloc_register().unwrap();
        let out = em.divide_stride(index, 3, 15).unwrap();
        let program = em.finish().unwrap();

        // 7 * 3 = 21: bit contributions leave a raw remainder of 5
        let result = run(program, &[(index.word(), 7)]);
        assert_eq!(result.read(out.quotient.word()), 5);
        assert_eq!(out.remainder.map(|r| result.read(r.word())), Some(1));
    }

    #[test]
    fn test_resolve_with_offset_carry() {
        let mut em = Emitter::default();
        let index = em.alloc_register().unwrap();
        let (word, sub) = em.resolve_stride_address(index, 6, 3, 15).unwrap();
        let program = em.finish().unwrap();

        for i in 0..16 {
            let result = run(program.clone(), &[(index.word(), i)]);
            let byte = 6 + 3 * i;
            assert_eq!((read(&result, word), read(&result, sub)), (byte / 4, byte % 4), "index {}", i);
        }
    }

    #[test]
    fn test_resolve_multiple_of_four() {
        let mut em = Emitter::default();
        let index = em.alloc_register_init(9).unwrap();
        let (word, sub) = em.resolve_stride_address(index, 5, 12, 15).unwrap();
        assert_eq!(sub, Value::Const(1));
        let result = run(em.finish().unwrap(), &[]);
        assert_eq!(read(&result, word), 28);
    }

    #[test]
    fn test_stride_four_needs_no_divider() {
        let mut em = Emitter::default();
        let index = em.alloc_register_init(3).unwrap();
        let (word, sub) = em.resolve_stride_address(index, 9, 4, 15).unwrap();
        assert_eq!(em.divider_count(), 0);
        assert_eq!(sub, Value::Const(1));
        let result = run(em.finish().unwrap(), &[]);
        assert_eq!(read(&result, word), 5);
    }

    #[test]
    fn test_invalid_stride_and_capacity() {
        let mut em = Emitter::default();
        let index = em.alloc_register().unwrap();
        assert!(matches!(
            em.resolve_stride_address(index, 0, 0, 15),
            Err(CodegenError::InvalidStride(0))
        ));
        assert!(matches!(
            em.divide_stride(index, 3, 1024),
            Err(CodegenError::CapacityExceeded {
                max_value: 2047,
                capacity: 1024
            })
        ));
        assert!(em.divide_stride(index, 3, 1023).is_ok());
    }

    #[test]
    fn test_dividers_shared_and_extended() {
        let mut em = Emitter::default();
        let a = em.alloc_register().unwrap();
        let b = em.alloc_register().unwrap();
        let qa = em.divide_stride(a, 6, 3).unwrap();
        let qb = em.divide_stride(b, 6, 100).unwrap();
        // same stride set, one divider grown to cover b's bits
        assert_eq!(em.divider_count(), 1);
        let program = em.finish().unwrap();

        let result = run(program, &[(a.word(), 3), (b.word(), 100)]);
        assert_eq!(result.read(qa.quotient.word()), 4);
        assert_eq!(qa.remainder.map(|r| result.read(r.word())), Some(2));
        assert_eq!(result.read(qb.quotient.word()), 150);
        assert_eq!(qb.remainder.map(|r| result.read(r.word())), Some(0));
    }

    #[test]
    fn test_repeated_division_skips_when_unchanged() {
        let mut em = Emitter::default();
        let index = em.alloc_register_init(11).unwrap();
        em.divide_stride(index, 5, 15).unwrap();
        let first = em.cell_count();
        let out = em.divide_stride(index, 5, 15).unwrap();
        // one call cell, no new routine
        assert_eq!(em.cell_count(), first + 1);
        let result = run(em.finish().unwrap(), &[]);
        assert_eq!(result.read(out.quotient.word()), 13);
        assert_eq!(out.remainder.map(|r| result.read(r.word())), Some(3));
    }
}
