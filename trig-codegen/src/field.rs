//! Fixed-width field reads and writes.
//!
//! Writes at a constant sub-offset are a single masked action. Reads are
//! bit-decomposition chains: one guarded cell per bit of a consecutive mask,
//! each adding the bit's shifted positional value into the destination. All
//! chains live in one shared network, read their source through the shared
//! cursor register and accumulate through the destination slot register, so
//! a chain is built once per `(lsb, msb, shift, order)` and reused by every
//! caller. A decreasing chain also serves reads with the same lsb and a
//! lower msb by entering it midway, and an increasing chain serves reads
//! with the same msb and a higher lsb.

use std::fmt;
use trig_spec::{Action, CellId, Condition, Modifier, Operand, Target, FULL_MASK};

use crate::emitter::{Emitter, Next};
use crate::error::{CodegenError, Result};
use crate::value::{Register, Value};

/// Name of the shared network holding every bit chain
pub const CHAIN_NETWORK: &str = "field-chains";

const ALL_SUBS: [u32; 4] = [0, 1, 2, 3];

/// Field width
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Word,
    Dword,
}

impl Width {
    pub fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Dword => 4,
        }
    }

    pub fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
            Width::Dword => FULL_MASK,
        }
    }

    pub fn check_sub(self, sub: u32) -> Result<()> {
        if sub > 3 {
            return Err(CodegenError::OffsetOutOfRange {
                sub,
                bytes: self.bytes(),
            });
        }
        Ok(())
    }

    /// Whether a field at `sub` continues into the next word
    pub fn straddles(self, sub: u32) -> bool {
        sub + self.bytes() > 4
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::Byte => write!(f, "byte"),
            Width::Word => write!(f, "word"),
            Width::Dword => write!(f, "dword"),
        }
    }
}

/// Direction a chain scans its bits in
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScanOrder {
    Increasing,
    Decreasing,
}

impl ScanOrder {
    /// Right-aligned reads scan down so they can share a chain's lsb end;
    /// in-place reads scan up and share the msb end.
    fn for_read(lsb: u32, shift: i32) -> Self {
        if lsb as i32 + shift == 0 {
            ScanOrder::Decreasing
        } else if shift == 0 {
            ScanOrder::Increasing
        } else {
            ScanOrder::Decreasing
        }
    }
}

/// True for a non-empty run of set bits
pub fn is_consecutive(mask: u32) -> bool {
    if mask == 0 {
        return false;
    }
    let run = mask >> mask.trailing_zeros();
    run & run.wrapping_add(1) == 0
}

pub fn lsb_index(mask: u32) -> u32 {
    mask.trailing_zeros()
}

pub fn msb_index(mask: u32) -> u32 {
    31 - mask.leading_zeros()
}

#[inline]
fn shift_by(value: u32, shift: i32) -> u32 {
    if shift >= 0 {
        value << shift
    } else {
        value >> -shift
    }
}

#[derive(Debug)]
struct Chain {
    lsb: u32,
    msb: u32,
    shift: i32,
    order: ScanOrder,
    /// Cells in scan order
    cells: Vec<CellId>,
}

#[derive(Debug, Default)]
pub(crate) struct ChainCache {
    chains: Vec<Chain>,
    exit: Option<CellId>,
    seeded: bool,
}

impl ChainCache {
    fn lookup(&self, lsb: u32, msb: u32, shift: i32, order: ScanOrder) -> Option<CellId> {
        self.chains.iter().find_map(|c| {
            if c.shift != shift || c.order != order {
                return None;
            }
            match order {
                ScanOrder::Decreasing if c.lsb == lsb && c.msb >= msb => {
                    c.cells.get((c.msb - msb) as usize).copied()
                }
                ScanOrder::Increasing if c.msb == msb && c.lsb <= lsb => {
                    c.cells.get((lsb - c.lsb) as usize).copied()
                }
                _ => None,
            }
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.chains.len()
    }
}

impl Emitter {
    /// Number of distinct bit chains built so far
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    fn chain_exit(&mut self) -> Result<CellId> {
        if let Some(exit) = self.chains.exit {
            return Ok(exit);
        }
        let exit = self.network(CHAIN_NETWORK, |em| {
            Ok(em.emit_with_next(vec![], vec![], Next::Halt))
        })?;
        self.set_network_exit(CHAIN_NETWORK, exit.into());
        self.chains.exit = Some(exit);
        Ok(exit)
    }

    fn build_chain(&mut self, lsb: u32, msb: u32, shift: i32, order: ScanOrder) -> Result<CellId> {
        let exit = self.chain_exit()?;
        let bits: Vec<u32> = match order {
            ScanOrder::Increasing => (lsb..=msb).collect(),
            ScanOrder::Decreasing => (lsb..=msb).rev().collect(),
        };
        let cursor = self.shared.cursor.word();
        let dest = self.shared.dest_slot.word();

        let cells = self.network(CHAIN_NETWORK, |em| {
            let cells: Vec<CellId> = bits
                .iter()
                .map(|&x| {
                    let value = 1u32 << (x as i32 + shift);
                    em.emit(
                        vec![Condition::bit_set(Target::Indirect(cursor), x)],
                        vec![Action::add(Target::Indirect(dest), Operand::Const(value))],
                    )
                })
                .collect();
            if let Some(&last) = cells.last() {
                em.set_next(last, Next::To(exit.into()));
            }
            Ok(cells)
        })?;

        tracing::debug!(lsb, msb, shift, ?order, cells = cells.len(), "built bit chain");
        let entry = cells.first().copied().ok_or(CodegenError::EmptyMask)?;
        self.chains.chains.push(Chain {
            lsb,
            msb,
            shift,
            order,
            cells,
        });
        Ok(entry)
    }

    fn chain_entry(&mut self, mask: u32, shift: i32) -> Result<CellId> {
        if !is_consecutive(mask) {
            return Err(CodegenError::Unimplemented(format!(
                "bit chain over non-consecutive mask {:#010x}",
                mask
            )));
        }
        let (lsb, msb) = (lsb_index(mask), msb_index(mask));
        if lsb as i32 + shift < 0 {
            return Err(CodegenError::ShiftOutOfRange { bit: lsb, shift });
        }
        if msb as i32 + shift > 31 {
            return Err(CodegenError::ShiftOutOfRange { bit: msb, shift });
        }

        if self.options.seed_chains && !self.chains.seeded {
            self.chains.seeded = true;
            self.build_chain(0, 31, 0, ScanOrder::Decreasing)?;
            self.build_chain(8, 31, 0, ScanOrder::Increasing)?;
        }

        let order = ScanOrder::for_read(lsb, shift);
        if let Some(cell) = self.chains.lookup(lsb, msb, shift, order) {
            tracing::trace!(mask, shift, %cell, "bit chain reused");
            return Ok(cell);
        }
        self.build_chain(lsb, msb, shift, order)
    }

    /// Add `(word & mask)` shifted by `shift` into `dest`, where `word` is
    /// the word `src + word_offset`.
    pub(crate) fn read_consecutive(
        &mut self,
        src: Value,
        word_offset: u32,
        mask: u32,
        shift: i32,
        dest: Register,
        clear: bool,
    ) -> Result<()> {
        let entry = self.chain_entry(mask, shift)?;
        let exit = self.chain_exit()?;
        let cursor = self.shared.cursor;

        let mut setup = Vec::with_capacity(4);
        if clear {
            setup.push(Action::set(dest.target(), Operand::Const(0)));
        }
        match src {
            Value::Const(w) => {
                setup.push(Action::set(cursor.target(), Operand::Const(w.wrapping_add(word_offset))))
            }
            Value::Reg(r) => {
                setup.push(Action::set(cursor.target(), r.operand()));
                if word_offset != 0 {
                    setup.push(Action::add(cursor.target(), Operand::Const(word_offset)));
                }
            }
        }
        setup.push(Action::set(
            self.shared.dest_slot.target(),
            Operand::Const(dest.word()),
        ));
        self.call(CHAIN_NETWORK, entry.into(), exit.into(), setup)
    }

    /// Read a field into a fresh register, right-aligned
    pub fn read_field(&mut self, width: Width, addr: Value, sub: Value) -> Result<Register> {
        let dest = self.alloc_register()?;
        self.read_field_into(dest, width, addr, sub)?;
        Ok(dest)
    }

    pub fn read_field_into(
        &mut self,
        dest: Register,
        width: Width,
        addr: Value,
        sub: Value,
    ) -> Result<()> {
        if let Value::Reg(_) = sub {
            self.assign(dest, Value::Const(0));
        }
        self.for_each_sub(sub, &ALL_SUBS, |em, s| em.read_at(dest, width, addr, s))
    }

    fn read_at(&mut self, dest: Register, width: Width, addr: Value, sub: u32) -> Result<()> {
        width.check_sub(sub)?;

        if width.straddles(sub) {
            let low_bits = 32 - 8 * sub;
            let high_bits = 8 * width.bytes() - low_bits;
            self.read_consecutive(addr, 0, FULL_MASK << (8 * sub), -((8 * sub) as i32), dest, true)?;
            return self.read_consecutive(addr, 1, (1 << high_bits) - 1, low_bits as i32, dest, false);
        }

        match addr {
            Value::Const(w) if sub == 0 => {
                let mut actions = Vec::with_capacity(2);
                if width != Width::Dword {
                    actions.push(Action::set(dest.target(), Operand::Const(0)));
                }
                actions.push(Action::masked(
                    dest.target(),
                    Modifier::SetTo,
                    Operand::Word(w),
                    width.mask(),
                ));
                self.emit(vec![], actions);
                Ok(())
            }
            _ => {
                let shift = -((8 * sub) as i32);
                self.read_consecutive(addr, 0, width.mask() << (8 * sub), shift, dest, true)
            }
        }
    }

    /// Set a field
    pub fn write_field(&mut self, width: Width, addr: Value, sub: Value, value: Value) -> Result<()> {
        self.modify_field(width, addr, sub, Modifier::SetTo, value)
    }

    /// Add to a field, wrapping inside the field
    pub fn add_field(&mut self, width: Width, addr: Value, sub: Value, value: Value) -> Result<()> {
        self.modify_field(width, addr, sub, Modifier::Add, value)
    }

    /// Subtract from a field, wrapping inside the field
    pub fn subtract_field(
        &mut self,
        width: Width,
        addr: Value,
        sub: Value,
        value: Value,
    ) -> Result<()> {
        self.modify_field(width, addr, sub, Modifier::Subtract, value)
    }

    pub fn modify_field(
        &mut self,
        width: Width,
        addr: Value,
        sub: Value,
        modifier: Modifier,
        value: Value,
    ) -> Result<()> {
        // add/subtract cannot carry across words, so straddling offsets get no case
        let cases: &[u32] = match (width, modifier) {
            (_, Modifier::SetTo) | (Width::Byte, _) => &ALL_SUBS,
            (Width::Word, _) => &ALL_SUBS[..3],
            (Width::Dword, _) => &ALL_SUBS[..1],
        };
        self.for_each_sub(sub, cases, |em, s| em.modify_at(width, addr, s, modifier, value))
    }

    fn modify_at(
        &mut self,
        width: Width,
        addr: Value,
        sub: u32,
        modifier: Modifier,
        value: Value,
    ) -> Result<()> {
        width.check_sub(sub)?;
        let shift = 8 * sub;

        if !width.straddles(sub) {
            return self.write_part(addr, 0, width.mask() << shift, modifier, value, width.mask(), shift as i32);
        }
        if modifier != Modifier::SetTo {
            return Err(CodegenError::Unimplemented(format!(
                "{} {} at sub-offset {}",
                width,
                modifier.symbol(),
                sub
            )));
        }

        let low_bits = 32 - shift;
        let high_bits = 8 * width.bytes() - low_bits;
        let low_mask = (1u32 << low_bits) - 1;
        let high_mask = (1u32 << high_bits) - 1;
        self.write_part(addr, 0, FULL_MASK << shift, modifier, value, low_mask, shift as i32)?;
        self.write_part(
            addr,
            1,
            high_mask,
            modifier,
            value,
            high_mask << low_bits,
            -(low_bits as i32),
        )
    }

    /// One masked action on word `addr + word_offset`. The bits `src_mask` of
    /// `value`, shifted by `shift`, land on the bits `dst_mask` of the word.
    #[allow(clippy::too_many_arguments)]
    fn write_part(
        &mut self,
        addr: Value,
        word_offset: u32,
        dst_mask: u32,
        modifier: Modifier,
        value: Value,
        src_mask: u32,
        shift: i32,
    ) -> Result<()> {
        let target = match self.add(addr, Value::Const(word_offset))? {
            Value::Const(w) => Target::Word(w),
            Value::Reg(r) => Target::Indirect(r.word()),
        };
        let operand = match value {
            Value::Const(v) => Operand::Const(shift_by(v & src_mask, shift)),
            Value::Reg(r) if shift == 0 => r.operand(),
            Value::Reg(r) => {
                let shifted = self.alloc_register()?;
                self.read_consecutive(Value::Const(r.word()), 0, src_mask, shift, shifted, true)?;
                shifted.operand()
            }
        };
        self.emit(vec![], vec![Action::masked(target, modifier, operand, dst_mask)]);
        Ok(())
    }

    /// Fresh register holding bit `bit` (0..=31) of the word at `addr`, as 0 or 1
    pub fn read_bit(&mut self, addr: Value, bit: u32) -> Result<Register> {
        if bit > 31 {
            return Err(CodegenError::ShiftOutOfRange { bit, shift: 0 });
        }
        self.test(vec![Condition::bit_set(addr.word_target(), bit)])
    }

    /// Set bit `bit` of the word at `addr` when `value` is nonzero, clear it otherwise
    pub fn write_bit(&mut self, addr: Value, bit: u32, value: Value) -> Result<()> {
        if bit > 31 {
            return Err(CodegenError::ShiftOutOfRange { bit, shift: 0 });
        }
        let mask = 1u32 << bit;
        let target = addr.word_target();
        match value {
            Value::Const(v) => {
                let bits = if v != 0 { mask } else { 0 };
                self.write_masked(addr, mask, Modifier::SetTo, Value::Const(bits));
            }
            Value::Reg(r) => {
                self.emit(
                    vec![],
                    vec![Action::masked(target, Modifier::SetTo, Operand::Const(0), mask)],
                );
                self.emit(
                    vec![Condition::new(r.target(), trig_spec::Comparison::AtLeast, 1)],
                    vec![Action::masked(target, Modifier::SetTo, Operand::Const(mask), mask)],
                );
            }
        }
        Ok(())
    }

    /// Apply `modifier` with `value`, taken in place, to the bits `mask` of the word at `addr`
    pub fn write_masked(&mut self, addr: Value, mask: u32, modifier: Modifier, value: Value) {
        self.emit(
            vec![],
            vec![Action::masked(addr.word_target(), modifier, value.operand(), mask)],
        );
    }
}
