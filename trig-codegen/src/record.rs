//! Records: named members over generated field access.
//!
//! A [`RecordType`] binds member descriptors to names. A [`Record`] is an
//! instance given by one value, constant or register, that is the base word
//! for struct members and the element index for array members. Every access
//! resolves the member's address afresh, so a register used as an index is
//! always divided by its current stride routine.

use std::collections::BTreeMap;
use trig_spec::{Action, Condition, Modifier, Operand, FULL_MASK};

use crate::emitter::Emitter;
use crate::error::{CodegenError, Result};
use crate::member::{Member, MemberKind, MemberLayout};
use crate::value::{Register, Value};

const ALL_SUBS: [u32; 4] = [0, 1, 2, 3];

/// Named member descriptors
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordType {
    name: String,
    index_max: u32,
    members: BTreeMap<String, Member>,
}

impl RecordType {
    /// `index_max` is the largest index an instance may take, which bounds
    /// the stride routines built for dynamic indices
    pub fn new(name: impl Into<String>, index_max: u32) -> Self {
        Self {
            name: name.into(),
            index_max,
            members: BTreeMap::new(),
        }
    }

    pub fn with_member(mut self, name: impl Into<String>, member: Member) -> Self {
        self.members.insert(name.into(), member);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_max(&self) -> u32 {
        self.index_max
    }

    pub fn member(&self, name: &str) -> Result<&Member> {
        self.members
            .get(name)
            .ok_or_else(|| CodegenError::UnknownMember {
                record: self.name.clone(),
                member: name.to_string(),
            })
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.members.iter().map(|(n, m)| (n.as_str(), m))
    }

    /// Instance at `value`
    pub fn at(&self, value: impl Into<Value>) -> Record<'_> {
        Record {
            ty: self,
            value: value.into(),
        }
    }
}

/// Record instance
#[derive(Copy, Clone, Debug)]
pub struct Record<'t> {
    ty: &'t RecordType,
    value: Value,
}

impl<'t> Record<'t> {
    pub fn record_type(&self) -> &'t RecordType {
        self.ty
    }

    pub fn value(&self) -> Value {
        self.value
    }

    /// `(word index, sub-word offset)` of a member
    pub fn address(&self, em: &mut Emitter, name: &str) -> Result<(Value, Value)> {
        let member = *self.ty.member(name)?;
        self.locate(em, name, &member)
    }

    fn locate(&self, em: &mut Emitter, name: &str, member: &Member) -> Result<(Value, Value)> {
        let offset = member.offset;
        match member.layout {
            MemberLayout::Struct => {
                let word = em.add(self.value, Value::Const(offset / 4))?;
                Ok((word, Value::Const(offset % 4)))
            }
            MemberLayout::Array { stride } => match self.value {
                Value::Const(index) => {
                    if index > self.ty.index_max {
                        return Err(CodegenError::ValueOutOfRange {
                            value: index,
                            max: self.ty.index_max,
                        });
                    }
                    let byte = offset as u64 + index as u64 * stride as u64;
                    let word = u32::try_from(byte / 4).map_err(|_| CodegenError::ValueOutOfRange {
                        value: index,
                        max: self.ty.index_max,
                    })?;
                    Ok((Value::Const(word), Value::Const((byte % 4) as u32)))
                }
                Value::Reg(index) => {
                    em.resolve_stride_address(index, offset, stride, self.ty.index_max)
                }
            },
            MemberLayout::Unsupported => Err(CodegenError::Unsupported {
                record: self.ty.name.clone(),
                member: name.to_string(),
            }),
            MemberLayout::NotImplemented => Err(CodegenError::Unimplemented(format!(
                "{}.{}",
                self.ty.name, name
            ))),
        }
    }

    /// Read a member into a fresh register
    pub fn get(&self, em: &mut Emitter, name: &str) -> Result<Register> {
        let member = *self.ty.member(name)?;
        let (addr, sub) = self.locate(em, name, &member)?;
        match member.kind.flag_bit() {
            Some(bit) => read_flag(em, addr, sub, bit),
            None => em.read_field(member.kind.width(), addr, sub),
        }
    }

    pub fn set(&self, em: &mut Emitter, name: &str, value: impl Into<Value>) -> Result<()> {
        let member = *self.ty.member(name)?;
        let value = cast(member.kind, value.into())?;
        let (addr, sub) = self.locate(em, name, &member)?;
        match member.kind.flag_bit() {
            Some(bit) => write_flag(em, addr, sub, bit, value),
            None => em.write_field(member.kind.width(), addr, sub, value),
        }
    }

    pub fn add(&self, em: &mut Emitter, name: &str, value: impl Into<Value>) -> Result<()> {
        self.modify(em, name, Modifier::Add, value.into())
    }

    pub fn subtract(&self, em: &mut Emitter, name: &str, value: impl Into<Value>) -> Result<()> {
        self.modify(em, name, Modifier::Subtract, value.into())
    }

    fn modify(&self, em: &mut Emitter, name: &str, modifier: Modifier, value: Value) -> Result<()> {
        let member = *self.ty.member(name)?;
        if member.kind.flag_bit().is_some() {
            return Err(CodegenError::Unimplemented(format!(
                "{} on {} member {}.{}",
                modifier.symbol(),
                member.kind,
                self.ty.name,
                name
            )));
        }
        let (addr, sub) = self.locate(em, name, &member)?;
        em.modify_field(member.kind.width(), addr, sub, modifier, value)
    }

    /// Both coordinates of a position member, decoded in one pass
    pub fn get_xy(&self, em: &mut Emitter, name: &str) -> Result<(Register, Register)> {
        let member = *self.ty.member(name)?;
        if member.kind != MemberKind::Position {
            return Err(CodegenError::Unimplemented(format!(
                "coordinates of {} member {}.{}",
                member.kind, self.ty.name, name
            )));
        }
        let (addr, sub) = self.locate(em, name, &member)?;
        if sub != Value::Const(0) {
            return Err(CodegenError::Malaligned {
                offset: member.offset,
                size: 4,
            });
        }

        let x = |b: u32| b & 0xFFFF;
        let y = |b: u32| b >> 16;
        let reader = em.build_masked_reader(FULL_MASK, &[(0, &x), (0, &y)], true)?;
        match em.invoke_reader(&reader, addr)?.as_slice() {
            &[x, y] => Ok((x, y)),
            _ => Err(CodegenError::EmptyMask),
        }
    }

    /// Bit `bit` of a member, as 0 or 1
    pub fn get_flag(&self, em: &mut Emitter, name: &str, bit: u32) -> Result<Register> {
        let member = *self.ty.member(name)?;
        check_flag_bit(&member, bit)?;
        let (addr, sub) = self.locate(em, name, &member)?;
        read_flag(em, addr, sub, bit)
    }

    /// Set bit `bit` of a member when `value` is nonzero, clear it otherwise
    pub fn set_flag(
        &self,
        em: &mut Emitter,
        name: &str,
        bit: u32,
        value: impl Into<Value>,
    ) -> Result<()> {
        let member = *self.ty.member(name)?;
        check_flag_bit(&member, bit)?;
        let (addr, sub) = self.locate(em, name, &member)?;
        write_flag(em, addr, sub, bit, value.into())
    }
}

fn cast(kind: MemberKind, value: Value) -> Result<Value> {
    match value {
        Value::Const(v) => Ok(Value::Const(kind.cast(v)?)),
        reg => Ok(reg),
    }
}

fn check_flag_bit(member: &Member, bit: u32) -> Result<()> {
    let bits = 8 * member.kind.size();
    if bit >= bits {
        return Err(CodegenError::ShiftOutOfRange { bit, shift: 0 });
    }
    Ok(())
}

/// Word and in-word bit of bit `bit` of the field at `(addr, sub)`
fn flag_location(em: &mut Emitter, addr: Value, sub: u32, bit: u32) -> Result<(Value, u32)> {
    let pos = 8 * sub + bit;
    let word = em.add(addr, Value::Const(pos / 32))?;
    Ok((word, pos % 32))
}

fn read_flag(em: &mut Emitter, addr: Value, sub: Value, bit: u32) -> Result<Register> {
    let dest = em.alloc_register()?;
    em.assign(dest, Value::Const(0));
    em.for_each_sub(sub, &ALL_SUBS, |em, s| {
        let (word, b) = flag_location(em, addr, s, bit)?;
        em.emit(
            vec![Condition::bit_set(word.word_target(), b)],
            vec![Action::set(dest.target(), Operand::Const(1))],
        );
        Ok(())
    })?;
    Ok(dest)
}

fn write_flag(em: &mut Emitter, addr: Value, sub: Value, bit: u32, value: Value) -> Result<()> {
    em.for_each_sub(sub, &ALL_SUBS, |em, s| {
        let (word, b) = flag_location(em, addr, s, bit)?;
        em.write_bit(word, b, value)
    })
}
