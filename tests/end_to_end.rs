//! End-to-end tests: scripts built with the code generator, run by the
//! reference interpreter

use proptest::prelude::*;
use trig_codegen::{CodegenError, Emitter, Member, MemberKind, RecordType, Value, Width};
use trig_runtime::{HaltReason, VMConfig, VM};
use trig_spec::{Action, Comparison, Condition, Operand};

const UNITS: u32 = 0x4000;
const TABLE: u32 = 0x2000;

fn unit_type() -> RecordType {
    RecordType::new("Unit", 1699)
        .with_member("hp", Member::field(0x08, MemberKind::Dword).unwrap())
        .with_member("pos", Member::field(0x28, MemberKind::Position).unwrap())
        .with_member("pos_x", Member::field(0x28, MemberKind::PositionX).unwrap())
        .with_member("player", Member::field(0x4C, MemberKind::Byte).unwrap())
        .with_member("status", Member::field(0xDC, MemberKind::Dword).unwrap())
}

#[test]
fn test_loop_sums_dynamically_indexed_array() {
    let table = RecordType::new("UnitType", 227)
        .with_member("build_time", Member::array(TABLE * 4, MemberKind::Word).unwrap());

    let mut em = Emitter::default();
    let i = em.alloc_register().unwrap();
    let sum = em.alloc_register().unwrap();
    let top = em.forward();
    em.bind_next(top);
    let time = table.at(i).get(&mut em, "build_time").unwrap();
    em.emit(
        vec![],
        vec![
            Action::add(sum.target(), time.operand()),
            Action::add(i.target(), Operand::Const(1)),
        ],
    );
    em.jump_if(
        vec![Condition::new(i.target(), Comparison::AtMost, 9)],
        top.into(),
    )
    .unwrap();
    let program = em.finish().unwrap();

    let mut vm = VM::new(program, VMConfig::default()).unwrap();
    for j in 0..5 {
        vm.poke(TABLE + j, (100 + 2 * j) | (101 + 2 * j) << 16);
    }
    let result = vm.run().unwrap();
    assert_eq!(result.halt_reason, HaltReason::Halted);
    assert_eq!(result.read(i.word()), 10);
    assert_eq!(result.read(sum.word()), (100..110).sum::<u32>());
}

#[test]
fn test_struct_through_byte_pointer() {
    let unit = unit_type();
    let mut em = Emitter::default();
    let ptr = em.alloc_register_init(UNITS * 4).unwrap();
    let (base, sub) = em.to_index_offset(Value::Reg(ptr)).unwrap();
    let u = unit.at(base);

    let hp = u.get(&mut em, "hp").unwrap();
    u.subtract(&mut em, "hp", 100u32).unwrap();
    let (x, y) = u.get_xy(&mut em, "pos").unwrap();
    u.add(&mut em, "pos_x", 16u32).unwrap();
    u.set_flag(&mut em, "status", 3, 1u32).unwrap();
    let player = u.get(&mut em, "player").unwrap();
    let program = em.finish().unwrap();

    let mut vm = VM::new(program, VMConfig::default()).unwrap();
    vm.poke(UNITS + 0x02, 500);
    vm.poke(UNITS + 0x0A, 0x0200_0100);
    vm.poke(UNITS + 0x13, 0x0000_0005);
    let result = vm.run().unwrap();

    assert_eq!(result.halt_reason, HaltReason::Halted);
    if let Value::Reg(sub) = sub {
        assert_eq!(result.read(sub.word()), 0);
    }
    assert_eq!(result.read(hp.word()), 500);
    assert_eq!(result.read(UNITS + 0x02), 400);
    assert_eq!((result.read(x.word()), result.read(y.word())), (0x100, 0x200));
    assert_eq!(result.read(UNITS + 0x0A), 0x0200_0110);
    assert_eq!(result.read(UNITS + 0x37), 0x8);
    assert_eq!(result.read(player.word()), 5);
}

#[test]
fn test_copy_between_records() {
    // copy every unit's player byte into a per-slot table indexed by the same register
    let unit = unit_type();
    let owners = RecordType::new("Owner", 15)
        .with_member("player", Member::array_with_stride(TABLE * 4 + 1, MemberKind::Byte, 3).unwrap());

    let mut em = Emitter::default();
    let slot = em.alloc_register().unwrap();
    let base = em.alloc_register_init(UNITS).unwrap();
    let top = em.forward();
    em.bind_next(top);
    let player = unit.at(base).get(&mut em, "player").unwrap();
    owners.at(slot).set(&mut em, "player", player).unwrap();
    em.emit(
        vec![],
        vec![
            Action::add(slot.target(), Operand::Const(1)),
            Action::add(base.target(), Operand::Const(0x40)),
        ],
    );
    em.jump_if(
        vec![Condition::new(slot.target(), Comparison::AtMost, 15)],
        top.into(),
    )
    .unwrap();
    let program = em.finish().unwrap();

    let mut vm = VM::new(program, VMConfig::default()).unwrap();
    for n in 0..16 {
        vm.poke(UNITS + 0x40 * n + 0x13, 0xFF00 | n);
    }
    let result = vm.run().unwrap();
    assert_eq!(result.halt_reason, HaltReason::Halted);

    for n in 0..16u32 {
        let byte = TABLE * 4 + 1 + 3 * n;
        let stored = (result.read(byte / 4) >> (8 * (byte % 4))) & 0xFF;
        assert_eq!(stored, n, "slot {}", n);
    }
}

#[test]
fn test_generation_errors_are_diagnostics() {
    let table = RecordType::new("Sprite", 2499)
        .with_member("image", Member::array(0x8000, MemberKind::Word).unwrap());
    let mut em = Emitter::default();
    let index = em.alloc_register().unwrap();
    let err = table.at(index).get(&mut em, "image").unwrap_err();
    assert!(matches!(
        err,
        CodegenError::CapacityExceeded {
            max_value: 4095,
            capacity: 1024
        }
    ));
    assert_eq!(err.category(), trig_codegen::ErrorCategory::Capacity);

    let err = em
        .add_field(Width::Dword, Value::Const(0x400), Value::Const(2), Value::Const(1))
        .unwrap_err();
    assert!(matches!(err, CodegenError::Unimplemented(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_reads_through_byte_pointer(offset in 0u32..64, low: u32, high: u32) {
        let mut em = Emitter::default();
        let ptr = em.alloc_register().unwrap();
        let byte = em.read_ptr(Width::Byte, Value::Reg(ptr)).unwrap();
        let word = em.read_ptr(Width::Word, Value::Reg(ptr)).unwrap();
        let program = em.finish().unwrap();

        let base = UNITS + offset / 4;
        let mut vm = VM::new(program, VMConfig::default()).unwrap();
        vm.poke(ptr.word(), UNITS * 4 + offset);
        vm.poke(base, low);
        vm.poke(base + 1, high);
        let result = vm.run().unwrap();

        let pair = (low as u64) | (high as u64) << 32;
        let sub = 8 * (offset % 4);
        prop_assert_eq!(&result.halt_reason, &HaltReason::Halted);
        prop_assert_eq!(result.read(byte.word()) as u64, (pair >> sub) & 0xFF);
        prop_assert_eq!(result.read(word.word()) as u64, (pair >> sub) & 0xFFFF);
    }
}
