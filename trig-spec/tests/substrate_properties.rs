//! Property tests for the substrate primitives

use proptest::prelude::*;
use trig_spec::{Action, Cell, CellId, Modifier, Operand, Program, Target};

proptest! {
    #[test]
    fn test_masked_modifier_never_touches_unmasked_bits(
        old in any::<u32>(),
        operand in any::<u32>(),
        mask in any::<u32>(),
    ) {
        for modifier in [Modifier::SetTo, Modifier::Add, Modifier::Subtract] {
            let new = modifier.apply(old, operand, mask);
            prop_assert_eq!(new & !mask, old & !mask);
        }
    }

    // field arithmetic: a contiguous mask and an operand aligned to its lowest bit
    #[test]
    fn test_add_then_subtract_restores(
        old in any::<u32>(),
        raw in any::<u32>(),
        lsb in 0u32..32,
        width in any::<u32>(),
    ) {
        let width = 1 + width % (32 - lsb);
        let mask = (((1u64 << width) - 1) << lsb) as u32;
        let operand = raw << lsb;
        let added = Modifier::Add.apply(old, operand, mask);
        prop_assert_eq!(added & !mask, old & !mask);
        prop_assert_eq!(Modifier::Subtract.apply(added, operand, mask), old);
    }

    #[test]
    fn test_link_values_decode(id in 0u32..0x00FF_FFFF) {
        prop_assert_eq!(CellId::from_link_value(CellId(id).link_value()), Some(CellId(id)));
    }

    #[test]
    fn test_program_bytes_survive_decoding(len in 1usize..20, word in 0u32..0x1000, value in any::<u32>()) {
        let mut program = Program::new();
        for i in 0..len {
            let next = (i + 1 < len).then(|| CellId(i as u32 + 1));
            program.cells.push(Cell {
                conditions: vec![],
                actions: vec![Action::add(Target::Word(word), Operand::Const(value))],
                next,
            });
        }
        program.entry = Some(CellId(0));

        let decoded = Program::from_bytes(&program.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(decoded, program);
    }
}

#[test]
fn test_masked_add_drops_operand_bits_below_mask() {
    // operand bits below the mask borrow into it on subtract, so add is not undone
    let added = Modifier::Add.apply(0, 4687, 4);
    assert_eq!(added, 4);
    assert_eq!(Modifier::Subtract.apply(added, 4687, 4), 4);
}
