//! Cell formatting to listing text

use trig_spec::{Action, Cell, Comparison, Condition, Layout, Operand, Target, WordIndex, FULL_MASK};

/// Name of a word: `r<n>` inside the register region, `link(c<n>)` for a
/// link word, hex otherwise
pub fn format_word(word: WordIndex, layout: &Layout) -> String {
    if layout.is_register(word) {
        format!("r{}", word - layout.register_base)
    } else if let Some(cell) = layout.cell_of_link(word) {
        format!("link({})", cell)
    } else {
        format!("[{:#x}]", word)
    }
}

pub fn format_target(target: &Target, layout: &Layout) -> String {
    match target {
        Target::Word(w) => format_word(*w, layout),
        Target::Indirect(w) => format!("*{}", format_word(*w, layout)),
        Target::Link(c) => format!("link({})", c),
    }
}

pub fn format_operand(operand: &Operand, layout: &Layout) -> String {
    match operand {
        Operand::Const(v) if *v > 0xFFFF => format!("{:#x}", v),
        Operand::Const(v) => v.to_string(),
        Operand::Word(w) => format_word(*w, layout),
        Operand::Link(c) => format!("&{}", c),
    }
}

pub fn format_condition(condition: &Condition, layout: &Layout) -> String {
    let target = format_target(&condition.target, layout);
    let mask = condition.mask;
    if mask.count_ones() == 1 && condition.comparison == Comparison::AtLeast && condition.value == 1 {
        return format!("{}.bit{}", target, mask.trailing_zeros());
    }

    let op = match condition.comparison {
        Comparison::AtLeast => ">=",
        Comparison::AtMost => "<=",
        Comparison::Exactly => "==",
    };
    if mask == FULL_MASK {
        format!("{} {} {}", target, op, condition.value)
    } else {
        format!("({} & {:#x}) {} {}", target, mask, op, condition.value)
    }
}

pub fn format_action(action: &Action, layout: &Layout) -> String {
    let mut text = format!(
        "{} {} {}",
        format_target(&action.target, layout),
        action.modifier.symbol(),
        format_operand(&action.operand, layout)
    );
    if action.mask != FULL_MASK {
        text.push_str(&format!(" mask {:#010x}", action.mask));
    }
    text
}

/// One line per cell: guards, actions and initial successor
pub fn format_cell(cell: &Cell, layout: &Layout) -> String {
    let mut text = String::new();
    if !cell.conditions.is_empty() {
        let conditions: Vec<_> = cell
            .conditions
            .iter()
            .map(|c| format_condition(c, layout))
            .collect();
        text.push_str(&format!("if {} ", conditions.join(" && ")));
    }

    let actions: Vec<_> = cell.actions.iter().map(|a| format_action(a, layout)).collect();
    if actions.is_empty() {
        text.push_str("nop");
    } else {
        text.push_str(&actions.join("; "));
    }

    match cell.next {
        Some(next) => text.push_str(&format!(" -> {}", next)),
        None => text.push_str(" -> halt"),
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use trig_spec::{CellId, Modifier};

    const LAYOUT: Layout = Layout::DEFAULT;

    #[test]
    fn test_format_words() {
        assert_eq!(format_word(0x0100_0003, &LAYOUT), "r3");
        assert_eq!(format_word(0x1000_0007, &LAYOUT), "link(c7)");
        assert_eq!(format_word(0x400, &LAYOUT), "[0x400]");
        assert_eq!(format_target(&Target::Indirect(0x0100_0000), &LAYOUT), "*r0");
    }

    #[test]
    fn test_format_conditions() {
        let bit = Condition::bit_set(Target::Word(0x0100_0002), 5);
        assert_eq!(format_condition(&bit, &LAYOUT), "r2.bit5");

        let eq = Condition::new(Target::Word(0x0100_0002), Comparison::Exactly, 0);
        assert_eq!(format_condition(&eq, &LAYOUT), "r2 == 0");

        let masked = Condition::masked(Target::Indirect(0x0100_0000), Comparison::Exactly, 0, 0xFF00);
        assert_eq!(format_condition(&masked, &LAYOUT), "(*r0 & 0xff00) == 0");
    }

    #[test]
    fn test_format_actions() {
        let add = Action::add(Target::Indirect(0x0100_0001), Operand::Const(0x8000_0000));
        assert_eq!(format_action(&add, &LAYOUT), "*r1 += 0x80000000");

        let link = Action::set_link(CellId(4), CellId(9));
        assert_eq!(format_action(&link, &LAYOUT), "link(c4) = &c9");

        let byte = Action::masked(Target::Word(0x400), Modifier::SetTo, Operand::Const(7), 0xFF);
        assert_eq!(format_action(&byte, &LAYOUT), "[0x400] = 7 mask 0x000000ff");
    }

    #[test]
    fn test_format_cell() {
        let cell = Cell {
            conditions: vec![Condition::bit_set(Target::Word(0x400), 0)],
            actions: vec![Action::add(Target::Word(0x0100_0005), Operand::Const(1))],
            next: Some(CellId(3)),
        };
        assert_eq!(format_cell(&cell, &LAYOUT), "if [0x400].bit0 r5 += 1 -> c3");
        assert_eq!(format_cell(&Cell::default(), &LAYOUT), "nop -> halt");
    }
}
