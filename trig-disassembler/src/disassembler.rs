//! Program listings

use std::collections::HashMap;
use std::io::Write;
use trig_spec::{CellId, Program};

use crate::error::Result;
use crate::formatter::{format_cell, format_word};

/// Disassemble a program into listing text
pub fn disassemble(program: &Program) -> Result<String> {
    let mut output = String::new();
    let layout = &program.layout;

    output.push_str("; trigger program\n");
    output.push_str(&format!("; {}\n", layout));
    match program.entry {
        Some(entry) => output.push_str(&format!("; entry: {}\n", entry)),
        None => output.push_str("; entry: none\n"),
    }
    output.push_str(&format!(
        "; {} cells, {} networks\n",
        program.cells.len(),
        program.subroutines.len()
    ));

    if !program.image.is_empty() {
        output.push_str("\n; image\n");
        for (&word, &value) in &program.image {
            output.push_str(&format!("{:<14} = {:#010x}\n", format_word(word, layout), value));
        }
    }

    // labels for network entries and exits
    let mut labels: HashMap<CellId, Vec<String>> = HashMap::new();
    for sub in &program.subroutines {
        for &entry in &sub.entries {
            labels.entry(entry).or_default().push(format!("{}:", sub.name));
        }
        labels
            .entry(sub.exit)
            .or_default()
            .push(format!("{}.exit:", sub.name));
    }

    output.push('\n');
    for (i, cell) in program.cells.iter().enumerate() {
        let id = CellId(i as u32);
        if let Some(names) = labels.get(&id) {
            for name in names {
                output.push_str(name);
                output.push('\n');
            }
        }
        output.push_str(&format!("{:>6}:  {}\n", id.to_string(), format_cell(cell, layout)));
    }

    Ok(output)
}

/// Decode program bytes and disassemble them
pub fn disassemble_bytes(bytes: &[u8]) -> Result<String> {
    let program = Program::from_bytes(bytes)?;
    disassemble(&program)
}

/// Write the listing of `program` to `out`
pub fn write_listing(program: &Program, mut out: impl Write) -> Result<()> {
    out.write_all(disassemble(program)?.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trig_spec::{Action, Cell, Operand, Subroutine, Target};

    fn sample() -> Program {
        let mut program = Program::new();
        program.cells.push(Cell {
            conditions: vec![],
            actions: vec![Action::set(Target::Word(0x400), Operand::Const(1))],
            next: Some(CellId(1)),
        });
        program.cells.push(Cell::default());
        program.entry = Some(CellId(0));
        program.image.insert(0x0100_0002, 0x20);
        program.subroutines.push(Subroutine {
            name: "reader#0".to_string(),
            entries: vec![CellId(1)],
            body: vec![CellId(1)],
            exit: CellId(1),
        });
        program
    }

    #[test]
    fn test_disassemble_simple() {
        let asm = disassemble(&sample()).unwrap();
        assert!(asm.contains("; entry: c0"));
        assert!(asm.contains("; 2 cells, 1 networks"));
        assert!(asm.contains("[0x400] = 1 -> c1"));
        assert!(asm.contains("reader#0:\n"));
        assert!(asm.contains("reader#0.exit:\n"));
        assert!(asm.contains("r2"));
    }

    #[test]
    fn test_bytes_and_writer() {
        let program = sample();
        let from_bytes = disassemble_bytes(&program.to_bytes().unwrap()).unwrap();
        assert_eq!(from_bytes, disassemble(&program).unwrap());

        let mut out = Vec::new();
        write_listing(&program, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), from_bytes);

        assert!(disassemble_bytes(&[0, 1, 2]).is_err());
    }
}
