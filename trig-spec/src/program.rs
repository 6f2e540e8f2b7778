//! # Program Image
//!
//! A finished program: the cell arena, the initial memory image and metadata
//! about shared networks.
//!
//! Binary format:
//! ```text
//! Offset  Size  Field
//! ──────────────────────────────────
//! 0x00    4     magic ("TRGC")
//! 0x04    4     version
//! 0x08    ..    bincode payload
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::cell::{Cell, CellId, WordIndex};
use crate::config::Layout;
use crate::error::{Result, SpecError};

/// Magic number for program files: "TRGC" = 0x54524743
pub const MAGIC: u32 = 0x5452_4743;

/// Version: 1.0 = 0x00010000
pub const VERSION: u32 = 0x0001_0000;

const HEADER_SIZE: usize = 8;

/// Shared network entered through a call/return convention.
///
/// The network is *active* from the moment control reaches one of `entries`
/// from outside `body` until `exit` runs. Entering it again while active is
/// reentrancy, which the substrate cannot support.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subroutine {
    pub name: String,
    pub entries: Vec<CellId>,
    pub body: Vec<CellId>,
    pub exit: CellId,
}

/// Complete program
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub layout: Layout,

    /// Cell arena, indexed by [`CellId`]
    pub cells: Vec<Cell>,

    /// Initial values of non-zero data words
    pub image: BTreeMap<WordIndex, u32>,

    /// First cell to run; `None` for an empty program
    pub entry: Option<CellId>,

    pub subroutines: Vec<Subroutine>,
}

impl Program {
    /// Create a new empty program
    pub fn new() -> Self {
        Self::with_layout(Layout::DEFAULT)
    }

    pub fn with_layout(layout: Layout) -> Self {
        Self {
            layout,
            cells: Vec::new(),
            image: BTreeMap::new(),
            entry: None,
            subroutines: Vec::new(),
        }
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id.index())
    }

    /// Initial contents of every link word
    pub fn initial_links(&self) -> impl Iterator<Item = (WordIndex, u32)> + '_ {
        self.cells.iter().enumerate().map(|(i, cell)| {
            let id = CellId(i as u32);
            let value = cell.next.map(CellId::link_value).unwrap_or(crate::cell::LINK_HALT);
            (self.layout.link_word(id), value)
        })
    }

    fn check_cell(&self, id: CellId) -> bool {
        id.index() < self.cells.len()
    }

    /// Validate the program
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;

        if self.cells.len() > self.layout.cell_limit as usize {
            return Err(SpecError::TooManyCells {
                count: self.cells.len(),
                limit: self.layout.cell_limit,
            });
        }

        for (i, cell) in self.cells.iter().enumerate() {
            if let Some(missing) = cell.referenced_cells().find(|&c| !self.check_cell(c)) {
                return Err(SpecError::UnknownCell {
                    cell: CellId(i as u32),
                    missing,
                });
            }
        }

        if let Some(entry) = self.entry {
            if !self.check_cell(entry) {
                return Err(SpecError::InvalidEntry(entry));
            }
        }

        if let Some(&word) = self.image.keys().find(|&&w| self.layout.is_link(w)) {
            return Err(SpecError::ImageTouchesLinks { word });
        }

        for sub in &self.subroutines {
            let all = sub.entries.iter().chain(&sub.body).chain(std::iter::once(&sub.exit));
            for &cell in all {
                if !self.check_cell(cell) {
                    return Err(SpecError::InvalidSubroutine {
                        name: sub.name.clone(),
                        cell,
                    });
                }
            }
        }

        Ok(())
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend(bincode::serialize(self)?);
        Ok(bytes)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(SpecError::Truncated(bytes.len()));
        }
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != MAGIC {
            return Err(SpecError::InvalidMagic(magic));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != VERSION {
            return Err(SpecError::InvalidVersion {
                expected: VERSION,
                found: version,
            });
        }

        let program: Program = bincode::deserialize(&bytes[HEADER_SIZE..])?;
        program.validate()?;
        Ok(program)
    }

    /// SHA-256 of the serialized program.
    ///
    /// Two generation runs that emit the same networks produce the same digest.
    pub fn digest(&self) -> Result<[u8; 32]> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_bytes()?);
        Ok(hasher.finalize().into())
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trigger Program v1.0")?;
        writeln!(f, "  {}", self.layout)?;
        writeln!(f, "  Cells:       {}", self.cells.len())?;
        writeln!(f, "  Image words: {}", self.image.len())?;
        match self.entry {
            Some(entry) => writeln!(f, "  Entry:       {}", entry)?,
            None => writeln!(f, "  Entry:       (none)")?,
        }
        writeln!(f, "  Subroutines: {}", self.subroutines.len())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Action, Operand, Target};

    fn two_cell_program() -> Program {
        let mut program = Program::new();
        program.cells.push(Cell {
            conditions: vec![],
            actions: vec![Action::set(Target::Word(0x10), Operand::Const(7))],
            next: Some(CellId(1)),
        });
        program.cells.push(Cell::default());
        program.entry = Some(CellId(0));
        program.image.insert(0x20, 99);
        program
    }

    #[test]
    fn test_program_serialization() {
        let program = two_cell_program();
        let bytes = program.to_bytes().unwrap();
        let decoded = Program::from_bytes(&bytes).unwrap();
        assert_eq!(program, decoded);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = two_cell_program().to_bytes().unwrap();
        bytes[0] ^= 0xFF;
        assert!(matches!(Program::from_bytes(&bytes), Err(SpecError::InvalidMagic(_))));
        assert!(matches!(Program::from_bytes(&[1, 2]), Err(SpecError::Truncated(2))));
    }

    #[test]
    fn test_validation_catches_dangling_link() {
        let mut program = two_cell_program();
        program.cells[1].next = Some(CellId(5));
        assert!(matches!(
            program.validate(),
            Err(SpecError::UnknownCell { cell: CellId(1), missing: CellId(5) })
        ));
    }

    #[test]
    fn test_validation_rejects_link_words_in_image() {
        let mut program = two_cell_program();
        let word = program.layout.link_word(CellId(0));
        program.image.insert(word, 1);
        assert!(matches!(program.validate(), Err(SpecError::ImageTouchesLinks { .. })));
    }

    #[test]
    fn test_initial_links() {
        let program = two_cell_program();
        let links: Vec<_> = program.initial_links().collect();
        assert_eq!(links[0], (program.layout.link_word(CellId(0)), 2));
        assert_eq!(links[1], (program.layout.link_word(CellId(1)), 0));
    }

    #[test]
    fn test_digest_is_stable() {
        let a = two_cell_program();
        let b = two_cell_program();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());

        let mut c = two_cell_program();
        c.image.insert(0x21, 1);
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
    }
}
