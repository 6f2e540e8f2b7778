//! # Memory Layout Configuration
//!
//! The substrate has a single flat bank of words. Generated code needs two
//! reserved regions inside it: one for dynamically allocated registers and one
//! holding the successor link word of every cell. User data lives anywhere
//! outside those regions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cell::{CellId, WordIndex};

/// Placement of the reserved word regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layout {
    /// First register word
    pub register_base: WordIndex,
    /// Number of register words
    pub register_limit: u32,
    /// Link word of cell 0
    pub link_base: WordIndex,
    /// Maximum number of cells
    pub cell_limit: u32,
}

impl Layout {
    /// Default layout
    /// - Registers: 0x0100_0000 .. 0x0110_0000 (1M registers)
    /// - Links:     0x1000_0000 .. 0x1100_0000 (16M cells)
    pub const DEFAULT: Self = Self {
        register_base: 0x0100_0000,
        register_limit: 0x0010_0000,
        link_base: 0x1000_0000,
        cell_limit: 0x0100_0000,
    };

    /// Create a new layout with validation
    pub const fn new(
        register_base: WordIndex,
        register_limit: u32,
        link_base: WordIndex,
        cell_limit: u32,
    ) -> Result<Self, ConfigError> {
        let layout = Self {
            register_base,
            register_limit,
            link_base,
            cell_limit,
        };
        match layout.check() {
            Ok(()) => Ok(layout),
            Err(e) => Err(e),
        }
    }

    const fn check(&self) -> Result<(), ConfigError> {
        if self.register_limit == 0 {
            return Err(ConfigError::EmptyRegisterRegion);
        }
        if self.cell_limit == 0 {
            return Err(ConfigError::EmptyCellRegion);
        }
        let register_end = match self.register_base.checked_add(self.register_limit) {
            Some(end) => end,
            None => return Err(ConfigError::RegionOverflow),
        };
        let link_end = match self.link_base.checked_add(self.cell_limit) {
            Some(end) => end,
            None => return Err(ConfigError::RegionOverflow),
        };
        if self.register_base < link_end && self.link_base < register_end {
            return Err(ConfigError::Overlap);
        }
        Ok(())
    }

    /// Validate layout
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check()
    }

    /// Word holding the successor pointer of `cell`
    #[inline]
    pub const fn link_word(&self, cell: CellId) -> WordIndex {
        self.link_base + cell.0
    }

    /// Word of the `n`-th register
    #[inline]
    pub const fn register_word(&self, n: u32) -> WordIndex {
        self.register_base + n
    }

    #[inline]
    pub const fn is_register(&self, word: WordIndex) -> bool {
        word >= self.register_base && word - self.register_base < self.register_limit
    }

    #[inline]
    pub const fn is_link(&self, word: WordIndex) -> bool {
        word >= self.link_base && word - self.link_base < self.cell_limit
    }

    /// Cell whose link word is `word`
    pub fn cell_of_link(&self, word: WordIndex) -> Option<CellId> {
        self.is_link(word).then(|| CellId(word - self.link_base))
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Layout {{ registers: {:#010x}+{}, links: {:#010x}+{} }}",
            self.register_base, self.register_limit, self.link_base, self.cell_limit,
        )
    }
}

/// Layout error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Register region must hold at least one word
    EmptyRegisterRegion,
    /// Link region must hold at least one word
    EmptyCellRegion,
    /// A region runs past the end of the address space
    RegionOverflow,
    /// Register and link regions intersect
    Overlap,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyRegisterRegion => write!(f, "register_limit must be nonzero"),
            ConfigError::EmptyCellRegion => write!(f, "cell_limit must be nonzero"),
            ConfigError::RegionOverflow => {
                write!(f, "region extends past the end of the word space")
            }
            ConfigError::Overlap => write!(f, "register and link regions overlap"),
        }
    }
}

impl std::error::Error for ConfigError {}
