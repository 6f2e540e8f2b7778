//! Memory subsystem
//!
//! Sparse word bank. Absent words read as zero and writes of zero drop the
//! entry, so two memories compare equal when their visible contents do.

use std::collections::HashMap;
use trig_spec::{Modifier, Program, WordIndex};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    data: HashMap<WordIndex, u32>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory holding a program's initial image and link words
    pub fn from_program(program: &Program) -> Self {
        let mut memory = Self::new();
        for (&word, &value) in &program.image {
            memory.write(word, value);
        }
        for (word, value) in program.initial_links() {
            memory.write(word, value);
        }
        memory
    }

    #[inline]
    pub fn read(&self, word: WordIndex) -> u32 {
        self.data.get(&word).copied().unwrap_or(0)
    }

    pub fn write(&mut self, word: WordIndex, value: u32) {
        if value == 0 {
            self.data.remove(&word);
        } else {
            self.data.insert(word, value);
        }
    }

    /// Read-modify-write of the bits selected by `mask`
    pub fn modify(&mut self, word: WordIndex, modifier: Modifier, operand: u32, mask: u32) {
        let old = self.read(word);
        self.write(word, modifier.apply(old, operand, mask));
    }

    /// Byte at `byte_offset` (0..=3) of `word`
    pub fn read_byte(&self, word: WordIndex, byte_offset: u32) -> u8 {
        (self.read(word) >> (8 * (byte_offset & 3))) as u8
    }

    /// Number of non-zero words
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WordIndex, u32)> + '_ {
        self.data.iter().map(|(&w, &v)| (w, v))
    }
}
