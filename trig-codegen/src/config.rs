//! Code generation options

use trig_spec::Layout;

/// Emitter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Memory layout of the generated program
    pub layout: Layout,

    /// Largest index space supported for a dynamically indexed array.
    /// A register whose maximum index value reaches this is rejected.
    pub array_capacity: u32,

    /// Build the full-dword and `0xFFFFFF00` bit chains on first use of the
    /// field reader so later reads can share them
    pub seed_chains: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            layout: Layout::DEFAULT,
            array_capacity: 1024,
            seed_chains: true,
        }
    }
}
