//! # Emitter
//!
//! Arena of cells under construction.
//!
//! Cells refer to each other through [`CellRef`]: either a cell already in
//! the arena or a [`ForwardId`] that is bound once its target exists. All
//! references are resolved by [`Emitter::finish`], so a forward may also be
//! *re*bound when a shared network is regenerated in place; every reference
//! taken before the regeneration then lands on the new network.
//!
//! Cells are emitted into scopes. A cell emitted with [`Next::Fallthrough`]
//! continues at the next cell emitted in the same scope. The bottom scope is
//! the main chain of the program; shared networks are built in detached
//! scopes so their cells never fall into the caller's code.

use std::collections::{BTreeMap, HashMap};
use trig_spec::{Action, Cell, CellId, Condition, Program, Subroutine, WordIndex};

use crate::config::CodegenOptions;
use crate::error::{CodegenError, Result};
use crate::field::ChainCache;
use crate::muldiv::{DividerNetwork, RegisterStrides, StrideSet};
use crate::addressing::PointerCache;
use crate::readgen::ReaderCache;
use crate::value::Register;

/// Deferred reference to a cell that may not exist yet
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForwardId(usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CellRef {
    Cell(CellId),
    Forward(ForwardId),
}

impl From<CellId> for CellRef {
    fn from(id: CellId) -> Self {
        CellRef::Cell(id)
    }
}

impl From<ForwardId> for CellRef {
    fn from(f: ForwardId) -> Self {
        CellRef::Forward(f)
    }
}

pub type PendingCondition = Condition<CellRef>;
pub type PendingAction = Action<CellRef>;

/// Initial successor of an emitted cell
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Next {
    /// Next cell emitted in the same scope
    Fallthrough,
    To(CellRef),
    Halt,
}

#[derive(Clone, Debug)]
struct PendingCell {
    conditions: Vec<PendingCondition>,
    actions: Vec<PendingAction>,
    next: Next,
}

#[derive(Debug, Default)]
struct Scope {
    first: Option<CellId>,
    last: Option<CellId>,
    /// Forwards waiting for the next cell of this scope
    pending: Vec<ForwardId>,
    cells: Vec<CellId>,
}

#[derive(Debug)]
struct NetworkRecord {
    name: String,
    entries: Vec<CellRef>,
    body: Vec<CellId>,
    exit: Option<CellRef>,
}

/// Registers shared by every generated reader
#[derive(Copy, Clone, Debug)]
pub(crate) struct SharedRegisters {
    /// Word index of the source word of the current read
    pub cursor: Register,
    /// Word index of the register a bit chain accumulates into
    pub dest_slot: Register,
}

/// Cell arena and generation-time caches
pub struct Emitter {
    pub(crate) options: CodegenOptions,
    cells: Vec<PendingCell>,
    forwards: Vec<Option<CellId>>,
    scopes: Vec<Scope>,
    registers: u32,
    image: BTreeMap<WordIndex, u32>,
    networks: Vec<NetworkRecord>,
    network_index: HashMap<String, usize>,
    building: Vec<String>,

    pub(crate) shared: SharedRegisters,
    pub(crate) chains: ChainCache,
    pub(crate) readers: ReaderCache,
    pub(crate) pointers: HashMap<Register, PointerCache>,
    pub(crate) dividers: HashMap<StrideSet, DividerNetwork>,
    pub(crate) strides: HashMap<Register, RegisterStrides>,
}

impl Emitter {
    /// Create an emitter for a validated layout
    pub fn new(options: CodegenOptions) -> Result<Self> {
        options.layout.validate().map_err(trig_spec::SpecError::from)?;
        if options.layout.register_limit < 2 {
            return Err(CodegenError::RegistersExhausted(options.layout.register_limit));
        }
        Ok(Self::with_options(options))
    }

    fn with_options(options: CodegenOptions) -> Self {
        let cursor = Register::new(options.layout.register_word(0));
        let dest_slot = Register::new(options.layout.register_word(1));
        Self {
            options,
            cells: Vec::new(),
            forwards: Vec::new(),
            scopes: vec![Scope::default()],
            registers: 2,
            image: BTreeMap::new(),
            networks: Vec::new(),
            network_index: HashMap::new(),
            building: Vec::new(),
            shared: SharedRegisters { cursor, dest_slot },
            chains: ChainCache::default(),
            readers: ReaderCache::default(),
            pointers: HashMap::new(),
            dividers: HashMap::new(),
            strides: HashMap::new(),
        }
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    /// Number of cells emitted so far
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of distinct shared networks
    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    // ========== Registers ==========

    pub fn alloc_register(&mut self) -> Result<Register> {
        let layout = &self.options.layout;
        if self.registers >= layout.register_limit {
            return Err(CodegenError::RegistersExhausted(layout.register_limit));
        }
        let reg = Register::new(layout.register_word(self.registers));
        self.registers += 1;
        Ok(reg)
    }

    /// Allocate a register holding `value` when the program starts
    pub fn alloc_register_init(&mut self, value: u32) -> Result<Register> {
        let reg = self.alloc_register()?;
        if value != 0 {
            self.image.insert(reg.word(), value);
        }
        Ok(reg)
    }

    /// Set the initial value of a data word
    pub fn init_word(&mut self, word: WordIndex, value: u32) {
        if value == 0 {
            self.image.remove(&word);
        } else {
            self.image.insert(word, value);
        }
    }

    // ========== Forward references ==========

    pub fn forward(&mut self) -> ForwardId {
        self.forwards.push(None);
        ForwardId(self.forwards.len() - 1)
    }

    pub fn bind(&mut self, forward: ForwardId, cell: CellId) -> Result<()> {
        match self.forwards[forward.0] {
            Some(_) => Err(CodegenError::ForwardAlreadyBound(forward)),
            None => {
                self.forwards[forward.0] = Some(cell);
                Ok(())
            }
        }
    }

    /// Point an already bound forward at a new cell
    pub fn rebind(&mut self, forward: ForwardId, cell: CellId) {
        self.forwards[forward.0] = Some(cell);
    }

    /// Bind `forward` to the next cell emitted in the current scope
    pub fn bind_next(&mut self, forward: ForwardId) {
        self.scope_mut().pending.push(forward);
    }

    pub fn is_bound(&self, forward: ForwardId) -> bool {
        self.forwards[forward.0].is_some()
    }

    // ========== Cells ==========

    fn scope_mut(&mut self) -> &mut Scope {
        let top = self.scopes.len() - 1;
        &mut self.scopes[top]
    }

    /// Emit a cell that falls through to the next cell of the scope
    pub fn emit(
        &mut self,
        conditions: Vec<PendingCondition>,
        actions: Vec<PendingAction>,
    ) -> CellId {
        self.emit_with_next(conditions, actions, Next::Fallthrough)
    }

    pub fn emit_with_next(
        &mut self,
        conditions: Vec<PendingCondition>,
        actions: Vec<PendingAction>,
        next: Next,
    ) -> CellId {
        let id = CellId(self.cells.len() as u32);
        self.cells.push(PendingCell {
            conditions,
            actions,
            next,
        });

        let scope = self.scopes.len() - 1;
        if let Some(last) = self.scopes[scope].last {
            let prev = &mut self.cells[last.index()];
            if prev.next == Next::Fallthrough {
                prev.next = Next::To(CellRef::Cell(id));
            }
        }
        let pending = std::mem::take(&mut self.scopes[scope].pending);
        for forward in pending {
            self.forwards[forward.0] = Some(id);
        }

        let scope = &mut self.scopes[scope];
        scope.first.get_or_insert(id);
        scope.last = Some(id);
        scope.cells.push(id);
        id
    }

    /// Emit an empty cell continuing at `target`
    pub fn jump(&mut self, target: CellRef) -> CellId {
        self.emit_with_next(vec![], vec![], Next::To(target))
    }

    /// Replace the initial successor of an emitted cell
    pub fn set_next(&mut self, cell: CellId, next: Next) {
        self.cells[cell.index()].next = next;
    }

    // ========== Scopes and shared networks ==========

    fn close_scope(&mut self) -> Scope {
        if !self.scope_mut().pending.is_empty() {
            self.emit_with_next(vec![], vec![], Next::Halt);
        }
        // the main scope is never popped
        if self.scopes.len() > 1 {
            self.scopes.pop().unwrap_or_default()
        } else {
            std::mem::take(&mut self.scopes[0])
        }
    }

    /// Run `f` in a fresh detached scope
    pub fn detached<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push(Scope::default());
        let result = f(self);
        self.close_scope();
        result
    }

    /// Build (part of) a shared network named `name` in a detached scope.
    ///
    /// Cells emitted by `f` are recorded as the network's body. Calling this
    /// again with the same name extends the body.
    pub(crate) fn network<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.building.iter().any(|n| n == name) {
            return Err(CodegenError::Reentrant(name.to_string()));
        }
        self.building.push(name.to_string());
        self.scopes.push(Scope::default());

        let result = f(self);

        let scope = self.close_scope();
        self.building.pop();
        let record = self.record_mut(name);
        record.body.extend(scope.cells);
        result
    }

    fn record_mut(&mut self, name: &str) -> &mut NetworkRecord {
        let index = match self.network_index.get(name) {
            Some(&i) => i,
            None => {
                self.networks.push(NetworkRecord {
                    name: name.to_string(),
                    entries: Vec::new(),
                    body: Vec::new(),
                    exit: None,
                });
                let i = self.networks.len() - 1;
                self.network_index.insert(name.to_string(), i);
                i
            }
        };
        &mut self.networks[index]
    }

    pub(crate) fn set_network_exit(&mut self, name: &str, exit: CellRef) {
        self.record_mut(name).exit = Some(exit);
    }

    /// Forget the body of a network about to be regenerated.
    /// Entries are kept; they are forwards that follow the regeneration.
    pub(crate) fn reset_network(&mut self, name: &str) {
        self.record_mut(name).body.clear();
    }

    /// Call a shared network and continue after it returns.
    ///
    /// Emits one cell that runs `setup`, patches the network's exit to the
    /// continuation and jumps to `entry`. The network must not be entered
    /// again until its exit has run.
    pub fn call(
        &mut self,
        name: &str,
        entry: CellRef,
        exit: CellRef,
        mut setup: Vec<PendingAction>,
    ) -> Result<()> {
        if self.building.iter().any(|n| n == name) {
            return Err(CodegenError::Reentrant(name.to_string()));
        }
        let record = self.record_mut(name);
        if !record.entries.contains(&entry) {
            record.entries.push(entry);
        }

        let cont = self.forward();
        setup.push(Action::set_link(exit, CellRef::Forward(cont)));
        self.emit_with_next(vec![], setup, Next::To(entry));
        self.bind_next(cont);
        Ok(())
    }

    // ========== Finish ==========

    fn resolve(&self, cell: CellRef) -> Result<CellId> {
        match cell {
            CellRef::Cell(id) => Ok(id),
            CellRef::Forward(f) => self.forwards[f.0].ok_or(CodegenError::UnboundForward(f)),
        }
    }

    /// Resolve every reference and produce a validated program
    pub fn finish(mut self) -> Result<Program> {
        while self.scopes.len() > 1 {
            self.close_scope();
        }
        let main = self.close_scope();

        let mut resolve = |c: CellRef| self.resolve(c);
        let mut cells = Vec::with_capacity(self.cells.len());
        for pending in &self.cells {
            let conditions = pending
                .conditions
                .iter()
                .map(|c| c.map_cells(&mut resolve))
                .collect::<Result<Vec<_>>>()?;
            let actions = pending
                .actions
                .iter()
                .map(|a| a.map_cells(&mut resolve))
                .collect::<Result<Vec<_>>>()?;
            let next = match pending.next {
                Next::Fallthrough | Next::Halt => None,
                Next::To(target) => Some(resolve(target)?),
            };
            cells.push(Cell {
                conditions,
                actions,
                next,
            });
        }

        let mut subroutines = Vec::new();
        for record in &self.networks {
            let Some(exit) = record.exit else { continue };
            let mut entries = Vec::new();
            for &entry in &record.entries {
                let id = resolve(entry)?;
                if !entries.contains(&id) {
                    entries.push(id);
                }
            }
            subroutines.push(Subroutine {
                name: record.name.clone(),
                entries,
                body: record.body.clone(),
                exit: resolve(exit)?,
            });
        }

        let program = Program {
            layout: self.options.layout,
            cells,
            image: std::mem::take(&mut self.image),
            entry: main.first,
            subroutines,
        };
        program.validate()?;
        tracing::debug!(
            cells = program.cells.len(),
            networks = program.subroutines.len(),
            "program finished"
        );
        Ok(program)
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::with_options(CodegenOptions::default())
    }
}
