//! # Trigger Code Generation
//!
//! Memory-access code generation and addressing for guarded-cell programs.
//!
//! The substrate has no arithmetic beyond masked set/add/subtract and no
//! control transfer beyond rewriting successor links. Everything here turns
//! requests like "read the word field at this runtime byte pointer" into
//! networks of guarded cells, and shares those networks between every
//! request that can use them.
//!
//! ## Layers
//!
//! - [`emitter`]: cell arena, forward references, scopes, call/return
//! - [`control`]: conditional branches and constant-case dispatch
//! - [`addressing`]: byte pointers to `(word, sub-word offset)`, cached per register
//! - [`field`]: byte/word/dword reads and writes over shared bit chains
//! - [`readgen`]: mask-driven multi-output readers
//! - [`muldiv`]: runtime `index * stride / 4` for array strides
//! - [`member`] and [`record`]: named members of structs and arrays
//!
//! ## Example
//!
//! ```rust,no_run
//! use trig_codegen::{Emitter, Member, MemberKind, RecordType};
//!
//! let unit = RecordType::new("Unit", 1699)
//!     .with_member("hp", Member::field(0x08, MemberKind::Dword).unwrap());
//! let mut em = Emitter::default();
//! let hp = unit.at(0x400u32).get(&mut em, "hp").unwrap();
//! let program = em.finish().unwrap();
//! println!("{} cells, hp in {}", program.cells.len(), hp);
//! ```
//!
//! ## Shared networks
//!
//! A shared network is entered through a call cell that patches the
//! network's exit link to the caller's continuation. There is no stack: a
//! network must not be entered again before its exit has run. The emitter
//! refuses to call a network while building it, and the interpreter in
//! `trig-runtime` halts when a running network is re-entered.

pub mod addressing;
pub mod config;
pub mod control;
pub mod emitter;
pub mod error;
pub mod field;
pub mod member;
pub mod muldiv;
pub mod readgen;
pub mod record;
pub mod value;

pub use config::CodegenOptions;
pub use emitter::{CellRef, Emitter, ForwardId, Next, PendingAction, PendingCondition};
pub use error::{CodegenError, ErrorCategory, Result};
pub use field::{ScanOrder, Width, CHAIN_NETWORK};
pub use member::{Member, MemberKind, MemberLayout};
pub use muldiv::{StrideOutputs, StrideSet};
pub use readgen::{BitTransform, ReaderHandle};
pub use record::{Record, RecordType};
pub use value::{Register, Value};
