//! schola-core: value representation, heap, and collector for the
//! Simp/Schola language (spec.md §3, §4.1, §4.2).
//!
//! # Modules
//!
//! - `value`: the tagged `Value` type and its type predicates.
//! - `heap`: the object slab, heap object variants, and the mark-and-sweep
//!   collector.
//! - `ops`: pair and arithmetic primitives that need `&mut Heap` access.
//! - `port`: the byte-oriented, line-counted, pushback-capable port handle.
//! - `error`: language-level error kinds and unrecoverable host failures.

pub mod error;
pub mod heap;
pub mod ops;
pub mod port;
pub mod value;

pub use error::{ErrorKind, HostError};
pub use heap::{
    ClosureObject, EnvId, EnvironmentObject, ExceptionObject, Heap, HeapId, HeapObject, SymbolId,
    VectorKind,
};
pub use port::{PortIo, PortMode, PortObject};
pub use value::{Opcode, Value};
