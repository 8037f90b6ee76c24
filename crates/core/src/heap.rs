//! Heap / garbage collector (spec §4.1).
//!
//! The C prototypes track heap blocks on an intrusive doubly-linked list
//! threaded through each block's header and splice blocks between a
//! `scan`/`live` pair of lists as `mark` walks the object graph. spec.md §9
//! explicitly allows trading that link discipline for "a single arena or
//! hashtable of live blocks", as long as the two-set partitioning invariant
//! holds. We keep a single slab (`Vec<Slot>`) indexed by [`HeapId`] and use
//! a per-slot mark bit instead of physical list membership: a slot whose
//! mark equals the collector's current color is logically in the *live*
//! set, everything else is logically in the *scan* set, for the duration of
//! a collection. This reproduces the same observable partition with O(1)
//! slot access instead of pointer splicing.

use crate::error::{ErrorKind, HostError};
use crate::value::Value;
use std::fmt;
use tracing::trace;

/// An index into the heap's object slab. Stable for the lifetime of the
/// object it names; never reused while that object is reachable, because
/// reuse only happens after `sweep` has proven the old occupant unreachable.
pub type HeapId = usize;

/// A symbol is interned string content; `SymbolId` documents that a
/// [`HeapId`] is being used in that role.
pub type SymbolId = HeapId;
/// An environment frame chain head, named for clarity at call sites.
pub type EnvId = HeapId;

/// Distinguishes a cons cell from a literal array. Both read as a §3
/// "Vector: N values, indexable", but only a `List`-kind vector is a
/// *pair*: `car`/`cdr`/`pair?`/`set-car!`/`set-cdr!` (§4.2, §4.5) are
/// defined on `List`-kind vectors only, and the two print differently
/// (`(a . b)` vs `[a b]`) — a two-element literal array `[a b]` and the
/// cons pair `(a . b)` would otherwise be structurally identical. Set once
/// at construction by whichever of `reader`'s two notations built the
/// vector; never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKind {
    /// Built by `(`/`)`: always exactly two slots, `[car, cdr]`.
    List,
    /// Built by `[`/`]`: any length, no pair semantics.
    Literal,
}

/// One object's payload, tagged by which Value variant(s) reference it.
pub enum HeapObject {
    Str(Vec<u8>),
    /// Backing storage for an interned symbol. Kept as its own variant
    /// (rather than reusing `Str`) so the symbol table can be sure nothing
    /// but `contextintern` ever creates one.
    Symbol(Vec<u8>),
    Vector {
        kind: VectorKind,
        items: Vec<Value>,
    },
    Port(crate::port::PortObject),
    Closure(ClosureObject),
    Environment(EnvironmentObject),
    Exception(ExceptionObject),
}

/// A closure: either an applicative (arguments pre-evaluated) or an
/// operative (arguments passed literally, caller's environment bound to the
/// first parameter). Spec §4.5.
pub struct ClosureObject {
    pub operative: bool,
    /// The parameter pattern: a proper list of symbols (possibly dotted,
    /// i.e. ending in a bare symbol for the variadic tail), or nil.
    pub params: Value,
    /// Body expressions, in source order.
    pub body: Vec<Value>,
    pub env: EnvId,
}

/// A single environment frame: alternating bindings plus a parent link.
/// Spec §3: "A frame is a vector of alternating symbol and value slots."
/// We store that as `Vec<(SymbolId, Value)>` rather than a flat
/// `Vec<Value>` — equivalent content, friendlier to index by name.
pub struct EnvironmentObject {
    pub bindings: Vec<(SymbolId, Value)>,
    pub parent: Option<EnvId>,
}

impl EnvironmentObject {
    pub fn lookup(&self, symbol: SymbolId) -> Option<Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(s, _)| *s == symbol)
            .map(|(_, v)| *v)
    }

    /// `define`/parameter-binding semantics: shadow any existing binding of
    /// the same symbol in this frame rather than pushing a duplicate.
    pub fn set(&mut self, symbol: SymbolId, value: Value) {
        if let Some(slot) = self.bindings.iter_mut().find(|(s, _)| *s == symbol) {
            slot.1 = value;
        } else {
            self.bindings.push((symbol, value));
        }
    }
}

/// A first-class exception value (§7): a kind plus an optional payload,
/// e.g. the offending expression.
pub struct ExceptionObject {
    pub kind: ErrorKind,
    pub payload: Option<Value>,
}

impl HeapObject {
    /// Values directly reachable from this object, for `mark`'s worklist.
    fn children(&self, push: &mut impl FnMut(Value)) {
        match self {
            HeapObject::Str(_) | HeapObject::Symbol(_) | HeapObject::Port(_) => {}
            HeapObject::Vector { items, .. } => {
                for v in items {
                    push(*v);
                }
            }
            HeapObject::Closure(c) => {
                push(c.params);
                for v in &c.body {
                    push(*v);
                }
                push(Value::Environment(c.env));
            }
            HeapObject::Environment(e) => {
                for (sym, v) in &e.bindings {
                    push(Value::Symbol(*sym));
                    push(*v);
                }
                if let Some(parent) = e.parent {
                    push(Value::Environment(parent));
                }
            }
            HeapObject::Exception(e) => {
                if let Some(payload) = e.payload {
                    push(payload);
                }
            }
        }
    }

    /// Rough payload size in bytes, for the GC-pressure threshold.
    fn approx_size(&self) -> usize {
        match self {
            HeapObject::Str(b) | HeapObject::Symbol(b) => b.len(),
            HeapObject::Vector { items, .. } => items.len() * std::mem::size_of::<Value>(),
            HeapObject::Port(_) => std::mem::size_of::<crate::port::PortObject>(),
            HeapObject::Closure(c) => {
                c.body.len() * std::mem::size_of::<Value>()
                    + std::mem::size_of::<ClosureObject>()
            }
            HeapObject::Environment(e) => {
                e.bindings.len() * std::mem::size_of::<(SymbolId, Value)>()
            }
            HeapObject::Exception(_) => std::mem::size_of::<ExceptionObject>(),
        }
    }
}

impl fmt::Debug for HeapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapObject::Str(_) => write!(f, "Str"),
            HeapObject::Symbol(b) => write!(f, "Symbol({:?})", String::from_utf8_lossy(b)),
            HeapObject::Vector { kind, items } => {
                write!(f, "Vector(kind={kind:?}, len={})", items.len())
            }
            HeapObject::Port(_) => write!(f, "Port"),
            HeapObject::Closure(c) => write!(f, "Closure(operative={})", c.operative),
            HeapObject::Environment(e) => write!(f, "Environment(n={})", e.bindings.len()),
            HeapObject::Exception(e) => write!(f, "Exception({:?})", e.kind),
        }
    }
}

enum Slot {
    Occupied { mark: i8, object: HeapObject },
    Free { next_free: Option<usize> },
}

/// The heap: allocates, tracks, and reclaims [`HeapObject`]s via
/// mark-and-sweep.
pub struct Heap {
    slots: Vec<Slot>,
    free_head: Option<usize>,
    /// Alternates between +1 and -1 across collections (spec §4.1) so that
    /// "already marked this cycle" can be tested without resetting every
    /// object's bit in between.
    mark_color: i8,
    bytes_allocated: usize,
    max_objects: Option<usize>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            slots: Vec::new(),
            free_head: None,
            mark_color: 1,
            bytes_allocated: 0,
            max_objects: None,
        }
    }

    /// Bound the number of live heap objects, purely so `OutOfMemory` is
    /// exercisable in tests; unbounded (`None`) in normal operation, since a
    /// real allocator failure in Rust aborts the process rather than
    /// returning an error.
    pub fn with_object_cap(mut self, cap: usize) -> Self {
        self.max_objects = Some(cap);
        self
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Occupied { .. }))
            .count()
    }

    fn get(&self, id: HeapId) -> &HeapObject {
        match &self.slots[id] {
            Slot::Occupied { object, .. } => object,
            Slot::Free { .. } => panic!("dangling HeapId {id}: GC invariant violated"),
        }
    }

    fn get_mut(&mut self, id: HeapId) -> &mut HeapObject {
        match &mut self.slots[id] {
            Slot::Occupied { object, .. } => object,
            Slot::Free { .. } => panic!("dangling HeapId {id}: GC invariant violated"),
        }
    }

    pub fn object(&self, id: HeapId) -> &HeapObject {
        self.get(id)
    }

    pub fn object_mut(&mut self, id: HeapId) -> &mut HeapObject {
        self.get_mut(id)
    }

    /// Allocate a new heap object, mark-zeroed (the mark is the collector's
    /// *previous* color, i.e. freshly allocated objects start in the "scan"
    /// partition and must survive one `collect` by being reachable from a
    /// root, same as the source's `MARK_ZERO` starting state).
    pub fn allocate(&mut self, object: HeapObject) -> Result<HeapId, HostError> {
        if let Some(cap) = self.max_objects
            && self.live_count() >= cap
        {
            return Err(HostError::OutOfMemory);
        }
        self.bytes_allocated += object.approx_size();
        let slot = Slot::Occupied {
            mark: self.mark_color.wrapping_neg(),
            object,
        };
        let id = if let Some(free) = self.free_head {
            let next_free = match &self.slots[free] {
                Slot::Free { next_free } => *next_free,
                Slot::Occupied { .. } => unreachable!("free list points at occupied slot"),
            };
            self.free_head = next_free;
            self.slots[free] = slot;
            free
        } else {
            self.slots.push(slot);
            self.slots.len() - 1
        };
        trace!(id, "heap allocate");
        Ok(id)
    }

    /// Mark-and-sweep collection from the given root values (spec §4.1).
    /// Uses an explicit worklist rather than recursion, per spec §9, to
    /// bound stack usage on long vectors/environment chains.
    pub fn collect(&mut self, roots: &[Value]) {
        let mut worklist: Vec<Value> = roots.to_vec();
        let mut scanned = 0usize;
        while let Some(value) = worklist.pop() {
            let Some(id) = value.heap_id() else {
                continue;
            };
            let already_marked = match &self.slots[id] {
                Slot::Occupied { mark, .. } => *mark == self.mark_color,
                Slot::Free { .. } => continue,
            };
            if already_marked {
                continue;
            }
            if let Slot::Occupied { mark, .. } = &mut self.slots[id] {
                *mark = self.mark_color;
            }
            scanned += 1;
            self.get(id).children(&mut |child| worklist.push(child));
        }
        let mut freed = 0usize;
        for (id, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Occupied { mark, object } = slot
                && *mark != self.mark_color
            {
                self.bytes_allocated = self
                    .bytes_allocated
                    .saturating_sub(object.approx_size());
                freed += 1;
                *slot = Slot::Free {
                    next_free: self.free_head,
                };
                self.free_head = Some(id);
            }
        }
        trace!(scanned, freed, "gc collect");
        self.mark_color = self.mark_color.wrapping_neg();
    }

    /// Unconditionally release every tracked object, e.g. at context
    /// teardown.
    pub fn shutdown(&mut self) {
        self.slots.clear();
        self.free_head = None;
        self.bytes_allocated = 0;
    }
}

impl Value {
    /// The slab index this value refers to, if it is heap-resident.
    pub fn heap_id(self) -> Option<HeapId> {
        match self {
            Value::String(id)
            | Value::Symbol(id)
            | Value::Vector(id)
            | Value::Port(id)
            | Value::Closure(id)
            | Value::Environment(id)
            | Value::Exception(id) => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_collect_frees_unreachable() {
        let mut heap = Heap::new();
        let a = heap.allocate(HeapObject::Str(b"a".to_vec())).unwrap();
        let _b = heap.allocate(HeapObject::Str(b"b".to_vec())).unwrap();
        assert_eq!(heap.live_count(), 2);
        heap.collect(&[Value::String(a)]);
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn collect_keeps_transitively_reachable_vector_elements() {
        let mut heap = Heap::new();
        let s = heap.allocate(HeapObject::Str(b"x".to_vec())).unwrap();
        let v = heap
            .allocate(HeapObject::Vector {
                kind: VectorKind::Literal,
                items: vec![Value::String(s)],
            })
            .unwrap();
        heap.collect(&[Value::Vector(v)]);
        assert_eq!(heap.live_count(), 2);
    }

    #[test]
    fn mark_color_flips_each_collection_without_reset() {
        let mut heap = Heap::new();
        let a = heap.allocate(HeapObject::Str(b"a".to_vec())).unwrap();
        heap.collect(&[Value::String(a)]);
        heap.collect(&[Value::String(a)]);
        assert_eq!(heap.live_count(), 1, "a survives two consecutive cycles");
    }

    #[test]
    fn object_cap_surfaces_out_of_memory() {
        let mut heap = Heap::new().with_object_cap(1);
        heap.allocate(HeapObject::Str(b"a".to_vec())).unwrap();
        let err = heap.allocate(HeapObject::Str(b"b".to_vec()));
        assert!(matches!(err, Err(HostError::OutOfMemory)));
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = Heap::new();
        let a = heap.allocate(HeapObject::Str(b"a".to_vec())).unwrap();
        heap.collect(&[]);
        assert_eq!(heap.live_count(), 0);
        let b = heap.allocate(HeapObject::Str(b"b".to_vec())).unwrap();
        assert_eq!(a, b, "freed slot index is recycled");
    }
}
