//! Value: the tagged value spec.md §3 describes.
//!
//! spec.md §9 explicitly permits trading the source's pointer-tagged,
//! 4-byte-aligned encoding for "a discriminated-union value type ... at the
//! cost of 1–2 extra words per value; alignment tricks are optional, not
//! contractual." We take that option: `Value` is a plain Rust enum, `Copy`
//! so it behaves like the source's pass-by-value `Simp` struct, with heap
//! variants carrying a [`HeapId`] instead of a tagged pointer.
//!
//! Because two `Value`s compare equal exactly when their discriminant and
//! payload match, `#[derive(PartialEq)]` already gives `same?` (§4.2)
//! "compares the encoded word directly" for free: two `Symbol` values are
//! `==` iff they name the same heap slot, which interning guarantees
//! happens only for equal byte content; two `String` values are `==` only
//! if they happen to reference the very same allocation, never merely equal
//! content. No custom `PartialEq` impl is needed or wanted here.

use crate::heap::{EnvId, HeapId};

/// An opcode identifying a built-in primitive. The *mapping* from opcode to
/// implementation is an evaluator concern (`schola-runtime`); the value
/// model only needs the immediate, copyable identifier (§3: "Builtin:
/// opcode identifying a primitive — immediate").
pub type Opcode = u32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// `#void`, the result of side-effecting forms like `define`.
    Void,
    /// The unique empty vector, doubling as the empty list (§3 invariant).
    /// Never materialized as a heap `Vector`: any `HeapObject::Vector` is
    /// therefore guaranteed non-empty by construction (see `heap::Heap`'s
    /// list-folding reader logic), which is what lets `is_nil` below stay a
    /// pure function of the discriminant. `pair?` needs heap access to
    /// check `VectorKind` (see `ops::is_pair`), so it isn't a `Value` method.
    Nil,
    /// The unique empty string, paralleling `Nil` (§3). A heap
    /// `HeapObject::Str` is therefore always non-empty by construction.
    EmptyString,
    True,
    False,
    Eof,
    /// The result of looking up an as-yet-unset environment slot. Not
    /// reachable from ordinary programs; reserved for internal bookkeeping.
    Undef,
    Fixnum(i64),
    Byte(u8),
    Real(f64),
    Builtin(Opcode),
    String(HeapId),
    Symbol(HeapId),
    Vector(HeapId),
    Port(HeapId),
    Closure(HeapId),
    Environment(EnvId),
    Exception(HeapId),
}

impl Value {
    pub fn is_fixnum(self) -> bool {
        matches!(self, Value::Fixnum(_))
    }
    pub fn is_byte(self) -> bool {
        matches!(self, Value::Byte(_))
    }
    pub fn is_real(self) -> bool {
        matches!(self, Value::Real(_))
    }
    pub fn is_number(self) -> bool {
        self.is_fixnum() || self.is_real()
    }
    pub fn is_string(self) -> bool {
        matches!(self, Value::String(_) | Value::EmptyString)
    }
    pub fn is_symbol(self) -> bool {
        matches!(self, Value::Symbol(_))
    }
    /// True for `Nil` as well as a heap vector: `Nil` *is* the (unique)
    /// zero-length vector (§3 invariant), not merely something that acts
    /// like one.
    pub fn is_vector(self) -> bool {
        matches!(self, Value::Vector(_) | Value::Nil)
    }
    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }
    pub fn is_port(self) -> bool {
        matches!(self, Value::Port(_))
    }
    pub fn is_closure(self) -> bool {
        matches!(self, Value::Closure(_))
    }
    pub fn is_environment(self) -> bool {
        matches!(self, Value::Environment(_))
    }
    pub fn is_exception(self) -> bool {
        matches!(self, Value::Exception(_))
    }
    pub fn is_boolean(self) -> bool {
        matches!(self, Value::True | Value::False)
    }
    pub fn is_void(self) -> bool {
        matches!(self, Value::Void)
    }
    pub fn is_eof(self) -> bool {
        matches!(self, Value::Eof)
    }

    /// `#f` is the only false value; every other value (including `0` and
    /// `()`) is truthy, matching `original_source/eval.c`'s `simp_istrue`
    /// usage in `simp_opif` (it only ever tests against `simp_false()`).
    pub fn is_true(self) -> bool {
        !matches!(self, Value::False)
    }

    /// Every value that is not a symbol and not a vector self-evaluates
    /// (spec §4.5, §8 "Self-evaluation"). This predicate names exactly the
    /// complement the evaluator's dispatch needs.
    pub fn is_self_evaluating(self) -> bool {
        !self.is_symbol() && !self.is_vector()
    }
}
