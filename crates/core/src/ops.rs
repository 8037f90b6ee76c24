//! Pair and arithmetic primitives (spec §4.2).
//!
//! These need `&mut Heap` (to allocate a pair) or `&Heap` (to read one), so
//! they live next to `Heap` rather than as inherent `Value` methods.

use crate::error::ErrorKind;
use crate::heap::{Heap, HeapObject, VectorKind};
use crate::value::Value;
use std::cmp::Ordering;

/// Allocate a new pair: a 2-element `List`-kind vector `[car, cdr]` (§3).
pub fn cons(heap: &mut Heap, car: Value, cdr: Value) -> Result<Value, crate::error::HostError> {
    let id = heap.allocate(HeapObject::Vector {
        kind: VectorKind::List,
        items: vec![car, cdr],
    })?;
    Ok(Value::Vector(id))
}

/// True for a `Value::Vector` built by `cons`/the reader's list notation.
/// A `Literal`-kind vector (built by `[`/`]`), even one of length 2, is not
/// a pair: the two are indistinguishable by shape alone, so the tag set at
/// construction is what `pair?` and `car`/`cdr` consult.
pub fn is_pair(heap: &Heap, v: Value) -> bool {
    match v {
        Value::Vector(id) => matches!(
            heap.object(id),
            HeapObject::Vector { kind: VectorKind::List, .. }
        ),
        _ => false,
    }
}

fn pair_slots(heap: &Heap, v: Value) -> Result<[Value; 2], ErrorKind> {
    match v {
        Value::Vector(id) => match heap.object(id) {
            HeapObject::Vector { kind: VectorKind::List, items } => Ok([items[0], items[1]]),
            HeapObject::Vector { .. } => Err(ErrorKind::IllegalType),
            _ => unreachable!("Value::Vector always names a HeapObject::Vector"),
        },
        _ => Err(ErrorKind::IllegalType),
    }
}

/// Read the 0th slot. Not defined on non-pairs (§4.2).
pub fn car(heap: &Heap, v: Value) -> Result<Value, ErrorKind> {
    pair_slots(heap, v).map(|s| s[0])
}

/// Read the 1st slot. Not defined on non-pairs (§4.2).
pub fn cdr(heap: &Heap, v: Value) -> Result<Value, ErrorKind> {
    pair_slots(heap, v).map(|s| s[1])
}

pub fn set_car(heap: &mut Heap, v: Value, new_car: Value) -> Result<(), ErrorKind> {
    match v {
        Value::Vector(id) => match heap.object_mut(id) {
            HeapObject::Vector { kind: VectorKind::List, items } => {
                items[0] = new_car;
                Ok(())
            }
            HeapObject::Vector { .. } => Err(ErrorKind::IllegalType),
            _ => unreachable!("Value::Vector always names a HeapObject::Vector"),
        },
        _ => Err(ErrorKind::IllegalType),
    }
}

pub fn set_cdr(heap: &mut Heap, v: Value, new_cdr: Value) -> Result<(), ErrorKind> {
    match v {
        Value::Vector(id) => match heap.object_mut(id) {
            HeapObject::Vector { kind: VectorKind::List, items } => {
                items[1] = new_cdr;
                Ok(())
            }
            HeapObject::Vector { .. } => Err(ErrorKind::IllegalType),
            _ => unreachable!("Value::Vector always names a HeapObject::Vector"),
        },
        _ => Err(ErrorKind::IllegalType),
    }
}

fn as_f64(v: Value) -> Option<f64> {
    match v {
        Value::Fixnum(x) => Some(x as f64),
        Value::Real(x) => Some(x),
        _ => None,
    }
}

/// `+`: fixnum arithmetic promotes to `Real` on overflow or mixed operand
/// kinds, never panics or wraps (§4 Open Questions: numeric overflow
/// promotes `i64` arithmetic to `Real`).
pub fn add(a: Value, b: Value) -> Result<Value, ErrorKind> {
    match (a, b) {
        (Value::Fixnum(x), Value::Fixnum(y)) => Ok(match x.checked_add(y) {
            Some(sum) => Value::Fixnum(sum),
            None => Value::Real(x as f64 + y as f64),
        }),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => Ok(Value::Real(x + y)),
            _ => Err(ErrorKind::IllegalType),
        },
    }
}

pub fn sub(a: Value, b: Value) -> Result<Value, ErrorKind> {
    match (a, b) {
        (Value::Fixnum(x), Value::Fixnum(y)) => Ok(match x.checked_sub(y) {
            Some(diff) => Value::Fixnum(diff),
            None => Value::Real(x as f64 - y as f64),
        }),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => Ok(Value::Real(x - y)),
            _ => Err(ErrorKind::IllegalType),
        },
    }
}

pub fn mul(a: Value, b: Value) -> Result<Value, ErrorKind> {
    match (a, b) {
        (Value::Fixnum(x), Value::Fixnum(y)) => Ok(match x.checked_mul(y) {
            Some(prod) => Value::Fixnum(prod),
            None => Value::Real(x as f64 * y as f64),
        }),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => Ok(Value::Real(x * y)),
            _ => Err(ErrorKind::IllegalType),
        },
    }
}

/// `/`: integer division truncates toward zero, matching Rust's native `/`
/// on `i64`. Division by a zero fixnum promotes both operands to `Real`
/// rather than raising a distinct error kind, following the same
/// overflow-promotes-to-real rule used elsewhere (`f64` division by zero
/// yields `inf`/`-inf`/`NaN` per IEEE 754).
pub fn div(a: Value, b: Value) -> Result<Value, ErrorKind> {
    match (a, b) {
        (Value::Fixnum(x), Value::Fixnum(y)) if y != 0 => Ok(match x.checked_div(y) {
            Some(q) => Value::Fixnum(q),
            None => Value::Real(x as f64 / y as f64),
        }),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => Ok(Value::Real(x / y)),
            _ => Err(ErrorKind::IllegalType),
        },
    }
}

pub fn abs(a: Value) -> Result<Value, ErrorKind> {
    match a {
        Value::Fixnum(x) => Ok(match x.checked_abs() {
            Some(y) => Value::Fixnum(y),
            None => Value::Real((x as f64).abs()),
        }),
        Value::Real(x) => Ok(Value::Real(x.abs())),
        _ => Err(ErrorKind::IllegalType),
    }
}

/// Three-way numeric comparison, returning -1/0/+1 (§4.2). Used to
/// implement `=`, `<`, `>` atop one primitive, mirroring the source's
/// single `simp_compare`.
pub fn compare(a: Value, b: Value) -> Result<i32, ErrorKind> {
    if let (Value::Fixnum(x), Value::Fixnum(y)) = (a, b) {
        return Ok(match x.cmp(&y) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        });
    }
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x
            .partial_cmp(&y)
            .map(|ord| match ord {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            })
            .ok_or(ErrorKind::IllegalType),
        _ => Err(ErrorKind::IllegalType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn cons_car_cdr_roundtrip() {
        let mut heap = Heap::new();
        let p = cons(&mut heap, Value::Fixnum(1), Value::Fixnum(2)).unwrap();
        assert_eq!(car(&heap, p), Ok(Value::Fixnum(1)));
        assert_eq!(cdr(&heap, p), Ok(Value::Fixnum(2)));
    }

    #[test]
    fn set_car_mutates_in_place() {
        let mut heap = Heap::new();
        let p = cons(&mut heap, Value::Fixnum(1), Value::Fixnum(2)).unwrap();
        set_car(&mut heap, p, Value::Fixnum(9)).unwrap();
        assert_eq!(car(&heap, p), Ok(Value::Fixnum(9)));
    }

    #[test]
    fn car_on_non_pair_is_illegal_type() {
        let heap = Heap::new();
        assert_eq!(car(&heap, Value::Nil), Err(ErrorKind::IllegalType));
        assert_eq!(car(&heap, Value::Fixnum(1)), Err(ErrorKind::IllegalType));
    }

    #[test]
    fn add_overflow_promotes_to_real() {
        let sum = add(Value::Fixnum(i64::MAX), Value::Fixnum(1)).unwrap();
        assert_eq!(sum, Value::Real(i64::MAX as f64 + 1.0));
    }

    #[test]
    fn add_mixed_fixnum_real_promotes() {
        let sum = add(Value::Fixnum(1), Value::Real(2.5)).unwrap();
        assert_eq!(sum, Value::Real(3.5));
    }

    #[test]
    fn div_truncates_toward_zero() {
        assert_eq!(div(Value::Fixnum(-7), Value::Fixnum(2)).unwrap(), Value::Fixnum(-3));
    }

    #[test]
    fn div_by_zero_fixnum_promotes_to_real_infinity() {
        let q = div(Value::Fixnum(1), Value::Fixnum(0)).unwrap();
        assert_eq!(q, Value::Real(f64::INFINITY));
    }

    #[test]
    fn compare_orders_fixnums() {
        assert_eq!(compare(Value::Fixnum(1), Value::Fixnum(2)), Ok(-1));
        assert_eq!(compare(Value::Fixnum(2), Value::Fixnum(2)), Ok(0));
        assert_eq!(compare(Value::Fixnum(3), Value::Fixnum(2)), Ok(1));
    }
}
