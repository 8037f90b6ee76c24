//! `write`/`display` external representation (spec §6).
//!
//! Grounded on `original_source/io.c`'s `dowrite`: that function walks a
//! vector flat, paren-wrapped, regardless of pair-ness; we instead consult
//! `VectorKind` (see `schola_core::heap`) to decide between a pair-chain
//! walk (`(a b . c)`) and a flat array (`[a b c]`), per the `car`/`cdr`
//! design recorded in DESIGN.md. The escape table mirrors `reader`'s
//! `read_escape_byte` exactly, in reverse, so that `read(write(v))`
//! round-trips (spec §8).

use schola_core::{Heap, HeapId, HeapObject, Value, VectorKind, ops};

/// Render `v` as bytes. `write_form` selects `write` (strings/chars quoted
/// and escaped) over `display` (raw bytes, no quoting).
pub fn format(heap: &Heap, v: Value, write_form: bool) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(heap, v, write_form, &mut out);
    out
}

/// Lossy `String` view of [`format`], for tests and diagnostics. The REPL
/// and `display`/`write` builtins use [`format`] directly so that a string
/// holding non-UTF-8 bytes round-trips byte-for-byte.
pub fn to_string(heap: &Heap, v: Value, write_form: bool) -> String {
    String::from_utf8_lossy(&format(heap, v, write_form)).into_owned()
}

fn write_value(heap: &Heap, v: Value, write_form: bool, out: &mut Vec<u8>) {
    match v {
        Value::Void => out.extend_from_slice(b"#void"),
        Value::Nil => out.extend_from_slice(b"()"),
        Value::EmptyString => write_string_bytes(&[], write_form, out),
        Value::True => out.extend_from_slice(b"#t"),
        Value::False => out.extend_from_slice(b"#f"),
        Value::Eof => out.extend_from_slice(b"#<eof>"),
        Value::Undef => out.extend_from_slice(b"#<undef>"),
        Value::Fixnum(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::Byte(b) => write_char_literal(b, out),
        Value::Real(f) => out.extend_from_slice(format_real(f).as_bytes()),
        Value::Builtin(_) => out.extend_from_slice(b"#<procedure>"),
        Value::String(id) => write_string_bytes(heap_bytes(heap, id), write_form, out),
        Value::Symbol(id) => out.extend_from_slice(heap_bytes(heap, id)),
        Value::Vector(id) => write_vector(heap, id, write_form, out),
        Value::Port(id) => match heap.object(id) {
            HeapObject::Port(p) => out.extend_from_slice(format!("#<port {}>", p.addr).as_bytes()),
            _ => unreachable!("Value::Port always names a HeapObject::Port"),
        },
        Value::Closure(_) => out.extend_from_slice(b"#<procedure>"),
        Value::Environment(_) => out.extend_from_slice(b"#<environment>"),
        Value::Exception(id) => match heap.object(id) {
            HeapObject::Exception(e) => out.extend_from_slice(format!("#<exception {}>", e.kind).as_bytes()),
            _ => unreachable!("Value::Exception always names a HeapObject::Exception"),
        },
    }
}

fn heap_bytes(heap: &Heap, id: HeapId) -> &[u8] {
    match heap.object(id) {
        HeapObject::Str(b) | HeapObject::Symbol(b) => b,
        _ => unreachable!("Value::String/Symbol always names a Str/Symbol HeapObject"),
    }
}

fn write_vector(heap: &Heap, id: HeapId, write_form: bool, out: &mut Vec<u8>) {
    match heap.object(id) {
        HeapObject::Vector {
            kind: VectorKind::List,
            ..
        } => write_pair_chain(heap, Value::Vector(id), write_form, out),
        HeapObject::Vector {
            kind: VectorKind::Literal,
            items,
        } => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_value(heap, *item, write_form, out);
            }
            out.push(b']');
        }
        _ => unreachable!("Value::Vector always names a HeapObject::Vector"),
    }
}

fn write_pair_chain(heap: &Heap, v: Value, write_form: bool, out: &mut Vec<u8>) {
    out.push(b'(');
    let mut cur = v;
    let mut first = true;
    loop {
        if !first {
            out.push(b' ');
        }
        first = false;
        let car = ops::car(heap, cur).expect("write_pair_chain only walks List-kind pairs");
        write_value(heap, car, write_form, out);
        let cdr = ops::cdr(heap, cur).expect("write_pair_chain only walks List-kind pairs");
        if cdr.is_nil() {
            break;
        }
        if ops::is_pair(heap, cdr) {
            cur = cdr;
            continue;
        }
        out.extend_from_slice(b" . ");
        write_value(heap, cdr, write_form, out);
        break;
    }
    out.push(b')');
}

/// The letter following a backslash for §4.4's named escapes, the reverse
/// of `reader::read_escape_byte`'s decode table.
fn escape_letter(b: u8) -> Option<u8> {
    match b {
        0x07 => Some(b'a'),
        0x08 => Some(b'b'),
        0x1B => Some(b'e'),
        0x0C => Some(b'f'),
        b'\n' => Some(b'n'),
        b'\r' => Some(b'r'),
        b'\t' => Some(b't'),
        0x0B => Some(b'v'),
        b'\\' => Some(b'\\'),
        _ => None,
    }
}

fn write_escaped_byte(b: u8, quote: u8, out: &mut Vec<u8>) {
    if b == quote {
        out.push(b'\\');
        out.push(quote);
    } else if let Some(letter) = escape_letter(b) {
        out.push(b'\\');
        out.push(letter);
    } else if (0x20..=0x7E).contains(&b) {
        out.push(b);
    } else {
        out.extend_from_slice(format!("\\x{b:02x}").as_bytes());
    }
}

fn write_string_bytes(bytes: &[u8], write_form: bool, out: &mut Vec<u8>) {
    if !write_form {
        out.extend_from_slice(bytes);
        return;
    }
    out.push(b'"');
    for &b in bytes {
        write_escaped_byte(b, b'"', out);
    }
    out.push(b'"');
}

fn write_char_literal(b: u8, out: &mut Vec<u8>) {
    out.push(b'\'');
    write_escaped_byte(b, b'\'', out);
    out.push(b'\'');
}

/// `format!("{}", f)` omits a decimal point for an integral value (`3` not
/// `3.0`), which the reader's number grammar would parse back as a fixnum
/// (§4.4/§6: a fractional part is what makes a token inexact). Force one in
/// so `write`/`read` round-trips a real.
fn format_real(f: f64) -> String {
    if f.is_nan() {
        return "+nan.0".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "+inf.0".to_string() } else { "-inf.0".to_string() };
    }
    let s = format!("{f}");
    if s.contains(['.', 'e', 'E']) { s } else { format!("{s}.0") }
}
