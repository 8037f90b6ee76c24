//! The reader: an iterative tokenizer plus a two-stack vector builder
//! (spec §4.4).
//!
//! The C prototypes root `read-stack`/`vector-stack` in the context so the
//! collector can trace them mid-parse. We only ever call `Heap::collect` at
//! top-level safepoints between whole `read`/`eval` cycles (see
//! `context::Context::collect`), never while a `read` call is in progress,
//! so these stacks live as plain local `Vec`s for the duration of one call
//! rather than as durable, GC-traced context fields — see DESIGN.md.
//!
//! The "virtual vector" §4.4 describes is this function's *scratch*
//! read-stack segment for an open group: elements accumulate flat as they
//! are read, and only once the closing bracket is seen do we fold them,
//! right-associatively, into the nested `[car, cdr]` pairs that make up a
//! proper list (§3's pair model) — or, for a bracket-delimited literal
//! vector, simply keep them flat. `car`/`cdr` (§4.2) only ever read slot 0
//! or slot 1, so parenthesized lists must end up as genuine pair chains,
//! never as one flat N-element vector.

use crate::symbols::SymbolTable;
use schola_core::heap::ExceptionObject;
use schola_core::{ErrorKind, Heap, HeapId, HeapObject, HostError, Value, VectorKind, ops};

enum RErr {
    Host(HostError),
    Lang(ErrorKind),
}

impl From<HostError> for RErr {
    fn from(e: HostError) -> Self {
        RErr::Host(e)
    }
}

type RResult<T> = Result<T, RErr>;

/// Read one value from `port_id`. EOF yields `Value::Eof`; malformed input
/// yields a first-class `Value::Exception` (§7) rather than an `Err` — only
/// allocator/IO failure is an `Err`.
pub fn read(
    heap: &mut Heap,
    symbols: &mut SymbolTable,
    port_id: HeapId,
) -> Result<Value, HostError> {
    match read_inner(heap, symbols, port_id) {
        Ok(v) => Ok(v),
        Err(RErr::Host(e)) => Err(e),
        Err(RErr::Lang(kind)) => {
            let id = heap.allocate(HeapObject::Exception(ExceptionObject { kind, payload: None }))?;
            Ok(Value::Exception(id))
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DotState {
    NotDotted,
    AwaitingCdr,
    Done,
}

struct OpenGroup {
    is_list: bool,
    count: usize,
    dot_state: DotState,
}

enum ReadEvent {
    Eof,
    Open(bool),
    Close(bool),
    Dot,
    Quote,
    Atom(Value),
}

fn read_inner(heap: &mut Heap, symbols: &mut SymbolTable, port_id: HeapId) -> RResult<Value> {
    let mut read_stack: Vec<Value> = Vec::new();
    let mut groups: Vec<OpenGroup> = Vec::new();

    loop {
        if groups.is_empty() && read_stack.len() == 1 {
            return Ok(read_stack.pop().unwrap());
        }
        match next_event(heap, symbols, port_id)? {
            ReadEvent::Eof => {
                if groups.is_empty() {
                    return Ok(Value::Eof);
                }
                return Err(RErr::Lang(ErrorKind::UnexpectedEof));
            }
            ReadEvent::Quote => {
                let quote_sym = Value::Symbol(symbols.intern(heap, b"quote")?);
                let datum = match read_inner(heap, symbols, port_id)? {
                    Value::Eof => return Err(RErr::Lang(ErrorKind::UnexpectedEof)),
                    v => v,
                };
                let wrapped = ops::cons(heap, datum, Value::Nil)?;
                let wrapped = ops::cons(heap, quote_sym, wrapped)?;
                push_value(&mut read_stack, &mut groups, wrapped)?;
            }
            ReadEvent::Atom(v) => push_value(&mut read_stack, &mut groups, v)?,
            ReadEvent::Dot => {
                let top = groups
                    .last_mut()
                    .filter(|g| g.is_list && g.dot_state == DotState::NotDotted && g.count >= 1)
                    .ok_or(RErr::Lang(ErrorKind::SyntaxError))?;
                top.dot_state = DotState::AwaitingCdr;
            }
            ReadEvent::Open(is_list) => {
                if let Some(parent) = groups.last_mut() {
                    bump(parent)?;
                }
                read_stack.push(Value::Nil);
                groups.push(OpenGroup {
                    is_list,
                    count: 0,
                    dot_state: DotState::NotDotted,
                });
            }
            ReadEvent::Close(closer_is_list) => {
                let top = groups.pop().ok_or(RErr::Lang(ErrorKind::SyntaxError))?;
                if top.is_list != closer_is_list || top.dot_state == DotState::AwaitingCdr {
                    return Err(RErr::Lang(ErrorKind::SyntaxError));
                }
                let mut items = Vec::with_capacity(top.count);
                for _ in 0..top.count {
                    items.push(read_stack.pop().ok_or(RErr::Lang(ErrorKind::SyntaxError))?);
                }
                items.reverse();
                read_stack.pop(); // this group's own reserved placeholder
                let result = build_group_value(heap, top.is_list, top.dot_state, items)?;
                read_stack.push(result);
            }
        }
    }
}

fn bump(group: &mut OpenGroup) -> RResult<()> {
    match group.dot_state {
        DotState::NotDotted => {}
        DotState::AwaitingCdr => group.dot_state = DotState::Done,
        DotState::Done => return Err(RErr::Lang(ErrorKind::SyntaxError)),
    }
    group.count += 1;
    Ok(())
}

fn push_value(
    read_stack: &mut Vec<Value>,
    groups: &mut [OpenGroup],
    value: Value,
) -> RResult<()> {
    if let Some(top) = groups.last_mut() {
        bump(top)?;
    }
    read_stack.push(value);
    Ok(())
}

fn build_group_value(
    heap: &mut Heap,
    is_list: bool,
    dot_state: DotState,
    items: Vec<Value>,
) -> RResult<Value> {
    if items.is_empty() {
        return Ok(Value::Nil);
    }
    if !is_list {
        let id = heap.allocate(HeapObject::Vector {
            kind: VectorKind::Literal,
            items,
        })?;
        return Ok(Value::Vector(id));
    }
    let mut items = items;
    let mut acc = if dot_state == DotState::Done {
        items.pop().unwrap()
    } else {
        Value::Nil
    };
    for item in items.into_iter().rev() {
        acc = ops::cons(heap, item, acc)?;
    }
    Ok(acc)
}

fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0c)
}

fn is_delimiter(b: u8) -> bool {
    is_ws(b) || matches!(b, b'(' | b')' | b'[' | b']' | b'"' | b'\'' | b'\\' | b'#')
}

fn with_port<T>(
    heap: &mut Heap,
    port_id: HeapId,
    f: impl FnOnce(&mut schola_core::PortObject) -> std::io::Result<T>,
) -> RResult<T> {
    match heap.object_mut(port_id) {
        HeapObject::Port(p) => f(p).map_err(|e| RErr::Host(HostError::Io(e))),
        _ => panic!("reader: HeapId {port_id} does not name a Port"),
    }
}

fn read_byte(heap: &mut Heap, port_id: HeapId) -> RResult<Option<u8>> {
    with_port(heap, port_id, |p| p.read_byte())
}

fn peek_byte(heap: &mut Heap, port_id: HeapId) -> RResult<Option<u8>> {
    with_port(heap, port_id, |p| p.peek_byte())
}

/// After consuming a leading `#`, either a literal token (`#t`, `#f`,
/// `#void`) or a `#`-to-end-of-line comment (anything else — including a
/// bare `#` at EOL). Every non-match degenerates harmlessly into "consume
/// to end of line", so there is no backtracking to do.
fn try_read_hash_literal(heap: &mut Heap, port_id: HeapId) -> RResult<Option<Value>> {
    let mut word = Vec::new();
    while word.len() <= 4 {
        match peek_byte(heap, port_id)? {
            Some(b) if !is_delimiter(b) => {
                read_byte(heap, port_id)?;
                word.push(b);
            }
            _ => break,
        }
    }
    let literal = match word.as_slice() {
        b"t" => Some(Value::True),
        b"f" => Some(Value::False),
        b"void" => Some(Value::Void),
        _ => None,
    };
    if literal.is_some() {
        return Ok(literal);
    }
    loop {
        match peek_byte(heap, port_id)? {
            None | Some(b'\n') => return Ok(None),
            Some(_) => {
                read_byte(heap, port_id)?;
            }
        }
    }
}

/// Produce the next tokenizer-level event (§4.4 Tokenizer), skipping
/// whitespace and `#`-comments as it goes. The tokenizer's token set
/// assigns `'c'` to CHAR and `\` to QUOTE as two distinct, non-colliding
/// tokens (§4.4); we follow that pairing rather than the apostrophe-quote
/// convention a couple of the source prototypes used (see DESIGN.md).
fn next_event(heap: &mut Heap, symbols: &mut SymbolTable, port_id: HeapId) -> RResult<ReadEvent> {
    loop {
        let b = match peek_byte(heap, port_id)? {
            None => return Ok(ReadEvent::Eof),
            Some(b) => b,
        };
        if is_ws(b) {
            read_byte(heap, port_id)?;
            continue;
        }
        match b {
            b'#' => {
                read_byte(heap, port_id)?;
                match try_read_hash_literal(heap, port_id)? {
                    Some(v) => return Ok(ReadEvent::Atom(v)),
                    None => continue,
                }
            }
            b'(' => {
                read_byte(heap, port_id)?;
                return Ok(ReadEvent::Open(true));
            }
            b'[' => {
                read_byte(heap, port_id)?;
                return Ok(ReadEvent::Open(false));
            }
            b')' => {
                read_byte(heap, port_id)?;
                return Ok(ReadEvent::Close(true));
            }
            b']' => {
                read_byte(heap, port_id)?;
                return Ok(ReadEvent::Close(false));
            }
            b'"' => {
                read_byte(heap, port_id)?;
                return Ok(ReadEvent::Atom(read_string(heap, port_id)?));
            }
            b'\'' => {
                read_byte(heap, port_id)?;
                return Ok(ReadEvent::Atom(read_char(heap, port_id)?));
            }
            b'\\' => {
                read_byte(heap, port_id)?;
                return Ok(ReadEvent::Quote);
            }
            b'.' => {
                read_byte(heap, port_id)?;
                match peek_byte(heap, port_id)? {
                    Some(nb) if !is_delimiter(nb) => {
                        let mut word = vec![b'.'];
                        word.extend(read_run_of_non_delimiters(heap, port_id)?);
                        return Ok(ReadEvent::Atom(parse_atom_word(heap, symbols, &word)?));
                    }
                    _ => return Ok(ReadEvent::Dot),
                }
            }
            _ => {
                let word = read_run_of_non_delimiters(heap, port_id)?;
                return Ok(ReadEvent::Atom(parse_atom_word(heap, symbols, &word)?));
            }
        }
    }
}

fn read_run_of_non_delimiters(heap: &mut Heap, port_id: HeapId) -> RResult<Vec<u8>> {
    let mut word = Vec::new();
    loop {
        match peek_byte(heap, port_id)? {
            Some(b) if !is_delimiter(b) => {
                read_byte(heap, port_id)?;
                word.push(b);
            }
            _ => return Ok(word),
        }
    }
}

/// Decode the byte following a backslash inside a string or char literal
/// (§4.4's escape table: `\" \a \b \e \f \n \r \t \v`, octal up to three
/// digits, `\x` hex run). Any other escaped byte — including `\u`/`\U`,
/// left undecoded per spec §1/§9 — passes through literally.
fn read_escape_byte(heap: &mut Heap, port_id: HeapId) -> RResult<u8> {
    let e = read_byte(heap, port_id)?.ok_or(RErr::Lang(ErrorKind::UnexpectedEof))?;
    let byte = match e {
        b'a' => 0x07,
        b'b' => 0x08,
        b'e' => 0x1B,
        b'f' => 0x0C,
        b'n' => b'\n',
        b'r' => b'\r',
        b't' => b'\t',
        b'v' => 0x0B,
        b'0'..=b'7' => {
            let mut val = (e - b'0') as u32;
            let mut count = 1;
            while count < 3 {
                match peek_byte(heap, port_id)? {
                    Some(d) if d.is_ascii_digit() && d < b'8' => {
                        read_byte(heap, port_id)?;
                        val = val * 8 + (d - b'0') as u32;
                        count += 1;
                    }
                    _ => break,
                }
            }
            (val & 0xFF) as u8
        }
        b'x' => {
            let mut val: u32 = 0;
            let mut any = false;
            loop {
                match peek_byte(heap, port_id)? {
                    Some(d) if d.is_ascii_hexdigit() => {
                        read_byte(heap, port_id)?;
                        val = val * 16 + (d as char).to_digit(16).unwrap();
                        any = true;
                    }
                    _ => break,
                }
            }
            if !any {
                return Err(RErr::Lang(ErrorKind::SyntaxError));
            }
            (val & 0xFF) as u8
        }
        other => other,
    };
    Ok(byte)
}

fn read_string(heap: &mut Heap, port_id: HeapId) -> RResult<Value> {
    let mut bytes = Vec::new();
    loop {
        let b = read_byte(heap, port_id)?.ok_or(RErr::Lang(ErrorKind::UnexpectedEof))?;
        match b {
            b'"' => break,
            b'\\' => bytes.push(read_escape_byte(heap, port_id)?),
            other => bytes.push(other),
        }
    }
    string_value(heap, &bytes)
}

fn read_char(heap: &mut Heap, port_id: HeapId) -> RResult<Value> {
    let b = read_byte(heap, port_id)?.ok_or(RErr::Lang(ErrorKind::UnexpectedEof))?;
    let value = if b == b'\\' {
        read_escape_byte(heap, port_id)?
    } else {
        b
    };
    let close = read_byte(heap, port_id)?.ok_or(RErr::Lang(ErrorKind::UnexpectedEof))?;
    if close != b'\'' {
        return Err(RErr::Lang(ErrorKind::SyntaxError));
    }
    Ok(Value::Byte(value))
}

fn string_value(heap: &mut Heap, bytes: &[u8]) -> RResult<Value> {
    if bytes.is_empty() {
        return Ok(Value::EmptyString);
    }
    let id = heap.allocate(HeapObject::Str(bytes.to_vec()))?;
    Ok(Value::String(id))
}

fn parse_atom_word(heap: &mut Heap, symbols: &mut SymbolTable, word: &[u8]) -> RResult<Value> {
    if let Some(v) = try_parse_number(word) {
        return Ok(v);
    }
    let id = symbols.intern(heap, word)?;
    Ok(Value::Symbol(id))
}

/// `[sign] [radix-prefix] digits [. digits] [e[sign]digits] [exactness]`
/// (§4.4/§6). Radix prefixes only apply to exact integers ("decimal only"
/// fraction, per spec). `E`/`I` force exact/inexact regardless of the
/// token's natural shape.
fn try_parse_number(word: &[u8]) -> Option<Value> {
    let mut i = 0;
    let neg = match word.first() {
        Some(b'-') => {
            i += 1;
            true
        }
        Some(b'+') => {
            i += 1;
            false
        }
        _ => false,
    };
    let mut radix = 10u32;
    let mut explicit_radix = false;
    if i + 1 < word.len() && word[i] == b'0' {
        match word[i + 1] {
            b'b' => {
                radix = 2;
                i += 2;
                explicit_radix = true;
            }
            b'o' => {
                radix = 8;
                i += 2;
                explicit_radix = true;
            }
            b'd' => {
                radix = 10;
                i += 2;
                explicit_radix = true;
            }
            b'x' => {
                radix = 16;
                i += 2;
                explicit_radix = true;
            }
            _ => {}
        }
    }
    let mut end = word.len();
    let exactness = match word.last() {
        Some(&b @ (b'E' | b'I')) if end > i => {
            end -= 1;
            Some(b)
        }
        _ => None,
    };
    if i >= end {
        return None;
    }
    let body = &word[i..end];
    if explicit_radix {
        if body.iter().any(|&b| b == b'.') {
            return None;
        }
        let digits = std::str::from_utf8(body).ok()?;
        let mut val = i64::from_str_radix(digits, radix).ok()?;
        if neg {
            val = -val;
        }
        return Some(apply_exactness(Value::Fixnum(val), exactness));
    }
    let has_dot_or_exp = body.iter().any(|&b| b == b'.' || b == b'e' || b == b'E');
    let text = std::str::from_utf8(body).ok()?;
    if !has_dot_or_exp {
        if !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mut val: i64 = text.parse().ok()?;
        if neg {
            val = -val;
        }
        Some(apply_exactness(Value::Fixnum(val), exactness))
    } else {
        let mut val: f64 = text.parse().ok()?;
        if neg {
            val = -val;
        }
        Some(apply_exactness(Value::Real(val), exactness))
    }
}

fn apply_exactness(v: Value, suffix: Option<u8>) -> Value {
    match (v, suffix) {
        (Value::Fixnum(x), Some(b'I')) => Value::Real(x as f64),
        (Value::Real(x), Some(b'E')) => Value::Fixnum(x as i64),
        (v, _) => v,
    }
}
