//! The builtin opcode table (spec §4.5).
//!
//! Grounded on `original_source/eval.c`'s `simp_op*` family and its
//! `getargs`/`GETARGS` argument-collection helper: each builtin receives
//! the raw, unevaluated operand list and the caller environment, and
//! decides per-argument whether to evaluate, exactly as §4.5 describes.
//! `get_args` below is that helper, stripped of the C macro indirection.

use crate::context::Context;
use crate::eval::{self, evalargs};
use schola_core::{EnvId, ErrorKind, HeapObject, HostError, Opcode, Value, ops};

macro_rules! builtins {
    ($($name:literal => $op:ident),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u32)]
        enum Op { $($op),+ }

        const TABLE: &[(&str, Op)] = &[ $(($name, Op::$op)),+ ];

        impl Op {
            fn from_opcode(op: Opcode) -> Option<Op> {
                TABLE.iter().map(|(_, o)| *o).find(|o| *o as u32 == op)
            }
        }
    };
}

builtins! {
    "+" => Add, "-" => Sub, "*" => Mul, "/" => Div,
    "=" => NumEq, "<" => Lt, ">" => Gt,
    "boolean?" => BooleanP, "null?" => NullP, "pair?" => PairP,
    "port?" => PortP, "symbol?" => SymbolP, "same?" => SameP,
    "car" => Car, "cdr" => Cdr, "cons" => Cons,
    "set-car!" => SetCar, "set-cdr!" => SetCdr,
    "quote" => Quote,
    "if" => If,
    "define" => Define,
    "lambda" => Lambda, "macro" => Macro,
    "make-environment" => MakeEnvironment, "eval" => Eval,
    "display" => Display, "write" => Write, "newline" => Newline,
    "current-input-port" => CurIPort, "current-output-port" => CurOPort,
    "current-error-port" => CurEPort,
    "gc" => Gc,
}

/// Bind every table entry as a global `Value::Builtin` (spec §4.3: the
/// context's global environment is the home of the reference builtin set).
pub fn install(ctx: &mut Context) -> Result<(), HostError> {
    for (name, op) in TABLE {
        let sym = ctx.symbols.intern(&mut ctx.heap, name.as_bytes())?;
        let value = Value::Builtin(*op as u32);
        match ctx.heap.object_mut(ctx.global_env) {
            HeapObject::Environment(frame) => frame.set(sym, value),
            _ => unreachable!("global_env always names a HeapObject::Environment"),
        }
    }
    Ok(())
}

fn boolean(b: bool) -> Value {
    if b { Value::True } else { Value::False }
}

/// Collect `operands` into `Vec<Value>`, honoring `min`/`max` arity and
/// optionally evaluating each one in `env` (spec §4.5's per-argument
/// evaluate decision). The outer `Result` carries host failure; the inner
/// one carries a language-level exception value, mirroring `read`'s split.
fn get_args(
    ctx: &mut Context,
    mut operands: Value,
    env: EnvId,
    min: usize,
    max: usize,
    evaluate: bool,
) -> Result<Result<Vec<Value>, Value>, HostError> {
    let mut raw = Vec::new();
    while raw.len() < max {
        if operands.is_nil() {
            break;
        }
        if !ops::is_pair(&ctx.heap, operands) {
            return Ok(Err(ctx.exception(ErrorKind::IllegalExpression, Some(operands))?));
        }
        raw.push(ops::car(&ctx.heap, operands).expect("checked pair above"));
        operands = ops::cdr(&ctx.heap, operands).expect("checked pair above");
    }
    if raw.len() < min || !operands.is_nil() {
        return Ok(Err(ctx.exception(ErrorKind::Arity, None)?));
    }
    if !evaluate {
        return Ok(Ok(raw));
    }
    let mut out = Vec::with_capacity(raw.len());
    for v in raw {
        let val = eval::eval(ctx, v, env)?;
        if val.is_exception() {
            return Ok(Err(val));
        }
        out.push(val);
    }
    Ok(Ok(out))
}

/// Unwraps `get_args`'s nested `Result`, returning the language-level
/// exception straight out of the enclosing builtin on a parse/eval failure.
macro_rules! get_args {
    ($ctx:expr, $operands:expr, $env:expr, $min:expr, $max:expr, $evaluate:expr) => {
        match get_args($ctx, $operands, $env, $min, $max, $evaluate)? {
            Ok(a) => a,
            Err(exc) => return Ok(exc),
        }
    };
}

fn predicate(
    ctx: &mut Context,
    operands: Value,
    env: EnvId,
    pred: fn(Value) -> bool,
) -> Result<Value, HostError> {
    let args = get_args!(ctx, operands, env, 1, 1, true);
    Ok(boolean(pred(args[0])))
}

fn compare(
    ctx: &mut Context,
    operands: Value,
    env: EnvId,
    accept: fn(i32) -> bool,
) -> Result<Value, HostError> {
    let args = get_args!(ctx, operands, env, 2, 2, true);
    match ops::compare(args[0], args[1]) {
        Ok(c) => Ok(boolean(accept(c))),
        Err(kind) => ctx.exception(kind, None),
    }
}

/// `+`/`*`: fold over zero or more evaluated numeric operands left-to-right.
fn fold_arith(
    ctx: &mut Context,
    operands: Value,
    env: EnvId,
    op: fn(Value, Value) -> Result<Value, ErrorKind>,
    identity: i64,
) -> Result<Value, HostError> {
    let args = evalargs(ctx, operands, env)?;
    if args.is_exception() {
        return Ok(args);
    }
    let mut acc = Value::Fixnum(identity);
    let mut rest = args;
    while !rest.is_nil() {
        let v = ops::car(&ctx.heap, rest).expect("evalargs yields a proper list");
        acc = match op(acc, v) {
            Ok(v) => v,
            Err(kind) => return ctx.exception(kind, Some(v)),
        };
        rest = ops::cdr(&ctx.heap, rest).expect("evalargs yields a proper list");
    }
    Ok(acc)
}

/// `-`/`/`: unary negation/reciprocal on a single operand, left fold from
/// the first operand otherwise. Mirrors `original_source/eval.c`'s
/// `simp_opsubtract`/`simp_opdivide` (`nops == 1` special case).
fn fold_arith_subtractive(
    ctx: &mut Context,
    operands: Value,
    env: EnvId,
    op: fn(Value, Value) -> Result<Value, ErrorKind>,
    identity: i64,
) -> Result<Value, HostError> {
    let args = evalargs(ctx, operands, env)?;
    if args.is_exception() {
        return Ok(args);
    }
    if args.is_nil() {
        return ctx.exception(ErrorKind::Arity, None);
    }
    let first = ops::car(&ctx.heap, args).expect("checked non-nil above");
    let mut rest = ops::cdr(&ctx.heap, args).expect("checked non-nil above");
    if rest.is_nil() {
        return match op(Value::Fixnum(identity), first) {
            Ok(v) => Ok(v),
            Err(kind) => ctx.exception(kind, Some(first)),
        };
    }
    let mut acc = first;
    while !rest.is_nil() {
        let v = ops::car(&ctx.heap, rest).expect("proper list");
        acc = match op(acc, v) {
            Ok(v) => v,
            Err(kind) => return ctx.exception(kind, Some(v)),
        };
        rest = ops::cdr(&ctx.heap, rest).expect("proper list");
    }
    Ok(acc)
}

fn op_if(ctx: &mut Context, operands: Value, env: EnvId) -> Result<Value, HostError> {
    let raw = get_args!(ctx, operands, env, 2, 3, false);
    let cond = eval::eval(ctx, raw[0], env)?;
    if cond.is_exception() {
        return Ok(cond);
    }
    if cond.is_true() {
        eval::eval(ctx, raw[1], env)
    } else if raw.len() == 3 {
        eval::eval(ctx, raw[2], env)
    } else {
        Ok(Value::Void)
    }
}

fn op_define(ctx: &mut Context, operands: Value, env: EnvId) -> Result<Value, HostError> {
    let raw = get_args!(ctx, operands, env, 2, 2, false);
    let Value::Symbol(sym) = raw[0] else {
        return ctx.exception(ErrorKind::IllegalExpression, Some(raw[0]));
    };
    let value = eval::eval(ctx, raw[1], env)?;
    if value.is_exception() {
        return Ok(value);
    }
    match ctx.heap.object_mut(env) {
        HeapObject::Environment(frame) => frame.set(sym, value),
        _ => unreachable!("EnvId always names a HeapObject::Environment"),
    }
    Ok(Value::Void)
}

fn op_print(
    ctx: &mut Context,
    operands: Value,
    env: EnvId,
    write_form: bool,
) -> Result<Value, HostError> {
    let args = get_args!(ctx, operands, env, 1, 2, true);
    let port = if args.len() == 2 { args[1] } else { ctx.stdout };
    let bytes = crate::printer::format(&ctx.heap, args[0], write_form);
    write_port(ctx, port, &bytes)
}

fn write_port(ctx: &mut Context, port: Value, bytes: &[u8]) -> Result<Value, HostError> {
    let Value::Port(id) = port else {
        return ctx.exception(ErrorKind::IllegalType, Some(port));
    };
    let result = match ctx.heap.object_mut(id) {
        HeapObject::Port(p) => p.write_bytes(bytes),
        _ => unreachable!("Value::Port always names a HeapObject::Port"),
    };
    match result {
        Ok(()) => Ok(Value::Void),
        Err(_) => ctx.exception(ErrorKind::PortError, Some(port)),
    }
}

pub fn dispatch(
    ctx: &mut Context,
    opcode: Opcode,
    operands: Value,
    env: EnvId,
) -> Result<Value, HostError> {
    let Some(op) = Op::from_opcode(opcode) else {
        return ctx.exception(ErrorKind::IllegalType, None);
    };
    match op {
        Op::Add => fold_arith(ctx, operands, env, ops::add, 0),
        Op::Sub => fold_arith_subtractive(ctx, operands, env, ops::sub, 0),
        Op::Mul => fold_arith(ctx, operands, env, ops::mul, 1),
        Op::Div => fold_arith_subtractive(ctx, operands, env, ops::div, 1),
        Op::NumEq => compare(ctx, operands, env, |c| c == 0),
        Op::Lt => compare(ctx, operands, env, |c| c < 0),
        Op::Gt => compare(ctx, operands, env, |c| c > 0),
        Op::BooleanP => predicate(ctx, operands, env, Value::is_boolean),
        Op::NullP => predicate(ctx, operands, env, Value::is_nil),
        Op::PairP => {
            let args = get_args!(ctx, operands, env, 1, 1, true);
            Ok(boolean(ops::is_pair(&ctx.heap, args[0])))
        }
        Op::PortP => predicate(ctx, operands, env, Value::is_port),
        Op::SymbolP => predicate(ctx, operands, env, Value::is_symbol),
        Op::SameP => {
            let args = get_args!(ctx, operands, env, 2, 2, true);
            Ok(boolean(args[0] == args[1]))
        }
        Op::Car => {
            let args = get_args!(ctx, operands, env, 1, 1, true);
            match ops::car(&ctx.heap, args[0]) {
                Ok(v) => Ok(v),
                Err(kind) => ctx.exception(kind, Some(args[0])),
            }
        }
        Op::Cdr => {
            let args = get_args!(ctx, operands, env, 1, 1, true);
            match ops::cdr(&ctx.heap, args[0]) {
                Ok(v) => Ok(v),
                Err(kind) => ctx.exception(kind, Some(args[0])),
            }
        }
        Op::Cons => {
            let args = get_args!(ctx, operands, env, 2, 2, true);
            Ok(ops::cons(&mut ctx.heap, args[0], args[1])?)
        }
        Op::SetCar => {
            let args = get_args!(ctx, operands, env, 2, 2, true);
            match ops::set_car(&mut ctx.heap, args[0], args[1]) {
                Ok(()) => Ok(Value::Void),
                Err(kind) => ctx.exception(kind, Some(args[0])),
            }
        }
        Op::SetCdr => {
            let args = get_args!(ctx, operands, env, 2, 2, true);
            match ops::set_cdr(&mut ctx.heap, args[0], args[1]) {
                Ok(()) => Ok(Value::Void),
                Err(kind) => ctx.exception(kind, Some(args[0])),
            }
        }
        Op::Quote => {
            let args = get_args!(ctx, operands, env, 1, 1, false);
            Ok(args[0])
        }
        Op::If => op_if(ctx, operands, env),
        Op::Define => op_define(ctx, operands, env),
        Op::Lambda => eval::make_closure(ctx, false, operands, env),
        Op::Macro => eval::make_closure(ctx, true, operands, env),
        Op::MakeEnvironment => {
            get_args!(ctx, operands, env, 0, 0, true);
            let id = ctx.heap.allocate(HeapObject::Environment(
                schola_core::EnvironmentObject { bindings: Vec::new(), parent: Some(env) },
            ))?;
            Ok(Value::Environment(id))
        }
        Op::Eval => {
            let args = get_args!(ctx, operands, env, 2, 2, true);
            let Value::Environment(target_env) = args[1] else {
                return ctx.exception(ErrorKind::IllegalType, Some(args[1]));
            };
            eval::eval(ctx, args[0], target_env)
        }
        Op::Display => op_print(ctx, operands, env, false),
        Op::Write => op_print(ctx, operands, env, true),
        Op::Newline => {
            let args = get_args!(ctx, operands, env, 0, 1, true);
            let port = if args.is_empty() { ctx.stdout } else { args[0] };
            write_port(ctx, port, b"\n")
        }
        Op::CurIPort => {
            get_args!(ctx, operands, env, 0, 0, true);
            Ok(ctx.stdin)
        }
        Op::CurOPort => {
            get_args!(ctx, operands, env, 0, 0, true);
            Ok(ctx.stdout)
        }
        Op::CurEPort => {
            get_args!(ctx, operands, env, 0, 0, true);
            Ok(ctx.stderr)
        }
        Op::Gc => {
            get_args!(ctx, operands, env, 0, 0, true);
            ctx.collect();
            Ok(Value::Void)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::context::Context;
    use schola_core::{ErrorKind, Value};

    fn eval_str(ctx: &mut Context, text: &str) -> Value {
        let id = ctx
            .heap
            .allocate(schola_core::HeapObject::Port(schola_core::PortObject::new(
                schola_core::PortIo::File(tempfile_from(text.as_bytes())),
                schola_core::PortMode {
                    readable: true,
                    writable: false,
                },
                0,
            )))
            .unwrap();
        let port = Value::Port(id);
        let mut result = Value::Void;
        loop {
            let form = ctx.read(port).unwrap();
            if form.is_eof() {
                break;
            }
            result = ctx.eval(form, ctx.global_env).unwrap();
        }
        result
    }

    fn tempfile_from(bytes: &[u8]) -> std::fs::File {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(bytes).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f
    }

    fn ctx() -> Context {
        Context::with_stdio(Config::default()).unwrap()
    }

    fn exception_kind(v: Value, ctx: &Context) -> ErrorKind {
        let Value::Exception(id) = v else {
            panic!("expected an exception, got {v:?}");
        };
        match ctx.heap.object(id) {
            schola_core::HeapObject::Exception(e) => e.kind,
            _ => unreachable!(),
        }
    }

    #[test]
    fn predicates_report_type() {
        let mut c = ctx();
        assert_eq!(eval_str(&mut c, "(null? \\())"), Value::True);
        assert_eq!(eval_str(&mut c, "(pair? \\(1 2))"), Value::True);
        assert_eq!(eval_str(&mut c, "(pair? [1 2])"), Value::False);
        assert_eq!(eval_str(&mut c, "(symbol? \\x)"), Value::True);
        assert_eq!(eval_str(&mut c, "(boolean? #t)"), Value::True);
    }

    #[test]
    fn same_compares_identity_not_structure() {
        let mut c = ctx();
        assert_eq!(eval_str(&mut c, "(same? 1 1)"), Value::True);
        assert_eq!(eval_str(&mut c, "(same? \\(1) \\(1))"), Value::False);
    }

    #[test]
    fn car_cdr_cons_roundtrip() {
        let mut c = ctx();
        assert_eq!(eval_str(&mut c, "(car (cons 1 2))"), Value::Fixnum(1));
        assert_eq!(eval_str(&mut c, "(cdr (cons 1 2))"), Value::Fixnum(2));
    }

    #[test]
    fn car_on_literal_vector_is_illegal_type() {
        let mut c = ctx();
        let result = eval_str(&mut c, "(car [1 2 3])");
        assert!(result.is_exception());
        assert_eq!(exception_kind(result, &c), ErrorKind::IllegalType);
    }

    #[test]
    fn set_car_mutates_in_place() {
        let mut c = ctx();
        let result = eval_str(&mut c, "(define p (cons 1 2)) (set-car! p 9) (car p)");
        assert_eq!(result, Value::Fixnum(9));
    }

    #[test]
    fn comparison_operators() {
        let mut c = ctx();
        assert_eq!(eval_str(&mut c, "(< 1 2)"), Value::True);
        assert_eq!(eval_str(&mut c, "(> 1 2)"), Value::False);
        assert_eq!(eval_str(&mut c, "(= 2 2)"), Value::True);
    }

    #[test]
    fn subtract_and_divide_unary_forms() {
        let mut c = ctx();
        assert_eq!(eval_str(&mut c, "(- 5)"), Value::Fixnum(-5));
        assert_eq!(eval_str(&mut c, "(- 5 2 1)"), Value::Fixnum(2));
        assert_eq!(eval_str(&mut c, "(/ 2)"), Value::Fixnum(0));
    }

    #[test]
    fn quote_prevents_evaluation() {
        let mut c = ctx();
        let result = eval_str(&mut c, "(quote (+ 1 2))");
        assert!(schola_core::ops::is_pair(&c.heap, result));
    }

    #[test]
    fn make_environment_and_eval_combine() {
        let mut c = ctx();
        let result = eval_str(&mut c, "(define e (make-environment)) (eval (quote 5) e)");
        assert_eq!(result, Value::Fixnum(5));
    }

    #[test]
    fn unknown_opcode_is_illegal_type() {
        let mut c = ctx();
        let result = super::dispatch(&mut c, 999_999, Value::Nil, c.global_env);
        assert!(result.unwrap().is_exception());
    }

    #[test]
    fn write_to_an_explicit_port_succeeds() {
        let mut c = ctx();
        let out_id = c
            .heap
            .allocate(schola_core::HeapObject::Port(schola_core::PortObject::new(
                schola_core::PortIo::File(tempfile::tempfile().unwrap()),
                schola_core::PortMode {
                    readable: false,
                    writable: true,
                },
                9,
            )))
            .unwrap();
        let sym = c.symbols.intern(&mut c.heap, b"out").unwrap();
        match c.heap.object_mut(c.global_env) {
            schola_core::HeapObject::Environment(frame) => frame.set(sym, Value::Port(out_id)),
            _ => unreachable!(),
        }
        let result = eval_str(&mut c, "(write 42 out)");
        assert_eq!(result, Value::Void);
    }
}
