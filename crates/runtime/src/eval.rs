//! The evaluator (spec §4.5): dispatch, `operate`, and parameter binding.
//!
//! Grounded on `original_source/eval.c`'s `simp_eval`/`combine`/`operate`/
//! `evalargs`. That source represents a closure's parameter list as a
//! possibly-dotted pair chain and binds it positionally, the trailing
//! parameter absorbing the rest as a variadic tail; we follow the same
//! shape, walking it with `ops::car`/`ops::cdr` rather than the source's
//! `Simp` vector accessors.
//!
//! Builtin dispatch itself (the opcode table) lives in `builtins`; this
//! module only implements the parts of §4.5 that are about evaluation order
//! and environment creation, not what any particular builtin computes.

use crate::context::Context;
use schola_core::{
    ClosureObject, EnvId, EnvironmentObject, ErrorKind, HeapObject, HostError, SymbolId, Value, ops,
};

/// Evaluate `expr` in `env` (spec §4.5 Dispatch).
///
/// Tracks `ctx.eval_depth` around the call so `Context::collect` can tell
/// whether some enclosing, still-in-progress evaluation (e.g. an
/// `evalargs`/`get_args` accumulator a few stack frames up) might be
/// holding an already-evaluated, not-yet-rooted value — see `collect`'s
/// doc comment.
pub fn eval(ctx: &mut Context, expr: Value, env: EnvId) -> Result<Value, HostError> {
    ctx.eval_depth += 1;
    let result = eval_inner(ctx, expr, env);
    ctx.eval_depth -= 1;
    result
}

fn eval_inner(ctx: &mut Context, expr: Value, env: EnvId) -> Result<Value, HostError> {
    if let Value::Symbol(sym) = expr {
        return lookup(ctx, env, sym);
    }
    if !expr.is_vector() {
        return Ok(expr);
    }
    combine(ctx, expr, env)
}

fn lookup(ctx: &mut Context, env: EnvId, sym: SymbolId) -> Result<Value, HostError> {
    let mut current = Some(env);
    while let Some(id) = current {
        match ctx.heap.object(id) {
            HeapObject::Environment(frame) => {
                if let Some(v) = frame.lookup(sym) {
                    return Ok(v);
                }
                current = frame.parent;
            }
            _ => unreachable!("EnvId always names a HeapObject::Environment"),
        }
    }
    ctx.exception(ErrorKind::Unbound, Some(Value::Symbol(sym)))
}

fn combine(ctx: &mut Context, expr: Value, env: EnvId) -> Result<Value, HostError> {
    if !ops::is_pair(&ctx.heap, expr) {
        return ctx.exception(ErrorKind::IllegalExpression, Some(expr));
    }
    let head = ops::car(&ctx.heap, expr).expect("checked pair above");
    let operator = eval(ctx, head, env)?;
    if operator.is_exception() {
        return Ok(operator);
    }
    let operands = ops::cdr(&ctx.heap, expr).expect("checked pair above");
    match operator {
        Value::Builtin(opcode) => crate::builtins::dispatch(ctx, opcode, operands, env),
        Value::Closure(_) => operate(ctx, operator, operands, env),
        _ => ctx.exception(ErrorKind::IllegalType, Some(operator)),
    }
}

/// Evaluate a proper list of operands left-to-right, short-circuiting on
/// the first exception (spec §4.5 `operate`, applicative branch). Iterative
/// (builds the result list forward, as `original_source/eval.c`'s
/// `evalargs` does with its `prev`/`args` bookkeeping) to bound stack usage
/// on long argument lists.
pub fn evalargs(ctx: &mut Context, list: Value, env: EnvId) -> Result<Value, HostError> {
    let mut values = Vec::new();
    let mut rest = list;
    loop {
        match rest {
            Value::Nil => break,
            _ if ops::is_pair(&ctx.heap, rest) => {
                let head = ops::car(&ctx.heap, rest).expect("checked pair above");
                let val = eval(ctx, head, env)?;
                if val.is_exception() {
                    return Ok(val);
                }
                values.push(val);
                rest = ops::cdr(&ctx.heap, rest).expect("checked pair above");
            }
            _ => return ctx.exception(ErrorKind::IllegalExpression, Some(rest)),
        }
    }
    let mut acc = Value::Nil;
    for v in values.into_iter().rev() {
        acc = ops::cons(&mut ctx.heap, v, acc)?;
    }
    Ok(acc)
}

/// Apply a closure to an operand list (spec §4.5 `operate`).
pub fn operate(
    ctx: &mut Context,
    operator: Value,
    operands: Value,
    calling_env: EnvId,
) -> Result<Value, HostError> {
    let Value::Closure(cid) = operator else {
        return ctx.exception(ErrorKind::IllegalType, Some(operator));
    };
    let (operative, params, body, closure_env) = match ctx.heap.object(cid) {
        HeapObject::Closure(c) => (c.operative, c.params, c.body.clone(), c.env),
        _ => unreachable!("Value::Closure always names a HeapObject::Closure"),
    };

    let args = if operative {
        operands
    } else {
        let evaluated = evalargs(ctx, operands, calling_env)?;
        if evaluated.is_exception() {
            return Ok(evaluated);
        }
        evaluated
    };

    let new_env = ctx.heap.allocate(HeapObject::Environment(EnvironmentObject {
        bindings: Vec::new(),
        parent: Some(closure_env),
    }))?;

    let mut params = params;
    if operative {
        if !ops::is_pair(&ctx.heap, params) {
            return ctx.exception(ErrorKind::IllegalExpression, Some(params));
        }
        let env_param = ops::car(&ctx.heap, params).expect("checked pair above");
        let Value::Symbol(env_sym) = env_param else {
            return ctx.exception(ErrorKind::IllegalExpression, Some(env_param));
        };
        bind(ctx, new_env, env_sym, Value::Environment(calling_env));
        params = ops::cdr(&ctx.heap, params).expect("checked pair above");
    }

    if let Some(exc) = bind_params(ctx, new_env, params, args)? {
        return Ok(exc);
    }

    let mut result = Value::Void;
    for expr in &body {
        result = eval(ctx, *expr, new_env)?;
        if result.is_exception() {
            return Ok(result);
        }
    }
    Ok(result)
}

fn bind(ctx: &mut Context, env: EnvId, sym: SymbolId, value: Value) {
    match ctx.heap.object_mut(env) {
        HeapObject::Environment(frame) => frame.set(sym, value),
        _ => unreachable!("EnvId always names a HeapObject::Environment"),
    }
}

/// Bind `params` (a possibly-dotted symbol chain, or a bare trailing symbol
/// for the variadic case) to `args` positionally in `env`. Returns
/// `Ok(Some(exception))` on arity/type mismatch rather than a bare `Err`,
/// matching the evaluator's exceptions-as-values policy.
fn bind_params(
    ctx: &mut Context,
    env: EnvId,
    mut params: Value,
    mut args: Value,
) -> Result<Option<Value>, HostError> {
    loop {
        match params {
            Value::Nil => {
                if !args.is_nil() {
                    return Ok(Some(ctx.exception(ErrorKind::Arity, None)?));
                }
                return Ok(None);
            }
            Value::Symbol(tail_sym) => {
                bind(ctx, env, tail_sym, args);
                return Ok(None);
            }
            _ if ops::is_pair(&ctx.heap, params) => {
                let var = ops::car(&ctx.heap, params).expect("checked pair above");
                let Value::Symbol(sym) = var else {
                    return Ok(Some(ctx.exception(ErrorKind::IllegalExpression, Some(var))?));
                };
                if args.is_nil() {
                    return Ok(Some(ctx.exception(ErrorKind::Arity, None)?));
                }
                if !ops::is_pair(&ctx.heap, args) {
                    return Ok(Some(ctx.exception(ErrorKind::IllegalExpression, Some(args))?));
                }
                let val = ops::car(&ctx.heap, args).expect("checked pair above");
                bind(ctx, env, sym, val);
                params = ops::cdr(&ctx.heap, params).expect("checked pair above");
                args = ops::cdr(&ctx.heap, args).expect("checked pair above");
            }
            _ => return Ok(Some(ctx.exception(ErrorKind::IllegalExpression, Some(params))?)),
        }
    }
}

/// Construct a closure from a `(params . body)` operand list, e.g. what
/// `lambda`/`macro` are handed (spec §4.5 procedure forms).
pub fn make_closure(
    ctx: &mut Context,
    operative: bool,
    operands: Value,
    env: EnvId,
) -> Result<Value, HostError> {
    if !operands.is_nil() && !ops::is_pair(&ctx.heap, operands) {
        return ctx.exception(ErrorKind::IllegalExpression, Some(operands));
    }
    let (params, body_list) = if operands.is_nil() {
        (Value::Nil, Value::Nil)
    } else {
        (
            ops::car(&ctx.heap, operands).expect("checked pair above"),
            ops::cdr(&ctx.heap, operands).expect("checked pair above"),
        )
    };
    let mut body = Vec::new();
    let mut rest = body_list;
    loop {
        match rest {
            Value::Nil => break,
            _ if ops::is_pair(&ctx.heap, rest) => {
                body.push(ops::car(&ctx.heap, rest).expect("checked pair above"));
                rest = ops::cdr(&ctx.heap, rest).expect("checked pair above");
            }
            _ => return ctx.exception(ErrorKind::IllegalExpression, Some(rest)),
        }
    }
    let id = ctx.heap.allocate(HeapObject::Closure(ClosureObject {
        operative,
        params,
        body,
        env,
    }))?;
    Ok(Value::Closure(id))
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::context::Context;
    use schola_core::Value;

    fn eval_str(ctx: &mut Context, text: &str) -> Value {
        let bytes = text.as_bytes().to_vec();
        let id = ctx
            .heap
            .allocate(schola_core::HeapObject::Port(schola_core::PortObject::new(
                schola_core::PortIo::File(tempfile_from(&bytes)),
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

    #[test]
    fn self_evaluating_values_evaluate_to_themselves() {
        let mut c = ctx();
        assert_eq!(eval_str(&mut c, "42"), Value::Fixnum(42));
        assert_eq!(eval_str(&mut c, "#t"), Value::True);
    }

    #[test]
    fn arithmetic_builtin_dispatches() {
        let mut c = ctx();
        assert_eq!(eval_str(&mut c, "(+ 1 2 3)"), Value::Fixnum(6));
    }

    #[test]
    fn define_then_lookup() {
        let mut c = ctx();
        assert_eq!(eval_str(&mut c, "(define x 10) x"), Value::Fixnum(10));
    }

    #[test]
    fn lambda_applies_and_closes_over_environment() {
        let mut c = ctx();
        let result = eval_str(
            &mut c,
            "(define sq (lambda (x) (* x x))) (sq 7)",
        );
        assert_eq!(result, Value::Fixnum(49));
    }

    #[test]
    fn nested_lambda_closes_over_outer_parameter() {
        let mut c = ctx();
        let result = eval_str(
            &mut c,
            "(define adder (lambda (x) (lambda (y) (+ x y)))) ((adder 3) 4)",
        );
        assert_eq!(result, Value::Fixnum(7));
    }

    #[test]
    fn if_only_evaluates_the_taken_branch() {
        let mut c = ctx();
        let result = eval_str(&mut c, "(if #f (car 5) 9)");
        assert_eq!(result, Value::Fixnum(9));
    }

    #[test]
    fn operative_macro_receives_caller_environment() {
        let mut c = ctx();
        let result = eval_str(
            &mut c,
            "(define my-if (macro (env c t f) (if (eval c env) (eval t env) (eval f env)))) \
             (my-if #t 1 2)",
        );
        assert_eq!(result, Value::Fixnum(1));
    }

    #[test]
    fn unbound_symbol_is_an_exception() {
        let mut c = ctx();
        assert!(eval_str(&mut c, "nope").is_exception());
    }

    #[test]
    fn arity_mismatch_is_an_exception() {
        let mut c = ctx();
        let result = eval_str(&mut c, "(define f (lambda (x y) x)) (f 1)");
        assert!(result.is_exception());
    }

    #[test]
    fn variadic_tail_parameter_absorbs_remaining_args() {
        let mut c = ctx();
        let result = eval_str(&mut c, "(define f (lambda (a . rest) rest)) (car (f 1 2 3))");
        assert_eq!(result, Value::Fixnum(2));
    }

    #[test]
    fn eval_depth_returns_to_zero_after_top_level_forms() {
        let mut c = ctx();
        eval_str(&mut c, "(+ 1 (* 2 3))");
        assert_eq!(c.eval_depth, 0);
    }

    #[test]
    fn gc_nested_in_an_operand_position_does_not_collect_a_sibling_operand() {
        // (gc) here sits in the second operand position of `cons`, nested
        // one eval deeper than a bare top-level `(gc)` call; `collect`
        // refuses to run in that position (see `Context::collect`), so the
        // freshly-allocated first operand pair is never swept out from
        // under `get_args`'s own accumulator.
        let mut c = ctx();
        let result = eval_str(&mut c, "(cons (cons 1 2) (gc))");
        let car = schola_core::ops::car(&c.heap, result).unwrap();
        assert_eq!(schola_core::ops::car(&c.heap, car).unwrap(), Value::Fixnum(1));
        assert_eq!(schola_core::ops::cdr(&c.heap, car).unwrap(), Value::Fixnum(2));
    }

    #[test]
    fn bare_top_level_gc_call_still_collects() {
        let mut c = ctx();
        // Unreachable the moment this top-level cycle ends: never bound to
        // anything, so nothing in `roots()` keeps it alive.
        eval_str(&mut c, "(cons 1 2)");
        let before = c.heap.bytes_allocated();
        eval_str(&mut c, "(gc)");
        assert!(c.heap.bytes_allocated() < before);
    }
}
