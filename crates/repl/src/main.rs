//! schola: the prompt-loop driver (spec §6).
//!
//! Out of scope for the core crates by design (spec.md's Overview): this
//! binary only wires standard streams into a [`schola_runtime::Context`],
//! loads configuration, and runs the read/eval/write/newline cycle until
//! EOF. Everything it does is a thin shell around `schola-runtime`.

use clap::Parser;
use schola_core::heap::ExceptionObject;
use schola_core::{HeapObject, Value};
use schola_runtime::{Config, Context};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "schola", about = "A Simp/Schola interpreter")]
struct Args {
    /// Path to a `schola.toml` config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the GC pressure threshold, in bytes of live heap payload.
    #[arg(long)]
    gc_threshold: Option<usize>,

    /// Override the prompt text written before each read.
    #[arg(long)]
    prompt: Option<String>,
}

fn load_config(args: &Args) -> Config {
    let mut config = match &args.config {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => Config::from_toml_str(&text).unwrap_or_else(|e| {
                error!(error = %e, path = %path.display(), "malformed config file, using defaults");
                Config::default()
            }),
            Err(e) => {
                error!(error = %e, path = %path.display(), "could not read config file, using defaults");
                Config::default()
            }
        },
        None => Config::default(),
    };
    config.apply_overrides(args.gc_threshold, args.prompt.clone());
    config
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(&args);

    let mut ctx = match Context::with_stdio(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %e, "failed to initialize interpreter context");
            return ExitCode::FAILURE;
        }
    };

    loop {
        let stdin = ctx.stdin;
        let stdout = ctx.stdout;
        let stderr = ctx.stderr;
        let global_env = ctx.global_env;
        let prompt = ctx.config.prompt.clone().into_bytes();

        if let Err(e) = write_bytes(&mut ctx, stdout, &prompt) {
            error!(error = %e, "fatal I/O failure writing prompt");
            return ExitCode::FAILURE;
        }

        let form = match ctx.read(stdin) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "fatal I/O failure reading input");
                return ExitCode::FAILURE;
            }
        };
        if form.is_eof() {
            return ExitCode::SUCCESS;
        }

        let result = match ctx.eval(form, global_env) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "fatal allocator failure during evaluation");
                return ExitCode::FAILURE;
            }
        };

        let report = if result.is_exception() {
            report_exception(&mut ctx, stderr, result)
        } else {
            let bytes = schola_runtime::printer::format(&ctx.heap, result, true);
            write_bytes(&mut ctx, stdout, &bytes).and_then(|()| write_bytes(&mut ctx, stdout, b"\n"))
        };
        if let Err(e) = report {
            error!(error = %e, "fatal I/O failure writing result");
            return ExitCode::FAILURE;
        }

        ctx.collect_if_pressured();
    }
}

/// Write the exception's kind (and offending source, if any) to the error
/// port, per §7's "writes the exception (type name and, where available,
/// offending source) to the error port and continues".
fn report_exception(ctx: &mut Context, stderr: Value, exc: Value) -> Result<(), schola_core::HostError> {
    let Value::Exception(id) = exc else {
        unreachable!("report_exception called with a non-exception value");
    };
    let (kind, payload) = match ctx.heap.object(id) {
        HeapObject::Exception(ExceptionObject { kind, payload }) => (*kind, *payload),
        _ => unreachable!("Value::Exception always names a HeapObject::Exception"),
    };
    let mut line = format!("error: {kind}").into_bytes();
    if let Some(p) = payload {
        line.push(b':');
        line.push(b' ');
        line.extend(schola_runtime::printer::format(&ctx.heap, p, true));
    }
    line.push(b'\n');
    write_bytes(ctx, stderr, &line)
}

fn write_bytes(ctx: &mut Context, port: Value, bytes: &[u8]) -> Result<(), schola_core::HostError> {
    let Value::Port(id) = port else {
        unreachable!("standard ports are always Value::Port");
    };
    match ctx.heap.object_mut(id) {
        HeapObject::Port(p) => p.write_bytes(bytes).map_err(schola_core::HostError::Io),
        _ => unreachable!("Value::Port always names a HeapObject::Port"),
    }
}
