//! Context: bundles the symbol table, ports, global environment, and heap
//! (spec §4.3).
//!
//! Construction wires caller-supplied stream handles into the three
//! standard ports; destruction (`Drop`) runs a final GC pass and releases
//! the heap, matching "destruction triggers a final GC pass and then
//! releases the heap."

use crate::builtins;
use crate::config::Config;
use crate::symbols::SymbolTable;
use schola_core::heap::ExceptionObject;
use schola_core::{
    EnvId, EnvironmentObject, ErrorKind, Heap, HeapObject, HostError, PortIo, PortMode, PortObject,
    Value,
};
use tracing::debug;

pub struct Context {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub global_env: EnvId,
    pub stdin: Value,
    pub stdout: Value,
    pub stderr: Value,
    pub config: Config,
    /// How many nested `eval::eval` calls are currently on the Rust stack.
    /// `collect` consults this so a `gc` builtin invoked from an operand
    /// position (e.g. `(cons (cons 1 2) (gc))`) can't sweep a value some
    /// enclosing `evalargs`/`get_args` accumulator is still holding outside
    /// the root set — see `collect`'s doc comment and DESIGN.md.
    pub eval_depth: u32,
}

impl Context {
    /// Build a context wired to the process's real standard streams.
    pub fn with_stdio(config: Config) -> Result<Self, HostError> {
        let mut heap = Heap::new();
        let stdin_id = heap.allocate(HeapObject::Port(PortObject::new(
            PortIo::Stdin(std::io::stdin()),
            PortMode {
                readable: true,
                writable: false,
            },
            1,
        )))?;
        let stdout_id = heap.allocate(HeapObject::Port(PortObject::new(
            PortIo::Stdout(std::io::stdout()),
            PortMode {
                readable: false,
                writable: true,
            },
            2,
        )))?;
        let stderr_id = heap.allocate(HeapObject::Port(PortObject::new(
            PortIo::Stderr(std::io::stderr()),
            PortMode {
                readable: false,
                writable: true,
            },
            3,
        )))?;
        let global_env = heap.allocate(HeapObject::Environment(EnvironmentObject {
            bindings: Vec::new(),
            parent: None,
        }))?;
        let mut ctx = Context {
            heap,
            symbols: SymbolTable::new(),
            global_env,
            stdin: Value::Port(stdin_id),
            stdout: Value::Port(stdout_id),
            stderr: Value::Port(stderr_id),
            config,
            eval_depth: 0,
        };
        builtins::install(&mut ctx)?;
        Ok(ctx)
    }

    /// Read one value from `port` (defaults conceptually to `self.stdin`;
    /// callers pick which port explicitly, matching that ports are
    /// first-class values, not an implicit global).
    pub fn read(&mut self, port: Value) -> Result<Value, HostError> {
        let port_id = port.heap_id().expect("read: not a port value");
        crate::reader::read(&mut self.heap, &mut self.symbols, port_id)
    }

    pub fn eval(&mut self, expr: Value, env: EnvId) -> Result<Value, HostError> {
        crate::eval::eval(self, expr, env)
    }

    /// Allocate a first-class exception value (§7). Every builtin/evaluator
    /// failure surfaces this way rather than as a Rust `Err`, so malformed
    /// user programs never abort the host process.
    pub fn exception(&mut self, kind: ErrorKind, payload: Option<Value>) -> Result<Value, HostError> {
        let id = self.heap.allocate(HeapObject::Exception(ExceptionObject { kind, payload }))?;
        Ok(Value::Exception(id))
    }

    /// The GC roots the context is responsible for (§4.1, §4.3): the
    /// symbol table, the three standard ports, and the global environment.
    /// This does *not* cover values an in-progress `evalargs`/`get_args`
    /// accumulator is holding on the Rust stack (§4.1's "any in-progress
    /// evaluation roots held by the evaluator's traversal") — `collect`
    /// instead refuses to run at all while such an accumulator could be
    /// live, rather than trying to enumerate it.
    fn roots(&self) -> Vec<Value> {
        let mut roots: Vec<Value> = self.symbols.roots().collect();
        roots.push(self.stdin);
        roots.push(self.stdout);
        roots.push(self.stderr);
        roots.push(Value::Environment(self.global_env));
        roots
    }

    /// Run a collection now, unless a `gc` builtin call is nested inside
    /// another evaluation that's still holding already-evaluated operands
    /// outside the root set (e.g. `(cons (cons 1 2) (gc))`: `cons`'s
    /// `get_args` has the inner pair in a local `Vec`, not in `roots()`,
    /// when `(gc)` runs). `eval_depth == 1` means the only evaluation on
    /// the stack is the one `collect`'s own caller is nested in — safe, no
    /// sibling operand is pending. `eval_depth == 0` covers the REPL's
    /// between-cycle safepoint and the final `Drop` collection, where no
    /// `eval` call is running at all. Anything deeper is a no-op.
    pub fn collect(&mut self) {
        if self.eval_depth > 1 {
            debug!(depth = self.eval_depth, "gc collect skipped: nested inside another evaluation");
            return;
        }
        let roots = self.roots();
        debug!(bytes = self.heap.bytes_allocated(), "gc collect requested");
        self.heap.collect(&roots);
    }

    /// Collect if allocation pressure has crossed the configured threshold.
    pub fn collect_if_pressured(&mut self) {
        if self.heap.bytes_allocated() >= self.config.gc_threshold {
            self.collect();
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.collect();
        self.heap.shutdown();
    }
}
