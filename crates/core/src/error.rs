//! Error kinds and host-level failures.
//!
//! The language-level error surface (§7) is a first-class *exception value*
//! (see [`crate::value::Value::Exception`]) so that evaluated Simp/Schola
//! code can inspect and eventually handle it. [`HostError`] is for failures
//! that can never be caught by interpreted code: the allocator refusing a
//! request, or I/O failing on a stream the host itself owns.

use std::fmt;

/// The kind of a language-level exception, carried inside an
/// [`ExceptionObject`](crate::heap::ExceptionObject).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed syntax discovered after reading (e.g. `if` with the wrong
    /// arity, a dotted pair where a proper list is required).
    IllegalExpression,
    /// An operation was applied to a value of the wrong kind.
    IllegalType,
    /// Too few or too many arguments were supplied to an operator.
    Arity,
    /// A symbol has no binding in the environment chain.
    Unbound,
    /// I/O failed on a port.
    PortError,
    /// The heap allocator could not satisfy a request.
    OutOfMemory,
    /// The reader encountered malformed textual input.
    SyntaxError,
    /// End of file was reached with an open reader state.
    UnexpectedEof,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::IllegalExpression => "illegal-expression",
            ErrorKind::IllegalType => "illegal-type",
            ErrorKind::Arity => "arity",
            ErrorKind::Unbound => "unbound",
            ErrorKind::PortError => "port-error",
            ErrorKind::OutOfMemory => "out-of-memory",
            ErrorKind::SyntaxError => "syntax-error",
            ErrorKind::UnexpectedEof => "unexpected-eof",
        };
        f.write_str(name)
    }
}

/// A failure that originates below the language, not representable as a
/// Simp/Schola exception value because producing one would itself require
/// the resource that just failed.
#[derive(Debug)]
pub enum HostError {
    /// The heap's object table is at its configured hard cap.
    OutOfMemory,
    /// I/O failed on a host-owned stream (not a Simp port).
    Io(std::io::Error),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::OutOfMemory => write!(f, "out of memory: heap object cap reached"),
            HostError::Io(e) => write!(f, "host I/O error: {e}"),
        }
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HostError::OutOfMemory => None,
            HostError::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for HostError {
    fn from(e: std::io::Error) -> Self {
        HostError::Io(e)
    }
}
