//! Port: a line-counted, single-byte-pushback stream handle.
//!
//! Mirrors `original_source/io.c`'s `simp_readbyte`/`simp_peekbyte`/
//! `simp_unreadbyte` trio: a port is read or written one byte at a time,
//! with exactly one byte of pushback available for the tokenizer to peek
//! past a delimiter. The line counter increments once per `\n` byte read
//! (not `\r`), matching the C reader's comment-terminator convention.

use std::io::{self, Read, Write};

/// The underlying handle a port wraps. Kept as a small closed set (rather
/// than a generic `Box<dyn Read>`) so that `display`/`write`-visible ports
/// (the three standard streams) and file ports have a uniform, printable
/// identity (`#<port ADDR>`, §6) derived from which variant they are.
pub enum PortIo {
    Stdin(io::Stdin),
    Stdout(io::Stdout),
    Stderr(io::Stderr),
    File(std::fs::File),
}

impl PortIo {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        let n = match self {
            PortIo::Stdin(s) => s.read(&mut buf)?,
            PortIo::Stdout(_) | PortIo::Stderr(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "port is not open for reading",
                ));
            }
            PortIo::File(f) => f.read(&mut buf)?,
        };
        Ok(if n == 0 { None } else { Some(buf[0]) })
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            PortIo::Stdin(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "port is not open for writing",
            )),
            PortIo::Stdout(s) => s.write_all(bytes),
            PortIo::Stderr(s) => s.write_all(bytes),
            PortIo::File(f) => f.write_all(bytes),
        }
    }
}

/// Which direction a port was opened for. A port may be both (a read/write
/// file), but the standard streams are strictly one or the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMode {
    pub readable: bool,
    pub writable: bool,
}

/// A heap-resident port object: the opaque stream handle plus the mode
/// flags, line counter, and EOF/error/closed flags spec.md's §3 data model
/// requires.
pub struct PortObject {
    io: Option<PortIo>,
    pub mode: PortMode,
    pub line: usize,
    pub eof: bool,
    pub err: bool,
    pub closed: bool,
    pushback: Option<u8>,
    /// A stable, printable identity for `#<port ADDR>` (§6). Derived once at
    /// construction so that closing a port doesn't change its printed form.
    pub addr: usize,
}

impl PortObject {
    pub fn new(io: PortIo, mode: PortMode, addr: usize) -> Self {
        PortObject {
            io: Some(io),
            mode,
            line: 0,
            eof: false,
            err: false,
            closed: false,
            pushback: None,
            addr,
        }
    }

    /// Read one byte, tracking line number and EOF. Returns `Ok(None)` on
    /// EOF, `Err` on I/O failure (sets `err`).
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.pushback.take() {
            return Ok(Some(b));
        }
        if self.closed || self.eof {
            return Ok(None);
        }
        let io = self.io.as_mut().expect("port io present while open");
        match io.read_byte() {
            Ok(Some(b)) => {
                if b == b'\n' {
                    self.line += 1;
                }
                Ok(Some(b))
            }
            Ok(None) => {
                self.eof = true;
                Ok(None)
            }
            Err(e) => {
                self.err = true;
                Err(e)
            }
        }
    }

    /// Peek the next byte without consuming it.
    pub fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.pushback {
            return Ok(Some(b));
        }
        let b = self.read_byte()?;
        self.pushback = b;
        // Peeking a newline must not double-count it on the subsequent read.
        if b == Some(b'\n') {
            self.line -= 1;
        }
        Ok(b)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        let io = self.io.as_mut().expect("port io present while open");
        io.write_all(bytes).inspect_err(|_| {
            self.err = true;
        })
    }

    /// Idempotent close: a second call on an already-closed port is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.io = None;
    }
}
