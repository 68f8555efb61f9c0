// SPDX-License-Identifier: BSD-3-Clause

//! The abstract full-duplex byte channel the driver is built on. The
//! transport itself (TCP, serial, ...) is out of scope; this module only
//! defines the capability the rest of the crate needs.

use std::io::{Read, Write};

use crate::error::Result;

/// A full-duplex, reliable, ordered, byte-granular channel, owned
/// exclusively by the driver for the duration of a session.
pub trait Channel {
    /// Opens the channel. Must be idempotent.
    fn open(&mut self) -> Result<()>;

    /// Closes the channel. Must be idempotent.
    fn close(&mut self) -> Result<()>;

    /// Reads exactly `buf.len()` bytes, or fails.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Writes all of `buf`, or fails.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Suspends the session. Defined as `close`; the session may be resumed
    /// by reopening and writing the reset sentinel.
    fn pause(&mut self) -> Result<()> {
        self.close()
    }
}

/// Adapts any `Read + Write` stream (`TcpStream`, `UnixStream`, a test
/// pipe, ...) into a [`Channel`]. `open`/`close` are no-ops: such streams
/// are already open once constructed and are closed by dropping them.
pub struct StreamChannel<S> {
    stream: S,
}

impl<S> StreamChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Channel for StreamChannel<S> {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf).map_err(Into::into)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf).map_err(Into::into)
    }
}
