// SPDX-License-Identifier: BSD-3-Clause

//! The length-prefixed, sync-framed message envelope: reading headers and
//! chunks off an inbound message, and building and flushing an outbound
//! one.

use log::trace;

use crate::channel::Channel;
use crate::error::{Error, FramingError, Result};
use crate::types::{D2HMessageType, H2DMessageType, MIN_ENVELOPE_LENGTH, SYNC_BYTES};

/// Wraps a [`Channel`] with the envelope parser/builder state that exists
/// only for the lifetime of a session.
pub struct Framer<C> {
    channel: C,
    read_type: Option<D2HMessageType>,
    remaining: usize,
    pending_type: Option<H2DMessageType>,
    pending_chunks: Vec<Vec<u8>>,
}

impl<C: Channel> Framer<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            read_type: None,
            remaining: 0,
            pending_type: None,
            pending_chunks: Vec::new(),
        }
    }

    pub fn open(&mut self) -> Result<()> {
        self.channel.open()
    }

    pub fn close(&mut self) -> Result<()> {
        self.channel.close()
    }

    pub fn pause(&mut self) -> Result<()> {
        self.channel.pause()
    }

    /// Unwraps the underlying channel, discarding any parser/builder
    /// state.
    pub fn into_channel(self) -> C {
        self.channel
    }

    /// The message type of the message currently being read, if a header
    /// has been read and not yet fully drained.
    pub fn current_type(&self) -> Option<D2HMessageType> {
        self.read_type
    }

    /// Bytes remaining to be read from the current inbound message.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Reads a new envelope header: resynchronizes on the sync sequence,
    /// reads the length and type, and sets up `remaining` for the body.
    pub fn read_header(&mut self) -> Result<D2HMessageType> {
        self.open()?;

        if self.remaining > 0 {
            return Err(FramingError::ReadUnderrun {
                remaining: self.remaining,
            }
            .into());
        }

        self.resynchronize()?;

        let mut length_bytes = [0u8; 4];
        self.channel.read_exact(&mut length_bytes)?;
        let length = i32::from_be_bytes(length_bytes);

        if length == 0 {
            return Err(FramingError::ConnectionClosed.into());
        }
        if length < MIN_ENVELOPE_LENGTH {
            return Err(FramingError::MalformedHeader { length }.into());
        }

        let mut type_byte = [0u8; 1];
        self.channel.read_exact(&mut type_byte)?;
        let ty = D2HMessageType::try_from(type_byte[0])?;

        self.read_type = Some(ty);
        self.remaining = (length - MIN_ENVELOPE_LENGTH) as usize;

        trace!("read header: type={ty:?} remaining={}", self.remaining);

        Ok(ty)
    }

    /// Consumes bytes from the channel until four consecutive sync bytes
    /// have been seen. Any other byte silently restarts the count.
    fn resynchronize(&mut self) -> Result<()> {
        let mut matched = 0usize;
        while matched < SYNC_BYTES.len() {
            let mut byte = [0u8; 1];
            self.channel.read_exact(&mut byte)?;
            if byte[0] == SYNC_BYTES[matched] {
                matched += 1;
            } else {
                matched = 0;
            }
        }
        Ok(())
    }

    /// Fails unless the current inbound message is of type `ty`.
    pub fn read_expect(&self, ty: D2HMessageType) -> Result<()> {
        match self.read_type {
            Some(actual) if actual == ty => Ok(()),
            Some(actual) => Err(Error::UnexpectedReply {
                expected: ty,
                actual,
            }),
            None => Err(Error::Protocol("no message header has been read".into())),
        }
    }

    /// Reads exactly `ty`'s (empty) body and drains it.
    pub fn read_empty(&mut self, ty: D2HMessageType) -> Result<()> {
        self.read_expect(ty)?;
        self.read_chunk(self.remaining)?;
        Ok(())
    }

    /// Reads exactly `n` bytes from the current inbound message.
    pub fn read_chunk(&mut self, n: usize) -> Result<Vec<u8>> {
        if n > self.remaining {
            return Err(FramingError::ReadOverrun {
                requested: n,
                remaining: self.remaining,
            }
            .into());
        }

        let mut buf = vec![0u8; n];
        self.channel.read_exact(&mut buf)?;
        self.remaining -= n;
        Ok(buf)
    }

    /// Drains whatever remains of the current inbound message without
    /// interpreting it.
    pub fn drain(&mut self) -> Result<()> {
        self.read_chunk(self.remaining)?;
        Ok(())
    }

    /// Starts building an outbound message of type `ty`.
    pub fn write_header(&mut self, ty: H2DMessageType) {
        self.pending_type = Some(ty);
        self.pending_chunks.clear();
    }

    /// Appends a chunk to the outbound message under construction.
    pub fn write_chunk(&mut self, chunk: Vec<u8>) {
        self.pending_chunks.push(chunk);
    }

    /// Flushes the outbound message: computes the length, writes the
    /// envelope, then every chunk in order, then clears the builder.
    pub fn write_flush(&mut self) -> Result<()> {
        let ty = self
            .pending_type
            .take()
            .expect("write_flush called with no pending header");

        let body_len: usize = self.pending_chunks.iter().map(Vec::len).sum();
        let length = MIN_ENVELOPE_LENGTH as usize + body_len;

        let mut out = Vec::with_capacity(4 + 4 + 1 + body_len);
        out.extend_from_slice(&SYNC_BYTES);
        out.extend_from_slice(&(length as i32).to_be_bytes());
        out.push(ty as u8);
        for chunk in self.pending_chunks.drain(..) {
            out.extend_from_slice(&chunk);
        }

        self.channel.write_all(&out)
    }

    /// Writes an empty message of type `ty` and flushes it.
    pub fn write_empty(&mut self, ty: H2DMessageType) -> Result<()> {
        self.write_header(ty);
        self.write_flush()
    }

    /// Writes the zero-length sync sentinel that tells the device to
    /// discard any in-progress state and resynchronize. Resets the local
    /// inbound parser state as well, since the session is starting over.
    /// Test-only accessor for the underlying channel, used by sibling
    /// modules' unit tests that build on [`tests::MemChannel`].
    #[cfg(test)]
    pub(crate) fn test_channel(&self) -> &C {
        &self.channel
    }

    pub fn reset_session(&mut self) -> Result<()> {
        let mut out = Vec::with_capacity(8);
        out.extend_from_slice(&SYNC_BYTES);
        out.extend_from_slice(&0i32.to_be_bytes());
        self.channel.write_all(&out)?;

        self.read_type = None;
        self.remaining = 0;
        self.pending_type = None;
        self.pending_chunks.clear();
        Ok(())
    }
}
