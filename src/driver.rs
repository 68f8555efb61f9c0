// SPDX-License-Identifier: BSD-3-Clause

//! The driver: the single entry point composing a [`Framer`] with the
//! control operations (`control` module) and the RPC serve loop (`rpc`
//! module). See `spec.md` §2 and SPEC_FULL.md §2's construction-ergonomics
//! note.

use crate::channel::Channel;
use crate::error::Result;
use crate::framer::Framer;

/// Owns one core-device session end to end: opening the channel, running
/// control operations, serving RPCs for a kernel run, and resetting or
/// closing the session.
pub struct Driver<C> {
    pub(crate) framer: Framer<C>,
}

impl<C: Channel> Driver<C> {
    pub fn new(channel: C) -> Self {
        Self {
            framer: Framer::new(channel),
        }
    }

    pub fn open(&mut self) -> Result<()> {
        self.framer.open()
    }

    pub fn close(&mut self) -> Result<()> {
        self.framer.close()
    }

    pub fn pause(&mut self) -> Result<()> {
        self.framer.pause()
    }

    /// Tells the device to discard any in-progress message and
    /// resynchronize, and resets local parser/builder state to match.
    pub fn reset_session(&mut self) -> Result<()> {
        self.framer.reset_session()
    }

    pub fn into_channel(self) -> C {
        self.framer.into_channel()
    }
}
