// SPDX-License-Identifier: BSD-3-Clause

//! The nine request/reply control operations: each writes a request,
//! flushes it, reads the reply header, and decodes the body, failing with
//! `Error::UnexpectedReply` if a differently-typed reply arrives. See
//! `spec.md` §4.4.

use log::warn;

use crate::channel::Channel;
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::types::{D2HMessageType, H2DMessageType, IDENT_MAGIC};

impl<C: Channel> Driver<C> {
    /// Requests and returns the device's identity magic and build info
    /// string, logging a `warn!` if the build version doesn't match this
    /// crate's, but not failing the call.
    pub fn check_ident(&mut self) -> Result<String> {
        self.framer.write_empty(H2DMessageType::IdentRequest)?;
        self.framer.read_header()?;
        self.framer.read_expect(D2HMessageType::IdentReply)?;

        let magic = self.framer.read_chunk(4)?;
        let magic: [u8; 4] = magic.try_into().unwrap();
        if magic != IDENT_MAGIC {
            self.framer.drain()?;
            return Err(Error::UnsupportedDevice { magic });
        }

        let info = self.framer.read_string()?;
        if !version_compatible(&info) {
            warn!("core device reports build info {info:?}, which may not match this driver");
        }
        Ok(info)
    }

    /// Requests the device switch its RTIO clock.
    pub fn switch_clock(&mut self, clock: u8) -> Result<()> {
        self.framer.write_header(H2DMessageType::SwitchClock);
        self.framer.write_chunk(vec![clock]);
        self.framer.write_flush()?;

        self.framer.read_header()?;
        match self.framer.current_type() {
            Some(D2HMessageType::ClockSwitchCompleted) => {
                self.framer.drain()?;
                Ok(())
            }
            Some(D2HMessageType::ClockSwitchFailed) => {
                self.framer.drain()?;
                Err(Error::Protocol("clock switch failed".into()))
            }
            Some(actual) => Err(Error::UnexpectedReply {
                expected: D2HMessageType::ClockSwitchCompleted,
                actual,
            }),
            None => unreachable!("read_header always sets current_type on success"),
        }
    }

    /// Requests and returns the current contents of the device's log
    /// buffer, decoded lossily (invalid UTF-8 is replaced, never a hard
    /// failure, since this channel carries free-form diagnostic text).
    pub fn get_log(&mut self) -> Result<String> {
        self.framer.write_empty(H2DMessageType::LogRequest)?;
        self.framer.read_header()?;
        self.framer.read_expect(D2HMessageType::LogReply)?;

        let bytes = self.framer.read_chunk(self.framer.remaining())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Clears the device's log buffer.
    pub fn clear_log(&mut self) -> Result<()> {
        self.framer.write_empty(H2DMessageType::LogClear)?;
        self.framer.read_header()?;
        self.framer.read_empty(D2HMessageType::LogReply)
    }

    /// Reads a value previously written to flash storage at `key`. A
    /// missing key comes back as a zero-length `FLASH_READ_REPLY` body,
    /// indistinguishable on the wire from a stored empty value.
    pub fn flash_read(&mut self, key: &str) -> Result<Vec<u8>> {
        self.framer.write_header(H2DMessageType::FlashReadRequest);
        self.framer.write_string(key);
        self.framer.write_flush()?;

        self.framer.read_header()?;
        self.framer.read_expect(D2HMessageType::FlashReadReply)?;
        self.framer.read_chunk(self.framer.remaining())
    }

    /// Writes `value` to flash storage at `key`, failing with
    /// `Error::FlashFull` if there is no room.
    pub fn flash_write(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.framer.write_header(H2DMessageType::FlashWriteRequest);
        self.framer.write_string(key);
        self.framer.write_bytes(value);
        self.framer.write_flush()?;

        self.framer.read_header()?;
        match self.framer.current_type() {
            Some(D2HMessageType::FlashOkReply) => {
                self.framer.drain()?;
                Ok(())
            }
            Some(D2HMessageType::FlashErrorReply) => {
                self.framer.drain()?;
                Err(Error::FlashFull)
            }
            Some(actual) => Err(Error::UnexpectedReply {
                expected: D2HMessageType::FlashOkReply,
                actual,
            }),
            None => unreachable!(),
        }
    }

    /// Erases the entirety of flash storage.
    pub fn flash_erase(&mut self) -> Result<()> {
        self.framer.write_empty(H2DMessageType::FlashEraseRequest)?;
        self.framer.read_header()?;
        self.framer.read_empty(D2HMessageType::FlashOkReply)
    }

    /// Removes a single key from flash storage. Absence of the key is not
    /// an error.
    pub fn flash_remove(&mut self, key: &str) -> Result<()> {
        self.framer.write_header(H2DMessageType::FlashRemoveRequest);
        self.framer.write_string(key);
        self.framer.write_flush()?;
        self.framer.read_header()?;
        self.framer.read_empty(D2HMessageType::FlashOkReply)
    }

    /// Loads a compiled kernel library into the device, failing with
    /// `Error::LoadFailed` if the device rejects it.
    pub fn load(&mut self, library: &[u8]) -> Result<()> {
        self.framer.write_header(H2DMessageType::LoadLibrary);
        self.framer.write_bytes(library);
        self.framer.write_flush()?;

        self.framer.read_header()?;
        match self.framer.current_type() {
            Some(D2HMessageType::LoadCompleted) => {
                self.framer.drain()?;
                Ok(())
            }
            Some(D2HMessageType::LoadFailed) => {
                self.framer.drain()?;
                Err(Error::LoadFailed)
            }
            Some(actual) => Err(Error::UnexpectedReply {
                expected: D2HMessageType::LoadCompleted,
                actual,
            }),
            None => unreachable!(),
        }
    }

    /// Starts the currently-loaded kernel running. The caller must follow
    /// this with `serve` to pump the RPC loop to completion.
    pub fn run(&mut self) -> Result<()> {
        self.framer.write_empty(H2DMessageType::RunKernel)
    }
}

/// `.dirty`-tolerant comparison: a build info string carrying a `.dirty`
/// suffix (an uncommitted local build) is accepted without warning,
/// matching the original driver's leniency for development builds.
fn version_compatible(info: &str) -> bool {
    let stripped = info.strip_suffix(".dirty").unwrap_or(info);
    stripped.contains(env!("CARGO_PKG_VERSION")) || info.is_empty()
}
