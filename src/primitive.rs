// SPDX-License-Identifier: BSD-3-Clause

//! Big-endian fixed-width integers, IEEE-754 doubles, and length-prefixed
//! byte/UTF-8 strings, layered on top of the [`Framer`]'s chunked
//! read/write.

use crate::channel::Channel;
use crate::error::Result;
use crate::framer::Framer;

impl<C: Channel> Framer<C> {
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_chunk(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_chunk(1)?[0] as i8)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let buf = self.read_chunk(4)?;
        Ok(i32::from_be_bytes(buf.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let buf = self.read_chunk(8)?;
        Ok(i64::from_be_bytes(buf.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let buf = self.read_chunk(8)?;
        Ok(f64::from_be_bytes(buf.try_into().unwrap()))
    }

    /// Reads a raw length-prefixed blob.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_i32()? as usize;
        self.read_chunk(len)
    }

    /// Reads a length-prefixed, NUL-terminated UTF-8 string, stripping the
    /// trailing NUL before decoding.
    pub fn read_string(&mut self) -> Result<String> {
        let mut bytes = self.read_bytes()?;
        bytes.pop();
        String::from_utf8(bytes)
            .map_err(|e| crate::error::Error::Protocol(format!("invalid UTF-8 in string: {e}")))
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_chunk(vec![value]);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write_chunk(vec![value as u8]);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_chunk(value.to_be_bytes().to_vec());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_chunk(value.to_be_bytes().to_vec());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_chunk(value.to_be_bytes().to_vec());
    }

    /// Writes a raw length-prefixed blob.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.write_i32(value.len() as i32);
        self.write_chunk(value.to_vec());
    }

    /// Writes a string as a NUL-terminated, length-prefixed blob.
    pub fn write_string(&mut self, value: &str) {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.write_bytes(&bytes);
    }
}
