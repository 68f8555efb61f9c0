// SPDX-License-Identifier: BSD-3-Clause

//! Shared in-memory channel for integration tests: pre-loads an inbound
//! byte queue and records everything written, without touching any real
//! transport.

use std::collections::VecDeque;

use core_comm::{Channel, Result};

pub struct MemChannel {
    pub inbound: VecDeque<u8>,
    pub outbound: Vec<u8>,
}

impl MemChannel {
    pub fn new(inbound: Vec<u8>) -> Self {
        Self {
            inbound: inbound.into(),
            outbound: Vec::new(),
        }
    }
}

impl Channel for MemChannel {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.inbound.len() < buf.len() {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        for b in buf {
            *b = self.inbound.pop_front().unwrap();
        }
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.outbound.extend_from_slice(buf);
        Ok(())
    }
}

pub fn envelope(ty: u8, body: &[u8]) -> Vec<u8> {
    use core_comm::types::{MIN_ENVELOPE_LENGTH, SYNC_BYTES};
    let length = (MIN_ENVELOPE_LENGTH as usize + body.len()) as i32;
    let mut buf = Vec::new();
    buf.extend_from_slice(&SYNC_BYTES);
    buf.extend_from_slice(&length.to_be_bytes());
    buf.push(ty);
    buf.extend_from_slice(body);
    buf
}

pub fn push_string(buf: &mut Vec<u8>, s: &str) {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    buf.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
    buf.extend_from_slice(&bytes);
}
