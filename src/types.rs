// SPDX-License-Identifier: BSD-3-Clause

//! Wire constants and the H2D/D2H message type enumerations.

use crate::error::FramingError;

/// Four-byte synchronization sequence that opens every envelope.
pub const SYNC_BYTES: [u8; 4] = [0x5A, 0x5A, 0x5A, 0x5A];

/// Minimum total envelope length: 4 sync bytes + 4 length bytes + 1 type byte.
pub const MIN_ENVELOPE_LENGTH: i32 = 9;

/// Expected 4-byte identity magic in an `IDENT_REPLY` body.
pub const IDENT_MAGIC: [u8; 4] = *b"AROR";

/// Host-to-device message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum H2DMessageType {
    LogRequest = 1,
    LogClear = 2,
    IdentRequest = 3,
    SwitchClock = 4,
    LoadLibrary = 5,
    RunKernel = 6,
    RpcReply = 7,
    RpcException = 8,
    FlashReadRequest = 9,
    FlashWriteRequest = 10,
    FlashEraseRequest = 11,
    FlashRemoveRequest = 12,
}

/// Device-to-host message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum D2HMessageType {
    LogReply = 1,
    IdentReply = 2,
    ClockSwitchCompleted = 3,
    ClockSwitchFailed = 4,
    LoadCompleted = 5,
    LoadFailed = 6,
    KernelFinished = 7,
    KernelStartupFailed = 8,
    KernelException = 9,
    RpcRequest = 10,
    FlashReadReply = 11,
    FlashOkReply = 12,
    FlashErrorReply = 13,
    WatchdogExpired = 14,
    ClockFailure = 15,
}

impl TryFrom<u8> for D2HMessageType {
    type Error = FramingError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            1 => Self::LogReply,
            2 => Self::IdentReply,
            3 => Self::ClockSwitchCompleted,
            4 => Self::ClockSwitchFailed,
            5 => Self::LoadCompleted,
            6 => Self::LoadFailed,
            7 => Self::KernelFinished,
            8 => Self::KernelStartupFailed,
            9 => Self::KernelException,
            10 => Self::RpcRequest,
            11 => Self::FlashReadReply,
            12 => Self::FlashOkReply,
            13 => Self::FlashErrorReply,
            14 => Self::WatchdogExpired,
            15 => Self::ClockFailure,
            other => return Err(FramingError::UnknownMessageType(other)),
        })
    }
}
