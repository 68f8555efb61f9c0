// SPDX-License-Identifier: BSD-3-Clause

use std::fmt;

use crate::types::D2HMessageType;

/// The possible errors that can arise while driving a core-device session.
///
/// Framing and transport errors leave the session unusable: the caller must
/// close and reopen the channel. A `ReturnValueType` or `KernelException`
/// error is local to one RPC; the serve loop keeps running afterwards.
#[derive(Debug)]
pub enum Error {
    /// The channel itself failed to open, read, or write.
    Transport(std::io::Error),

    /// The wire framing was violated.
    Framing(FramingError),

    /// A reply of a type other than the one awaited was received.
    UnexpectedReply {
        expected: D2HMessageType,
        actual: D2HMessageType,
    },

    /// The identity magic did not match `"AROR"`.
    UnsupportedDevice { magic: [u8; 4] },

    /// `flash_write` could not find space for the value.
    FlashFull,

    /// `LOAD_LIBRARY` was rejected by the device.
    LoadFailed,

    /// The kernel failed to start after `RUN_KERNEL`.
    KernelStartupFailed,

    /// A service's return value did not match its declared return-tag
    /// stream.
    ReturnValueType {
        function: String,
        expected: String,
        value: String,
    },

    /// A kernel-side exception was decoded and is being re-raised on the
    /// host.
    KernelException(crate::exception::CoreException),

    /// The core's watchdog expired while the kernel was running.
    WatchdogExpired,

    /// The core's clock failed while the kernel was running.
    ClockFailure,

    /// A message of unexpected type was seen for the current protocol
    /// state.
    Protocol(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Framing(e) => write!(f, "framing error: {e}"),
            Self::UnexpectedReply { expected, actual } => {
                write!(f, "unexpected reply: expected {expected:?}, got {actual:?}")
            }
            Self::UnsupportedDevice { magic } => {
                write!(f, "unsupported device: bad identity magic {magic:02x?}")
            }
            Self::FlashFull => write!(f, "flash storage is full"),
            Self::LoadFailed => write!(f, "kernel library load failed"),
            Self::KernelStartupFailed => write!(f, "kernel failed to start"),
            Self::ReturnValueType {
                function,
                expected,
                value,
            } => write!(
                f,
                "type mismatch: cannot serialize {value} as {expected} ({function} returned it)"
            ),
            Self::KernelException(exn) => write!(f, "kernel exception: {}: {}", exn.name, exn.message),
            Self::WatchdogExpired => write!(f, "watchdog expired"),
            Self::ClockFailure => write!(f, "clock failure"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<FramingError> for Error {
    fn from(e: FramingError) -> Self {
        Self::Framing(e)
    }
}

#[derive(Debug)]
pub enum FramingError {
    /// A new header was read before the previous message was fully drained.
    ReadUnderrun { remaining: usize },

    /// A chunk read asked for more bytes than remain in the current
    /// message.
    ReadOverrun { requested: usize, remaining: usize },

    /// The envelope's length field was below the 9-byte minimum.
    MalformedHeader { length: i32 },

    /// A zero-length envelope was received: the peer is closing the
    /// session.
    ConnectionClosed,

    /// The message type byte did not name a known D2H message type.
    UnknownMessageType(u8),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadUnderrun { remaining } => {
                write!(f, "read underrun ({remaining} bytes remaining)")
            }
            Self::ReadOverrun {
                requested,
                remaining,
            } => write!(
                f,
                "read overrun (requested {requested} bytes, {remaining} remaining)"
            ),
            Self::MalformedHeader { length } => {
                write!(f, "malformed header: length {length} is below the 9-byte minimum")
            }
            Self::ConnectionClosed => write!(f, "connection closed by peer"),
            Self::UnknownMessageType(ty) => write!(f, "unknown message type byte: {ty}"),
        }
    }
}

impl std::error::Error for FramingError {}

pub type Result<T> = std::result::Result<T, Error>;
