// SPDX-License-Identifier: BSD-3-Clause

//! Host-side driver for the core-device communications protocol: a
//! length-prefixed, sync-framed binary RPC channel between a host and an
//! embedded device running a compiled kernel.
//!
//! The crate defines the wire protocol and the collaborator traits
//! (`Channel`, `EmbeddingMap`, `Symbolizer`, `Demangler`, `ServiceRegistry`)
//! a host application supplies; it does not itself provide a transport,
//! a kernel compiler, or a device-side implementation.

pub mod channel;
pub mod control;
pub mod driver;
pub mod embedding;
pub mod error;
pub mod exception;
pub mod framer;
pub mod primitive;
pub mod rpc;
pub mod types;
pub mod value;

pub use channel::{Channel, StreamChannel};
pub use driver::Driver;
pub use embedding::{EmbeddedObject, EmbeddingMap, TestEmbeddingMap};
pub use error::{Error, FramingError, Result};
pub use exception::{CoreException, Demangler, Frame, HostException, Symbolizer};
pub use framer::Framer;
pub use rpc::{RunOutcome, Service, ServiceRegistry};
pub use types::{D2HMessageType, H2DMessageType};
pub use value::{TagStream, Value};
