// SPDX-License-Identifier: BSD-3-Clause

//! The exception bridge: marshaling device-raised core exceptions to the
//! host, and host-raised exceptions back to the device. See `spec.md`
//! §3 ("Core Exception"), §4.7.

use crate::channel::Channel;
use crate::embedding::EmbeddingMap;
use crate::error::Result;
use crate::framer::Framer;

/// One frame of a symbolized, demangled backtrace.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub file: String,
    pub line: i32,
    pub column: i32,
    pub function: String,
}

/// A structured exception record originating in a kernel, or synthesized
/// on the host to send back to one.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreException {
    pub name: String,
    pub message: String,
    pub params: [i64; 3],
    pub traceback: Vec<Frame>,
}

/// How a core exception's `name` field resolves to an actual exception
/// type: either one of a handful of builtin kinds, or an object handle
/// into the embedding map.
#[derive(Debug, Clone, PartialEq)]
pub enum ExceptionKind {
    Builtin(String),
    Embedded(i32, String),
}

/// Parses the `"0:Kind"` / `"<id>:module.qualname"` name prefix.
pub fn parse_name(name: &str) -> Result<ExceptionKind> {
    let (id_str, rest) = name
        .split_once(':')
        .ok_or_else(|| crate::error::Error::Protocol(format!("malformed exception name: {name}")))?;
    let id: i32 = id_str
        .parse()
        .map_err(|_| crate::error::Error::Protocol(format!("malformed exception name: {name}")))?;

    if id == 0 {
        Ok(ExceptionKind::Builtin(rest.to_string()))
    } else {
        Ok(ExceptionKind::Embedded(id, rest.to_string()))
    }
}

/// An address/location before symbolization, as read from the wire.
pub type Address = i32;

/// The external address-to-source-location service.
pub trait Symbolizer {
    /// Resolves each address to its (possibly inlined) frame chain,
    /// outer-first.
    fn symbolize(&self, addresses: &[Address]) -> Vec<Frame>;
}

/// The external symbol-demangling service.
pub trait Demangler {
    fn demangle(&self, functions: &[String]) -> Vec<String>;
}

/// Reads a `KERNEL_EXCEPTION` message body and builds the host-side
/// [`CoreException`], resolving the backtrace through `symbolizer` and
/// `demangler`.
///
/// The direct frame (where the exception was raised, as reported by the
/// device) is reversed-and-appended after the symbolizer's outer-first
/// frames, so the overall traceback reads innermost-first, matching
/// `list(reversed(symbolizer(backtrace))) + [direct_frame]` in the
/// original driver.
pub fn recv_kernel_exception<C: Channel>(
    framer: &mut Framer<C>,
    symbolizer: &dyn Symbolizer,
    demangler: &dyn Demangler,
) -> Result<CoreException> {
    let name = framer.read_string()?;
    let message = framer.read_string()?;
    let params = [
        framer.read_i64()?,
        framer.read_i64()?,
        framer.read_i64()?,
    ];

    let file = framer.read_string()?;
    let line = framer.read_i32()?;
    let column = framer.read_i32()?;
    let function = framer.read_string()?;

    let count = framer.read_i32()?;
    let mut addresses = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        addresses.push(framer.read_i32()?);
    }

    let mut traceback = symbolizer.symbolize(&addresses);
    traceback.reverse();

    let demangled_function = demangler
        .demangle(std::slice::from_ref(&function))
        .into_iter()
        .next()
        .unwrap_or(function);

    traceback.push(Frame {
        file,
        line,
        column,
        function: demangled_function,
    });

    Ok(CoreException {
        name,
        message,
        params,
        traceback,
    })
}

/// Formats `message`, substituting `{0}`, `{1}`, `{2}` with `params`, the
/// way the device-side message template is expanded on the host.
pub fn format_message(message: &str, params: &[i64; 3]) -> String {
    let mut out = message.to_string();
    for (i, param) in params.iter().enumerate() {
        out = out.replace(&format!("{{{i}}}"), &param.to_string());
    }
    out
}

/// The four exception kinds the protocol treats as builtin regardless of
/// their host-side type, per `spec.md` §4.7.
pub const BUILTIN_KINDS: [&str; 3] = ["ZeroDivisionError", "ValueError", "IndexError"];

/// Classifies a raised exception's type for the host→device encoding: the
/// well-known builtins (and anything the caller flags as builtin) are
/// named `"0:TypeName"`; anything else is stored through the embedding map
/// and named `"<id>:module.qualname"`.
pub fn classify_type(
    type_name: &str,
    module: &str,
    qualname: &str,
    is_builtin: bool,
    map: &mut dyn EmbeddingMap,
    handle: crate::embedding::EmbeddedObject,
) -> String {
    if is_builtin || BUILTIN_KINDS.contains(&type_name) {
        format!("0:{type_name}")
    } else {
        let id = map.store_object(handle);
        format!("{id}:{module}.{qualname}")
    }
}

/// Writes an `RPC_EXCEPTION` body for a previously-received core exception
/// being re-raised verbatim (tag byte and envelope are written by the
/// caller via `Framer::write_header`/`write_flush`).
pub fn send_core_exception<C: Channel>(framer: &mut Framer<C>, exn: &CoreException) {
    framer.write_string(&exn.name);
    framer.write_string(&exn.message);
    for param in exn.params {
        framer.write_i64(param);
    }

    let frame = exn
        .traceback
        .last()
        .expect("a core exception always carries at least one frame");
    framer.write_string(&frame.file);
    framer.write_i32(frame.line);
    framer.write_i32(frame.column);
    framer.write_string(&frame.function);
}

/// Selects the frame emitted for a freshly-raised (not re-raised) host
/// exception: the last of up to two caller-supplied frames. This mirrors
/// `traceback.extract_tb(exn.__traceback__, 2)` in the original driver,
/// which keeps the two outermost frames and then emits the *last* of
/// those — i.e. the frame closest to the raise site among the two kept.
/// Column is always unknown (`-1`) for a freshly-classified exception.
pub fn frame_for_new_exception(frames: &[Frame]) -> Frame {
    let mut chosen = frames
        .last()
        .cloned()
        .unwrap_or_else(|| Frame {
            file: String::new(),
            line: 0,
            column: -1,
            function: String::new(),
        });
    chosen.column = -1;
    chosen
}

/// The error type a [`crate::rpc::Service`] call returns: either a fresh
/// host-side failure to encode for the device, or a previously-received
/// core exception being re-raised verbatim.
#[derive(Debug)]
pub struct HostException {
    pub type_name: String,
    pub module: String,
    pub qualname: String,
    pub is_builtin: bool,
    pub message: String,
    pub params: [i64; 3],
    pub frames: Vec<Frame>,
    /// Set when this wraps a core exception received earlier in the same
    /// session and is being passed back through unmodified.
    pub reraised: Option<CoreException>,
}

impl HostException {
    pub fn reraise(exn: CoreException) -> Self {
        Self {
            type_name: String::new(),
            module: String::new(),
            qualname: String::new(),
            is_builtin: false,
            message: String::new(),
            params: [0; 3],
            frames: Vec::new(),
            reraised: Some(exn),
        }
    }
}

impl std::fmt::Display for HostException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(exn) = &self.reraised {
            write!(f, "{}: {}", exn.name, exn.message)
        } else {
            write!(f, "{}: {}", self.type_name, self.message)
        }
    }
}

impl std::error::Error for HostException {}

/// Builds the `CoreException` to send back to the device for a freshly
/// raised (not re-raised) `HostException`, classifying its type through
/// `map` and selecting its emitted frame per
/// [`frame_for_new_exception`].
pub fn encode_host_exception(
    exn: &HostException,
    map: &mut dyn EmbeddingMap,
    handle: crate::embedding::EmbeddedObject,
) -> CoreException {
    if let Some(reraised) = &exn.reraised {
        return reraised.clone();
    }

    let name = classify_type(
        &exn.type_name,
        &exn.module,
        &exn.qualname,
        exn.is_builtin,
        map,
        handle,
    );
    let frame = frame_for_new_exception(&exn.frames);

    CoreException {
        name,
        message: exn.message.clone(),
        params: exn.params,
        traceback: vec![frame],
    }
}
