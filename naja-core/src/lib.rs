//! Naja Core - Object model and marshal codec (pure logic, no IO)
//!
//! Contains the runtime value model and the binary object-graph codec.
//! Only operates on caller-supplied byte sinks/sources, no file IO or
//! terminal output.
//!
//! Configuration is passed explicitly via parameters, not via global state.

pub mod marshal;
pub mod object;

// Re-export common types
pub use object::code::{BackendCode, CodeFlags, CodeUnit, ExceptionRange};
pub use object::value::{ForeignObject, StrObject, Value};
pub use object::array::{ArrayKind, TypedArray};
pub use marshal::error::MarshalError;

// Re-export config types from naja-config
pub use naja_config::{CodeBackend, MarshalOptions, CURRENT_VERSION, MAX_VERSION};
