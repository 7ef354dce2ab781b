//! Naja API - Marshal orchestration layer
//!
//! Provides unified entry points over the core codec, including:
//! - Buffer and `std::io` based encode/decode
//! - Code-unit serialize/deserialize
//! - Unified error handling (NajaError)
//!
//! For CLI convenience, this crate provides a global default-options
//! singleton. For library use, prefer the explicit `*_with` APIs.

use std::io::{Read, Write};
use std::rc::Rc;

use tracing::debug;

use naja_core::marshal::{self, IoSink, IoSource};
pub use naja_core::object::code::CodeUnit;

// Re-export config
pub mod config;
pub use config::{init as init_options, is_initialized, options};

// Re-export config types from naja_config
pub use naja_config::{CodeBackend, LimitConfig, MarshalOptions, CURRENT_VERSION, MAX_VERSION};

// Re-export error and core types
pub mod error;
pub use error::{ErrorReport, MarshalError, NajaError};
pub use naja_core::{ArrayKind, BackendCode, TypedArray, Value};

/// Encode a value graph into a byte buffer
pub fn encode_bytes(value: &Value, options: &MarshalOptions) -> Result<Vec<u8>, NajaError> {
    let bytes = marshal::encode(value, options)?;
    debug!(
        version = options.version,
        len = bytes.len(),
        "marshal encode completed"
    );
    Ok(bytes)
}

/// Decode a value graph from a byte buffer
pub fn decode_bytes(bytes: &[u8], options: &MarshalOptions) -> Result<Value, NajaError> {
    let value = marshal::decode(bytes, options)?;
    debug!(
        version = options.version,
        len = bytes.len(),
        kind = value.kind_name(),
        "marshal decode completed"
    );
    Ok(value)
}

/// Encode a value graph to an `std::io::Write` sink
pub fn encode_to_writer<W: Write>(
    value: &Value,
    options: &MarshalOptions,
    writer: W,
) -> Result<(), NajaError> {
    let mut sink = IoSink::new(writer);
    marshal::encode_to(value, options, &mut sink)?;
    Ok(())
}

/// Decode a value graph from an `std::io::Read` source
pub fn decode_from_reader<R: Read>(
    reader: R,
    options: &MarshalOptions,
) -> Result<Value, NajaError> {
    let mut source = IoSource::new(reader);
    let value = marshal::decode_from(&mut source, options)?;
    Ok(value)
}

/// Serialize one code unit
pub fn encode_code(unit: &Rc<CodeUnit>, options: &MarshalOptions) -> Result<Vec<u8>, NajaError> {
    let bytes = marshal::encode_code(unit, options)?;
    debug!(
        name = %unit.name,
        backend = %options.backend,
        len = bytes.len(),
        "code unit encoded"
    );
    Ok(bytes)
}

/// Deserialize one code unit; the source name is synthesized
pub fn decode_code(bytes: &[u8], options: &MarshalOptions) -> Result<Rc<CodeUnit>, NajaError> {
    let unit = marshal::decode_code(bytes, options)?;
    Ok(unit)
}

/// Deserialize one code unit with a caller-supplied source name
pub fn decode_code_named(
    bytes: &[u8],
    options: &MarshalOptions,
    source_name: &str,
) -> Result<Rc<CodeUnit>, NajaError> {
    let unit = marshal::decode_code_named(bytes, options, source_name)?;
    Ok(unit)
}

// ==================== Legacy API (using global options) ====================

/// Encode with the global default options
pub fn dumps(value: &Value) -> Result<Vec<u8>, NajaError> {
    encode_bytes(value, &options())
}

/// Decode with the global default options
pub fn loads(bytes: &[u8]) -> Result<Value, NajaError> {
    decode_bytes(bytes, &options())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_bytes() {
        let options = MarshalOptions::default();
        let value = Value::list(vec![Value::Int32(1), Value::str("two")]);
        let bytes = encode_bytes(&value, &options).unwrap();
        assert_eq!(decode_bytes(&bytes, &options).unwrap(), value);
    }

    #[test]
    fn test_writer_reader_roundtrip() {
        let options = MarshalOptions::default();
        let value = Value::dict(vec![(Value::str("k"), Value::Int64(5))]);

        let mut buf = Vec::new();
        encode_to_writer(&value, &options, &mut buf).unwrap();
        let decoded = decode_from_reader(std::io::Cursor::new(buf), &options).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_dumps_loads() {
        let value = Value::tuple(vec![Value::Bool(true), Value::None]);
        let bytes = dumps(&value).unwrap();
        assert_eq!(loads(&bytes).unwrap(), value);
    }

    #[test]
    fn test_error_is_unified() {
        let err = loads(&[0xFE]).unwrap_err();
        assert_eq!(err.to_report().kind, "malformed");
    }
}
