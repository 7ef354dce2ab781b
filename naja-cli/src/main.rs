//! Naja Marshal CLI - inspect and verify marshal streams
//!
//! Decodes a marshal stream from a file and prints a summary or a JSON
//! rendering of the value graph; optionally re-encodes the graph and
//! checks that the bytes round-trip.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use clap::Parser;
use serde_json::json;

use naja_api::{decode_bytes, encode_bytes, CodeBackend, MarshalOptions, TypedArray, Value};
use naja_config::CURRENT_VERSION;

mod logging;

#[derive(Parser)]
#[command(
    name = "najam",
    about = "Naja marshal stream inspector",
    version = "0.1.0"
)]
struct Cli {
    /// Marshal stream file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Format version the stream was written with (out-of-band context)
    #[arg(long = "format-version", default_value_t = CURRENT_VERSION)]
    version: u8,

    /// Bytecode backend: "bytecode" or "ir"
    #[arg(long, default_value = "bytecode")]
    backend: String,

    /// Print the decoded value graph as JSON
    #[arg(long)]
    json: bool,

    /// Re-encode the decoded graph and verify byte identity
    #[arg(long)]
    roundtrip: bool,

    /// Log level: silent, error, warn, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    logging::init(cli.log_level.as_deref().and_then(logging::parse_log_level));

    let backend = match cli.backend.as_str() {
        "bytecode" => CodeBackend::Bytecode,
        "ir" => CodeBackend::Ir,
        other => {
            eprintln!("Error: unknown backend '{}' (expected 'bytecode' or 'ir')", other);
            process::exit(2);
        }
    };
    let options = MarshalOptions {
        version: cli.version,
        backend,
        ..MarshalOptions::default()
    };

    let bytes = match std::fs::read(&cli.file) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", cli.file.display(), e);
            process::exit(1);
        }
    };
    tracing::info!(target: "najam", "读取 {} 字节: {}", bytes.len(), cli.file.display());

    let value = match decode_bytes(&bytes, &options) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e.to_report());
            process::exit(1);
        }
    };

    if cli.json {
        let mut seen = HashMap::new();
        let rendered = render_json(&value, &mut seen);
        println!("{}", serde_json::to_string_pretty(&rendered).unwrap());
    } else {
        println!("{}", describe(&value));
    }

    if cli.roundtrip {
        match encode_bytes(&value, &options) {
            Ok(reencoded) if reencoded == bytes => {
                println!("roundtrip: OK ({} bytes)", bytes.len());
            }
            Ok(reencoded) => {
                println!(
                    "roundtrip: bytes differ (input {} bytes, re-encoded {} bytes)",
                    bytes.len(),
                    reencoded.len()
                );
                process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: {}", e.to_report());
                process::exit(1);
            }
        }
    }
}

/// 单行摘要
fn describe(value: &Value) -> String {
    match value {
        Value::Tuple(items) => format!("tuple ({} elements)", items.len()),
        Value::List(items) => format!("list ({} elements)", items.borrow().len()),
        Value::Dict(pairs) => format!("dict ({} entries)", pairs.borrow().len()),
        Value::Set(items) => format!("set ({} elements)", items.borrow().len()),
        Value::FrozenSet(items) => format!("frozenset ({} elements)", items.len()),
        Value::Bytes(data) => format!("bytes ({} bytes)", data.len()),
        Value::Str(s) => format!("str ({} chars)", s.chars.chars().count()),
        Value::Array(arr) => format!("array ({} x {:?})", arr.len(), arr.kind()),
        Value::Code(unit) => format!(
            "code unit '{}' ({} constants, {} instruction bytes)",
            unit.name,
            unit.constants.len(),
            unit.code.len()
        ),
        other => other.kind_name().to_string(),
    }
}

/// 把值图渲染为 JSON
///
/// 共享/成环的对象第二次出现时渲染为 `{"$ref": id}`，与编解码器
/// 的引用表同样按对象身份去重。
fn render_json(
    value: &Value,
    seen: &mut HashMap<*const (), usize>,
) -> serde_json::Value {
    if let Some(identity) = value.identity() {
        if let Some(&id) = seen.get(&identity) {
            return json!({ "$ref": id });
        }
        seen.insert(identity, seen.len());
    }

    match value {
        Value::Null => json!({ "$null": true }),
        Value::None => serde_json::Value::Null,
        Value::NoValue => json!({ "$novalue": true }),
        Value::StopIteration => json!({ "$stopiteration": true }),
        Value::Ellipsis => json!({ "$ellipsis": true }),
        Value::SourceMarker => json!({ "$source": true }),
        Value::Bool(b) => json!(b),
        Value::Int32(n) => json!(n),
        Value::Int64(n) => json!(n),
        Value::BigInt(big) => json!({ "$bigint": big.to_string() }),
        Value::Float(f) if f.is_finite() => json!(f),
        Value::Float(f) => json!({ "$float": f.to_string() }),
        Value::Complex { re, im } => json!({ "$complex": { "re": re, "im": im } }),
        Value::Bytes(data) => json!({ "$bytes": hex_string(data) }),
        Value::Str(s) => json!(s.chars),
        Value::Tuple(items) => {
            let rendered: Vec<_> = items.iter().map(|v| render_json(v, seen)).collect();
            json!({ "$tuple": rendered })
        }
        Value::List(items) => {
            let rendered: Vec<_> = items
                .borrow()
                .iter()
                .map(|v| render_json(v, seen))
                .collect();
            serde_json::Value::Array(rendered)
        }
        Value::Dict(pairs) => {
            let rendered: Vec<_> = pairs
                .borrow()
                .iter()
                .map(|(k, v)| json!([render_json(k, seen), render_json(v, seen)]))
                .collect();
            json!({ "$dict": rendered })
        }
        Value::Set(items) => {
            let rendered: Vec<_> = items
                .borrow()
                .iter()
                .map(|v| render_json(v, seen))
                .collect();
            json!({ "$set": rendered })
        }
        Value::FrozenSet(items) => {
            let rendered: Vec<_> = items.iter().map(|v| render_json(v, seen)).collect();
            json!({ "$frozenset": rendered })
        }
        Value::Array(arr) => render_array(arr, seen),
        Value::Code(unit) => {
            let constants: Vec<_> = unit
                .constants
                .iter()
                .map(|v| render_json(v, seen))
                .collect();
            json!({
                "$code": {
                    "name": unit.name,
                    "qualname": unit.qualname,
                    "arg_count": unit.arg_count,
                    "flags": unit.flags,
                    "code_len": unit.code.len(),
                    "names": unit.names,
                    "varnames": unit.varnames,
                    "constants": constants,
                    "source": unit.source_name,
                }
            })
        }
        Value::Foreign(obj) => json!({ "$foreign": obj.type_name }),
    }
}

fn render_array(arr: &Rc<TypedArray>, seen: &mut HashMap<*const (), usize>) -> serde_json::Value {
    let items = match arr.as_ref() {
        TypedArray::Byte(v) => json!(v),
        TypedArray::Short(v) => json!(v),
        TypedArray::Int(v) => json!(v),
        TypedArray::Long(v) => json!(v),
        TypedArray::Double(v) => json!(v),
        TypedArray::Bool(v) => json!(v),
        TypedArray::Str(v) => json!(v),
        TypedArray::Object(v) => {
            serde_json::Value::Array(v.iter().map(|item| render_json(item, seen)).collect())
        }
    };
    json!({ "$array": { "kind": format!("{:?}", arr.kind()), "items": items } })
}

fn hex_string(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
