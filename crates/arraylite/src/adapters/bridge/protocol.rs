//! Wire shape of the NDJSON command surface, plus the JSON <-> host
//! value conversions at the protocol boundary.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::text;
use crate::core::types::{ExecResult, QueryOutcome, QueryResult};
use crate::core::value::{CellValue, ClassId, HostArray, HostValue};
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct BridgeRequest {
    pub v: u32,
    pub id: String,
    pub cmd: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct BridgeResponse {
    pub v: u32,
    pub id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl BridgeResponse {
    pub fn ok(v: u32, id: String, data: Value) -> Self {
        Self { v, id, status: "ok", data: Some(data), error: None, code: None }
    }

    pub fn err(v: u32, id: String, e: &AppError) -> Self {
        Self {
            v,
            id,
            status: "error",
            data: None,
            error: Some(e.to_string()),
            code: Some(e.code()),
        }
    }
}

// Payloads

#[derive(Debug, Deserialize)]
pub struct OpenPayload {
    pub path: String,
    #[serde(default)]
    pub db: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DbPayload {
    #[serde(default)]
    pub db: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct QueryPayload {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub db: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct OptionPayload {
    pub name: String,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct BusyTimeoutPayload {
    pub ms: u64,
    #[serde(default)]
    pub db: Option<usize>,
}

// Inbound values

/// Map one JSON parameter onto a host value. JSON arrays become cells
/// and unrecognized objects become structs; both are carried through so
/// the binder can reject them with the documented error.
pub fn value_from_json(v: &Value) -> AppResult<HostValue> {
    match v {
        Value::Null => Ok(HostValue::Empty),
        Value::Bool(b) => Ok(HostValue::Logical(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(HostValue::Int(i))
            } else {
                n.as_f64()
                    .map(HostValue::Float)
                    .ok_or_else(|| AppError::InvalidArgument(format!("unrepresentable number {n}")))
            }
        }
        Value::String(s) => Ok(HostValue::Text(text::to_latin1(s.as_bytes()))),
        Value::Array(items) => Ok(HostValue::Cell(
            items.iter().map(value_from_json).collect::<AppResult<_>>()?,
        )),
        Value::Object(o) => object_to_host(o),
    }
}

fn object_to_host(o: &serde_json::Map<String, Value>) -> AppResult<HostValue> {
    if let Some(b64) = o.get("blob").and_then(Value::as_str) {
        let data = BASE64
            .decode(b64)
            .map_err(|e| AppError::InvalidArgument(format!("bad base64 blob: {e}")))?;
        let n = data.len() as i32;
        return Ok(HostValue::Array(HostArray {
            class: ClassId::Uint8,
            dims: vec![1, n],
            data,
        }));
    }

    if let (Some(class), Some(dims), Some(data)) = (o.get("class"), o.get("dims"), o.get("data")) {
        return array_from_spec(class, dims, data);
    }

    Ok(HostValue::Struct(
        o.iter()
            .map(|(k, v)| Ok((k.clone(), value_from_json(v)?)))
            .collect::<AppResult<_>>()?,
    ))
}

fn array_from_spec(class: &Value, dims: &Value, data: &Value) -> AppResult<HostValue> {
    let class = class
        .as_str()
        .and_then(ClassId::from_name)
        .ok_or_else(|| AppError::UnsupportedVariableType(format!("array class {class}")))?;

    let dims: Vec<i32> = dims
        .as_array()
        .ok_or_else(|| AppError::InvalidArgument("array dims must be a list".into()))?
        .iter()
        .map(|d| {
            d.as_i64()
                .filter(|&d| (0..=i32::MAX as i64).contains(&d))
                .map(|d| d as i32)
                .ok_or_else(|| AppError::InvalidArgument("array dims must be non-negative".into()))
        })
        .collect::<AppResult<_>>()?;

    let mut bytes = Vec::new();
    match data {
        Value::String(s) if class == ClassId::Char => {
            for c in s.chars() {
                bytes.extend(((c as u32).min(u16::MAX as u32) as u16).to_ne_bytes());
            }
        }
        Value::Array(items) => {
            for item in items {
                push_element(class, item, &mut bytes)?;
            }
        }
        _ => {
            return Err(AppError::InvalidArgument(
                "array data must be a list (or a string for char arrays)".into(),
            ))
        }
    }

    let array = HostArray { class, dims, data: bytes };
    array.validate()?;
    Ok(HostValue::Array(array))
}

fn push_element(class: ClassId, v: &Value, out: &mut Vec<u8>) -> AppResult<()> {
    let f = v
        .as_f64()
        .or_else(|| v.as_i64().map(|i| i as f64))
        .ok_or_else(|| AppError::InvalidArgument("array data must be numeric".into()))?;
    match class {
        ClassId::Logical => out.push((f != 0.0) as u8),
        ClassId::Int8 => out.extend((f as i8).to_ne_bytes()),
        ClassId::Uint8 => out.extend((f as u8).to_ne_bytes()),
        ClassId::Int16 => out.extend((f as i16).to_ne_bytes()),
        ClassId::Uint16 | ClassId::Char => out.extend((f as u16).to_ne_bytes()),
        ClassId::Int32 => out.extend((f as i32).to_ne_bytes()),
        ClassId::Uint32 => out.extend((f as u32).to_ne_bytes()),
        // 64-bit integers keep full precision when the JSON number has it.
        ClassId::Int64 => out.extend(v.as_i64().unwrap_or(f as i64).to_ne_bytes()),
        ClassId::Uint64 => out.extend(v.as_u64().unwrap_or(f as u64).to_ne_bytes()),
        ClassId::Single => out.extend((f as f32).to_ne_bytes()),
        ClassId::Double => out.extend(f.to_ne_bytes()),
    }
    Ok(())
}

// Outbound values

pub fn outcome_to_json(outcome: QueryOutcome) -> Value {
    match outcome {
        QueryOutcome::Rows(r) => query_result_to_json(r),
        QueryOutcome::Exec(e) => exec_result_to_json(&e),
    }
}

pub fn exec_result_to_json(e: &ExecResult) -> Value {
    json!({ "changes": e.changes, "last_insert_rowid": e.last_insert_rowid })
}

/// Rows become objects keyed by sanitized column name. With uniqueness
/// checking disabled, duplicate keys collapse here; the in-process
/// result keeps every column.
pub fn query_result_to_json(r: QueryResult) -> Value {
    let rows: Vec<Value> = r
        .rows
        .into_iter()
        .map(|row| {
            let mut obj = serde_json::Map::with_capacity(r.columns.len());
            for (name, cell) in r.columns.iter().zip(row) {
                obj.insert(name.clone(), cell_to_json(cell));
            }
            Value::Object(obj)
        })
        .collect();
    json!({ "columns": r.columns, "rows": rows })
}

fn cell_to_json(cell: CellValue) -> Value {
    match cell {
        CellValue::Empty => Value::Null,
        CellValue::Number(n) => {
            if n.is_nan() {
                json!("NaN")
            } else if n.is_infinite() {
                json!(if n > 0.0 { "Inf" } else { "-Inf" })
            } else {
                json!(n)
            }
        }
        CellValue::Text(bytes) => {
            // Host single-byte text maps 1:1 into the first Unicode page.
            Value::String(bytes.iter().map(|&b| b as char).collect())
        }
        CellValue::Bytes(b) => json!({ "blob": BASE64.encode(b) }),
        CellValue::Array(a) => array_to_json(&a),
    }
}

fn array_to_json(a: &HostArray) -> Value {
    let data = match a.class {
        ClassId::Char => {
            let s: String = a
                .data
                .chunks_exact(2)
                .map(|c| {
                    char::from_u32(u16::from_ne_bytes([c[0], c[1]]) as u32).unwrap_or('\u{FFFD}')
                })
                .collect();
            Value::String(s)
        }
        _ => Value::Array(elements_to_json(a)),
    };
    json!({ "class": a.class.name(), "dims": a.dims, "data": data })
}

fn elements_to_json(a: &HostArray) -> Vec<Value> {
    let size = a.class.element_size();
    a.data
        .chunks_exact(size)
        .map(|e| match a.class {
            ClassId::Logical => json!(e[0] != 0),
            ClassId::Int8 => json!(e[0] as i8),
            ClassId::Uint8 => json!(e[0]),
            ClassId::Int16 => json!(i16::from_ne_bytes([e[0], e[1]])),
            ClassId::Uint16 | ClassId::Char => json!(u16::from_ne_bytes([e[0], e[1]])),
            ClassId::Int32 => json!(i32::from_ne_bytes([e[0], e[1], e[2], e[3]])),
            ClassId::Uint32 => json!(u32::from_ne_bytes([e[0], e[1], e[2], e[3]])),
            ClassId::Int64 => json!(i64::from_ne_bytes(eight(e))),
            ClassId::Uint64 => json!(u64::from_ne_bytes(eight(e))),
            ClassId::Single => json!(f32::from_ne_bytes([e[0], e[1], e[2], e[3]])),
            ClassId::Double => json!(f64::from_ne_bytes(eight(e))),
        })
        .collect()
}

fn eight(e: &[u8]) -> [u8; 8] {
    [e[0], e[1], e[2], e[3], e[4], e[5], e[6], e[7]]
}
