//! Maps host values onto statement placeholders.

use rusqlite::types::{Null, ToSqlOutput, ValueRef};
use rusqlite::Statement;

use crate::core::config::MarshalConfig;
use crate::core::value::{ClassId, HostValue};
use crate::core::{text, typed_blob};
use crate::error::{AppError, AppResult};

/// Bind `values` positionally to the statement's placeholders.
///
/// The arity contract is checked before anything reaches the engine:
/// a statement without placeholders accepts no values, and more values
/// than placeholders is an error. Unsupplied trailing placeholders stay
/// NULL.
pub fn bind_parameters(
    stmt: &mut Statement<'_>,
    values: &[HostValue],
    cfg: &MarshalConfig,
) -> AppResult<()> {
    let placeholders = stmt.parameter_count();

    if placeholders == 0 && !values.is_empty() {
        return Err(AppError::UnexpectedArgument(
            "statement declares no placeholders".into(),
        ));
    }
    if values.len() > placeholders {
        return Err(AppError::UnexpectedArgument(format!(
            "{} values supplied for {placeholders} placeholders",
            values.len()
        )));
    }

    for (i, value) in values.iter().enumerate() {
        bind_one(stmt, i + 1, value, cfg)?;
    }
    Ok(())
}

fn bind_one(
    stmt: &mut Statement<'_>,
    idx: usize,
    value: &HostValue,
    cfg: &MarshalConfig,
) -> AppResult<()> {
    match value {
        HostValue::Empty => Ok(stmt.raw_bind_parameter(idx, Null)?),

        HostValue::Cell(_) | HostValue::Struct(_) | HostValue::Complex { .. } => {
            Err(AppError::UnsupportedVariableType(format!(
                "parameter {idx}: complex values and nested aggregates cannot be bound"
            )))
        }

        HostValue::Logical(b) => Ok(stmt.raw_bind_parameter(idx, *b as i64)?),
        HostValue::Int(v) => Ok(stmt.raw_bind_parameter(idx, *v)?),
        HostValue::Float(v) => Ok(stmt.raw_bind_parameter(idx, *v)?),

        HostValue::Text(bytes) => {
            if bytes.is_empty() {
                return Ok(stmt.raw_bind_parameter(idx, Null)?);
            }
            bind_text(stmt, idx, bytes, cfg)
        }

        HostValue::Array(a) => {
            a.validate()?;
            if a.is_empty() {
                return Ok(stmt.raw_bind_parameter(idx, Null)?);
            }
            if a.class == ClassId::Char {
                let host = chars_to_host_bytes(&a.data);
                return bind_text(stmt, idx, &host, cfg);
            }
            if a.len() > 1 {
                let payload;
                let blob: &[u8] = if cfg.typed_blobs {
                    payload = typed_blob::encode(a)?;
                    &payload
                } else {
                    &a.data
                };
                return Ok(
                    stmt.raw_bind_parameter(idx, ToSqlOutput::Borrowed(ValueRef::Blob(blob)))?
                );
            }
            if a.class.is_integer() {
                Ok(stmt.raw_bind_parameter(idx, a.scalar_i64())?)
            } else {
                Ok(stmt.raw_bind_parameter(idx, a.scalar_f64())?)
            }
        }
    }
}

fn bind_text(
    stmt: &mut Statement<'_>,
    idx: usize,
    host: &[u8],
    cfg: &MarshalConfig,
) -> AppResult<()> {
    let converted;
    let out: &[u8] = if cfg.convert_utf8 {
        converted = text::to_utf8(host);
        &converted
    } else {
        host
    };
    Ok(stmt.raw_bind_parameter(idx, ToSqlOutput::Borrowed(ValueRef::Text(out)))?)
}

/// Flatten 2-byte character code units into host single-byte text.
/// Code units outside the single-byte range degrade to `?`.
fn chars_to_host_bytes(data: &[u8]) -> Vec<u8> {
    data.chunks_exact(2)
        .map(|c| {
            let cu = u16::from_ne_bytes([c[0], c[1]]);
            if cu < 256 {
                cu as u8
            } else {
                b'?'
            }
        })
        .collect()
}
