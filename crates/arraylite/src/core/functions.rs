//! Extra scalar SQL functions registered on every opened connection.

use regex::Regex;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;

pub fn register_scalar_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    // pow(base, exponent): NULL in either argument propagates NULL.
    conn.create_scalar_function("pow", 2, flags, |ctx| {
        let (base, exponent) = match (numeric_arg(ctx, 0), numeric_arg(ctx, 1)) {
            (Some(b), Some(e)) => (b, e),
            _ => return Ok(None),
        };
        Ok(Some(base.powf(exponent)))
    })?;

    // regex(str, pattern): whole-match substring, NULL when unmatched.
    conn.create_scalar_function("regex", 2, flags, |ctx| {
        let text = text_arg(ctx, 0);
        let re = compile(ctx)?;
        Ok(re.find(&text).map(|m| m.as_str().to_string()))
    })?;

    // regex(str, pattern, replacement): replace all matches, NULL when
    // the pattern never matches.
    conn.create_scalar_function("regex", 3, flags, |ctx| {
        let text = text_arg(ctx, 0);
        let re = compile(ctx)?;
        if !re.is_match(&text) {
            return Ok(None);
        }
        let replacement = text_arg(ctx, 2);
        Ok(Some(re.replace_all(&text, replacement.as_str()).into_owned()))
    })?;

    Ok(())
}

fn compile(ctx: &Context<'_>) -> rusqlite::Result<Regex> {
    let pattern = text_arg(ctx, 1);
    Regex::new(&pattern).map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))
}

/// Numeric coercion in the spirit of `sqlite3_value_double`: NULL stays
/// NULL, text parses as a double or counts as zero.
fn numeric_arg(ctx: &Context<'_>, idx: usize) -> Option<f64> {
    match ctx.get_raw(idx) {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v as f64),
        ValueRef::Real(v) => Some(v),
        ValueRef::Text(t) => Some(
            std::str::from_utf8(t)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0.0),
        ),
        ValueRef::Blob(_) => Some(0.0),
    }
}

fn text_arg(ctx: &Context<'_>, idx: usize) -> String {
    match ctx.get_raw(idx) {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => v.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}
