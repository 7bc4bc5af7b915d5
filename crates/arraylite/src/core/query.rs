//! Statement execution: bind, step, buffer, project.
//!
//! The engine never announces a row count, so rows are buffered into a
//! growable list of typed cells while stepping, then projected into the
//! final result one row at a time (each buffered row is released as
//! soon as it has been projected).

use std::ffi::CString;
use std::os::raw::c_int;

use rusqlite::types::ValueRef;
use rusqlite::{ffi, Connection, Row};

use crate::core::config::MarshalConfig;
use crate::core::types::{ExecResult, QueryOutcome, QueryResult};
use crate::core::value::{CellValue, TypedValue};
use crate::core::{bind, fieldnames, schema, text, typed_blob};
use crate::error::{AppError, AppResult};

pub fn run_query(
    conn: &Connection,
    sql: &str,
    params: &[crate::core::value::HostValue],
    cfg: &MarshalConfig,
) -> AppResult<QueryOutcome> {
    let sql = schema::rewrite_show_tables(sql);
    check_query_text(sql)?;

    let mut stmt = conn.prepare(sql)?;
    bind::bind_parameters(&mut stmt, params, cfg)?;

    let ncol = stmt.column_count();
    if ncol == 0 {
        let changes = stmt.raw_execute()? as u64;
        return Ok(QueryOutcome::Exec(ExecResult {
            changes,
            last_insert_rowid: conn.last_insert_rowid(),
        }));
    }

    let raw_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let fields = fieldnames::build_field_names(&raw_names, cfg)?;

    let mut buffered: Vec<Vec<TypedValue>> = Vec::new();
    {
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(ncol);
            for i in 0..ncol {
                let storage = column_storage_class(row.get_ref(i)?);
                record.push(read_cell(row, i, storage, cfg)?);
            }
            buffered.push(record);
        }
    }

    let mut out = Vec::with_capacity(buffered.len());
    for record in buffered {
        let mut cells = Vec::with_capacity(ncol);
        for value in record {
            cells.push(project(value, cfg)?);
        }
        out.push(cells);
    }

    Ok(QueryOutcome::Rows(QueryResult {
        columns: fields.names,
        rows: out,
    }))
}

/// Run a statement that is expected to produce no rows.
pub fn run_execute(
    conn: &Connection,
    sql: &str,
    params: &[crate::core::value::HostValue],
    cfg: &MarshalConfig,
) -> AppResult<ExecResult> {
    check_query_text(sql)?;
    let mut stmt = conn.prepare(sql)?;
    bind::bind_parameters(&mut stmt, params, cfg)?;
    let changes = stmt.raw_execute()? as u64;
    Ok(ExecResult {
        changes,
        last_insert_rowid: conn.last_insert_rowid(),
    })
}

/// A trailing semicolon would smuggle further statements past the
/// single-statement prepare, so statement text that `sqlite3_complete`
/// already considers terminated is rejected up front.
fn check_query_text(sql: &str) -> AppResult<()> {
    let c = CString::new(sql)
        .map_err(|_| AppError::InvalidArgument("query contains an embedded NUL".into()))?;
    if unsafe { ffi::sqlite3_complete(c.as_ptr()) } != 0 {
        return Err(AppError::InvalidArgument("invalid query string (semicolon?)".into()));
    }
    Ok(())
}

/// The SQLite storage class of a fetched value, as the type code the row
/// loop validates against. `ValueRef` is itself derived from
/// `sqlite3_column_type`, so this yields the same class the raw call did.
fn column_storage_class(v: ValueRef<'_>) -> c_int {
    match v {
        ValueRef::Null => ffi::SQLITE_NULL,
        ValueRef::Integer(_) => ffi::SQLITE_INTEGER,
        ValueRef::Real(_) => ffi::SQLITE_FLOAT,
        ValueRef::Text(_) => ffi::SQLITE3_TEXT,
        ValueRef::Blob(_) => ffi::SQLITE_BLOB,
    }
}

fn read_cell(row: &Row<'_>, i: usize, storage: c_int, cfg: &MarshalConfig) -> AppResult<TypedValue> {
    const KNOWN: [c_int; 5] = [
        ffi::SQLITE_INTEGER,
        ffi::SQLITE_FLOAT,
        ffi::SQLITE3_TEXT,
        ffi::SQLITE_BLOB,
        ffi::SQLITE_NULL,
    ];
    if !KNOWN.contains(&storage) {
        return Err(AppError::UnknownDbType(storage));
    }

    Ok(match row.get_ref(i)? {
        ValueRef::Null => TypedValue::Null,
        ValueRef::Integer(v) => TypedValue::Integer(v as f64),
        ValueRef::Real(v) => TypedValue::Float(v),
        ValueRef::Text(t) => TypedValue::Text(if cfg.convert_utf8 {
            text::to_latin1(t)
        } else {
            t.to_vec()
        }),
        ValueRef::Blob(b) => TypedValue::Blob(b.to_vec()),
    })
}

fn project(value: TypedValue, cfg: &MarshalConfig) -> AppResult<CellValue> {
    Ok(match value {
        TypedValue::Null => {
            if cfg.null_as_nan {
                CellValue::Number(f64::NAN)
            } else {
                CellValue::Empty
            }
        }
        TypedValue::Integer(v) | TypedValue::Float(v) => CellValue::Number(v),
        TypedValue::Text(t) => CellValue::Text(t),
        TypedValue::Blob(b) => {
            if b.is_empty() {
                CellValue::Empty
            } else if typed_blob::looks_typed(&b) {
                // The header is validated in full even though the
                // envelope may have been written as a plain blob.
                CellValue::Array(typed_blob::decode(&b)?)
            } else {
                CellValue::Bytes(b)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::{ClassId, HostArray, HostValue};

    fn cfg() -> MarshalConfig {
        MarshalConfig::default()
    }

    fn rows_of(outcome: QueryOutcome) -> QueryResult {
        match outcome {
            QueryOutcome::Rows(r) => r,
            QueryOutcome::Exec(e) => panic!("expected rows, got {e:?}"),
        }
    }

    #[test]
    fn zero_rows_is_an_explicit_empty_result() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(a, b)").unwrap();
        let r = rows_of(run_query(&conn, "SELECT a, b FROM t", &[], &cfg()).unwrap());
        assert_eq!(r.columns, ["a", "b"]);
        assert!(r.rows.is_empty());
    }

    #[test]
    fn statements_without_columns_report_changes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(a)").unwrap();
        let outcome =
            run_query(&conn, "INSERT INTO t VALUES (?1)", &[HostValue::Int(5)], &cfg()).unwrap();
        match outcome {
            QueryOutcome::Exec(e) => {
                assert_eq!(e.changes, 1);
                assert_eq!(e.last_insert_rowid, 1);
            }
            QueryOutcome::Rows(_) => panic!("expected exec outcome"),
        }
    }

    #[test]
    fn null_projects_as_empty_or_nan() {
        let conn = Connection::open_in_memory().unwrap();
        let r = rows_of(run_query(&conn, "SELECT NULL", &[], &cfg()).unwrap());
        assert_eq!(r.rows[0][0], CellValue::Empty);

        let mut c = cfg();
        c.null_as_nan = true;
        let r = rows_of(run_query(&conn, "SELECT NULL", &[], &c).unwrap());
        match r.rows[0][0] {
            CellValue::Number(v) => assert!(v.is_nan()),
            ref other => panic!("expected NaN, got {other:?}"),
        }
    }

    #[test]
    fn numbers_project_as_doubles() {
        let conn = Connection::open_in_memory().unwrap();
        let r = rows_of(run_query(&conn, "SELECT 3, 2.5", &[], &cfg()).unwrap());
        assert_eq!(r.rows[0], [CellValue::Number(3.0), CellValue::Number(2.5)]);
    }

    #[test]
    fn text_comes_back_in_host_bytes() {
        let conn = Connection::open_in_memory().unwrap();
        let r = rows_of(run_query(&conn, "SELECT 'caf' || char(233)", &[], &cfg()).unwrap());
        assert_eq!(r.rows[0][0], CellValue::Text(b"caf\xE9".to_vec()));

        let mut c = cfg();
        c.convert_utf8 = false;
        let r = rows_of(run_query(&conn, "SELECT 'caf' || char(233)", &[], &c).unwrap());
        // Raw UTF-8 bytes when conversion is off.
        assert_eq!(r.rows[0][0], CellValue::Text("café".as_bytes().to_vec()));
    }

    #[test]
    fn plain_blobs_project_as_bytes() {
        let conn = Connection::open_in_memory().unwrap();
        let r = rows_of(run_query(&conn, "SELECT x'010203'", &[], &cfg()).unwrap());
        assert_eq!(r.rows[0][0], CellValue::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn empty_blob_projects_as_empty() {
        let conn = Connection::open_in_memory().unwrap();
        let r = rows_of(run_query(&conn, "SELECT x''", &[], &cfg()).unwrap());
        assert_eq!(r.rows[0][0], CellValue::Empty);
    }

    #[test]
    fn typed_blob_round_trips_through_a_table() {
        let source = HostArray {
            class: ClassId::Double,
            dims: vec![3, 4],
            data: (0..12).flat_map(|i| (i as f64).to_ne_bytes()).collect(),
        };
        let mut c = cfg();
        c.typed_blobs = true;

        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(m BLOB)").unwrap();
        run_query(
            &conn,
            "INSERT INTO t VALUES (?1)",
            &[HostValue::Array(source.clone())],
            &c,
        )
        .unwrap();

        // The read side sniffs the envelope even with the mode off.
        let r = rows_of(run_query(&conn, "SELECT m FROM t", &[], &cfg()).unwrap());
        assert_eq!(r.rows[0][0], CellValue::Array(source));
    }

    #[test]
    fn corrupt_envelope_version_aborts_the_fetch() {
        let source = HostArray {
            class: ClassId::Uint8,
            dims: vec![1, 2],
            data: vec![7, 8],
        };
        let mut blob = typed_blob::encode(&source).unwrap();
        blob[14..16].copy_from_slice(&99u16.to_ne_bytes());

        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(m BLOB)").unwrap();
        conn.execute("INSERT INTO t VALUES (?1)", rusqlite::params![blob])
            .unwrap();

        assert!(matches!(
            run_query(&conn, "SELECT m FROM t", &[], &cfg()),
            Err(AppError::UnsupportedTypedBlobHeader(_))
        ));
    }

    #[test]
    fn duplicate_column_names_are_suffixed() {
        let conn = Connection::open_in_memory().unwrap();
        let r = rows_of(
            run_query(
                &conn,
                "SELECT 1 AS \"Total Count\", 2 AS \"Total Count\"",
                &[],
                &cfg(),
            )
            .unwrap(),
        );
        assert_eq!(r.columns, ["Total_Count", "Total_Count_1"]);
    }

    #[test]
    fn semicolon_terminated_text_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            run_query(&conn, "SELECT 1;", &[], &cfg()),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn show_tables_is_emulated() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE zz(a); CREATE TABLE aa(a)").unwrap();
        let r = rows_of(run_query(&conn, "show tables", &[], &cfg()).unwrap());
        assert_eq!(r.columns, ["tablename"]);
        let names: Vec<_> = r.rows.iter().map(|row| row[0].clone()).collect();
        assert_eq!(
            names,
            [
                CellValue::Text(b"aa".to_vec()),
                CellValue::Text(b"zz".to_vec())
            ]
        );
    }

    #[test]
    fn execute_reports_changes_and_rowid() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(a)").unwrap();
        let e = run_execute(
            &conn,
            "INSERT INTO t VALUES (?1)",
            &[HostValue::Float(1.5)],
            &cfg(),
        )
        .unwrap();
        assert_eq!(e.changes, 1);
        assert_eq!(e.last_insert_rowid, 1);
    }
}
