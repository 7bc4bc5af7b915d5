use rusqlite::Connection;

use crate::error::AppResult;

/// Expansion of the `show tables` convenience command. Matches plain
/// tables and views, including temporary ones.
const SHOW_TABLES_SQL: &str = "SELECT name as tablename FROM sqlite_master \
     WHERE type IN ('table','view') AND name NOT LIKE 'sqlite_%' \
     UNION ALL \
     SELECT name as tablename FROM sqlite_temp_master \
     WHERE type IN ('table','view') \
     ORDER BY 1";

/// The literal query text `show tables` is rewritten before it reaches
/// the engine; everything else passes through untouched.
pub fn rewrite_show_tables(sql: &str) -> &str {
    if sql.trim().eq_ignore_ascii_case("show tables") {
        SHOW_TABLES_SQL
    } else {
        sql
    }
}

pub fn list_tables(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(SHOW_TABLES_SQL)?;
    let rows = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
