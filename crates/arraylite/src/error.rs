use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("no or wrong argument: {0}")]
    InvalidArgument(String),

    #[error("unexpected arguments passed: {0}")]
    UnexpectedArgument(String),

    #[error("unsupported variable type: {0}")]
    UnsupportedVariableType(String),

    #[error("unknown or unsupported typed blob header: {0}")]
    UnsupportedTypedBlobHeader(&'static str),

    #[error("BLOB exceeds maximum allowed size: {size} > {max}")]
    BlobTooBig { size: usize, max: usize },

    #[error("memory allocation error")]
    MemoryError,

    #[error("unknown SQLITE data type: {0}")]
    UnknownDbType(i32),

    #[error("{message}")]
    Sql { ident: String, message: String },

    #[error("invalid database handle {0}")]
    InvalidHandle(i64),

    #[error("database not open")]
    DbNotOpen,

    #[error("no free database handle available")]
    NoFreeSlot,

    #[error("cannot set busy timeout")]
    BusyTimeoutFail,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(err, msg) => {
                let message = msg.unwrap_or_else(|| err.to_string());
                AppError::Sql {
                    ident: sqlite_ident(err.extended_code & 0xff),
                    message,
                }
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl AppError {
    pub fn code(&self) -> String {
        match self {
            AppError::InvalidArgument(_) => "INVALID_ARGUMENT".into(),
            AppError::UnexpectedArgument(_) => "UNEXPECTED_ARGUMENT".into(),
            AppError::UnsupportedVariableType(_) => "UNSUPPORTED_VARIABLE_TYPE".into(),
            AppError::UnsupportedTypedBlobHeader(_) => "UNSUPPORTED_TYPED_BLOB_HEADER".into(),
            AppError::BlobTooBig { .. } => "BLOB_TOO_BIG".into(),
            AppError::MemoryError => "MEMORY_ERROR".into(),
            AppError::UnknownDbType(_) => "UNKNOWN_DB_TYPE".into(),
            AppError::Sql { ident, .. } => ident.clone(),
            AppError::InvalidHandle(_) => "INVALID_HANDLE".into(),
            AppError::DbNotOpen => "DB_NOT_OPEN".into(),
            AppError::NoFreeSlot => "NO_FREE_SLOT".into(),
            AppError::BusyTimeoutFail => "BUSY_TIMEOUT_FAIL".into(),
            AppError::InvalidRequest(_) => "INVALID_REQUEST".into(),
            AppError::Io(_) => "IO_ERROR".into(),
            AppError::Json(_) => "JSON_ERROR".into(),
            AppError::Internal(_) => "INTERNAL".into(),
        }
    }
}

/// Translate a primary SQLite result code into a structured error
/// identifier. Unrecognized codes fall back to the numeric form.
pub fn sqlite_ident(code: i32) -> String {
    let name = match code {
        0 => "OK",
        1 => "ERROR",
        2 => "INTERNAL",
        3 => "PERM",
        4 => "ABORT",
        5 => "BUSY",
        6 => "LOCKED",
        7 => "NOMEM",
        8 => "READONLY",
        9 => "INTERRUPT",
        10 => "IOERR",
        11 => "CORRUPT",
        12 => "NOTFOUND",
        13 => "FULL",
        14 => "CANTOPEN",
        15 => "PROTOCOL",
        16 => "EMPTY",
        17 => "SCHEMA",
        18 => "TOOBIG",
        19 => "CONSTRAINT",
        20 => "MISMATCH",
        21 => "MISUSE",
        22 => "NOLFS",
        23 => "AUTH",
        24 => "FORMAT",
        25 => "RANGE",
        26 => "NOTADB",
        100 => "ROW",
        101 => "DONE",
        _ => return format!("SQLITE:{code}"),
    };
    format!("SQLITE:{name}")
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_ident_maps_symbolic_names() {
        assert_eq!(sqlite_ident(5), "SQLITE:BUSY");
        assert_eq!(sqlite_ident(19), "SQLITE:CONSTRAINT");
        assert_eq!(sqlite_ident(101), "SQLITE:DONE");
    }

    #[test]
    fn sqlite_ident_falls_back_to_numeric() {
        assert_eq!(sqlite_ident(77), "SQLITE:77");
    }

    #[test]
    fn sql_failures_carry_the_ident() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let e: AppError = conn.prepare("NOT A QUERY").unwrap_err().into();
        assert_eq!(e.code(), "SQLITE:ERROR");
    }
}
