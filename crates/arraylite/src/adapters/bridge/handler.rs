use std::path::PathBuf;

use serde_json::{json, Value};

use crate::{
    cli::Args,
    core::config::{DuplicatePolicy, MarshalConfig},
    core::connection::ConnectionManager,
    core::value::HostValue,
    error::{AppError, AppResult},
};

use super::protocol::*;

pub struct BridgeHandler {
    cm: ConnectionManager,
    cfg: MarshalConfig,
}

impl BridgeHandler {
    pub fn new(args: Args) -> Self {
        Self {
            cm: ConnectionManager::new(args.busy_timeout_ms),
            cfg: MarshalConfig::default(),
        }
    }

    pub async fn handle(&mut self, req: BridgeRequest) -> BridgeResponse {
        if req.v != 1 {
            let e = AppError::InvalidRequest(format!("unsupported protocol version: {}", req.v));
            return BridgeResponse::err(req.v, req.id, &e);
        }

        let (v, id) = (req.v, req.id.clone());
        let res = match req.cmd.as_str() {
            "open" => self.handle_open(req.payload),
            "close" => self.handle_close(req.payload),
            "status" => self.handle_status(),
            "set_option" => self.handle_set_option(req.payload),
            "get_option" => self.handle_get_option(req.payload),
            "set_busy_timeout" => self.handle_busy_timeout(req.payload).await,
            "query" => self.handle_query(req.payload).await,
            "execute" => self.handle_execute(req.payload).await,
            "tables" => self.handle_tables(req.payload).await,
            "version" => Ok(json!({
                "arraylite": env!("CARGO_PKG_VERSION"),
                "sqlite": rusqlite::version(),
            })),
            other => Err(AppError::InvalidRequest(format!("unknown cmd: {other}"))),
        };

        match res {
            Ok(data) => BridgeResponse::ok(v, id, data),
            Err(e) => BridgeResponse::err(v, id, &e),
        }
    }

    fn handle_open(&mut self, payload: Value) -> AppResult<Value> {
        let p: OpenPayload = parse(payload)?;
        let id = self.cm.open(&PathBuf::from(p.path), p.db)?;
        Ok(json!({ "db": id }))
    }

    fn handle_close(&mut self, payload: Value) -> AppResult<Value> {
        let p: DbPayload = parse(payload)?;
        self.cm.close(p.db)?;
        Ok(Value::Bool(true))
    }

    fn handle_status(&self) -> AppResult<Value> {
        Ok(serde_json::to_value(self.cm.status())?)
    }

    fn handle_set_option(&mut self, payload: Value) -> AppResult<Value> {
        let p: OptionPayload = parse(payload)?;
        let value = p
            .value
            .ok_or_else(|| AppError::InvalidRequest("set_option requires a value".into()))?;
        match p.name.as_str() {
            "convert_utf8" => self.cfg.convert_utf8 = as_flag(&value)?,
            "typed_blobs" => self.cfg.typed_blobs = as_flag(&value)?,
            "null_as_nan" => self.cfg.null_as_nan = as_flag(&value)?,
            "unique_fieldnames" => self.cfg.unique_fieldnames = as_flag(&value)?,
            "duplicate_policy" => {
                self.cfg.duplicate_policy = match value.as_str() {
                    Some("warn") => DuplicatePolicy::Warn,
                    Some("error") => DuplicatePolicy::Error,
                    _ => {
                        return Err(AppError::InvalidRequest(
                            "duplicate_policy is \"warn\" or \"error\"".into(),
                        ))
                    }
                }
            }
            other => return Err(AppError::InvalidRequest(format!("unknown option: {other}"))),
        }
        Ok(Value::Bool(true))
    }

    fn handle_get_option(&self, payload: Value) -> AppResult<Value> {
        let p: OptionPayload = parse(payload)?;
        Ok(match p.name.as_str() {
            "convert_utf8" => json!(self.cfg.convert_utf8),
            "typed_blobs" => json!(self.cfg.typed_blobs),
            "null_as_nan" => json!(self.cfg.null_as_nan),
            "unique_fieldnames" => json!(self.cfg.unique_fieldnames),
            "duplicate_policy" => match self.cfg.duplicate_policy {
                DuplicatePolicy::Warn => json!("warn"),
                DuplicatePolicy::Error => json!("error"),
            },
            other => return Err(AppError::InvalidRequest(format!("unknown option: {other}"))),
        })
    }

    async fn handle_busy_timeout(&mut self, payload: Value) -> AppResult<Value> {
        let p: BusyTimeoutPayload = parse(payload)?;
        self.worker(p.db)?.set_busy_timeout(p.ms).await?;
        Ok(Value::Bool(true))
    }

    async fn handle_query(&mut self, payload: Value) -> AppResult<Value> {
        let p: QueryPayload = parse(payload)?;
        let params = host_params(&p.params)?;
        let outcome = self.worker(p.db)?.query(p.sql, params, self.cfg).await?;
        Ok(outcome_to_json(outcome))
    }

    async fn handle_execute(&mut self, payload: Value) -> AppResult<Value> {
        let p: QueryPayload = parse(payload)?;
        let params = host_params(&p.params)?;
        let exec = self.worker(p.db)?.execute(p.sql, params, self.cfg).await?;
        Ok(exec_result_to_json(&exec))
    }

    async fn handle_tables(&mut self, payload: Value) -> AppResult<Value> {
        let p: DbPayload = parse(payload)?;
        let tables = self.worker(p.db)?.tables().await?;
        Ok(serde_json::to_value(tables)?)
    }

    fn worker(&self, db: Option<usize>) -> AppResult<&crate::core::connection::WorkerHandle> {
        self.cm.handle(db.unwrap_or(1))
    }
}

fn parse<T: serde::de::DeserializeOwned>(payload: Value) -> AppResult<T> {
    // An omitted payload means "all fields defaulted".
    let payload = if payload.is_null() { json!({}) } else { payload };
    serde_json::from_value(payload).map_err(|e| AppError::InvalidRequest(e.to_string()))
}

fn host_params(params: &[Value]) -> AppResult<Vec<HostValue>> {
    params.iter().map(value_from_json).collect()
}

/// Option values only need to coerce to a boolean: JSON booleans and
/// numbers both count.
fn as_flag(v: &Value) -> AppResult<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0) != 0.0),
        _ => Err(AppError::InvalidRequest("option value must be a boolean or number".into())),
    }
}
