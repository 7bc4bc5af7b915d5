//! Fixed table of open database handles. Each open database is owned
//! by one dedicated worker thread; callers talk to it through a task
//! channel, which serializes all statement execution per connection.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::oneshot;

use crate::core::config::MarshalConfig;
use crate::core::types::{ExecResult, QueryOutcome, SlotStatus};
use crate::core::value::HostValue;
use crate::core::{functions, query, schema};
use crate::error::{AppError, AppResult};

/// Size of the slot table; database ids are 1-based slot indexes.
pub const MAX_OPEN_DBS: usize = 5;

pub struct ConnectionManager {
    slots: Vec<Option<WorkerHandle>>,
    busy_timeout_ms: u64,
}

impl ConnectionManager {
    pub fn new(busy_timeout_ms: u64) -> Self {
        Self {
            slots: (0..MAX_OPEN_DBS).map(|_| None).collect(),
            busy_timeout_ms,
        }
    }

    /// Open a database into `requested` (closing whatever occupied it)
    /// or into the lowest free slot. Returns the database id.
    pub fn open(&mut self, path: &Path, requested: Option<usize>) -> AppResult<usize> {
        let id = match requested {
            Some(id) => {
                self.check_id(id)?;
                self.slots[id - 1] = None;
                id
            }
            None => self
                .slots
                .iter()
                .position(|s| s.is_none())
                .map(|i| i + 1)
                .ok_or(AppError::NoFreeSlot)?,
        };

        let handle = WorkerHandle::spawn(path.to_path_buf(), self.busy_timeout_ms)?;
        self.slots[id - 1] = Some(handle);
        Ok(id)
    }

    /// Close one database, or all of them when no id is given.
    pub fn close(&mut self, id: Option<usize>) -> AppResult<()> {
        match id {
            None => {
                for slot in &mut self.slots {
                    *slot = None;
                }
                Ok(())
            }
            Some(id) => {
                self.check_id(id)?;
                self.slots[id - 1].take().map(|_| ()).ok_or(AppError::DbNotOpen)
            }
        }
    }

    pub fn handle(&self, id: usize) -> AppResult<&WorkerHandle> {
        self.check_id(id)?;
        self.slots[id - 1].as_ref().ok_or(AppError::DbNotOpen)
    }

    pub fn status(&self) -> Vec<SlotStatus> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| SlotStatus {
                db: i + 1,
                path: slot.as_ref().map(|h| h.db_path.clone()),
            })
            .collect()
    }

    fn check_id(&self, id: usize) -> AppResult<()> {
        if (1..=MAX_OPEN_DBS).contains(&id) {
            Ok(())
        } else {
            Err(AppError::InvalidHandle(id as i64))
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if self.slots.iter().any(|s| s.is_some()) {
            tracing::warn!("closing open databases");
        }
    }
}

#[derive(Debug)]
pub struct WorkerHandle {
    tx: mpsc::Sender<DbTask>,
    pub db_path: PathBuf,
}

impl WorkerHandle {
    /// Open the database, apply the busy timeout, register the extra
    /// SQL functions, then hand the connection to its worker thread.
    /// Open failures are reported here, synchronously.
    fn spawn(db_path: PathBuf, busy_timeout_ms: u64) -> AppResult<Self> {
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
            .map_err(|_| AppError::BusyTimeoutFail)?;
        functions::register_scalar_functions(&conn)?;

        let (tx, rx) = mpsc::channel::<DbTask>();
        thread::spawn(move || db_worker_main(conn, rx));
        Ok(Self { tx, db_path })
    }

    pub async fn query(
        &self,
        sql: String,
        params: Vec<HostValue>,
        cfg: MarshalConfig,
    ) -> AppResult<QueryOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send(DbTask::Query { sql, params, cfg, respond_to: tx })?;
        recv(rx).await
    }

    pub async fn execute(
        &self,
        sql: String,
        params: Vec<HostValue>,
        cfg: MarshalConfig,
    ) -> AppResult<ExecResult> {
        let (tx, rx) = oneshot::channel();
        self.send(DbTask::Execute { sql, params, cfg, respond_to: tx })?;
        recv(rx).await
    }

    pub async fn tables(&self) -> AppResult<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        self.send(DbTask::Tables { respond_to: tx })?;
        recv(rx).await
    }

    pub async fn set_busy_timeout(&self, ms: u64) -> AppResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(DbTask::SetBusyTimeout { ms, respond_to: tx })?;
        recv(rx).await
    }

    fn send(&self, task: DbTask) -> AppResult<()> {
        self.tx
            .send(task)
            .map_err(|_| AppError::Internal("db worker unavailable".into()))
    }
}

async fn recv<T>(rx: oneshot::Receiver<AppResult<T>>) -> AppResult<T> {
    rx.await
        .map_err(|_| AppError::Internal("db worker dropped response".into()))?
}

enum DbTask {
    Query {
        sql: String,
        params: Vec<HostValue>,
        cfg: MarshalConfig,
        respond_to: oneshot::Sender<AppResult<QueryOutcome>>,
    },
    Execute {
        sql: String,
        params: Vec<HostValue>,
        cfg: MarshalConfig,
        respond_to: oneshot::Sender<AppResult<ExecResult>>,
    },
    Tables {
        respond_to: oneshot::Sender<AppResult<Vec<String>>>,
    },
    SetBusyTimeout {
        ms: u64,
        respond_to: oneshot::Sender<AppResult<()>>,
    },
}

fn db_worker_main(conn: Connection, rx: mpsc::Receiver<DbTask>) {
    // The loop ends when the handle (and with it the sender) is
    // dropped, which closes the connection.
    while let Ok(task) = rx.recv() {
        match task {
            DbTask::Query { sql, params, cfg, respond_to } => {
                let _ = respond_to.send(query::run_query(&conn, &sql, &params, &cfg));
            }
            DbTask::Execute { sql, params, cfg, respond_to } => {
                let _ = respond_to.send(query::run_execute(&conn, &sql, &params, &cfg));
            }
            DbTask::Tables { respond_to } => {
                let _ = respond_to.send(schema::list_tables(&conn));
            }
            DbTask::SetBusyTimeout { ms, respond_to } => {
                let res = conn
                    .busy_timeout(Duration::from_millis(ms))
                    .map_err(|_| AppError::BusyTimeoutFail);
                let _ = respond_to.send(res);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::CellValue;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }

    fn mem() -> PathBuf {
        PathBuf::from(":memory:")
    }

    #[test]
    fn slots_fill_lowest_first_and_run_out() {
        let mut cm = ConnectionManager::new(1_000);
        for expect in 1..=MAX_OPEN_DBS {
            assert_eq!(cm.open(&mem(), None).unwrap(), expect);
        }
        assert!(matches!(cm.open(&mem(), None), Err(AppError::NoFreeSlot)));

        cm.close(Some(3)).unwrap();
        assert_eq!(cm.open(&mem(), None).unwrap(), 3);
    }

    #[test]
    fn close_validates_the_handle() {
        let mut cm = ConnectionManager::new(1_000);
        assert!(matches!(cm.close(Some(2)), Err(AppError::DbNotOpen)));
        assert!(matches!(cm.close(Some(9)), Err(AppError::InvalidHandle(9))));
        assert!(matches!(cm.handle(1), Err(AppError::DbNotOpen)));
        cm.close(None).unwrap();
    }

    #[test]
    fn status_reports_every_slot() {
        let mut cm = ConnectionManager::new(1_000);
        cm.open(&mem(), None).unwrap();
        let status = cm.status();
        assert_eq!(status.len(), MAX_OPEN_DBS);
        assert_eq!(status[0].path, Some(mem()));
        assert_eq!(status[1].path, None);
    }

    #[test]
    fn worker_runs_queries_with_functions_registered() {
        block_on(async {
            let mut cm = ConnectionManager::new(1_000);
            let id = cm.open(&mem(), None).unwrap();
            let h = cm.handle(id).unwrap();

            let outcome = h
                .query("SELECT pow(2, 3)".into(), vec![], MarshalConfig::default())
                .await
                .unwrap();
            match outcome {
                QueryOutcome::Rows(r) => assert_eq!(r.rows[0][0], CellValue::Number(8.0)),
                QueryOutcome::Exec(_) => panic!("expected rows"),
            }

            h.set_busy_timeout(250).await.unwrap();

            h.execute("CREATE TABLE t(a)".into(), vec![], MarshalConfig::default())
                .await
                .unwrap();
            assert_eq!(h.tables().await.unwrap(), ["t"]);
        });
    }
}
