//! Pooled SQL driver backed by SQLite.
//!
//! One process-wide connection pool is shared across sessions; a session's
//! logical [`SqlConnection`] borrows a physical connection from the pool
//! lazily on first use and keeps it for the session's lifetime. Transactions
//! are guarded by a caller-supplied token: `begin` only starts one when none
//! is active, and `commit`/`rollback` act only when the stored token matches.

mod value;
use value::{column_value, SqlParam};

use quarry_core::{
    async_trait,
    driver::{Command, Connection, ConnectionSettings, DriverFactory, Response},
    Error, Result,
};

use rusqlite::Connection as RusqliteConnection;
use serde_json::{Map, Value};
use url::Url;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Instant,
};

/// SQLite connection target.
#[derive(Debug, Clone)]
pub enum Sqlite {
    File(PathBuf),
    InMemory,
}

impl Sqlite {
    /// Create a target from a `sqlite:` connection URL.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url_str = url.into();
        let url = Url::parse(&url_str)
            .map_err(|err| Error::configuration(format!("invalid connection url: {err}")))?;

        if url.scheme() != "sqlite" {
            return Err(Error::configuration(format!(
                "connection URL does not have a `sqlite` scheme; url={url_str}"
            )));
        }

        if url.path() == ":memory:" {
            Ok(Self::InMemory)
        } else {
            Ok(Self::File(PathBuf::from(url.path())))
        }
    }

    pub fn in_memory() -> Self {
        Self::InMemory
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    /// Every pooled connection to `:memory:` would be a distinct database, so
    /// in-memory targets cap the pool at one physical connection.
    fn max_connections(&self) -> Option<usize> {
        matches!(self, Self::InMemory).then_some(1)
    }

    fn connect(&self) -> Result<RusqliteConnection> {
        match self {
            Sqlite::File(path) => RusqliteConnection::open(path).map_err(Error::driver),
            Sqlite::InMemory => RusqliteConnection::open_in_memory().map_err(Error::driver),
        }
    }
}

#[derive(Debug)]
struct Manager {
    target: Sqlite,
}

impl deadpool::managed::Manager for Manager {
    type Type = RusqliteConnection;
    type Error = Error;

    async fn create(&self) -> std::result::Result<Self::Type, Self::Error> {
        self.target.connect()
    }

    async fn recycle(
        &self,
        _obj: &mut Self::Type,
        _metrics: &deadpool::managed::Metrics,
    ) -> deadpool::managed::RecycleResult<Self::Error> {
        Ok(())
    }
}

type PoolObject = deadpool::managed::Object<Manager>;

/// Process-wide pool of physical SQLite connections. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct SqlPool {
    inner: deadpool::managed::Pool<Manager>,
}

impl SqlPool {
    pub fn new(target: Sqlite, max_size: Option<usize>) -> Result<Self> {
        let mut builder = deadpool::managed::Pool::builder(Manager {
            target: target.clone(),
        })
        .runtime(deadpool::Runtime::Tokio1);

        if let Some(max_size) = target.max_connections().or(max_size) {
            builder = builder.max_size(max_size);
        }

        let inner = builder.build().map_err(Error::connection_pool)?;
        tracing::debug!(sqlite = ?target, "created sql connection pool");
        Ok(Self { inner })
    }

    async fn get(&self) -> Result<PoolObject> {
        self.inner.get().await.map_err(Error::connection_pool)
    }
}

#[derive(Debug, Default)]
struct State {
    /// Physical connection, borrowed lazily on first use and kept for the
    /// session. Dropping it returns it to the pool.
    physical: Option<PoolObject>,

    /// Token of the active transaction, when one is open.
    tx_token: Option<String>,
}

/// Session-scoped logical connection over a shared [`SqlPool`].
///
/// All state mutation happens under one async mutex, so the
/// transaction-token check and the lazy borrow are atomic.
#[derive(Debug)]
pub struct SqlConnection {
    pool: SqlPool,
    state: tokio::sync::Mutex<State>,
}

impl SqlConnection {
    pub fn new(pool: SqlPool) -> Self {
        Self {
            pool,
            state: tokio::sync::Mutex::new(State::default()),
        }
    }

    async fn ensure_physical<'a>(&self, state: &'a mut State) -> Result<&'a PoolObject> {
        if state.physical.is_none() {
            state.physical = Some(self.pool.get().await?);
        }
        Ok(state.physical.as_ref().unwrap())
    }
}

#[async_trait]
impl Connection for SqlConnection {
    async fn execute(&self, command: &Command, params: &[Value]) -> Result<Response> {
        let Command::Sql(sql) = command else {
            return Err(Error::configuration(
                "sql connection cannot execute an HTTP command",
            ));
        };

        let started = Instant::now();
        let mut state = self.state.lock().await;
        let conn = self.ensure_physical(&mut state).await?;

        let mut stmt = conn.prepare(sql).map_err(Error::execution)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let bound: Vec<SqlParam<'_>> = params.iter().map(SqlParam).collect();

        if columns.is_empty() {
            let count = stmt
                .execute(rusqlite::params_from_iter(bound.iter()))
                .map_err(Error::execution)?;
            return Ok(Response::count(count as u64).timed(started));
        }

        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound.iter()))
            .map_err(Error::execution)?;

        let mut values = vec![];
        loop {
            match rows.next() {
                Ok(Some(row)) => {
                    let mut record = Map::new();
                    for (index, column) in columns.iter().enumerate() {
                        record.insert(
                            column.clone(),
                            column_value(row, index).map_err(Error::execution)?,
                        );
                    }
                    values.push(Value::Object(record));
                }
                Ok(None) => break,
                Err(err) => return Err(Error::execution(err)),
            }
        }

        Ok(Response::values(values)
            .with_fields(columns)
            .timed(started))
    }

    async fn begin(&self, token: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.tx_token.is_some() {
            return Ok(false);
        }

        let conn = self.ensure_physical(&mut state).await?;
        conn.execute("BEGIN", []).map_err(Error::execution)?;
        state.tx_token = Some(token.to_string());
        tracing::debug!(token, "transaction started");
        Ok(true)
    }

    async fn commit(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.tx_token.as_deref() != Some(token) {
            return Ok(());
        }

        let conn = self.ensure_physical(&mut state).await?;
        conn.execute("COMMIT", []).map_err(Error::execution)?;
        state.tx_token = None;
        tracing::debug!(token, "transaction committed");
        Ok(())
    }

    async fn rollback(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.tx_token.as_deref() != Some(token) {
            return Ok(());
        }

        let conn = self.ensure_physical(&mut state).await?;
        conn.execute("ROLLBACK", []).map_err(Error::execution)?;
        state.tx_token = None;
        tracing::debug!(token, "transaction rolled back");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.tx_token.take() {
            if let Some(conn) = state.physical.as_ref() {
                if let Err(err) = conn.execute("ROLLBACK", []) {
                    tracing::warn!(token, %err, "rollback on close failed");
                }
            }
        }
        // Returns the physical connection to the pool.
        state.physical = None;
        Ok(())
    }
}

/// Factory registered under the `sql` driver name. Pools are keyed by
/// connection URL, so every session sharing a connection setting shares one
/// physical pool.
#[derive(Debug, Default)]
pub struct SqlFactory {
    pools: Mutex<HashMap<String, SqlPool>>,
}

impl SqlFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool_for(&self, settings: &ConnectionSettings) -> Result<SqlPool> {
        let mut pools = self.pools.lock().unwrap();
        if let Some(pool) = pools.get(&settings.url) {
            return Ok(pool.clone());
        }

        let max_size = settings
            .options
            .get("maxConnections")
            .and_then(Value::as_u64)
            .map(|n| n as usize);
        let pool = SqlPool::new(Sqlite::new(&settings.url)?, max_size)?;
        pools.insert(settings.url.clone(), pool.clone());
        Ok(pool)
    }
}

#[async_trait]
impl DriverFactory for SqlFactory {
    fn driver_name(&self) -> &'static str {
        "sql"
    }

    async fn create(&self, settings: &ConnectionSettings) -> Result<Box<dyn Connection>> {
        Ok(Box::new(SqlConnection::new(self.pool_for(settings)?)))
    }
}
