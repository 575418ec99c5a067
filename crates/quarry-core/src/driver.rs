mod command;
pub use command::{Command, HttpCommand, HttpMethod};

mod response;
pub use response::{Diagnostics, Response, Rows};

use crate::{async_trait, Result};

use serde::Deserialize;
use serde_json::{Map, Value};

use std::fmt::Debug;

/// A session-scoped handle to a backend. Implementations are either pooled
/// SQL connections (a logical handle borrowing from a process-wide pool) or
/// stateless remote HTTP wrappers.
///
/// Transaction methods default to no-ops so stateless variants inherit them.
/// A connection holds at most one active transaction token at a time;
/// `commit`/`rollback` act only when the caller's token matches the stored
/// one.
#[async_trait]
pub trait Connection: Debug + Send + Sync + 'static {
    /// Execute a command with positional parameters.
    ///
    /// Execution failures come back as `Err`; the runtime rolls back first
    /// when the call was transactional.
    async fn execute(&self, command: &Command, params: &[Value]) -> Result<Response>;

    /// Begin a transaction guarded by `token`, unless one is already active
    /// on the underlying physical connection. Returns whether a transaction
    /// was actually started.
    async fn begin(&self, _token: &str) -> Result<bool> {
        Ok(false)
    }

    /// Commit the active transaction if `token` matches; no-op otherwise.
    async fn commit(&self, _token: &str) -> Result<()> {
        Ok(())
    }

    /// Roll back the active transaction if `token` matches; no-op otherwise.
    async fn rollback(&self, _token: &str) -> Result<()> {
        Ok(())
    }

    /// Release underlying resources. Called once when the owning session
    /// ends.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Declared backend for one connection-setting name inside a datasource
/// definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    pub name: String,

    /// Driver name resolved against the startup-time driver registry.
    pub driver: String,

    pub url: String,

    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    /// Driver-specific knobs (pool size, timeouts, ...).
    #[serde(default)]
    pub options: Map<String, Value>,
}

/// Constructs session connections for one driver name. Factories register
/// once at startup; connection construction never derives anything from
/// runtime strings beyond the declared settings.
#[async_trait]
pub trait DriverFactory: Send + Sync + 'static {
    /// The name connection settings use to select this driver.
    fn driver_name(&self) -> &'static str;

    async fn create(&self, settings: &ConnectionSettings) -> Result<Box<dyn Connection>>;
}
