use quarry_core::{driver::Connection, Result};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Per-datasource map of session id → connection-setting name → connection.
///
/// One async mutex guards the whole map, so lookup and creation of a missing
/// connection are a single atomic step: two concurrent requests for a
/// brand-new session cannot both construct a connection and leak one.
#[derive(Default)]
pub struct SessionPool {
    sessions: tokio::sync::Mutex<HashMap<String, HashMap<String, Arc<dyn Connection>>>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached connection for `(session_id, setting)`, or runs
    /// `create` and caches its result. `force` replaces any cached entry,
    /// closing the displaced connection.
    pub(crate) async fn get_or_create<F>(
        &self,
        session_id: &str,
        setting: &str,
        force: bool,
        create: F,
    ) -> Result<Arc<dyn Connection>>
    where
        F: Future<Output = Result<Arc<dyn Connection>>>,
    {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(session_id.to_string()).or_default();

        if !force {
            if let Some(connection) = session.get(setting) {
                return Ok(connection.clone());
            }
        }

        let connection = create.await?;
        if let Some(replaced) = session.insert(setting.to_string(), connection.clone()) {
            if let Err(err) = replaced.close().await {
                tracing::warn!(session_id, setting, %err, "failed to close replaced connection");
            }
        }
        Ok(connection)
    }

    /// Ends a session: every connection it holds is closed and the entry is
    /// removed. Individual close failures are logged, not propagated.
    pub async fn close(&self, session_id: &str) {
        let closed = self.sessions.lock().await.remove(session_id);

        if let Some(connections) = closed {
            for (setting, connection) in connections {
                if let Err(err) = connection.close().await {
                    tracing::warn!(session_id, setting, %err, "failed to close connection");
                }
            }
            tracing::debug!(session_id, "session closed");
        }
    }

    /// Number of live sessions. Connections are never proactively evicted,
    /// so this only shrinks through [`close`](Self::close).
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionPool")
    }
}
