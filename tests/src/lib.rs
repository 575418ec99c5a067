//! Shared test doubles and fixtures for the integration suite.

use quarry::{
    Command, Connection, ConnectionSettings, DatasourceDef, DriverFactory, Environment, MapperDef,
    QueryDef, Response, Runtime,
};
use quarry_core::{async_trait, Error, Result};

use serde_json::{Map, Value};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Everything the mock driver observed, shared across all connections the
/// factory created.
#[derive(Debug, Default)]
pub struct MockLog {
    pub calls: Mutex<Vec<MockCall>>,
    pub connections_created: AtomicUsize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Execute(String, Vec<Value>),
    Begin(String),
    Commit(String),
    Rollback(String),
    Close,
}

impl MockLog {
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.connections_created.load(Ordering::SeqCst)
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn count(&self, matches: impl Fn(&MockCall) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }
}

/// What the mock connection answers with.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    pub rows: Vec<Value>,
    pub fail_execute: bool,
    pub stall_execute: bool,
}

impl MockScript {
    pub fn rows(rows: Vec<Value>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_execute: true,
            ..Self::default()
        }
    }

    /// Never resolves an execute call; for exercising deadlines.
    pub fn stalling() -> Self {
        Self {
            stall_execute: true,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct MockConnection {
    log: Arc<MockLog>,
    script: MockScript,
    tx_token: Mutex<Option<String>>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&self, command: &Command, params: &[Value]) -> Result<Response> {
        self.log
            .record(MockCall::Execute(command.display(), params.to_vec()));
        if self.script.stall_execute {
            std::future::pending::<()>().await;
        }
        if self.script.fail_execute {
            return Err(Error::execution_msg("scripted failure"));
        }
        Ok(Response::values(self.script.rows.clone()))
    }

    async fn begin(&self, token: &str) -> Result<bool> {
        self.log.record(MockCall::Begin(token.to_string()));
        let mut tx = self.tx_token.lock().unwrap();
        if tx.is_some() {
            return Ok(false);
        }
        *tx = Some(token.to_string());
        Ok(true)
    }

    async fn commit(&self, token: &str) -> Result<()> {
        self.log.record(MockCall::Commit(token.to_string()));
        let mut tx = self.tx_token.lock().unwrap();
        if tx.as_deref() == Some(token) {
            *tx = None;
        }
        Ok(())
    }

    async fn rollback(&self, token: &str) -> Result<()> {
        self.log.record(MockCall::Rollback(token.to_string()));
        let mut tx = self.tx_token.lock().unwrap();
        if tx.as_deref() == Some(token) {
            *tx = None;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.record(MockCall::Close);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockFactory {
    pub log: Arc<MockLog>,
    pub script: MockScript,
}

#[async_trait]
impl DriverFactory for MockFactory {
    fn driver_name(&self) -> &'static str {
        "mock"
    }

    async fn create(&self, _settings: &ConnectionSettings) -> Result<Box<dyn Connection>> {
        self.log.connections_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            log: self.log.clone(),
            script: self.script.clone(),
            tx_token: Mutex::new(None),
        }))
    }
}

pub fn mock_settings(name: &str) -> ConnectionSettings {
    ConnectionSettings {
        name: name.to_string(),
        driver: "mock".to_string(),
        url: "mock:".to_string(),
        username: None,
        password: None,
        options: Map::new(),
    }
}

/// A `crm` datasource (test environment) with one `find_user` query whose
/// single mapper requires a numeric `id`.
pub fn crm_def(transactional: bool) -> DatasourceDef {
    let mapper: MapperDef = serde_json::from_value(serde_json::json!({
        "transactional": transactional,
        "parameters": {"id": {"type": "number", "required": true}}
    }))
    .unwrap();

    DatasourceDef::new("crm")
        .environment(Environment::Test)
        .connection(mock_settings("main"))
        .query(QueryDef::sql("find_user", "SELECT * FROM users WHERE id = ?1").mapper(mapper))
}

/// Runtime over the mock driver plus the log it records into.
pub fn mock_runtime(def: DatasourceDef, script: MockScript) -> (Runtime, Arc<MockLog>) {
    let log = Arc::new(MockLog::default());
    let runtime = Runtime::builder()
        .driver(MockFactory {
            log: log.clone(),
            script,
        })
        .define(def)
        .build()
        .unwrap();
    (runtime, log)
}
