use crate::{
    datasource::Datasource,
    discovery::{self, DatasourceDef},
    mapper::{ExecuteOptions, MapperHooks},
    policy::{AccessPolicy, AllowAll},
    registry::DriverRegistry,
    request::Request,
};

use quarry_core::{
    driver::{DriverFactory, Response},
    Error, Result, Validator,
};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Process-wide entry point holding every datasource.
pub struct Runtime {
    datasources: HashMap<String, Arc<Datasource>>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn datasource(&self, name: &str) -> Option<&Arc<Datasource>> {
        self.datasources.get(name)
    }

    pub fn datasource_names(&self) -> impl Iterator<Item = &str> {
        self.datasources.keys().map(String::as_str)
    }

    fn require(&self, name: &str) -> Result<&Arc<Datasource>> {
        self.datasource(name)
            .ok_or_else(|| Error::configuration(format!("unknown datasource `{name}`")))
    }

    /// Routes a request to the named query's mapper and executes it.
    pub async fn execute(
        &self,
        datasource: &str,
        query: &str,
        request: &Request,
        options: &ExecuteOptions,
    ) -> Result<Response> {
        self.require(datasource)?
            .execute(query, request, options)
            .await
    }

    /// Blocking variant of [`execute`](Self::execute). Must run inside a
    /// multi-threaded tokio runtime.
    pub fn execute_blocking(
        &self,
        datasource: &str,
        query: &str,
        request: &Request,
        options: &ExecuteOptions,
    ) -> Result<Response> {
        let handle = tokio::runtime::Handle::current();
        tokio::task::block_in_place(|| {
            handle.block_on(self.execute(datasource, query, request, options))
        })
    }

    /// Ends a session on the named datasource, closing its connections.
    pub async fn close_session(&self, datasource: &str, session_id: &str) -> Result<()> {
        self.require(datasource)?.close_session(session_id).await;
        Ok(())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("datasources", &self.datasources.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Assembles a [`Runtime`]: datasource definitions (scanned or declared),
/// driver factories, access policy, kind registry, and mapper hooks.
pub struct RuntimeBuilder {
    defs: Vec<DatasourceDef>,
    registry: DriverRegistry,
    policy: Arc<dyn AccessPolicy>,
    validator: Validator,
    hooks: HashMap<String, MapperHooks>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self {
            defs: vec![],
            registry: DriverRegistry::new(),
            policy: Arc::new(AllowAll),
            validator: Validator::default(),
            hooks: HashMap::new(),
        }
    }
}

impl RuntimeBuilder {
    /// Discovers datasource definitions under `root`.
    pub fn scan(mut self, root: impl AsRef<Path>) -> Result<Self> {
        self.defs.extend(discovery::scan(root.as_ref())?);
        Ok(self)
    }

    /// Declares a datasource definition programmatically.
    pub fn define(mut self, def: DatasourceDef) -> Self {
        self.defs.push(def);
        self
    }

    pub fn driver(mut self, factory: impl DriverFactory) -> Self {
        self.registry.register(factory);
        self
    }

    pub fn policy(mut self, policy: impl AccessPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Replaces the default validator (and with it, the kind registry).
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Attaches behavioral hooks to the mapper named `mapper` (its declared
    /// name, or the `"<query>[<index>]"` default) inside `datasource`.
    pub fn hooks(
        mut self,
        datasource: &str,
        mapper: &str,
        hooks: MapperHooks,
    ) -> Self {
        self.hooks.insert(format!("{datasource}/{mapper}"), hooks);
        self
    }

    pub fn build(self) -> Result<Runtime> {
        let registry = Arc::new(self.registry);
        let validator = Arc::new(self.validator);

        let mut datasources = HashMap::new();
        for def in self.defs {
            let name = def.name.clone();
            if datasources.contains_key(&name) {
                return Err(Error::configuration(format!(
                    "duplicate datasource `{name}`"
                )));
            }

            let datasource = Datasource::from_def(
                def,
                registry.clone(),
                self.policy.clone(),
                validator.clone(),
                &self.hooks,
            )?;
            datasources.insert(name, Arc::new(datasource));
        }

        Ok(Runtime { datasources })
    }
}
