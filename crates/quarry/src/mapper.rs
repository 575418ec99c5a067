use crate::{Datasource, QuerySetting, Request};

use quarry_core::{
    driver::{Diagnostics, Response, Rows},
    validate::DescriptorMap,
    Error, Result,
};

use serde::Deserialize;
use serde_json::{Map, Value};

use std::sync::{Arc, Weak};
use std::time::Duration;

/// Builds the descriptor map for a request. Defaults to the mapper's declared
/// parameter descriptors.
pub trait MapParameters: Send + Sync {
    fn map(&self, request: &Request, datasource: &Datasource) -> DescriptorMap;
}

/// Reshapes the validated parameter map before dispatch. Identity by default.
pub trait MapRequest: Send + Sync {
    fn map(&self, parameters: Map<String, Value>) -> Map<String, Value>;
}

/// Reshapes one result row. Identity by default. `index` is the row's
/// position within an ordered result.
pub trait MapResult: Send + Sync {
    fn map(&self, row: Value, index: Option<usize>) -> Value;
}

/// Fires when the query is dispatched to the connection, before its outcome
/// is known.
pub trait IssuedHook: Send + Sync {
    fn fire(&self, request: &Request, datasource: &Datasource);
}

/// Fires with the final outcome of the execution, success or failure.
pub trait CompletedHook: Send + Sync {
    fn fire(&self, request: &Request, datasource: &Datasource, outcome: &Result<Response>);
}

pub fn map_request_fn<F>(f: F) -> Arc<dyn MapRequest>
where
    F: Fn(Map<String, Value>) -> Map<String, Value> + Send + Sync + 'static,
{
    struct Hook<F>(F);
    impl<F> MapRequest for Hook<F>
    where
        F: Fn(Map<String, Value>) -> Map<String, Value> + Send + Sync,
    {
        fn map(&self, parameters: Map<String, Value>) -> Map<String, Value> {
            (self.0)(parameters)
        }
    }
    Arc::new(Hook(f))
}

pub fn map_result_fn<F>(f: F) -> Arc<dyn MapResult>
where
    F: Fn(Value, Option<usize>) -> Value + Send + Sync + 'static,
{
    struct Hook<F>(F);
    impl<F> MapResult for Hook<F>
    where
        F: Fn(Value, Option<usize>) -> Value + Send + Sync,
    {
        fn map(&self, row: Value, index: Option<usize>) -> Value {
            (self.0)(row, index)
        }
    }
    Arc::new(Hook(f))
}

pub fn on_issued_fn<F>(f: F) -> Arc<dyn IssuedHook>
where
    F: Fn(&Request, &Datasource) + Send + Sync + 'static,
{
    struct Hook<F>(F);
    impl<F> IssuedHook for Hook<F>
    where
        F: Fn(&Request, &Datasource) + Send + Sync,
    {
        fn fire(&self, request: &Request, datasource: &Datasource) {
            (self.0)(request, datasource)
        }
    }
    Arc::new(Hook(f))
}

pub fn on_completed_fn<F>(f: F) -> Arc<dyn CompletedHook>
where
    F: Fn(&Request, &Datasource, &Result<Response>) + Send + Sync + 'static,
{
    struct Hook<F>(F);
    impl<F> CompletedHook for Hook<F>
    where
        F: Fn(&Request, &Datasource, &Result<Response>) + Send + Sync,
    {
        fn fire(&self, request: &Request, datasource: &Datasource, outcome: &Result<Response>) {
            (self.0)(request, datasource, outcome)
        }
    }
    Arc::new(Hook(f))
}

/// Behavioral hooks attached to a mapper in code at build time. Definition
/// files carry only data; anything callable lives here.
#[derive(Clone, Default)]
pub struct MapperHooks {
    pub map_parameters: Option<Arc<dyn MapParameters>>,
    pub map_request: Option<Arc<dyn MapRequest>>,
    pub map_result: Option<Arc<dyn MapResult>>,
    pub on_issued: Option<Arc<dyn IssuedHook>>,
    pub on_completed: Option<Arc<dyn CompletedHook>>,
}

impl MapperHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_request(mut self, hook: Arc<dyn MapRequest>) -> Self {
        self.map_request = Some(hook);
        self
    }

    pub fn map_result(mut self, hook: Arc<dyn MapResult>) -> Self {
        self.map_result = Some(hook);
        self
    }

    pub fn on_issued(mut self, hook: Arc<dyn IssuedHook>) -> Self {
        self.on_issued = Some(hook);
        self
    }

    pub fn on_completed(mut self, hook: Arc<dyn CompletedHook>) -> Self {
        self.on_completed = Some(hook);
        self
    }
}

impl std::fmt::Debug for MapperHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperHooks")
            .field("map_parameters", &self.map_parameters.is_some())
            .field("map_request", &self.map_request.is_some())
            .field("map_result", &self.map_result.is_some())
            .field("on_issued", &self.on_issued.is_some())
            .field("on_completed", &self.on_completed.is_some())
            .finish()
    }
}

/// Data-only mapper declaration, as read from a `<query>.mappers.json` file
/// or built in code.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapperDef {
    /// Defaults to `"<querySetting>[<index>]"`.
    pub name: Option<String>,

    /// Connection-setting name; defaults to the datasource's default
    /// connection.
    pub connection: Option<String>,

    pub transactional: bool,

    /// HTTP-style methods this mapper answers. `None` matches all.
    pub methods: Option<Vec<String>>,

    pub parameters: DescriptorMap,
}

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Deadline for the backend call. In-flight queries have no implicit
    /// timeout; callers opt in here.
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Binds one query setting to a parameter descriptor map, a connection
/// setting, and result-shaping hooks.
pub struct Mapper {
    pub(crate) name: String,
    pub(crate) connection_setting: String,
    pub(crate) transactional: bool,
    pub(crate) methods: Option<Vec<String>>,
    pub(crate) parameter_descriptors: DescriptorMap,
    pub(crate) query: Weak<QuerySetting>,
    pub(crate) hooks: MapperHooks,
}

impl Mapper {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection_setting(&self) -> &str {
        &self.connection_setting
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    /// The owning query setting. The back-reference is weak; the setting
    /// owns the mapper, not the other way around.
    pub fn query_setting(&self) -> Result<Arc<QuerySetting>> {
        self.query
            .upgrade()
            .ok_or_else(|| Error::configuration(format!("mapper `{}` outlived its query setting", self.name)))
    }

    pub(crate) fn handles_method(&self, method: &str) -> bool {
        match &self.methods {
            None => true,
            Some(methods) => methods.iter().any(|m| m.eq_ignore_ascii_case(method)),
        }
    }

    /// Validates the request and runs the query on the session's connection.
    ///
    /// Validation failure returns the per-field report without issuing the
    /// query. Execution failure on a transactional mapper rolls the
    /// transaction back before the error is surfaced. Exactly one outcome is
    /// produced per call; `on_completed` observes it either way.
    pub async fn execute(
        &self,
        datasource: &Datasource,
        request: &Request,
        options: &ExecuteOptions,
    ) -> Result<Response> {
        let outcome = self.execute_inner(datasource, request, options).await;
        if let Some(hook) = &self.hooks.on_completed {
            hook.fire(request, datasource, &outcome);
        }
        outcome
    }

    /// Blocking variant of [`execute`](Self::execute) for synchronous call
    /// sites. Parks the current thread on the async path; must run inside a
    /// multi-threaded tokio runtime.
    pub fn execute_blocking(
        &self,
        datasource: &Datasource,
        request: &Request,
        options: &ExecuteOptions,
    ) -> Result<Response> {
        let handle = tokio::runtime::Handle::current();
        tokio::task::block_in_place(|| handle.block_on(self.execute(datasource, request, options)))
    }

    async fn execute_inner(
        &self,
        datasource: &Datasource,
        request: &Request,
        options: &ExecuteOptions,
    ) -> Result<Response> {
        let query = self.query_setting()?;

        // Validate before anything touches a connection.
        let mapped;
        let descriptors = match &self.hooks.map_parameters {
            Some(hook) => {
                mapped = hook.map(request, datasource);
                &mapped
            }
            None => &self.parameter_descriptors,
        };

        let formatted = datasource
            .validator()
            .format(&request.parameters, descriptors)
            .await?;
        if let Some(errors) = formatted.errors {
            tracing::debug!(
                datasource = datasource.name(),
                query = query.name.as_str(),
                mapper = self.name.as_str(),
                ?errors,
                "request rejected by validation"
            );
            return Err(Error::validation(errors).in_query_context(
                datasource.name(),
                &query.name,
                &self.name,
            ));
        }

        let mut outbound = formatted.value;
        if let Some(hook) = &self.hooks.map_request {
            outbound = hook.map(outbound);
        }

        // Positional parameters follow descriptor declaration order.
        let params: Vec<Value> = descriptors
            .keys()
            .map(|field| outbound.get(field).cloned().unwrap_or(Value::Null))
            .collect();

        let validated = request.with_parameters(outbound);

        let connection = datasource
            .connection(&validated, self, false)
            .await?
            .ok_or_else(|| Error::connection_denied(datasource.name()))?;

        // The transaction token is the query-setting name.
        let token = query.name.as_str();
        if self.transactional {
            connection.begin(token).await?;
        }

        if let Some(hook) = &self.hooks.on_issued {
            hook.fire(&validated, datasource);
        }

        let dispatched = connection.execute(&query.raw_query, &params);
        let result = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, dispatched).await {
                Ok(result) => result,
                Err(_) => Err(Error::execution_msg(format!(
                    "query `{}` timed out after {limit:?}",
                    query.name
                ))),
            },
            None => dispatched.await,
        };

        let mut response = match result {
            Ok(response) => response,
            Err(err) => {
                if self.transactional {
                    if let Err(rollback_err) = connection.rollback(token).await {
                        tracing::error!(token, %rollback_err, "rollback after failed execution failed");
                    }
                }
                tracing::debug!(
                    datasource = datasource.name(),
                    query = query.name.as_str(),
                    %err,
                    "query execution failed"
                );
                return Err(err);
            }
        };

        if let Rows::Values(rows) = &mut response.rows {
            if let Some(hook) = &self.hooks.map_result {
                let mapped = std::mem::take(rows)
                    .into_iter()
                    .enumerate()
                    .map(|(index, row)| hook.map(row, Some(index)))
                    .collect();
                *rows = mapped;
            }
        }

        if !datasource.is_production() {
            response.diagnostics = Some(Diagnostics {
                query: query.raw_query.display(),
                params,
            });
        }

        if self.transactional {
            if let Err(err) = connection.commit(token).await {
                if let Err(rollback_err) = connection.rollback(token).await {
                    tracing::error!(token, %rollback_err, "rollback after failed commit failed");
                }
                return Err(err);
            }
        }

        Ok(response)
    }
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("name", &self.name)
            .field("connection_setting", &self.connection_setting)
            .field("transactional", &self.transactional)
            .field("methods", &self.methods)
            .field("hooks", &self.hooks)
            .finish()
    }
}
