use crate::{
    discovery::DatasourceDef,
    mapper::{ExecuteOptions, Mapper, MapperHooks},
    policy::AccessPolicy,
    query::QuerySetting,
    registry::DriverRegistry,
    request::Request,
    session::SessionPool,
};

use quarry_core::{
    driver::{Connection, ConnectionSettings, Response},
    Error, Result, Validator,
};

use indexmap::IndexMap;
use serde::Deserialize;

use std::collections::HashMap;
use std::sync::Arc;

/// Which diagnostics a datasource's responses carry. Production responses
/// never echo query text or parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Test,
}

/// A named backend grouping query settings and session-scoped connections.
/// Built once at startup; lives for the process lifetime.
pub struct Datasource {
    name: String,
    environment: Environment,
    connection_settings: HashMap<String, ConnectionSettings>,
    default_connection: String,
    query_settings: IndexMap<String, Arc<QuerySetting>>,
    sessions: SessionPool,
    registry: Arc<DriverRegistry>,
    policy: Arc<dyn AccessPolicy>,
    validator: Arc<Validator>,
}

impl Datasource {
    pub(crate) fn from_def(
        def: DatasourceDef,
        registry: Arc<DriverRegistry>,
        policy: Arc<dyn AccessPolicy>,
        validator: Arc<Validator>,
        hooks: &HashMap<String, MapperHooks>,
    ) -> Result<Self> {
        let name = def.name;
        let config = def.config;

        let mut connection_settings = HashMap::new();
        for settings in config.connections {
            if !registry.contains(&settings.driver) {
                return Err(Error::configuration(format!(
                    "datasource `{name}`: connection `{}` names unknown driver `{}`",
                    settings.name, settings.driver
                )));
            }
            connection_settings.insert(settings.name.clone(), settings);
        }

        let default_connection = match config.default_connection {
            Some(default) => {
                if !connection_settings.contains_key(&default) {
                    return Err(Error::configuration(format!(
                        "datasource `{name}`: default connection `{default}` is not declared"
                    )));
                }
                default
            }
            None => connection_settings
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| {
                    Error::configuration(format!(
                        "datasource `{name}` declares no connection settings"
                    ))
                })?,
        };

        let mut query_settings = IndexMap::new();
        for query in def.queries {
            if query_settings.contains_key(&query.name) {
                return Err(Error::configuration(format!(
                    "datasource `{name}`: duplicate query setting `{}`",
                    query.name
                )));
            }

            let hooks_for = |mapper_name: &str| {
                hooks
                    .get(&format!("{name}/{mapper_name}"))
                    .cloned()
                    .unwrap_or_default()
            };
            let setting = QuerySetting::build(
                query.name.clone(),
                query.command,
                query.mappers,
                &default_connection,
                &hooks_for,
            );

            for mapper in &setting.mappers {
                if !connection_settings.contains_key(mapper.connection_setting()) {
                    return Err(Error::configuration(format!(
                        "datasource `{name}`: mapper `{}` names unknown connection `{}`",
                        mapper.name(),
                        mapper.connection_setting()
                    )));
                }
            }

            query_settings.insert(query.name, setting);
        }

        tracing::debug!(
            datasource = name.as_str(),
            queries = query_settings.len(),
            "datasource ready"
        );

        Ok(Self {
            name,
            environment: config.environment,
            connection_settings,
            default_connection,
            query_settings,
            sessions: SessionPool::new(),
            registry,
            policy,
            validator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn default_connection(&self) -> &str {
        &self.default_connection
    }

    pub(crate) fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn query(&self, name: &str) -> Option<&Arc<QuerySetting>> {
        self.query_settings.get(name)
    }

    pub fn query_names(&self) -> impl Iterator<Item = &str> {
        self.query_settings.keys().map(String::as_str)
    }

    /// Locates the mapper answering `request.method` under the named query.
    pub fn mapper(&self, query: &str, method: &str) -> Result<Arc<Mapper>> {
        let setting = self.query(query).ok_or_else(|| {
            Error::configuration(format!(
                "datasource `{}` has no query setting `{query}`",
                self.name
            ))
        })?;
        setting.mapper_for(method).cloned().ok_or_else(|| {
            Error::configuration(format!(
                "query `{}/{query}` has no mapper for method `{method}`",
                self.name
            ))
        })
    }

    /// Validated execution of the named query for this request.
    pub async fn execute(
        &self,
        query: &str,
        request: &Request,
        options: &ExecuteOptions,
    ) -> Result<Response> {
        self.mapper(query, &request.method)?
            .execute(self, request, options)
            .await
    }

    /// Resolves the session's connection for the mapper's connection setting,
    /// creating and caching one when absent or when `force` is set.
    ///
    /// Returns `Ok(None)` when the access policy denies this datasource for
    /// the request.
    pub async fn connection(
        &self,
        request: &Request,
        mapper: &Mapper,
        force: bool,
    ) -> Result<Option<Arc<dyn Connection>>> {
        if !self.policy.is_resource_allowed(&self.name, request) {
            tracing::warn!(
                datasource = self.name.as_str(),
                session_id = request.session_id.as_str(),
                "access denied"
            );
            return Ok(None);
        }

        let settings = self
            .connection_settings
            .get(mapper.connection_setting())
            .ok_or_else(|| {
                Error::configuration(format!(
                    "unknown connection setting `{}`",
                    mapper.connection_setting()
                ))
            })?;
        let factory = self.registry.get(&settings.driver).ok_or_else(|| {
            Error::configuration(format!("unknown driver `{}`", settings.driver))
        })?;

        let connection = self
            .sessions
            .get_or_create(
                &request.session_id,
                mapper.connection_setting(),
                force,
                async {
                    tracing::debug!(
                        datasource = self.name.as_str(),
                        session_id = request.session_id.as_str(),
                        setting = settings.name.as_str(),
                        "opening connection"
                    );
                    Ok(Arc::from(factory.create(settings).await?))
                },
            )
            .await?;

        Ok(Some(connection))
    }

    /// Ends a session, closing every connection it holds.
    pub async fn close_session(&self, session_id: &str) {
        self.sessions.close(session_id).await;
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.sessions
    }
}

impl std::fmt::Debug for Datasource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datasource")
            .field("name", &self.name)
            .field("environment", &self.environment)
            .field("connections", &self.connection_settings.keys().collect::<Vec<_>>())
            .field("queries", &self.query_settings.keys().collect::<Vec<_>>())
            .finish()
    }
}
