//! Remote driver over HTTP.
//!
//! The connection is a stateless wrapper holding a base URL and optional
//! credentials; every command carries its own method and path. Transaction
//! methods are the inherited no-ops: there is nothing to bracket on a remote
//! call.

use quarry_core::{
    async_trait,
    driver::{Command, Connection, ConnectionSettings, DriverFactory, HttpMethod, Response},
    Error, Result,
};

use serde_json::Value;
use url::Url;

use std::time::Instant;

#[derive(Debug)]
pub struct HttpConnection {
    base: Url,
    client: reqwest::Client,
    credentials: Option<(String, Option<String>)>,
}

impl HttpConnection {
    pub fn new(base: impl AsRef<str>) -> Result<Self> {
        let base = Url::parse(base.as_ref())
            .map_err(|err| Error::configuration(format!("invalid base url: {err}")))?;
        Ok(Self {
            base,
            client: reqwest::Client::new(),
            credentials: None,
        })
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Some((username.into(), password));
        self
    }
}

fn method_for(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn execute(&self, command: &Command, params: &[Value]) -> Result<Response> {
        let Command::Http(command) = command else {
            return Err(Error::configuration(
                "http connection cannot execute a SQL command",
            ));
        };

        let path = command.resolve_url(params)?;
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|err| Error::configuration(format!("invalid request url `{path}`: {err}")))?;

        let started = Instant::now();
        let mut request = self.client.request(method_for(command.method), url.clone());
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, password.as_deref());
        }

        let response = request.send().await.map_err(Error::execution)?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%url, %status, "remote call failed");
            return Err(Error::execution_msg(format!(
                "remote call to {url} returned {status}"
            )));
        }

        let body = response.text().await.map_err(Error::execution)?;
        let rows = match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(items)) => items,
            Ok(single) => vec![single],
            // Non-JSON bodies come back as one opaque row.
            Err(_) => vec![Value::String(body)],
        };

        Ok(Response::values(rows).timed(started))
    }
}

/// Factory registered under the `http` driver name. The connection setting's
/// `url` is the remote base; `username`/`password` become basic auth.
#[derive(Debug, Default)]
pub struct HttpFactory;

impl HttpFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DriverFactory for HttpFactory {
    fn driver_name(&self) -> &'static str {
        "http"
    }

    async fn create(&self, settings: &ConnectionSettings) -> Result<Box<dyn Connection>> {
        let mut connection = HttpConnection::new(&settings.url)?;
        if let Some(username) = &settings.username {
            connection = connection.with_credentials(username, settings.password.clone());
        }
        Ok(Box::new(connection))
    }
}
