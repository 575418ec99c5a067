use crate::validate::FieldErrors;

use std::sync::Arc;

/// An error that can occur in Quarry.
///
/// Recoverable, request-scoped failures (validation, execution) are always
/// returned as values from the async operations that produced them. Only
/// setup-time defects surface as [`Configuration`](Error::is_configuration)
/// errors at discovery or registration time.
#[derive(Clone)]
pub struct Error {
    inner: Arc<ErrorKind>,
}

#[derive(Debug)]
enum ErrorKind {
    /// Per-field, multi-cause validation failure. The query is never issued.
    Validation(ValidationError),

    /// The access policy denied the datasource for the request.
    ConnectionDenied(ConnectionDeniedError),

    /// Failure managing the connection pool.
    ConnectionPool(BoxedError),

    /// Driver-level connect or I/O failure.
    Driver(BoxedError),

    /// Query execution failure. Triggers rollback on transactional calls.
    Execution(ExecutionError),

    /// Programming or deployment defect detected at discovery or dispatch
    /// time: malformed command literal, missing query file, unknown driver.
    Configuration(String),

    Other(anyhow::Error),
}

/// Per-field cause lists for a failed validation, plus the location of the
/// mapper that rejected the request.
#[derive(Debug)]
pub struct ValidationError {
    pub fields: FieldErrors,
    pub datasource: Option<String>,
    pub query: Option<String>,
    pub mapper: Option<String>,
}

#[derive(Debug)]
struct ConnectionDeniedError {
    resource: String,
}

#[derive(Debug)]
struct ExecutionError {
    message: String,
    source: Option<BoxedError>,
}

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

impl Error {
    pub fn validation(fields: FieldErrors) -> Error {
        Error::from(ErrorKind::Validation(ValidationError {
            fields,
            datasource: None,
            query: None,
            mapper: None,
        }))
    }

    /// Attaches datasource/query/mapper names to a validation error. No-op
    /// for every other kind.
    pub fn in_query_context(self, datasource: &str, query: &str, mapper: &str) -> Error {
        match Arc::try_unwrap(self.inner) {
            Ok(ErrorKind::Validation(mut err)) => {
                err.datasource = Some(datasource.to_string());
                err.query = Some(query.to_string());
                err.mapper = Some(mapper.to_string());
                Error::from(ErrorKind::Validation(err))
            }
            Ok(kind) => Error::from(kind),
            Err(inner) => Error { inner },
        }
    }

    pub fn connection_denied(resource: impl Into<String>) -> Error {
        Error::from(ErrorKind::ConnectionDenied(ConnectionDeniedError {
            resource: resource.into(),
        }))
    }

    pub fn connection_pool(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::from(ErrorKind::ConnectionPool(Box::new(err)))
    }

    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::from(ErrorKind::Driver(Box::new(err)))
    }

    pub fn execution(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::from(ErrorKind::Execution(ExecutionError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }))
    }

    pub fn execution_msg(message: impl Into<String>) -> Error {
        Error::from(ErrorKind::Execution(ExecutionError {
            message: message.into(),
            source: None,
        }))
    }

    pub fn configuration(message: impl Into<String>) -> Error {
        Error::from(ErrorKind::Configuration(message.into()))
    }

    pub fn is_validation(&self) -> bool {
        matches!(&*self.inner, ErrorKind::Validation(_))
    }

    pub fn is_execution(&self) -> bool {
        matches!(&*self.inner, ErrorKind::Execution(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(&*self.inner, ErrorKind::Configuration(_))
    }

    pub fn is_connection_denied(&self) -> bool {
        matches!(&*self.inner, ErrorKind::ConnectionDenied(_))
    }

    /// The per-field cause report, when this is a validation error.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match &*self.inner {
            ErrorKind::Validation(err) => Some(&err.fields),
            _ => None,
        }
    }

    pub fn validation_details(&self) -> Option<&ValidationError> {
        match &*self.inner {
            ErrorKind::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Arc::new(kind),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        Error::from(ErrorKind::Other(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::configuration(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::configuration(err.to_string())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &*self.inner {
            ErrorKind::ConnectionPool(err) | ErrorKind::Driver(err) => Some(err.as_ref()),
            ErrorKind::Execution(err) => err.source.as_ref().map(|err| err.as_ref() as _),
            ErrorKind::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        core::fmt::Display::fmt(&*self.inner, f)
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if f.alternate() {
            f.debug_struct("Error").field("kind", &self.inner).finish()
        } else {
            core::fmt::Display::fmt(self, f)
        }
    }
}

impl core::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "validation failed")?;
        if let (Some(datasource), Some(query)) = (&self.datasource, &self.query) {
            write!(f, " for {datasource}/{query}")?;
            if let Some(mapper) = &self.mapper {
                write!(f, " ({mapper})")?;
            }
        }
        let mut first = true;
        for (field, causes) in &self.fields {
            f.write_str(if first { ": " } else { "; " })?;
            first = false;
            write!(f, "{field}=[")?;
            for (index, cause) in causes.iter().enumerate() {
                if index > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{cause}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            ErrorKind::Validation(err) => core::fmt::Display::fmt(err, f),
            ErrorKind::ConnectionDenied(err) => {
                write!(f, "access denied for resource `{}`", err.resource)
            }
            ErrorKind::ConnectionPool(err) => write!(f, "connection pool error: {err}"),
            ErrorKind::Driver(err) => write!(f, "driver error: {err}"),
            ErrorKind::Execution(err) => write!(f, "execution failed: {}", err.message),
            ErrorKind::Configuration(message) => write!(f, "configuration error: {message}"),
            ErrorKind::Other(err) => core::fmt::Display::fmt(err, f),
        }
    }
}
