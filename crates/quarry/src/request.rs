use serde_json::{Map, Value};

/// An inbound request routed to a mapper. The session id is caller-supplied
/// and scopes connection reuse.
#[derive(Debug, Clone)]
pub struct Request {
    pub session_id: String,
    pub method: String,
    pub parameters: Map<String, Value>,
}

impl Request {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            method: "get".to_string(),
            parameters: Map::new(),
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Clone of this request carrying validated parameters in place of the
    /// raw ones.
    pub(crate) fn with_parameters(&self, parameters: Map<String, Value>) -> Self {
        Self {
            session_id: self.session_id.clone(),
            method: self.method.clone(),
            parameters,
        }
    }
}
