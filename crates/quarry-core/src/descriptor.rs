//! Declarative per-field validation and normalization rules.
//!
//! A [`Descriptor`] is immutable once defined and owned by the mapper that
//! declares it. The data-only constraints deserialize from mapper definition
//! files; the behavioral hooks attach in code.

use crate::{async_trait, Result};

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use std::sync::Arc;

/// Replaces a value during validation. May suspend (remote lookups,
/// encryption) which is why the hook is async.
#[async_trait]
pub trait ValueHook: Send + Sync {
    async fn apply(&self, value: Value) -> Result<Value>;
}

/// Extracts the raw value for a field from somewhere other than the parameter
/// map itself (headers, session state, ...).
#[async_trait]
pub trait SourceHook: Send + Sync {
    async fn fetch(&self, source: &Map<String, Value>, field: &str) -> Option<Value>;
}

/// Membership oracle backing the `exists` / `notExists` checks.
#[async_trait]
pub trait MembershipHook: Send + Sync {
    async fn contains(&self, value: &Value) -> Result<bool>;
}

/// Value list or callback used by `exists` / `notExists`.
#[derive(Clone)]
pub enum Membership {
    Values(Vec<Value>),
    Hook(Arc<dyn MembershipHook>),
}

impl Membership {
    pub async fn contains(&self, value: &Value) -> Result<bool> {
        match self {
            Membership::Values(values) => Ok(values.contains(value)),
            Membership::Hook(hook) => hook.contains(value).await,
        }
    }
}

impl std::fmt::Debug for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Membership::Values(values) => f.debug_tuple("Values").field(values).finish(),
            Membership::Hook(_) => f.write_str("Hook(..)"),
        }
    }
}

/// Adapts a plain closure into a [`ValueHook`].
pub fn value_hook<F>(f: F) -> Arc<dyn ValueHook>
where
    F: Fn(Value) -> Value + Send + Sync + 'static,
{
    struct FnHook<F>(F);

    #[async_trait]
    impl<F> ValueHook for FnHook<F>
    where
        F: Fn(Value) -> Value + Send + Sync,
    {
        async fn apply(&self, value: Value) -> Result<Value> {
            Ok((self.0)(value))
        }
    }

    Arc::new(FnHook(f))
}

/// Adapts a plain closure into a [`SourceHook`].
pub fn source_hook<F>(f: F) -> Arc<dyn SourceHook>
where
    F: Fn(&Map<String, Value>, &str) -> Option<Value> + Send + Sync + 'static,
{
    struct FnHook<F>(F);

    #[async_trait]
    impl<F> SourceHook for FnHook<F>
    where
        F: Fn(&Map<String, Value>, &str) -> Option<Value> + Send + Sync,
    {
        async fn fetch(&self, source: &Map<String, Value>, field: &str) -> Option<Value> {
            (self.0)(source, field)
        }
    }

    Arc::new(FnHook(f))
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Descriptor {
    /// Kind alias resolved against the registry (`text`, `number`, ...).
    /// `None` skips all kind-backed constraint checks.
    #[serde(rename = "type")]
    pub kind: Option<String>,

    pub required: bool,
    pub default_value: Option<Value>,

    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_decimal_length: Option<u64>,
    pub max_decimal_length: Option<u64>,
    #[serde(deserialize_with = "deserialize_regex")]
    pub pattern: Option<Regex>,
    pub format: Option<String>,

    #[serde(skip)]
    pub normalization: Option<Arc<dyn ValueHook>>,
    #[serde(skip)]
    pub transform: Option<Arc<dyn ValueHook>>,
    #[serde(skip)]
    pub source: Option<Arc<dyn SourceHook>>,
    #[serde(skip)]
    pub exists: Option<Membership>,
    #[serde(skip)]
    pub not_exists: Option<Membership>,
}

fn deserialize_regex<'de, D>(deserializer: D) -> std::result::Result<Option<Regex>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let pattern: Option<String> = Option::deserialize(deserializer)?;
    pattern
        .map(|p| Regex::new(&p).map_err(serde::de::Error::custom))
        .transpose()
}

impl Descriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Default::default()
        }
    }

    /// Descriptor with no kind; only `required`, defaults, hooks and
    /// membership checks apply.
    pub fn untyped() -> Self {
        Self::default()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn min_length(mut self, limit: u64) -> Self {
        self.min_length = Some(limit);
        self
    }

    pub fn max_length(mut self, limit: u64) -> Self {
        self.max_length = Some(limit);
        self
    }

    pub fn min_value(mut self, limit: f64) -> Self {
        self.min_value = Some(limit);
        self
    }

    pub fn max_value(mut self, limit: f64) -> Self {
        self.max_value = Some(limit);
        self
    }

    pub fn min_decimal_length(mut self, limit: u64) -> Self {
        self.min_decimal_length = Some(limit);
        self
    }

    pub fn max_decimal_length(mut self, limit: u64) -> Self {
        self.max_decimal_length = Some(limit);
        self
    }

    /// Panics on an invalid pattern; descriptors are declared at startup
    /// where an invalid regex is a programming defect.
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(Regex::new(pattern).unwrap_or_else(|err| {
            panic!("invalid descriptor pattern `{pattern}`: {err}");
        }));
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn normalization(mut self, hook: Arc<dyn ValueHook>) -> Self {
        self.normalization = Some(hook);
        self
    }

    pub fn transform(mut self, hook: Arc<dyn ValueHook>) -> Self {
        self.transform = Some(hook);
        self
    }

    pub fn source(mut self, hook: Arc<dyn SourceHook>) -> Self {
        self.source = Some(hook);
        self
    }

    pub fn exists(mut self, membership: Membership) -> Self {
        self.exists = Some(membership);
        self
    }

    pub fn not_exists(mut self, membership: Membership) -> Self {
        self.not_exists = Some(membership);
        self
    }
}

impl Clone for Descriptor {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            required: self.required,
            default_value: self.default_value.clone(),
            min_length: self.min_length,
            max_length: self.max_length,
            min_value: self.min_value,
            max_value: self.max_value,
            min_decimal_length: self.min_decimal_length,
            max_decimal_length: self.max_decimal_length,
            pattern: self.pattern.clone(),
            format: self.format.clone(),
            normalization: self.normalization.clone(),
            transform: self.transform.clone(),
            source: self.source.clone(),
            exists: self.exists.clone(),
            not_exists: self.not_exists.clone(),
        }
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("default_value", &self.default_value)
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("min_value", &self.min_value)
            .field("max_value", &self.max_value)
            .field("min_decimal_length", &self.min_decimal_length)
            .field("max_decimal_length", &self.max_decimal_length)
            .field("pattern", &self.pattern.as_ref().map(|p| p.as_str()))
            .field("format", &self.format)
            .field("normalization", &self.normalization.is_some())
            .field("transform", &self.transform.is_some())
            .field("source", &self.source.is_some())
            .field("exists", &self.exists)
            .field("not_exists", &self.not_exists)
            .finish()
    }
}
