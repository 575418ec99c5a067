//! Validation and normalization of untyped parameter maps against descriptor
//! maps.
//!
//! [`format`] is a cross-cutting contract: security helpers validate
//! passwords and payloads through it, so the shape of [`Formatted`] — the
//! normalized value map plus an optional per-field, multi-cause error report
//! — must stay stable.

use crate::descriptor::Descriptor;
use crate::kind::{Kind, KindRegistry};
use crate::Result;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use std::sync::Arc;

/// Ordered map of descriptors, one per validated field.
pub type DescriptorMap = IndexMap<String, Descriptor>;

/// Per-field lists of violated constraint names, in evaluation order.
pub type FieldErrors = IndexMap<String, Vec<Cause>>;

/// A violated constraint. Serialized in camelCase so reports read
/// `["minLength", "pattern"]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Cause {
    Required,
    MinValue,
    MaxValue,
    MinLength,
    MaxLength,
    MinDecimalLength,
    MaxDecimalLength,
    Pattern,
    Format,
    Exists,
    NotExists,
}

impl Cause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cause::Required => "required",
            Cause::MinValue => "minValue",
            Cause::MaxValue => "maxValue",
            Cause::MinLength => "minLength",
            Cause::MaxLength => "maxLength",
            Cause::MinDecimalLength => "minDecimalLength",
            Cause::MaxDecimalLength => "maxDecimalLength",
            Cause::Pattern => "pattern",
            Cause::Format => "format",
            Cause::Exists => "exists",
            Cause::NotExists => "notExists",
        }
    }
}

impl std::fmt::Display for Cause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`format`]: the normalized values and, when any field violated
/// any constraint, the accumulated report. `errors == None` denotes full
/// success.
#[derive(Debug)]
pub struct Formatted {
    pub value: Map<String, Value>,
    pub errors: Option<FieldErrors>,
}

impl Formatted {
    pub fn is_ok(&self) -> bool {
        self.errors.is_none()
    }
}

/// `required` and default substitution treat these as absent.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Validates a raw parameter map with the default kind registry.
pub async fn format(source: &Map<String, Value>, descriptors: &DescriptorMap) -> Result<Formatted> {
    Validator::default().format(source, descriptors).await
}

/// Validator bound to a kind registry. The registry decides how each
/// descriptor's declared type resolves to constraint predicates.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    kinds: KindRegistry,
}

impl Validator {
    pub fn new(kinds: KindRegistry) -> Self {
        Self { kinds }
    }

    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    /// Validates and normalizes `source` against `descriptors`, field by
    /// field in map order. Constraints are evaluated independently: one field
    /// can accumulate several causes and validation never short-circuits on
    /// the first failure.
    pub async fn format(
        &self,
        source: &Map<String, Value>,
        descriptors: &DescriptorMap,
    ) -> Result<Formatted> {
        let mut value = Map::new();
        let mut errors = FieldErrors::default();

        for (field, descriptor) in descriptors {
            let mut causes = vec![];

            // 1. Extract the raw value.
            let mut raw = match &descriptor.source {
                Some(hook) => hook.fetch(source, field).await,
                None => source.get(field).cloned(),
            }
            .unwrap_or(Value::Null);

            // 2. Normalization replaces the raw value.
            if let Some(hook) = &descriptor.normalization {
                raw = hook.apply(raw).await?;
            }

            // 3. Default substitution for falsy values.
            if let Some(default) = &descriptor.default_value {
                if is_falsy(&raw) {
                    raw = default.clone();
                }
            }

            // 4. Required.
            if descriptor.required && is_falsy(&raw) {
                causes.push(Cause::Required);
            }

            // 5. Kind-backed coercion and constraint checks. Values the kind
            // cannot read stay verbatim for the constraints to reject.
            let kind = descriptor.kind.as_deref().and_then(|a| self.kinds.resolve(a));
            if let Some(kind) = kind {
                if !is_falsy(&raw) {
                    if let Some(canonical) = kind.parse(&raw) {
                        raw = canonical;
                    }
                }
            }
            self.check_constraints(descriptor, kind, &raw, &mut causes);

            // 6. Transform replaces the value.
            if let Some(hook) = &descriptor.transform {
                raw = hook.apply(raw).await?;
            }

            // 7. Membership.
            if let Some(membership) = &descriptor.exists {
                if !membership.contains(&raw).await? {
                    causes.push(Cause::Exists);
                }
            }
            if let Some(membership) = &descriptor.not_exists {
                if membership.contains(&raw).await? {
                    causes.push(Cause::NotExists);
                }
            }

            value.insert(field.clone(), raw);
            if !causes.is_empty() {
                errors.insert(field.clone(), causes);
            }
        }

        Ok(Formatted {
            value,
            errors: (!errors.is_empty()).then_some(errors),
        })
    }

    /// A declared constraint fails when the resolved kind's predicate returns
    /// false or is absent on the kind. An unresolvable kind alias downgrades
    /// every check to a permissive no-op.
    fn check_constraints(
        &self,
        descriptor: &Descriptor,
        kind: Option<&Arc<dyn Kind>>,
        value: &Value,
        causes: &mut Vec<Cause>,
    ) {
        let Some(kind) = kind else {
            return;
        };

        let mut check = |declared: bool, outcome: Option<bool>, cause: Cause| {
            if declared && outcome != Some(true) {
                causes.push(cause);
            }
        };

        check(
            descriptor.min_value.is_some(),
            descriptor.min_value.and_then(|l| kind.min_value(value, l)),
            Cause::MinValue,
        );
        check(
            descriptor.max_value.is_some(),
            descriptor.max_value.and_then(|l| kind.max_value(value, l)),
            Cause::MaxValue,
        );
        check(
            descriptor.min_length.is_some(),
            descriptor.min_length.and_then(|l| kind.min_length(value, l)),
            Cause::MinLength,
        );
        check(
            descriptor.max_length.is_some(),
            descriptor.max_length.and_then(|l| kind.max_length(value, l)),
            Cause::MaxLength,
        );
        check(
            descriptor.min_decimal_length.is_some(),
            descriptor
                .min_decimal_length
                .and_then(|l| kind.min_decimal_length(value, l)),
            Cause::MinDecimalLength,
        );
        check(
            descriptor.max_decimal_length.is_some(),
            descriptor
                .max_decimal_length
                .and_then(|l| kind.max_decimal_length(value, l)),
            Cause::MaxDecimalLength,
        );
        check(
            descriptor.pattern.is_some(),
            descriptor
                .pattern
                .as_ref()
                .and_then(|p| kind.pattern(value, p)),
            Cause::Pattern,
        );
        check(
            descriptor.format.is_some(),
            descriptor
                .format
                .as_deref()
                .and_then(|f| kind.format(value, f)),
            Cause::Format,
        );
    }
}
