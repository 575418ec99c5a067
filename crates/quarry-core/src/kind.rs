//! Validation kinds and the ordered alias registry that resolves a declared
//! type name to one of them.
//!
//! Each [`Kind`] is a family of constraint predicates (text, number, date).
//! Predicates return `Option<bool>`: `None` means the kind does not implement
//! that predicate, and a descriptor declaring it is recorded as a violation.

use regex::Regex;
use serde_json::Value;

use std::sync::Arc;

pub trait Kind: std::fmt::Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Coerce a raw value into the kind's canonical representation, when the
    /// kind knows how to read it.
    fn parse(&self, value: &Value) -> Option<Value>;

    fn min_length(&self, _value: &Value, _limit: u64) -> Option<bool> {
        None
    }

    fn max_length(&self, _value: &Value, _limit: u64) -> Option<bool> {
        None
    }

    fn min_value(&self, _value: &Value, _limit: f64) -> Option<bool> {
        None
    }

    fn max_value(&self, _value: &Value, _limit: f64) -> Option<bool> {
        None
    }

    fn min_decimal_length(&self, _value: &Value, _limit: u64) -> Option<bool> {
        None
    }

    fn max_decimal_length(&self, _value: &Value, _limit: u64) -> Option<bool> {
        None
    }

    fn pattern(&self, _value: &Value, _pattern: &Regex) -> Option<bool> {
        None
    }

    fn format(&self, _value: &Value, _format: &str) -> Option<bool> {
        None
    }
}

/// Anchored alias matcher for kind resolution. Matching is case-insensitive
/// on ASCII; there is deliberately no unanchored substring or regex form.
#[derive(Debug, Clone)]
pub enum Alias {
    Exact(&'static str),
    Prefix(&'static str),
}

impl Alias {
    pub fn matches(&self, alias: &str) -> bool {
        match self {
            Alias::Exact(name) => alias.eq_ignore_ascii_case(name),
            // Byte-wise compare: a str slice could split a multi-byte char.
            Alias::Prefix(prefix) => {
                alias.len() >= prefix.len()
                    && alias.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
            }
        }
    }
}

/// Ordered list of `(alias, kind)` entries. Resolution scans in declaration
/// order and the first matching alias wins, so order encodes priority. The
/// entries live in a `Vec`, never a map.
#[derive(Debug, Clone)]
pub struct KindRegistry {
    entries: Vec<(Alias, Arc<dyn Kind>)>,
}

impl KindRegistry {
    pub fn empty() -> Self {
        Self { entries: vec![] }
    }

    /// Appends an entry. Later registrations only apply to aliases no earlier
    /// entry matches.
    pub fn register(&mut self, alias: Alias, kind: Arc<dyn Kind>) -> &mut Self {
        self.entries.push((alias, kind));
        self
    }

    /// Returns the first kind whose alias matches, or `None`, in which case
    /// downstream constraint checks become permissive no-ops.
    pub fn resolve(&self, type_alias: &str) -> Option<&Arc<dyn Kind>> {
        self.entries
            .iter()
            .find(|(alias, _)| alias.matches(type_alias))
            .map(|(_, kind)| kind)
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        let text: Arc<dyn Kind> = Arc::new(TextKind);
        let number: Arc<dyn Kind> = Arc::new(NumberKind);
        let date: Arc<dyn Kind> = Arc::new(DateKind);

        let mut registry = Self::empty();
        registry
            .register(Alias::Prefix("text"), text.clone())
            .register(Alias::Exact("string"), text)
            .register(Alias::Prefix("num"), number.clone())
            .register(Alias::Exact("int"), number.clone())
            .register(Alias::Exact("integer"), number.clone())
            .register(Alias::Exact("float"), number.clone())
            .register(Alias::Exact("decimal"), number)
            .register(Alias::Prefix("date"), date.clone())
            .register(Alias::Prefix("time"), date);
        registry
    }
}

/// Renders a value the way it would appear as request text: strings verbatim,
/// everything else via JSON serialization.
pub(crate) fn lexical(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug)]
pub struct TextKind;

impl Kind for TextKind {
    fn name(&self) -> &'static str {
        "text"
    }

    fn parse(&self, value: &Value) -> Option<Value> {
        Some(Value::String(lexical(value)))
    }

    fn min_length(&self, value: &Value, limit: u64) -> Option<bool> {
        Some(lexical(value).chars().count() as u64 >= limit)
    }

    fn max_length(&self, value: &Value, limit: u64) -> Option<bool> {
        Some(lexical(value).chars().count() as u64 <= limit)
    }

    fn pattern(&self, value: &Value, pattern: &Regex) -> Option<bool> {
        Some(pattern.is_match(&lexical(value)))
    }
}

#[derive(Debug)]
pub struct NumberKind;

impl Kind for NumberKind {
    fn name(&self) -> &'static str {
        "number"
    }

    fn parse(&self, value: &Value) -> Option<Value> {
        serde_json::Number::from_f64(numeric(value)?).map(Value::Number)
    }

    fn min_value(&self, value: &Value, limit: f64) -> Option<bool> {
        Some(numeric(value).is_some_and(|n| n >= limit))
    }

    fn max_value(&self, value: &Value, limit: f64) -> Option<bool> {
        Some(numeric(value).is_some_and(|n| n <= limit))
    }

    fn min_decimal_length(&self, value: &Value, limit: u64) -> Option<bool> {
        Some(decimal_digits(value) >= limit)
    }

    fn max_decimal_length(&self, value: &Value, limit: u64) -> Option<bool> {
        Some(decimal_digits(value) <= limit)
    }

    fn pattern(&self, value: &Value, pattern: &Regex) -> Option<bool> {
        Some(pattern.is_match(&lexical(value)))
    }
}

/// Number of digits after the decimal separator in the lexical form.
fn decimal_digits(value: &Value) -> u64 {
    let text = lexical(value);
    match text.split_once('.') {
        Some((_, frac)) => frac.chars().take_while(|c| c.is_ascii_digit()).count() as u64,
        None => 0,
    }
}

#[derive(Debug)]
pub struct DateKind;

impl Kind for DateKind {
    fn name(&self) -> &'static str {
        "date"
    }

    fn parse(&self, value: &Value) -> Option<Value> {
        let text = lexical(value);
        let parsed = chrono::NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
            .map(|dt| dt.to_string())
            .or_else(|_| {
                chrono::NaiveDate::parse_from_str(&text, "%Y-%m-%d").map(|d| d.to_string())
            })
            .ok()?;
        Some(Value::String(parsed))
    }

    /// Checks that the value parses under the given chrono format string.
    fn format(&self, value: &Value, format: &str) -> Option<bool> {
        let text = lexical(value);
        let ok = chrono::NaiveDateTime::parse_from_str(&text, format).is_ok()
            || chrono::NaiveDate::parse_from_str(&text, format).is_ok()
            || chrono::NaiveTime::parse_from_str(&text, format).is_ok();
        Some(ok)
    }
}
