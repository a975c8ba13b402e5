//! A small typed query algebra over JSON records.
//!
//! Filters match the JSON projection of a record. Field names are dotted
//! paths (`metadata.owner`). When a path lands on an array, a scalar filter
//! matches if any element matches, so `Filter::eq("tags", "network")` finds
//! rules tagged `network`.

use core::cmp::Ordering;

use serde_json::Value;

/// A predicate over a JSON record.
#[derive(Debug, Clone)]
pub enum Filter {
    /// The field equals the value.
    Eq(String, Value),
    /// The field equals one of the values.
    In(String, Vec<Value>),
    /// The field is greater than or equal to the value. Numbers compare
    /// numerically, strings lexicographically; mixed types never match.
    Gte(String, Value),
    /// The field is a string matching the pattern.
    Regex(String, regex::Regex),
    /// Every inner filter matches. An empty conjunction matches everything.
    And(Vec<Filter>),
}

impl Filter {
    /// Creates an [`Eq`](Self::Eq) filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// Creates an [`In`](Self::In) filter.
    pub fn one_of<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// Creates a [`Gte`](Self::Gte) filter.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte(field.into(), value.into())
    }

    /// Creates a [`Regex`](Self::Regex) filter.
    ///
    /// # Errors
    ///
    /// Returns the compile error if `pattern` is not a valid regex.
    pub fn regex(field: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(field.into(), regex::Regex::new(pattern)?))
    }

    /// Creates an [`And`](Self::And) filter.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    /// Evaluates the filter against `record`.
    #[must_use]
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Self::Eq(field, expected) => any_scalar(record, field, |v| v == expected),
            Self::In(field, expected) => any_scalar(record, field, |v| expected.contains(v)),
            Self::Gte(field, bound) => any_scalar(record, field, |v| {
                matches!(compare(v, bound), Some(Ordering::Greater | Ordering::Equal))
            }),
            Self::Regex(field, pattern) => {
                any_scalar(record, field, |v| v.as_str().is_some_and(|s| pattern.is_match(s)))
            }
            Self::And(filters) => filters.iter().all(|f| f.matches(record)),
        }
    }
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(record, |value, segment| value.get(segment))
}

fn any_scalar(record: &Value, path: &str, predicate: impl Fn(&Value) -> bool) -> bool {
    match lookup(record, path) {
        None => false,
        Some(value) if predicate(value) => true,
        Some(Value::Array(items)) => items.iter().any(predicate),
        Some(_) => false,
    }
}

fn compare(value: &Value, bound: &Value) -> Option<Ordering> {
    match (value, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "name": "ip-allowlist",
            "type": 4,
            "tags": ["network", "security"],
            "metadata": {"owner": "netops", "priority": 7}
        })
    }

    #[test]
    fn eq_on_nested_and_array_fields() {
        assert!(Filter::eq("metadata.owner", "netops").matches(&record()));
        assert!(Filter::eq("tags", "security").matches(&record()));
        assert!(!Filter::eq("tags", "billing").matches(&record()));
        assert!(!Filter::eq("metadata.missing", "x").matches(&record()));
    }

    #[test]
    fn in_and_gte() {
        assert!(Filter::one_of("type", [2, 4]).matches(&record()));
        assert!(!Filter::one_of("type", [1, 3]).matches(&record()));
        assert!(Filter::gte("metadata.priority", 7).matches(&record()));
        assert!(!Filter::gte("metadata.priority", 7.5).matches(&record()));
        assert!(!Filter::gte("name", 1).matches(&record()));
    }

    #[test]
    fn regex_and_conjunction() {
        let filter = Filter::and([
            Filter::regex("name", "^ip-").unwrap(),
            Filter::eq("type", 4),
        ]);
        assert!(filter.matches(&record()));
        assert!(Filter::and([]).matches(&record()));
        assert!(Filter::regex("name", "(").is_err());
    }
}
