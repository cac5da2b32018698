use std::collections::BTreeMap;
use std::fmt;

use parityguard_core::{Error, PLACEHOLDER, Result, anonymize_literals};
use serde_json::Value;

/// Pure value transformation addressable by name from a mapping document.
pub trait Transform: Send + Sync {
    fn id(&self) -> &'static str;

    fn apply(&self, input: Value, params: Option<&Value>) -> Result<Value>;
}

/// Named transformations available to mapping documents.
pub struct TransformRegistry {
    transforms: BTreeMap<&'static str, Box<dyn Transform>>,
}

impl TransformRegistry {
    /// Empty registry without built-ins.
    pub fn empty() -> Self {
        Self {
            transforms: BTreeMap::new(),
        }
    }

    /// Registry preloaded with `direct`, `rate_per_second`, `anonymize` and
    /// `uppercase`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_transform(Box::new(DirectTransform));
        registry.register_transform(Box::new(RatePerSecondTransform));
        registry.register_transform(Box::new(AnonymizeTransform));
        registry.register_transform(Box::new(UppercaseTransform));
        registry
    }

    /// Register a transformation, replacing any previous one with the same id.
    pub fn register_transform(&mut self, transform: Box<dyn Transform>) {
        self.transforms.insert(transform.id(), transform);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.transforms.keys().copied()
    }

    pub fn apply(&self, name: &str, input: Value, params: Option<&Value>) -> Result<Value> {
        let transform = self
            .transforms
            .get(name)
            .ok_or_else(|| Error::Transform(format!("unknown transformation '{name}'")))?;
        transform.apply(input, params)
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.transforms.keys()).finish()
    }
}

struct DirectTransform;

impl Transform for DirectTransform {
    fn id(&self) -> &'static str {
        "direct"
    }

    fn apply(&self, input: Value, _params: Option<&Value>) -> Result<Value> {
        Ok(input)
    }
}

struct RatePerSecondTransform;

impl Transform for RatePerSecondTransform {
    fn id(&self) -> &'static str {
        "rate_per_second"
    }

    fn apply(&self, input: Value, params: Option<&Value>) -> Result<Value> {
        let interval = params
            .and_then(|params| params.get("interval"))
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::Transform("rate_per_second requires params.interval".to_string()))?;
        if interval <= 0.0 {
            return Err(Error::Transform(format!(
                "rate_per_second interval must be positive, got {interval}"
            )));
        }

        match input {
            Value::Null => Ok(Value::Null),
            other => {
                let value = other.as_f64().ok_or_else(|| {
                    Error::Transform(format!("rate_per_second expects a number, got {other}"))
                })?;
                Ok(Value::from(value / interval))
            }
        }
    }
}

struct AnonymizeTransform;

impl Transform for AnonymizeTransform {
    fn id(&self) -> &'static str {
        "anonymize"
    }

    fn apply(&self, input: Value, _params: Option<&Value>) -> Result<Value> {
        Ok(match input {
            Value::String(text) => Value::String(anonymize_literals(&text)),
            Value::Number(_) => Value::String(PLACEHOLDER.to_string()),
            other => other,
        })
    }
}

struct UppercaseTransform;

impl Transform for UppercaseTransform {
    fn id(&self) -> &'static str {
        "uppercase"
    }

    fn apply(&self, input: Value, _params: Option<&Value>) -> Result<Value> {
        Ok(match input {
            Value::String(text) => Value::String(text.to_uppercase()),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = TransformRegistry::with_builtins();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["anonymize", "direct", "rate_per_second", "uppercase"]);
    }

    #[test]
    fn rate_per_second_divides_by_interval() {
        let registry = TransformRegistry::with_builtins();
        let params = json!({ "interval": 60 });
        let value = registry
            .apply("rate_per_second", json!(120.0), Some(&params))
            .expect("rate");
        assert_eq!(value, json!(2.0));
    }

    #[test]
    fn rate_per_second_rejects_bad_interval() {
        let registry = TransformRegistry::with_builtins();
        assert!(registry.apply("rate_per_second", json!(1.0), None).is_err());
        let zero = json!({ "interval": 0 });
        assert!(registry.apply("rate_per_second", json!(1.0), Some(&zero)).is_err());
        let negative = json!({ "interval": -5 });
        assert!(registry.apply("rate_per_second", json!(1.0), Some(&negative)).is_err());
    }

    #[test]
    fn anonymize_is_idempotent() {
        let registry = TransformRegistry::with_builtins();
        let input = json!("SELECT * FROM orders WHERE id = 42 AND owner = 'alice'");
        let once = registry.apply("anonymize", input, None).expect("once");
        let twice = registry.apply("anonymize", once.clone(), None).expect("twice");
        assert_eq!(once, twice);
        let text = once.as_str().expect("string");
        assert!(!text.contains("42"));
        assert!(!text.contains("alice"));
        assert_eq!(registry.apply("anonymize", json!(17), None).expect("number"), json!("?"));
    }

    #[test]
    fn unknown_transform_is_an_error() {
        let registry = TransformRegistry::with_builtins();
        let err = registry.apply("reverse", json!("x"), None).unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
    }
}
