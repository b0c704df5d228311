//! Per-extension translation and configuration maps.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key to format-string map used for every message an extension shows.
///
/// Format strings use positional placeholders: `"Hello {0}, you have {1} coins"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Translations(BTreeMap<String, String>);

impl Translations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, format: impl Into<String>) -> Self {
        self.0.insert(key.into(), format.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, format: impl Into<String>) {
        self.0.insert(key.into(), format.into());
    }

    /// Formats `key` with `args`. An unknown key comes back unchanged so a
    /// missing translation is visible rather than silent.
    pub fn translate(&self, key: &str, args: &[&str]) -> String {
        match self.get(key) {
            Some(format) => format_positional(format, args),
            None => key.to_string(),
        }
    }

    /// Adds every key of `defaults` this map lacks. Returns whether anything
    /// was added.
    pub fn merge_missing(&mut self, defaults: &Translations) -> bool {
        merge_missing(&mut self.0, &defaults.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// Key to JSON value map holding an extension's tunable settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(BTreeMap<String, Value>);

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Reads a value as `T`, `None` when missing or of the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn merge_missing(&mut self, defaults: &Configuration) -> bool {
        merge_missing(&mut self.0, &defaults.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn merge_missing<V: Clone>(target: &mut BTreeMap<String, V>, defaults: &BTreeMap<String, V>) -> bool {
    let mut changed = false;
    for (key, value) in defaults {
        if !target.contains_key(key) {
            target.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

/// Replaces `{0}`, `{1}`, ... with the matching argument. Placeholders
/// without an argument, and anything else in braces, are left as written.
pub fn format_positional(format: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            let arg = args.get(index)?;
            Some((arg, close))
        });
        match replaced {
            Some((arg, close)) => {
                out.push_str(arg);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_translate() {
        let translations = Translations::new()
            .with("greet", "Hello {0}, welcome to {1}!")
            .with("twice", "{0} and {0}");

        assert_eq!(
            translations.translate("greet", &["Ann", "Bulwark"]),
            "Hello Ann, welcome to Bulwark!"
        );
        assert_eq!(translations.translate("twice", &["x"]), "x and x");
        assert_eq!(translations.translate("missing_key", &["x"]), "missing_key");
    }

    #[test]
    fn test_format_leaves_unknown_placeholders() {
        assert_eq!(format_positional("{0} {1} {name} {", &["a"]), "a {1} {name} {");
        assert_eq!(format_positional("no braces", &[]), "no braces");
    }

    #[test]
    fn test_merge_missing_keeps_operator_values() {
        let mut stored = Configuration::new().with("MaxGreetings", 10);
        let defaults = Configuration::new()
            .with("MaxGreetings", 3)
            .with("Enabled", true);

        assert!(stored.merge_missing(&defaults));
        assert_eq!(stored.get::<u32>("MaxGreetings"), Some(10));
        assert_eq!(stored.get::<bool>("Enabled"), Some(true));
        assert!(!stored.merge_missing(&defaults));
    }

    #[test]
    fn test_serialized_as_plain_object() {
        let translations = Translations::new().with("a", "b");
        assert_eq!(serde_json::to_value(&translations).unwrap(), json!({ "a": "b" }));

        let config: Configuration = serde_json::from_value(json!({ "Limit": 5 })).unwrap();
        assert_eq!(config.get::<i64>("Limit"), Some(5));
        assert_eq!(config.get::<String>("Limit"), None);
    }
}
