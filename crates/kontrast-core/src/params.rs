// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Flat key -> value parameter bag handed in by callers.
//
// The bag is deliberately loose: values are coerced on read and typed
// settings structs decide what to do with anything out of range. Reading a
// bag never fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view of the value. Booleans map to 0/1, text is parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Number(_) => None,
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    /// Boolean view of the value. Non-zero numbers are true; text accepts
    /// the usual spellings.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) => Some(*n != 0.0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Flat mapping of named options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterBag(BTreeMap<String, ParamValue>);

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Numeric value for `key`, if present and coercible.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ParamValue::as_number)
    }

    /// Boolean value for `key`, if present and coercible.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ParamValue::as_flag)
    }

    /// Text value for `key`. Numbers and booleans are rendered.
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).map(ToString::to_string)
    }
}

impl FromIterator<(String, ParamValue)> for ParameterBag {
    fn from_iter<T: IntoIterator<Item = (String, ParamValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_values_keep_their_kind() {
        let bag: ParameterBag =
            serde_json::from_str(r#"{ "alpha": 1.5, "denoise": false, "pattern": "cross" }"#)
                .expect("parse");
        assert_eq!(bag.get("alpha"), Some(&ParamValue::Number(1.5)));
        assert_eq!(bag.get("denoise"), Some(&ParamValue::Bool(false)));
        assert_eq!(bag.text("pattern").as_deref(), Some("cross"));
    }

    #[test]
    fn loose_coercion() {
        let bag = ParameterBag::new()
            .with("window_size", "21")
            .with("sharpen", 0.0)
            .with("apply_clahe", "yes")
            .with("bogus", "not-a-number");

        assert_eq!(bag.number("window_size"), Some(21.0));
        assert_eq!(bag.flag("sharpen"), Some(false));
        assert_eq!(bag.flag("apply_clahe"), Some(true));
        assert_eq!(bag.number("bogus"), None);
        assert_eq!(bag.number("missing"), None);
    }

    #[test]
    fn non_finite_numbers_are_ignored() {
        let bag = ParameterBag::new().with("alpha", f64::NAN);
        assert_eq!(bag.number("alpha"), None);
    }
}
