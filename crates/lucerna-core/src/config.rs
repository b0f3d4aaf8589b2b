// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hierarchical key-value configuration.
//!
//! A [`Properties`] set maps dotted names (`bake.maps.lm0.width`) to lists of
//! string values. Names keep their insertion order, which matters for repeating
//! groups such as `bake.maps.*` where the order of definition is meaningful.
//!
//! The typed getters take the default to use when a key is absent. A key that is
//! present but cannot be interpreted is always a [`ConfigError::Malformed`]: a
//! malformed value never silently falls back to the default.

use crate::error::ConfigError;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A single named property with its list of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    name: String,
    values: Vec<String>,
}

impl Property {
    /// Creates a property with the given values.
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// The dotted property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All values, in the order they were written.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// The first value, if any.
    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// An ordered set of [`Property`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    order: Vec<String>,
    props: HashMap<String, Property>,
}

impl Properties {
    /// Creates an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a property file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    /// Sets (or replaces) a property. A replaced property keeps its original position.
    pub fn set(&mut self, property: Property) -> &mut Self {
        if !self.props.contains_key(&property.name) {
            self.order.push(property.name.clone());
        }
        self.props.insert(property.name.clone(), property);
        self
    }

    /// Builder-style variant of [`Properties::set`] for a single value.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(Property::new(name, [value.into()]));
        self
    }

    /// Builder-style variant of [`Properties::set`] for a list of values.
    pub fn with_values<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(Property::new(name, values));
        self
    }

    /// Copies every property of `other` into `self`, `other` winning on conflicts.
    pub fn merge(&mut self, other: &Properties) -> &mut Self {
        for name in &other.order {
            if let Some(prop) = other.props.get(name) {
                self.set(prop.clone());
            }
        }
        self
    }

    /// Returns the property with the given name.
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.props.get(name)
    }

    /// Whether the property is defined.
    pub fn is_defined(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Property names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Property names starting with `prefix.`, in insertion order.
    pub fn names_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.names().filter(move |name| {
            name.len() > prefix.len()
                && name.starts_with(prefix)
                && name.as_bytes()[prefix.len()] == b'.'
        })
    }

    /// Returns the distinct names one level below `prefix`, in order of first appearance.
    ///
    /// With `bake.maps.a.type`, `bake.maps.a.width` and `bake.maps.b.type` defined,
    /// `unique_sub_names("bake.maps")` yields `["bake.maps.a", "bake.maps.b"]`.
    pub fn unique_sub_names(&self, prefix: &str) -> Vec<String> {
        let depth = prefix.split('.').count();
        let mut result: Vec<String> = Vec::new();
        for name in self.names_with_prefix(prefix) {
            let sub: Vec<&str> = name.split('.').take(depth + 1).collect();
            let sub = sub.join(".");
            if !result.contains(&sub) {
                result.push(sub);
            }
        }
        result
    }

    /// Returns the `index`-th dotted field of `name`, or an empty string.
    pub fn extract_field(name: &str, index: usize) -> &str {
        name.split('.').nth(index).unwrap_or("")
    }

    /// Reads a string property.
    pub fn get_string(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        match self.get(key) {
            None => Ok(default.to_string()),
            Some(prop) => prop.first().map(str::to_string).ok_or(ConfigError::Malformed {
                key: key.to_string(),
                value: String::new(),
                expected: "a string",
            }),
        }
    }

    /// Reads a list-of-strings property.
    pub fn get_strings(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.get(key) {
            None => default.iter().map(|s| s.to_string()).collect(),
            Some(prop) => prop.values().to_vec(),
        }
    }

    /// Reads a boolean property (`true`/`false`/`1`/`0`).
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.single_value(key, "a boolean")? else {
            return Ok(default);
        };
        match value.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ConfigError::Malformed {
                key: key.to_string(),
                value: value.to_string(),
                expected: "a boolean",
            }),
        }
    }

    /// Reads an unsigned 32-bit property.
    pub fn get_u32(&self, key: &str, default: u32) -> Result<u32, ConfigError> {
        self.get_parsed(key, default, "an unsigned integer")
    }

    /// Reads a signed 32-bit property.
    pub fn get_i32(&self, key: &str, default: i32) -> Result<i32, ConfigError> {
        self.get_parsed(key, default, "an integer")
    }

    /// Reads an unsigned 64-bit property.
    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        self.get_parsed(key, default, "an unsigned integer")
    }

    /// Reads a floating-point property.
    pub fn get_f32(&self, key: &str, default: f32) -> Result<f32, ConfigError> {
        self.get_parsed(key, default, "a number")
    }

    fn get_parsed<T: FromStr>(
        &self,
        key: &str,
        default: T,
        expected: &'static str,
    ) -> Result<T, ConfigError> {
        let Some(value) = self.single_value(key, expected)? else {
            return Ok(default);
        };
        value.parse().map_err(|_| ConfigError::Malformed {
            key: key.to_string(),
            value: value.to_string(),
            expected,
        })
    }

    fn single_value(&self, key: &str, expected: &'static str) -> Result<Option<&str>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(prop) if prop.values().len() == 1 => Ok(prop.first()),
            Some(prop) => Err(ConfigError::Malformed {
                key: key.to_string(),
                value: prop.values().join(" "),
                expected,
            }),
        }
    }
}

impl FromStr for Properties {
    type Err = ConfigError;

    /// Parses the `name = value1 "value 2"` text format. `#` starts a comment.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut props = Properties::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let syntax_error = || ConfigError::Syntax {
                line: index + 1,
                text: raw.to_string(),
            };
            let (name, values) = line.split_once('=').ok_or_else(syntax_error)?;
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(syntax_error());
            }
            let values = tokenize(values).ok_or_else(syntax_error)?;
            props.set(Property::new(name, values));
        }
        Ok(props)
    }
}

/// Splits a value list on whitespace, honouring double quotes. `None` on an unclosed quote.
fn tokenize(text: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = text.trim().chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => token.push(ch),
                    None => return None,
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Some(tokens)
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in &self.order {
            let Some(prop) = self.props.get(name) else {
                continue;
            };
            write!(f, "{name} =")?;
            for value in prop.values() {
                if value.is_empty() || value.contains(char::is_whitespace) {
                    write!(f, " \"{value}\"")?;
                } else {
                    write!(f, " {value}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_format() {
        let text = r#"
            # a comment
            renderengine.type = BAKECPU
            bake.maps.lm0.objectnames = "Suzanne Head" Floor
            film.width = 320
        "#;
        let props: Properties = text.parse().unwrap();

        assert_eq!(props.len(), 3);
        assert_eq!(props.get_string("renderengine.type", "PATHCPU").unwrap(), "BAKECPU");
        assert_eq!(
            props.get_strings("bake.maps.lm0.objectnames", &[]),
            vec!["Suzanne Head".to_string(), "Floor".to_string()]
        );
        assert_eq!(props.get_u32("film.width", 640).unwrap(), 320);
    }

    #[test]
    fn test_parse_rejects_missing_equal_sign() {
        let err = "film.width 320".parse::<Properties>().unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_unclosed_quote() {
        let err = "a.b = \"open".parse::<Properties>().unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { .. }));
    }

    #[test]
    fn test_absent_key_uses_default() {
        let props = Properties::new();
        assert_eq!(props.get_u32("film.width", 640).unwrap(), 640);
        assert!(!props.get_bool("film.gpu.enable", false).unwrap());
        assert_eq!(props.get_strings("x.y", &["a", "b"]), vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let props = Properties::new().with("film.width", "wide");
        let err = props.get_u32("film.width", 640).unwrap_err();
        match err {
            ConfigError::Malformed { key, value, .. } => {
                assert_eq!(key, "film.width");
                assert_eq!(value, "wide");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_multiple_values_for_scalar_is_malformed() {
        let props = Properties::new().with_values("film.width", ["1", "2"]);
        assert!(props.get_u32("film.width", 640).is_err());
    }

    #[test]
    fn test_unique_sub_names_keeps_first_appearance_order() {
        let props = Properties::new()
            .with("bake.maps.b.type", "LIGHTMAP")
            .with("bake.maps.a.type", "LIGHTMAP")
            .with("bake.maps.b.width", "64")
            .with("bake.mapsx.c", "1");

        assert_eq!(
            props.unique_sub_names("bake.maps"),
            vec!["bake.maps.b".to_string(), "bake.maps.a".to_string()]
        );
        assert_eq!(Properties::extract_field("bake.maps.b", 2), "b");
        assert_eq!(Properties::extract_field("bake.maps", 2), "");
    }

    #[test]
    fn test_merge_overrides_and_keeps_position() {
        let mut base = Properties::new().with("a", "1").with("b", "2");
        let over = Properties::new().with("a", "3").with("c", "4");
        base.merge(&over);

        assert_eq!(base.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(base.get_string("a", "").unwrap(), "3");
    }

    #[test]
    fn test_display_round_trip() {
        let props = Properties::new()
            .with("film.width", "320")
            .with_values("bake.maps.lm0.objectnames", ["Suzanne Head", "Floor"]);
        let reparsed: Properties = props.to_string().parse().unwrap();
        assert_eq!(reparsed, props);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.cfg");
        std::fs::write(&path, "renderengine.type = BAKECPU\nnative.threads.count = 2\n").unwrap();

        let props = Properties::load(&path).unwrap();
        assert_eq!(props.get_u32("native.threads.count", 1).unwrap(), 2);

        let missing = Properties::load(dir.path().join("missing.cfg")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
