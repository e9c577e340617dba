use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{fmt, str::FromStr};

///
/// FieldPath
///
/// Logical, dotted path into a document (`address.city`, `tags.0`).
/// Numeric segments address list elements.
///

#[derive(
    Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(from = "String", into = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// The empty path, addressing the document root.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Extend this path by one segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());

        Self(segments)
    }

    /// True when `self` is a strict ancestor of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }

    /// Resolve this path against a wire (JSON) document.
    #[must_use]
    pub fn resolve<'a>(&self, doc: &'a JsonValue) -> Option<&'a JsonValue> {
        let mut current = doc;
        for segment in &self.0 {
            current = match current {
                JsonValue::Object(map) => map.get(segment)?,
                JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Set a value on a wire (JSON) document, creating intermediate objects.
    ///
    /// Returns `false` when an intermediate segment exists and is not an
    /// object.
    pub fn assign(&self, doc: &mut JsonValue, value: JsonValue) -> bool {
        let Some((last, parents)) = self.0.split_last() else {
            *doc = value;
            return true;
        };

        let mut current = doc;
        for segment in parents {
            let JsonValue::Object(map) = current else {
                return false;
            };
            current = map
                .entry(segment.clone())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
        }

        match current {
            JsonValue::Object(map) => {
                map.insert(last.clone(), value);
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for FieldPath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for FieldPath {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

///
/// TESTS
///
