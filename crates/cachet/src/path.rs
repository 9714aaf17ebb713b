//! Document paths and their wire form.
//!
//! A path is an ordered list of field names and array indices. On the wire to
//! the remote JSON backend it is written as `field.field[idx]`, with `.` as the
//! root sentinel.

use crate::error::{CacheError, CacheResult};
use serde_json::Value;
use std::fmt;

/// Literal the remote backend uses for "the whole document".
pub const ROOT_SENTINEL: &str = ".";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl PathSegment {
    /// True for indices and for field names made only of ASCII digits.
    ///
    /// Decides whether a missing container created on write is a list or a map.
    pub fn looks_like_index(&self) -> bool {
        match self {
            PathSegment::Index(_) => true,
            PathSegment::Field(name) => !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()),
        }
    }

    /// Position to use when this segment addresses a list element.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(i) => Some(*i),
            PathSegment::Field(name) if self.looks_like_index() => name.parse().ok(),
            PathSegment::Field(_) => None,
        }
    }

    /// Key to use when this segment addresses a map entry.
    pub fn as_key(&self) -> String {
        match self {
            PathSegment::Field(name) => name.clone(),
            PathSegment::Index(i) => i.to_string(),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(name.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(name: String) -> Self {
        PathSegment::Field(name)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Normalized address inside a document. The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathSegment>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a path from JSON segments: strings become field names and
    /// non-negative integers become indices.
    pub fn from_values(values: &[Value]) -> CacheResult<Self> {
        let mut segments = Vec::with_capacity(values.len());
        for value in values {
            let segment = match value {
                Value::String(s) => PathSegment::Field(s.clone()),
                Value::Number(n) => match n.as_u64().and_then(|i| usize::try_from(i).ok()) {
                    Some(i) => PathSegment::Index(i),
                    None => {
                        return Err(CacheError::BadRequest(format!(
                            "invalid path index: {n}"
                        )))
                    }
                },
                other => {
                    return Err(CacheError::BadRequest(format!(
                        "invalid path segment: {other}"
                    )))
                }
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    /// Parse the wire form. Accepts `.`, `$`, `$.a.b`, `a.b[0]` and `items[0][1]`.
    pub fn parse(wire: &str) -> CacheResult<Self> {
        let trimmed = wire.trim_start_matches('$').trim_start_matches('.');
        let mut segments = Vec::new();

        for part in trimmed.split('.') {
            if part.is_empty() {
                continue;
            }

            let (field, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if !field.is_empty() {
                segments.push(PathSegment::Field(field.to_string()));
            }

            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .ok_or_else(|| CacheError::BadRequest(format!("unterminated index in path '{wire}'")))?;
                let index: usize = rest[1..close]
                    .parse()
                    .map_err(|_| CacheError::BadRequest(format!("invalid index in path '{wire}'")))?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(CacheError::BadRequest(format!("invalid path '{wire}'")));
                }
            }
        }

        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Parent path and the final segment, or `None` for the root.
    pub fn split_last(&self) -> Option<(JsonPath, &PathSegment)> {
        let (last, parent) = self.segments.split_last()?;
        Some((
            JsonPath {
                segments: parent.to_vec(),
            },
            last,
        ))
    }

    /// Serialize to `seg1.seg2[idx]`, or `.` for the root.
    pub fn to_wire(&self) -> String {
        if self.is_root() {
            return ROOT_SENTINEL.to_string();
        }
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(name);
                }
                PathSegment::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl<S: Into<PathSegment>> FromIterator<S> for JsonPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        JsonPath::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_wire_form() {
        assert_eq!(JsonPath::root().to_wire(), ".");
        assert!(JsonPath::parse(".").unwrap().is_root());
        assert!(JsonPath::parse("$").unwrap().is_root());
        assert!(JsonPath::parse("").unwrap().is_root());
    }

    #[test]
    fn test_wire_form_with_indices() {
        let path = JsonPath::new([
            PathSegment::from("users"),
            PathSegment::from(0usize),
            PathSegment::from("name"),
        ]);
        assert_eq!(path.to_wire(), "users[0].name");
        assert_eq!(JsonPath::parse("users[0].name").unwrap(), path);
        assert_eq!(JsonPath::parse("$.users[0].name").unwrap(), path);
    }

    #[test]
    fn test_parse_consecutive_indices() {
        let path = JsonPath::parse("grid[1][2]").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Field("grid".into()),
                PathSegment::Index(1),
                PathSegment::Index(2)
            ]
        );
    }

    #[test]
    fn test_parse_rejects_bad_index() {
        assert!(JsonPath::parse("a[x]").is_err());
        assert!(JsonPath::parse("a[1").is_err());
    }

    #[test]
    fn test_from_values() {
        let path = JsonPath::from_values(&[json!("a"), json!(2)]).unwrap();
        assert_eq!(path.to_wire(), "a[2]");
        assert!(JsonPath::from_values(&[json!(-1)]).is_err());
        assert!(JsonPath::from_values(&[json!(true)]).is_err());
    }

    #[test]
    fn test_from_values_index_width() {
        let result = JsonPath::from_values(&[json!(u64::MAX)]);
        match usize::try_from(u64::MAX) {
            Ok(i) => assert_eq!(result.unwrap().segments(), &[PathSegment::Index(i)]),
            Err(_) => assert_eq!(
                result.unwrap_err().kind(),
                crate::error::ErrorKind::BadRequest
            ),
        }
    }

    #[test]
    fn test_looks_like_index() {
        assert!(PathSegment::from("12").looks_like_index());
        assert!(PathSegment::from(3usize).looks_like_index());
        assert!(!PathSegment::from("a1").looks_like_index());
        assert!(!PathSegment::from("").looks_like_index());
        assert_eq!(PathSegment::from("7").as_index(), Some(7));
    }

    #[test]
    fn test_split_last() {
        let path = JsonPath::new(["a", "b"]);
        let (parent, last) = path.split_last().unwrap();
        assert_eq!(parent, JsonPath::new(["a"]));
        assert_eq!(last, &PathSegment::Field("b".into()));
        assert!(JsonPath::root().split_last().is_none());
    }
}
