//! Route parameters bound while matching a pathname.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single bound route parameter.
///
/// `[name]` segments bind [`RouteParam::Segment`], `[...name]` segments bind
/// the rest of the path as [`RouteParam::Wildcard`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteParam {
    Segment(String),
    Wildcard(Vec<String>),
}

impl RouteParam {
    /// Returns the value of a single-segment parameter.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RouteParam::Segment(value) => Some(value),
            RouteParam::Wildcard(_) => None,
        }
    }

    /// Returns the segments of a wildcard parameter.
    pub fn segments(&self) -> Option<&[String]> {
        match self {
            RouteParam::Segment(_) => None,
            RouteParam::Wildcard(segments) => Some(segments),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, RouteParam::Wildcard(_))
    }

    /// Renders the parameter as path text (wildcards are joined with `/`).
    pub fn to_path_string(&self) -> String {
        match self {
            RouteParam::Segment(value) => value.clone(),
            RouteParam::Wildcard(segments) => segments.join("/"),
        }
    }
}

impl From<&str> for RouteParam {
    fn from(value: &str) -> Self {
        RouteParam::Segment(value.to_string())
    }
}

impl From<Vec<String>> for RouteParam {
    fn from(segments: Vec<String>) -> Self {
        RouteParam::Wildcard(segments)
    }
}

/// Parameter dictionary produced by a route match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteParams(BTreeMap<String, RouteParam>);

impl RouteParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RouteParam>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style insert, handy when assembling parent parameters.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RouteParam>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RouteParam> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RouteParam)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// All parameters bound to a rest-of-path wildcard.
    pub fn wildcards(&self) -> Vec<(&str, &[String])> {
        self.0
            .iter()
            .filter_map(|(name, value)| value.segments().map(|segments| (name.as_str(), segments)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards_only_returns_rest_parameters() {
        let params = RouteParams::new()
            .with("org", "acme")
            .with("path", vec!["a".to_string(), "b".to_string()]);

        let wildcards = params.wildcards();
        assert_eq!(wildcards.len(), 1);
        assert_eq!(wildcards[0].0, "path");
        assert_eq!(wildcards[0].1, ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let params = RouteParams::new()
            .with("userId", "42")
            .with("rest", vec!["x".to_string()]);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, serde_json::json!({ "rest": ["x"], "userId": "42" }));
    }
}
