//! Route matching logic.
//!
//! # Responsibilities
//! - Compile route identifiers (`/users/[userId]`, `/files/[...path]`)
//! - Resolve a pathname to a route id and its bound parameters
//!
//! # Design Decisions
//! - Static segments beat dynamic segments, dynamic beat wildcards
//! - Ties resolve in declaration order (stable sort)
//! - Empty segments are ignored, so `/a//b/` matches `/a/b`
//! - No regex; matching is a linear scan over compiled segments

use std::cmp::Ordering;

use crate::routing::params::RouteParams;

/// Result of a successful route lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route_id: String,
    pub params: RouteParams,
}

/// Resolves pathnames to route ids.
pub trait RouteMatcher: Send + Sync + std::fmt::Debug {
    /// Returns the matched route, or `None` when nothing matches.
    fn match_path(&self, pathname: &str) -> Option<RouteMatch>;
}

/// Error raised while compiling a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("route `{0}` must start with `/`")]
    MissingLeadingSlash(String),
    #[error("route `{0}` has a wildcard segment that is not last")]
    WildcardNotLast(String),
    #[error("route `{0}` has an empty parameter name")]
    EmptyParameterName(String),
    #[error("route `{route}` binds parameter `{name}` twice")]
    DuplicateParameter { route: String, name: String },
    #[error("route `{0}` is declared more than once")]
    DuplicateRoute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Wildcard(String),
}

impl Segment {
    fn rank(&self) -> u8 {
        match self {
            Segment::Static(_) => 0,
            Segment::Param(_) => 1,
            Segment::Wildcard(_) => 2,
        }
    }
}

/// A compiled route identifier.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    id: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Compile a route identifier.
    pub fn parse(id: &str) -> Result<Self, PatternError> {
        if !id.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(id.to_string()));
        }

        let raw: Vec<&str> = split_path(id).collect();
        let mut segments = Vec::with_capacity(raw.len());
        let mut names: Vec<&str> = Vec::new();

        for (index, part) in raw.iter().enumerate() {
            let segment = match part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
                Some(inner) => {
                    let (name, wildcard) = match inner.strip_prefix("...") {
                        Some(name) => (name, true),
                        None => (inner, false),
                    };
                    if name.is_empty() {
                        return Err(PatternError::EmptyParameterName(id.to_string()));
                    }
                    if names.contains(&name) {
                        return Err(PatternError::DuplicateParameter {
                            route: id.to_string(),
                            name: name.to_string(),
                        });
                    }
                    names.push(name);
                    if wildcard {
                        if index + 1 != raw.len() {
                            return Err(PatternError::WildcardNotLast(id.to_string()));
                        }
                        Segment::Wildcard(name.to_string())
                    } else {
                        Segment::Param(name.to_string())
                    }
                }
                None => Segment::Static((*part).to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            id: id.to_string(),
            segments,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn specificity_cmp(&self, other: &Self) -> Ordering {
        let left = self.segments.iter().map(Segment::rank);
        let right = other.segments.iter().map(Segment::rank);
        left.cmp(right)
    }

    fn match_segments(&self, path: &[&str]) -> Option<RouteParams> {
        let mut params = RouteParams::new();

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Static(expected) => {
                    if path.get(index) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = path.get(index)?;
                    params.insert(name.clone(), *value);
                }
                Segment::Wildcard(name) => {
                    let rest = path.get(index..).filter(|rest| !rest.is_empty())?;
                    let rest: Vec<String> = rest.iter().map(|s| (*s).to_string()).collect();
                    params.insert(name.clone(), rest);
                    return Some(params);
                }
            }
        }

        (path.len() == self.segments.len()).then_some(params)
    }
}

/// Matcher compiled from a list of route identifiers.
#[derive(Debug, Default, Clone)]
pub struct PatternMatcher {
    patterns: Vec<RoutePattern>,
}

impl PatternMatcher {
    /// Compile all route identifiers, ordering them by specificity.
    pub fn new<I, S>(route_ids: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns: Vec<RoutePattern> = Vec::new();
        for id in route_ids {
            let pattern = RoutePattern::parse(id.as_ref())?;
            if patterns.iter().any(|p| p.id == pattern.id) {
                return Err(PatternError::DuplicateRoute(pattern.id));
            }
            patterns.push(pattern);
        }
        patterns.sort_by(RoutePattern::specificity_cmp);
        Ok(Self { patterns })
    }

    pub fn route_ids(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(RoutePattern::id)
    }
}

impl RouteMatcher for PatternMatcher {
    fn match_path(&self, pathname: &str) -> Option<RouteMatch> {
        let path: Vec<&str> = split_path(pathname).collect();
        self.patterns.iter().find_map(|pattern| {
            pattern.match_segments(&path).map(|params| RouteMatch {
                route_id: pattern.id.clone(),
                params,
            })
        })
    }
}

fn split_path(pathname: &str) -> impl Iterator<Item = &str> {
    pathname.split('/').filter(|segment| !segment.is_empty())
}
