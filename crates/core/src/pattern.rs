//! Path templates and the segment-wise matcher.
//!
//! Template syntax (segments separated by `/`):
//! - `posts`: exact, case-sensitive segment
//! - `{id}`: named placeholder, exactly one non-empty segment
//! - `*`: anonymous placeholder, exactly one non-empty segment
//! - `**`: trailing wildcard, one or more remaining segments (may span `/`)
//!
//! Matching anchors both ends and walks the template once, left to right.
//! There is no backtracking: `**` may only appear last, so every segment has
//! exactly one way to match.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
    Any,
    Rest,
}

/// A parsed, validated path template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(CoreError::template(raw, "must start with '/'"));
        };

        // The root template is the only one allowed to hold an empty segment.
        if rest.is_empty() {
            return Ok(Self {
                raw: raw.to_string(),
                segments: vec![Segment::Literal(String::new())],
            });
        }

        let parts: Vec<&str> = rest.split('/').collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());

        for (i, part) in parts.into_iter().enumerate() {
            let segment = match part {
                "" => return Err(CoreError::template(raw, "empty segment")),
                "**" if i != last => {
                    return Err(CoreError::template(raw, "'**' is only allowed as the last segment"));
                }
                "**" => Segment::Rest,
                "*" => Segment::Any,
                p if p.starts_with('{') => {
                    let name = p
                        .strip_prefix('{')
                        .and_then(|p| p.strip_suffix('}'))
                        .filter(|n| !n.is_empty() && !n.contains(['{', '}']))
                        .ok_or_else(|| CoreError::template(raw, "malformed placeholder"))?;
                    Segment::Placeholder(name.to_string())
                }
                p if p.contains(['{', '}', '*']) => {
                    return Err(CoreError::template(raw, "wildcards must span a whole segment"));
                }
                p => Segment::Literal(p.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match a concrete request path (no query string) against this template.
    pub fn matches(&self, path: &str) -> bool {
        let Some(rest) = path.strip_prefix('/') else {
            return false;
        };
        let mut parts = rest.split('/');

        for segment in &self.segments {
            match segment {
                Segment::Rest => {
                    return matches!(parts.next(), Some(p) if !p.is_empty());
                }
                Segment::Literal(lit) => match parts.next() {
                    Some(p) if p == lit => {}
                    _ => return false,
                },
                Segment::Placeholder(_) | Segment::Any => match parts.next() {
                    Some(p) if !p.is_empty() => {}
                    _ => return false,
                },
            }
        }

        parts.next().is_none()
    }
}

/// One-shot convenience: parse `template` and match `path` against it.
///
/// An unparsable template never matches.
pub fn matches(template: &str, path: &str) -> bool {
    PathTemplate::parse(template).is_ok_and(|t| t.matches(path))
}

impl core::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl core::str::FromStr for PathTemplate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathTemplate {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PathTemplate> for String {
    fn from(value: PathTemplate) -> Self {
        value.raw
    }
}
