//! Path templates such as `/users/{id}/orders/{orderId}`.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("must start with '/'")]
    NotAbsolute,

    #[error("empty capture '{{}}'")]
    EmptyCapture,

    #[error("segment '{0}' mixes literal text and a capture")]
    PartialCapture(String),

    #[error("capture '{0}' appears more than once")]
    DuplicateCapture(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Capture(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        if !raw.starts_with('/') {
            return Err(TemplateError::NotAbsolute);
        }

        let mut captures = HashSet::new();
        let mut segments = Vec::new();
        for part in split(raw) {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) if name.is_empty() => return Err(TemplateError::EmptyCapture),
                Some(name) if name.contains(['{', '}']) => {
                    return Err(TemplateError::PartialCapture(part.to_string()))
                }
                Some(name) => {
                    if !captures.insert(name.to_string()) {
                        return Err(TemplateError::DuplicateCapture(name.to_string()));
                    }
                    Segment::Capture(name.to_string())
                }
                None if part.contains(['{', '}']) => {
                    return Err(TemplateError::PartialCapture(part.to_string()))
                }
                None => Segment::Literal(part.to_string()),
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

    /// Match a request path, returning percent-decoded captures. Empty
    /// segments (doubled or trailing slashes) are ignored.
    pub fn match_path(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let parts: Vec<&str> = split(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            let decoded = decode(part);
            match segment {
                Segment::Literal(literal) if *literal == decoded => {}
                Segment::Literal(_) => return None,
                Segment::Capture(name) => {
                    params.insert(name.clone(), decoded.into_owned());
                }
            }
        }
        Some(params)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Percent-decode, falling back to the raw text when the result would not
/// be UTF-8.
pub(crate) fn decode(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_are_extracted_and_decoded() {
        let t = PathTemplate::parse("/users/{id}/orders/{orderId}").unwrap();
        let params = t.match_path("/users/ada%20lovelace/orders/42").unwrap();
        assert_eq!(params["id"], "ada lovelace");
        assert_eq!(params["orderId"], "42");
        assert_eq!(t.segments().len(), 4);

        let exact = t.match_path("/users/123/orders/456").unwrap();
        let expected: BTreeMap<String, String> = [("id", "123"), ("orderId", "456")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(exact, expected);
        assert!(t.match_path("/users/123").is_none());
        assert!(t.match_path("/users/123/orders").is_none());
    }

    #[test]
    fn literal_and_length_mismatches_fail() {
        let t = PathTemplate::parse("/users/{id}").unwrap();
        assert!(t.match_path("/users").is_none());
        assert!(t.match_path("/users/1/extra").is_none());
        assert!(t.match_path("/accounts/1").is_none());
        assert!(t.match_path("/users/1/").is_some());
    }

    #[test]
    fn root_template_matches_root_only() {
        let t = PathTemplate::parse("/").unwrap();
        assert_eq!(t.match_path("/"), Some(BTreeMap::new()));
        assert!(t.match_path("/x").is_none());
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert_eq!(PathTemplate::parse("users"), Err(TemplateError::NotAbsolute));
        assert_eq!(PathTemplate::parse("/users/{}"), Err(TemplateError::EmptyCapture));
        assert_eq!(
            PathTemplate::parse("/files/{name}.json"),
            Err(TemplateError::PartialCapture("{name}.json".into()))
        );
        assert_eq!(
            PathTemplate::parse("/a/{x}/b/{x}"),
            Err(TemplateError::DuplicateCapture("x".into()))
        );
    }
}
