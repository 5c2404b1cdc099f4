// Storage path templates: parsing, nesting for inline models, rendering and
// matching against known filenames.

use crate::error::{Result, StoreError};
use crate::identity::UUID_PATTERN;
use regex::Regex;
use std::collections::BTreeMap;

/// Key holding a document's own identifier in render/match maps.
pub const UUID_KEY: &str = "uuid";

#[derive(Debug, Clone, PartialEq)]
pub struct PathTemplate {
    pub raw: String,
    pub segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Literal(String),
    /// `{uuid}`: the document's own identifier.
    Uuid,
    /// `{<name>_uuid}`: identifier of an owning ancestor.
    AncestorUuid(String),
}

impl PathSegment {
    fn key(&self) -> Option<String> {
        match self {
            PathSegment::Literal(_) => None,
            PathSegment::Uuid => Some(UUID_KEY.to_string()),
            PathSegment::AncestorUuid(name) => Some(ancestor_key(name)),
        }
    }
}

/// Render/match key for the identifier of the ancestor called `name`.
pub fn ancestor_key(name: &str) -> String {
    format!("{name}_uuid")
}

impl PathTemplate {
    /// Parse a template such as `authors/{uuid}/author.yaml`. It must hold
    /// exactly one `{uuid}` segment followed by at least one literal segment.
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for part in template.split('/') {
            let segment = match part {
                "" | "." | ".." => {
                    return Err(StoreError::Definition(format!(
                        "invalid path template '{template}': bad segment '{part}'"
                    )))
                }
                "{uuid}" => PathSegment::Uuid,
                p if p.contains('{') || p.contains('}') => {
                    return Err(StoreError::Definition(format!(
                        "invalid path template '{template}': only {{uuid}} may be substituted"
                    )))
                }
                p => PathSegment::Literal(p.to_string()),
            };
            segments.push(segment);
        }

        let uuid_positions: Vec<usize> = segments
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == PathSegment::Uuid)
            .map(|(i, _)| i)
            .collect();
        match uuid_positions.as_slice() {
            [pos] if *pos + 1 < segments.len() => {}
            [_] => {
                return Err(StoreError::Definition(format!(
                    "invalid path template '{template}': {{uuid}} cannot be the file name"
                )))
            }
            _ => {
                return Err(StoreError::Definition(format!(
                    "invalid path template '{template}': expected exactly one {{uuid}}"
                )))
            }
        }

        Ok(PathTemplate {
            raw: template.to_string(),
            segments,
        })
    }

    /// Template of an inline model stored under `parent`: the parent's own
    /// `{uuid}` becomes `{<parent_name>_uuid}` and everything after it is
    /// replaced by the child's template.
    pub fn nested_under(parent: &PathTemplate, parent_name: &str, child: &PathTemplate) -> Self {
        let mut segments = Vec::new();
        for segment in &parent.segments {
            if *segment == PathSegment::Uuid {
                segments.push(PathSegment::AncestorUuid(parent_name.to_string()));
                break;
            }
            segments.push(segment.clone());
        }
        segments.extend(child.segments.iter().cloned());

        let raw = segments
            .iter()
            .map(|s| match s {
                PathSegment::Literal(l) => l.clone(),
                other => format!("{{{}}}", other.key().unwrap_or_default()),
            })
            .collect::<Vec<_>>()
            .join("/");

        PathTemplate { raw, segments }
    }

    /// Substitute identifiers. Returns `None` if a placeholder has no value.
    pub fn render(&self, values: &BTreeMap<String, String>) -> Option<String> {
        let mut parts = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                PathSegment::Literal(l) => parts.push(l.clone()),
                other => parts.push(values.get(&other.key()?)?.clone()),
            }
        }
        Some(parts.join("/"))
    }

    /// Regex matching every filename of this template, with pinned keys
    /// matched literally and the others captured by name.
    pub fn matcher(&self, pinned: &BTreeMap<String, String>) -> Result<Regex> {
        let mut pattern = String::from("^");
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                pattern.push('/');
            }
            match segment {
                PathSegment::Literal(l) => pattern.push_str(&regex::escape(l)),
                other => {
                    let key = other.key().unwrap_or_default();
                    match pinned.get(&key) {
                        Some(value) => pattern.push_str(&regex::escape(value)),
                        None => pattern.push_str(&format!("(?P<{key}>{UUID_PATTERN})")),
                    }
                }
            }
        }
        pattern.push('$');
        Ok(Regex::new(&pattern)?)
    }

    /// Every substitution key, outermost ancestor first, `uuid` last.
    pub fn keys(&self) -> Vec<String> {
        self.segments.iter().filter_map(PathSegment::key).collect()
    }
}
