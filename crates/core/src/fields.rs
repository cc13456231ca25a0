//! Field selectors in the Kubernetes string syntax: `field=value`,
//! `field==value` and `field!=value`, comma separated.
//!
//! `metadata.name` is always selectable and `metadata.namespace` only for
//! namespaced kinds. Any other field must be declared by the kind.

use std::fmt;

use smallvec::SmallVec;

use crate::summary::{extract_path, normalize_json_path, render_scalar};
use crate::{KappError, KappResult, Resource, ResourceKind};

const NAME_FIELD: &str = "metadata.name";
const NAMESPACE_FIELD: &str = "metadata.namespace";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRequirement {
    Equals(String, String),
    NotEquals(String, String),
}

impl FieldRequirement {
    pub fn field(&self) -> &str {
        match self {
            Self::Equals(f, _) | Self::NotEquals(f, _) => f,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Equals(_, v) | Self::NotEquals(_, v) => v,
        }
    }

    fn holds(&self, actual: &str) -> bool {
        match self {
            Self::Equals(_, want) => actual == want,
            Self::NotEquals(_, want) => actual != want,
        }
    }

    fn with_field(self, field: String) -> Self {
        match self {
            Self::Equals(_, v) => Self::Equals(field, v),
            Self::NotEquals(_, v) => Self::NotEquals(field, v),
        }
    }
}

impl fmt::Display for FieldRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(k, v) => write!(f, "{}={}", k, v),
            Self::NotEquals(k, v) => write!(f, "{}!={}", k, v),
        }
    }
}

/// Conjunction of field requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: SmallVec<[FieldRequirement; 2]>,
}

impl FieldSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[FieldRequirement] {
        &self.requirements
    }

    pub fn parse(raw: &str) -> KappResult<Self> {
        let mut out = Self::default();
        if raw.trim().is_empty() {
            return Ok(out);
        }
        for part in raw.split(',') {
            let part = part.trim();
            let (field, value, negate) = if let Some(i) = part.find("!=") {
                (&part[..i], &part[i + 2..], true)
            } else if let Some(i) = part.find("==") {
                (&part[..i], &part[i + 2..], false)
            } else if let Some(i) = part.find('=') {
                (&part[..i], &part[i + 1..], false)
            } else {
                return Err(KappError::invalid(format!("field selector {:?}: expected field=value", part)));
            };
            let field = field.trim();
            if field.is_empty() {
                return Err(KappError::invalid(format!("field selector {:?}: empty field", part)));
            }
            let (field, value) = (field.to_string(), value.trim().to_string());
            out.requirements.push(if negate {
                FieldRequirement::NotEquals(field, value)
            } else {
                FieldRequirement::Equals(field, value)
            });
        }
        Ok(out)
    }

    /// Check every field against what `kind` allows and normalize declared
    /// fields to their dot-less form.
    pub fn resolve(self, kind: &ResourceKind, selectable: &[String]) -> KappResult<Self> {
        let mut out = Self::default();
        for req in self.requirements {
            let field = req.field();
            if field == NAME_FIELD || (field == NAMESPACE_FIELD && kind.namespaced()) {
                out.requirements.push(req);
                continue;
            }
            let declared = selectable
                .iter()
                .map(|s| s.trim_start_matches('.'))
                .find(|s| *s == field || *s == field.trim_start_matches('.'));
            match declared {
                Some(path) => {
                    let path = path.to_string();
                    out.requirements.push(req.with_field(path));
                }
                None => {
                    return Err(KappError::invalid(format!(
                        "field label not supported for {}: {}",
                        kind.gvk_key(),
                        field
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Missing fields compare as the empty string.
    pub fn matches(&self, obj: &Resource) -> bool {
        let mut raw: Option<serde_json::Value> = None;
        self.requirements.iter().all(|req| {
            let actual = match req.field() {
                NAME_FIELD => obj.name().to_string(),
                NAMESPACE_FIELD => obj.namespace().unwrap_or("").to_string(),
                path => {
                    let root = raw.get_or_insert_with(|| serde_json::to_value(obj).unwrap_or_default());
                    render_scalar(extract_path(root, path))
                }
            };
            req.holds(&actual)
        })
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

/// Validate a declared selectable field path and return it without the
/// leading dot.
pub fn selectable_field(path: &str) -> KappResult<String> {
    normalize_json_path(path).ok_or_else(|| KappError::invalid(format!("unsupported selectable field {:?}", path)))
}
