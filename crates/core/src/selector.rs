//! Label selectors in the Kubernetes string syntax.
//!
//! Supported requirements, comma separated:
//! `key`, `!key`, `key=value`, `key==value`, `key!=value`,
//! `key in (a,b)`, `key notin (a,b)`. An empty selector matches everything.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;

use crate::{KappError, KappResult};

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("valid label name regex"));
static PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").expect("valid dns subdomain regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Exists(String),
    DoesNotExist(String),
    Equals(String, String),
    NotEquals(String, String),
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
}

impl Requirement {
    pub fn key(&self) -> &str {
        match self {
            Self::Exists(k) | Self::DoesNotExist(k) => k,
            Self::Equals(k, _) | Self::NotEquals(k, _) => k,
            Self::In(k, _) | Self::NotIn(k, _) => k,
        }
    }

    /// Negative requirements hold when the label is absent.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(self.key());
        match self {
            Self::Exists(_) => value.is_some(),
            Self::DoesNotExist(_) => value.is_none(),
            Self::Equals(_, want) => value == Some(want),
            Self::NotEquals(_, want) => value != Some(want),
            Self::In(_, set) => value.map(|v| set.contains(v)).unwrap_or(false),
            Self::NotIn(_, set) => value.map(|v| !set.contains(v)).unwrap_or(true),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(set: &BTreeSet<String>) -> String {
            set.iter().cloned().collect::<Vec<_>>().join(",")
        }
        match self {
            Self::Exists(k) => write!(f, "{}", k),
            Self::DoesNotExist(k) => write!(f, "!{}", k),
            Self::Equals(k, v) => write!(f, "{}={}", k, v),
            Self::NotEquals(k, v) => write!(f, "{}!={}", k, v),
            Self::In(k, set) => write!(f, "{} in ({})", k, join(set)),
            Self::NotIn(k, set) => write!(f, "{} notin ({})", k, join(set)),
        }
    }
}

/// Conjunction of requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: SmallVec<[Requirement; 4]>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn push(&mut self, req: Requirement) {
        self.requirements.push(req);
    }

    pub fn parse(raw: &str) -> KappResult<Self> {
        let mut out = Self::default();
        if raw.trim().is_empty() {
            return Ok(out);
        }
        for part in split_top_level(raw)? {
            out.requirements.push(parse_requirement(part)?);
        }
        Ok(out)
    }

    /// Build from the structured `matchLabels`/`matchExpressions` form.
    pub fn from_k8s(sel: &metav1::LabelSelector) -> KappResult<Self> {
        let mut out = Self::default();
        if let Some(ml) = sel.match_labels.as_ref() {
            for (k, v) in ml.iter() {
                validate_key(k)?;
                validate_value(v)?;
                out.requirements.push(Requirement::Equals(k.clone(), v.clone()));
            }
        }
        for expr in sel.match_expressions.iter().flatten() {
            validate_key(&expr.key)?;
            let values: BTreeSet<String> = expr.values.iter().flatten().cloned().collect();
            let req = match expr.operator.as_str() {
                "In" | "NotIn" => {
                    if values.is_empty() {
                        return Err(KappError::invalid(format!("{}: operator {} requires values", expr.key, expr.operator)));
                    }
                    for v in values.iter() {
                        validate_value(v)?;
                    }
                    if expr.operator == "In" {
                        Requirement::In(expr.key.clone(), values)
                    } else {
                        Requirement::NotIn(expr.key.clone(), values)
                    }
                }
                "Exists" => Requirement::Exists(expr.key.clone()),
                "DoesNotExist" => Requirement::DoesNotExist(expr.key.clone()),
                other => return Err(KappError::invalid(format!("{}: unknown operator {:?}", expr.key, other))),
            };
            out.requirements.push(req);
        }
        Ok(out)
    }

    /// A missing label map is treated as empty.
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        static EMPTY: Lazy<BTreeMap<String, String>> = Lazy::new(BTreeMap::new);
        let labels = labels.unwrap_or(&EMPTY);
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

fn split_top_level(raw: &str) -> KappResult<Vec<&str>> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, ch) in raw.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(KappError::invalid(format!("label selector {:?}: unbalanced ')'", raw)));
                }
            }
            ',' if depth == 0 => {
                out.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(KappError::invalid(format!("label selector {:?}: unbalanced '('", raw)));
    }
    out.push(&raw[start..]);
    Ok(out)
}

fn parse_requirement(raw: &str) -> KappResult<Requirement> {
    let r = raw.trim();
    if r.is_empty() {
        return Err(KappError::invalid("label selector: empty requirement"));
    }
    if let Some(key) = r.strip_prefix('!') {
        let key = key.trim();
        validate_key(key)?;
        return Ok(Requirement::DoesNotExist(key.to_string()));
    }
    if let Some(open) = r.find('(') {
        if !r.ends_with(')') {
            return Err(KappError::invalid(format!("label selector {:?}: expected ')' at end", r)));
        }
        let head: Vec<&str> = r[..open].split_whitespace().collect();
        let (key, op) = match head.as_slice() {
            [key, op] => (*key, *op),
            _ => return Err(KappError::invalid(format!("label selector {:?}: expected `key in (...)`", r))),
        };
        validate_key(key)?;
        let inner = &r[open + 1..r.len() - 1];
        if inner.trim().is_empty() {
            return Err(KappError::invalid(format!("label selector {:?}: empty value set", r)));
        }
        let mut values = BTreeSet::new();
        for v in inner.split(',') {
            let v = v.trim();
            validate_value(v)?;
            values.insert(v.to_string());
        }
        return match op {
            "in" => Ok(Requirement::In(key.to_string(), values)),
            "notin" => Ok(Requirement::NotIn(key.to_string(), values)),
            other => Err(KappError::invalid(format!("label selector {:?}: unknown operator {:?}", r, other))),
        };
    }
    let (key, value, negate) = if let Some(i) = r.find("!=") {
        (&r[..i], &r[i + 2..], true)
    } else if let Some(i) = r.find("==") {
        (&r[..i], &r[i + 2..], false)
    } else if let Some(i) = r.find('=') {
        (&r[..i], &r[i + 1..], false)
    } else {
        validate_key(r)?;
        return Ok(Requirement::Exists(r.to_string()));
    };
    let (key, value) = (key.trim(), value.trim());
    validate_key(key)?;
    validate_value(value)?;
    if negate {
        Ok(Requirement::NotEquals(key.to_string(), value.to_string()))
    } else {
        Ok(Requirement::Equals(key.to_string(), value.to_string()))
    }
}

fn validate_key(key: &str) -> KappResult<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, key),
    };
    if let Some(p) = prefix {
        if p.is_empty() || p.len() > 253 || !PREFIX_RE.is_match(p) {
            return Err(KappError::invalid(format!("invalid label key prefix {:?}", p)));
        }
    }
    if name.is_empty() || name.len() > 63 || !NAME_RE.is_match(name) {
        return Err(KappError::invalid(format!("invalid label key {:?}", key)));
    }
    Ok(())
}

fn validate_value(value: &str) -> KappResult<()> {
    if value.is_empty() {
        return Ok(());
    }
    if value.len() > 63 || !NAME_RE.is_match(value) {
        return Err(KappError::invalid(format!("invalid label value {:?}", value)));
    }
    Ok(())
}
