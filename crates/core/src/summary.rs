//! Named-field summaries of resources.
//!
//! Kinds expose summary rows through [`Summarizable`] instead of being
//! inspected at runtime. [`FieldSummary`] is the schema-driven variant: it
//! reads printer-column style JSON paths out of any [`Resource`].

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{KappError, KappResult, Resource};

/// Capability of producing `(column, value)` rows.
pub trait Summarizable {
    fn summary_fields(&self) -> SmallVec<[(String, String); 8]>;

    fn summary_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .summary_fields()
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Column name plus a simple JSON path such as `.spec.ports[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryColumn {
    pub name: String,
    pub json_path: String,
}

/// Compiled set of columns evaluated against resources.
#[derive(Debug, Clone, Default)]
pub struct FieldSummary {
    columns: Vec<(String, String)>,
}

impl FieldSummary {
    pub fn new(columns: &[SummaryColumn]) -> KappResult<Self> {
        let mut out = Vec::with_capacity(columns.len());
        for c in columns {
            let path = normalize_json_path(&c.json_path)
                .ok_or_else(|| KappError::invalid(format!("column {}: unsupported json path {:?}", c.name, c.json_path)))?;
            out.push((c.name.clone(), path));
        }
        Ok(Self { columns: out })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn view<'a>(&'a self, obj: &'a Resource) -> ColumnView<'a> {
        ColumnView { summary: self, obj }
    }

    fn render(&self, raw: &serde_json::Value) -> SmallVec<[(String, String); 8]> {
        let mut out = SmallVec::new();
        for (name, path) in self.columns.iter() {
            out.push((name.clone(), render_scalar(extract_path(raw, path))));
        }
        out
    }
}

/// A resource seen through a [`FieldSummary`].
pub struct ColumnView<'a> {
    summary: &'a FieldSummary,
    obj: &'a Resource,
}

impl Summarizable for ColumnView<'_> {
    fn summary_fields(&self) -> SmallVec<[(String, String); 8]> {
        match serde_json::to_value(self.obj) {
            Ok(raw) => self.summary.render(&raw),
            Err(_) => SmallVec::new(),
        }
    }
}

// Accept only simple paths like .spec.foo.bar[0]
pub(crate) fn normalize_json_path(jp: &str) -> Option<String> {
    if jp.contains('?') || jp.contains('*') {
        return None;
    }
    let s = jp.strip_prefix('.').unwrap_or(jp);
    if s.is_empty() {
        return None;
    }
    for seg in s.split('.') {
        let (key, idx) = match seg.find('[') {
            Some(open) => {
                let idx = seg[open + 1..].strip_suffix(']')?;
                (&seg[..open], Some(idx))
            }
            None => (seg, None),
        };
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return None;
        }
        if let Some(idx) = idx {
            if idx.is_empty() || !idx.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
        }
    }
    Some(s.to_string())
}

pub(crate) fn extract_path<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut cur = root;
    for seg in path.split('.') {
        let (key, idx) = match seg.find('[') {
            Some(open) => (&seg[..open], seg[open + 1..seg.len() - 1].parse::<usize>().ok()),
            None => (seg, None),
        };
        cur = cur.as_object()?.get(key)?;
        if let Some(i) = idx {
            cur = cur.as_array()?.get(i)?;
        }
    }
    Some(cur)
}

/// Strings, numbers and booleans as text; anything else is empty.
pub(crate) fn render_scalar(v: Option<&serde_json::Value>) -> String {
    match v {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
