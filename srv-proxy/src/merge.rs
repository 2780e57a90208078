//! Structural merge of the generated static config with the on-disk copy.
//!
//! Top-level sections fall into three disjoint classes:
//!
//! | Class   | Sections                                   | Result                            |
//! |---------|--------------------------------------------|-----------------------------------|
//! | user    | `api`, `log`, `accessLog`, `metrics`, `tracing` | existing if present, else template |
//! | managed | `providers`, `certificatesResolvers`        | always template                   |
//! | merged  | `entryPoints`                               | existing entries + required ones from template |
//!
//! Any other top-level section in the existing document is kept as user-owned.
//! A document that does not parse as a mapping is replaced by the template.

use serde_yaml::{Mapping, Value};

use crate::error::ProxyError;

pub const USER_SECTIONS: [&str; 5] = ["api", "log", "accessLog", "metrics", "tracing"];
pub const MANAGED_SECTIONS: [&str; 2] = ["providers", "certificatesResolvers"];
pub const ENTRY_POINTS: &str = "entryPoints";
pub const REQUIRED_ENTRY_POINTS: [&str; 2] = ["web", "websecure"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionClass {
    User,
    Managed,
    Merged,
}

pub fn classify(section: &str) -> SectionClass {
    if MANAGED_SECTIONS.contains(&section) {
        SectionClass::Managed
    } else if section == ENTRY_POINTS {
        SectionClass::Merged
    } else {
        SectionClass::User
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    /// No existing document.
    Fresh,
    Merged,
    /// Existing document was unreadable and was replaced.
    Replaced,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub kind: MergeKind,
    pub content: String,
}

/// Merge `existing` text (if any) against the rendered `template` text.
pub fn merge_documents(existing: Option<&str>, template: &str) -> Result<MergeOutcome, ProxyError> {
    let Some(existing) = existing else {
        return Ok(MergeOutcome {
            kind: MergeKind::Fresh,
            content: template.to_string(),
        });
    };

    let existing = match parse_mapping(existing) {
        Some(map) => map,
        None => {
            tracing::warn!("existing proxy config is not valid YAML; replacing with template");
            return Ok(MergeOutcome {
                kind: MergeKind::Replaced,
                content: template.to_string(),
            });
        }
    };

    let template: Mapping = serde_yaml::from_str(template)?;
    let merged = merge(&existing, &template);
    Ok(MergeOutcome {
        kind: MergeKind::Merged,
        content: serde_yaml::to_string(&Value::Mapping(merged))?,
    })
}

/// An empty document counts as an empty mapping; any other non-mapping is unusable.
fn parse_mapping(text: &str) -> Option<Mapping> {
    match serde_yaml::from_str::<Value>(text).ok()? {
        Value::Mapping(map) => Some(map),
        Value::Null => Some(Mapping::new()),
        _ => None,
    }
}

pub fn merge(existing: &Mapping, template: &Mapping) -> Mapping {
    let mut result = Mapping::new();

    for (key, template_value) in template {
        let name = key.as_str().unwrap_or_default();
        let value = match classify(name) {
            SectionClass::Managed => template_value.clone(),
            SectionClass::Merged => merge_entry_points(existing.get(key), template_value),
            SectionClass::User => existing
                .get(key)
                .cloned()
                .unwrap_or_else(|| template_value.clone()),
        };
        result.insert(key.clone(), value);
    }

    for (key, value) in existing {
        if result.contains_key(key) {
            continue;
        }
        let name = key.as_str().unwrap_or_default();
        if classify(name) == SectionClass::User {
            result.insert(key.clone(), value.clone());
        }
    }

    result
}

fn merge_entry_points(existing: Option<&Value>, template: &Value) -> Value {
    let mut entries = match existing {
        Some(Value::Mapping(map)) => map.clone(),
        _ => Mapping::new(),
    };
    if let Value::Mapping(required) = template {
        for name in REQUIRED_ENTRY_POINTS {
            if let Some(value) = required.get(name) {
                entries.insert(Value::from(name), value.clone());
            }
        }
    }
    Value::Mapping(entries)
}
