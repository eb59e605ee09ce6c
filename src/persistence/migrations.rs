//! Ordered schema patches applied to `groups.json` when it is opened.
//!
//! Each patch lifts the document from version `n` to `n + 1`. Patches only
//! ever add fields or split data out; nothing is dropped.

use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// Version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

type Patch = fn(&mut Map<String, Value>) -> Result<(), String>;

/// `PATCHES[i]` upgrades version `i + 1` to `i + 2`.
const PATCHES: &[Patch] = &[v1_split_memberships];

/// Outcome of [`migrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Migration {
    /// Document was already current.
    UpToDate,
    /// Document was upgraded from the given version.
    Upgraded { from: u32 },
    /// Document is newer than this build understands.
    TooNew { found: u32 },
}

/// Brings a parsed document up to [`CURRENT_SCHEMA_VERSION`] in place.
///
/// A document without `schema_version` is treated as version 1.
pub fn migrate(doc: &mut Value) -> Result<Migration, String> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| "top level is not an object".to_string())?;
    let found = match root.get("schema_version") {
        None => 1,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| "schema_version is not an integer".to_string())?,
    };

    if found > CURRENT_SCHEMA_VERSION {
        return Ok(Migration::TooNew { found });
    }
    if found == CURRENT_SCHEMA_VERSION {
        return Ok(Migration::UpToDate);
    }

    for version in found.max(1)..CURRENT_SCHEMA_VERSION {
        let patch = PATCHES[(version - 1) as usize];
        patch(root).map_err(|e| format!("patch v{} -> v{}: {}", version, version + 1, e))?;
        root.insert("schema_version".to_string(), json!(version + 1));
    }
    Ok(Migration::Upgraded { from: found })
}

/// v1 kept members inline as `tab_ids` and had no soft-delete flag.
fn v1_split_memberships(root: &mut Map<String, Value>) -> Result<(), String> {
    let groups = match root.get_mut("groups") {
        Some(Value::Array(groups)) => groups,
        Some(_) => return Err("groups is not an array".to_string()),
        None => {
            root.insert("groups".to_string(), json!([]));
            root.insert("memberships".to_string(), json!([]));
            return Ok(());
        }
    };

    let mut memberships = Vec::new();
    let mut seen = HashSet::new();
    for group in groups.iter_mut() {
        let group = group
            .as_object_mut()
            .ok_or_else(|| "group entry is not an object".to_string())?;
        let group_id = group
            .get("id")
            .cloned()
            .ok_or_else(|| "group entry has no id".to_string())?;
        let tab_ids = match group.remove("tab_ids") {
            Some(Value::Array(ids)) => ids,
            Some(_) => return Err("tab_ids is not an array".to_string()),
            None => Vec::new(),
        };
        let mut position = 0u32;
        for tab_id in tab_ids {
            let Some(tab) = tab_id.as_str() else {
                continue;
            };
            if !seen.insert(tab.to_string()) {
                continue;
            }
            memberships.push(json!({
                "tab_id": tab,
                "group_id": group_id,
                "position": position,
            }));
            position += 1;
        }
        group.entry("active").or_insert(json!(true));
    }
    root.insert("memberships".to_string(), Value::Array(memberships));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_document_is_untouched() {
        let mut doc = json!({"schema_version": CURRENT_SCHEMA_VERSION, "groups": [], "memberships": []});
        let before = doc.clone();
        assert_eq!(migrate(&mut doc), Ok(Migration::UpToDate));
        assert_eq!(doc, before);
    }

    #[test]
    fn newer_document_is_reported() {
        let mut doc = json!({"schema_version": 99});
        assert_eq!(migrate(&mut doc), Ok(Migration::TooNew { found: 99 }));
    }

    #[test]
    fn v1_inline_members_become_membership_rows() {
        let mut doc = json!({
            "schema_version": 1,
            "groups": [
                {"id": "6f1c8a7e-0000-4000-8000-000000000001", "name": "a", "color": "blue",
                 "created_at": "2024-01-01T00:00:00Z", "tab_ids": ["t1", "t2"]},
                {"id": "6f1c8a7e-0000-4000-8000-000000000002", "name": "b", "color": "red",
                 "created_at": "2024-01-02T00:00:00Z", "tab_ids": ["t2", "t3"]}
            ]
        });
        assert_eq!(migrate(&mut doc), Ok(Migration::Upgraded { from: 1 }));
        assert_eq!(doc["schema_version"], json!(2));

        let rows = doc["memberships"].as_array().expect("memberships array");
        let tabs: Vec<&str> = rows.iter().filter_map(|r| r["tab_id"].as_str()).collect();
        assert_eq!(tabs, vec!["t1", "t2", "t3"], "duplicate t2 keeps first owner");
        assert_eq!(rows[2]["position"], json!(0));
        assert_eq!(doc["groups"][0]["active"], json!(true));
        assert!(doc["groups"][0].get("tab_ids").is_none());
    }

    #[test]
    fn missing_version_is_treated_as_v1() {
        let mut doc = json!({"groups": []});
        assert_eq!(migrate(&mut doc), Ok(Migration::Upgraded { from: 1 }));
        assert_eq!(doc["memberships"], json!([]));
    }

    #[test]
    fn non_object_document_is_rejected() {
        let mut doc = json!([1, 2, 3]);
        assert!(migrate(&mut doc).is_err());
    }
}
