//! Normalized remote record shapes.
//!
//! The registry's responses are loosely shaped: point lookups come back as
//! one-element arrays, list endpoints may return a bare object or an empty
//! body, ids are sometimes numbers, and the season field on membership rows
//! varies by deployment. Everything is funnelled through the mapping
//! functions here so the engine only ever sees these types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field-name variants under which membership rows carry a season id.
///
/// This list is exhaustive for the registry deployments we integrate with;
/// extend it here rather than probing fields ad hoc at call sites.
pub const SEASON_ID_FIELDS: &[&str] = &["seasonId", "season_id", "season-id"];

/// Field-name variants under which membership rows carry a contact id.
pub const CONTACT_ID_FIELDS: &[&str] = &["contactId", "contact_id", "contact-id", "id"];

/// A page of normalized records with the remote total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> ListPage<T> {
    /// An empty page (the normalization of empty/non-array responses).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    /// A page whose total is simply the item count.
    #[must_use]
    pub fn of(items: Vec<T>) -> Self {
        let total = items.len() as u64;
        Self { items, total }
    }
}

/// A group (the registry's team/roster container).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteGroup {
    pub id: String,
    pub name: String,
    /// Full raw attribute payload, kept for diffing and conflict snapshots.
    pub attributes: Value,
}

/// A contact (the registry's person/player record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteContact {
    pub id: String,
    pub name: String,
    pub attributes: Value,
}

/// A season record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSeason {
    pub id: String,
    pub name: String,
    pub attributes: Value,
}

/// One raw group-membership row from `/group-contacts`.
#[derive(Debug, Clone)]
pub struct MembershipRow {
    pub contact_id: String,
    pub season_id: Option<String>,
}

/// Extract the rows of a list response.
///
/// The registry returns an array even for point lookups; anything else
/// (empty body, bare object, null) normalizes to no rows.
#[must_use]
pub fn response_rows(body: &Value) -> Vec<Value> {
    body.as_array().cloned().unwrap_or_default()
}

/// Read an id-ish field that may be a string or a number.
fn id_field(value: &Value, names: &[&str]) -> Option<String> {
    for name in names {
        match value.get(name) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn name_field(value: &Value) -> String {
    value
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            // Contacts often carry first/last instead of a display name.
            let first = value.get("firstName").and_then(|v| v.as_str());
            let last = value.get("lastName").and_then(|v| v.as_str());
            match (first, last) {
                (Some(f), Some(l)) => format!("{f} {l}"),
                (Some(f), None) => f.to_string(),
                (None, Some(l)) => l.to_string(),
                (None, None) => String::new(),
            }
        })
}

impl RemoteGroup {
    /// Map one raw group row; rows without an id are dropped by callers.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            id: id_field(value, &["id"])?,
            name: name_field(value),
            attributes: value.clone(),
        })
    }
}

impl RemoteContact {
    /// Map one raw contact row.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            id: id_field(value, &["id"])?,
            name: name_field(value),
            attributes: value.clone(),
        })
    }
}

impl RemoteSeason {
    /// Map one raw season row.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            id: id_field(value, &["id"])?,
            name: name_field(value),
            attributes: value.clone(),
        })
    }
}

impl MembershipRow {
    /// Map one raw membership row, reading the season id through the
    /// documented field-name variants.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            contact_id: id_field(value, CONTACT_ID_FIELDS)?,
            season_id: id_field(value, SEASON_ID_FIELDS),
        })
    }
}
