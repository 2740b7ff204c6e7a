//! Ownership-aware merge of two snapshots of the same world taken at
//! different rollback horizons.
//!
//! Snapshots are walked as JSON values. An object carrying an `"owner"` key is
//! an owned entity: the recipient's own entities come from the owner horizon,
//! everybody else's from the non-owner horizon. Everything that is not owned
//! comes from the owner horizon.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::net::OwnerId;
use crate::simulation::Snapshot;

const OWNER_KEY: &str = "owner";

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("failed to encode snapshot for merging: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("merged snapshot does not decode: {0}")]
    Decode(#[source] serde_json::Error),
}

pub fn merge_snapshots<S: Snapshot>(
    owner_horizon: &S,
    non_owner_horizon: &S,
    recipient: Option<OwnerId>,
) -> Result<S, MergeError> {
    let owner_value = serde_json::to_value(owner_horizon).map_err(MergeError::Encode)?;
    let non_owner_value = serde_json::to_value(non_owner_horizon).map_err(MergeError::Encode)?;
    let merged = merge_values(owner_value, non_owner_value, recipient);
    serde_json::from_value(merged).map_err(MergeError::Decode)
}

pub fn merge_values(
    owner_horizon: Value,
    non_owner_horizon: Value,
    recipient: Option<OwnerId>,
) -> Value {
    match (owner_horizon, non_owner_horizon) {
        (Value::Object(owner_map), Value::Object(non_owner_map)) => {
            if is_owned(&owner_map) {
                if is_owned_by(&owner_map, recipient) {
                    Value::Object(owner_map)
                } else {
                    Value::Object(non_owner_map)
                }
            } else {
                Value::Object(merge_objects(owner_map, non_owner_map, recipient))
            }
        }
        (Value::Array(owner_items), Value::Array(non_owner_items))
            if is_owned_array(&owner_items, &non_owner_items) =>
        {
            Value::Array(merge_owned_arrays(owner_items, non_owner_items, recipient))
        }
        (owner_value, _) => owner_value,
    }
}

fn merge_objects(
    owner_map: Map<String, Value>,
    mut non_owner_map: Map<String, Value>,
    recipient: Option<OwnerId>,
) -> Map<String, Value> {
    let mut merged = Map::new();
    for (key, owner_value) in owner_map {
        let value = match non_owner_map.remove(&key) {
            Some(non_owner_value) => Some(merge_values(owner_value, non_owner_value, recipient)),
            None => without_foreign_entities(owner_value, recipient),
        };
        if let Some(value) = value {
            merged.insert(key, value);
        }
    }

    // Another participant's entity that only exists at the older horizon.
    for (key, non_owner_value) in non_owner_map {
        if let Value::Object(entity) = &non_owner_value
            && is_owned(entity)
            && !is_owned_by(entity, recipient)
        {
            merged.insert(key, non_owner_value);
        }
    }
    merged
}

/// A value that only exists at the owner horizon, minus the entities of
/// other participants, which may not be shown at that horizon.
fn without_foreign_entities(value: Value, recipient: Option<OwnerId>) -> Option<Value> {
    match value {
        Value::Object(entity) if is_owned(&entity) => {
            is_owned_by(&entity, recipient).then_some(Value::Object(entity))
        }
        Value::Object(map) => Some(Value::Object(
            map.into_iter()
                .filter_map(|(key, value)| {
                    without_foreign_entities(value, recipient).map(|value| (key, value))
                })
                .collect(),
        )),
        Value::Array(items) if is_owned_array(&items, &[]) => Some(Value::Array(
            items
                .into_iter()
                .filter(|item| item_owned_by(item, recipient))
                .collect(),
        )),
        other => Some(other),
    }
}

fn merge_owned_arrays(
    owner_items: Vec<Value>,
    non_owner_items: Vec<Value>,
    recipient: Option<OwnerId>,
) -> Vec<Value> {
    let mut merged: Vec<Value> = owner_items
        .into_iter()
        .filter(|item| item_owned_by(item, recipient))
        .chain(
            non_owner_items
                .into_iter()
                .filter(|item| !item_owned_by(item, recipient)),
        )
        .collect();
    merged.sort_by(|a, b| compare_owners(owner_of(a), owner_of(b)));
    merged
}

fn is_owned(entity: &Map<String, Value>) -> bool {
    entity.contains_key(OWNER_KEY)
}

fn is_owned_by(entity: &Map<String, Value>, recipient: Option<OwnerId>) -> bool {
    match (entity.get(OWNER_KEY).and_then(Value::as_u64), recipient) {
        (Some(owner), Some(recipient)) => owner == recipient.0,
        _ => false,
    }
}

fn item_owned_by(item: &Value, recipient: Option<OwnerId>) -> bool {
    item.as_object()
        .is_some_and(|entity| is_owned_by(entity, recipient))
}

fn is_owned_array(owner_items: &[Value], non_owner_items: &[Value]) -> bool {
    let mut items = owner_items.iter().chain(non_owner_items).peekable();
    items.peek().is_some()
        && items.all(|item| item.as_object().is_some_and(is_owned))
}

fn owner_of(item: &Value) -> &Value {
    item.get(OWNER_KEY).unwrap_or(&Value::Null)
}

/// Orders owner values as null, then numbers, then strings, then anything
/// else.
fn compare_owners(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            _ => 3,
        }
    }

    rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
        (Value::Number(a), Value::Number(b)) => match (a.as_u64(), b.as_u64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a
                .as_f64()
                .unwrap_or(0.0)
                .total_cmp(&b.as_f64().unwrap_or(0.0)),
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => Ordering::Equal,
    })
}
