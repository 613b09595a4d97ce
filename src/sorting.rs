// Copyright (c) 2025 - Cowboy AI, Inc.
//! Sort normalization
//!
//! Backing stores give no ordering guarantee for related collections, so the
//! same set of tags may load as `[core, edge]` on one side and `[edge, core]`
//! on the other. Before diffing, every list attribute whose shape declares a
//! sort key is sorted in place on both sides. Lists without a sort key keep
//! their load order and compare order-sensitively.

use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;

use crate::adapter::Adapter;
use crate::model::TypeAnnotation;

/// Total order over JSON values: null, booleans, numbers, strings, lists, objects
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(f64::NAN)
                .total_cmp(&y.as_f64().unwrap_or(f64::NAN)),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(x, y)| compare_values(x, y))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Stable-sort shape entries by `key`
pub fn sort_by_key(entries: &mut [Value], key: &str) {
    entries.sort_by(|a, b| {
        compare_values(a.get(key).unwrap_or(&Value::Null), b.get(key).unwrap_or(&Value::Null))
    });
}

/// Sort every sort-keyed list attribute of every object in an adapter
pub fn sort_adapter(adapter: &mut Adapter) {
    let plans: Vec<(String, String, String)> = adapter
        .specs()
        .flat_map(|spec| {
            spec.annotations.iter().filter_map(move |(name, annotation)| match &annotation.ty {
                TypeAnnotation::List { shape } => shape
                    .sort_key()
                    .map(|key| (spec.kind.clone(), name.clone(), key.to_string())),
                _ => None,
            })
        })
        .collect();

    for (kind, attribute, key) in plans {
        let mut sorted = 0usize;
        for object in adapter.objects_mut(&kind) {
            if let Some(Value::Array(entries)) = object.get_mut(&attribute) {
                sort_by_key(entries, &key);
                sorted += 1;
            }
        }
        debug!(
            "Sorted {}.{} by '{}' on {} objects in {}",
            kind,
            attribute,
            key,
            sorted,
            adapter.name()
        );
    }
}

/// Normalize both sides of a synchronization before diffing
pub fn sort_relationships(source: &mut Adapter, target: &mut Adapter) {
    sort_adapter(source);
    sort_adapter(target);
}
