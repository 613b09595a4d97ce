// Copyright (c) 2025 - Cowboy AI, Inc.
//! Content-Type Registry Lookups
//!
//! Generic relations and custom relationships name their endpoints by content
//! type (`app_label`, `model`). These helpers turn content-type records back
//! into concrete [`RecordType`]s, going through the run's [`OrmCache`].

use serde_json::Value;

use crate::cache::OrmCache;
use crate::errors::{SyncError, SyncResult};
use crate::store::{builtin, BackingStore, Parameters, Record, RecordId, RecordType};

/// Concrete record type a content-type record stands for
pub fn record_type_of(content_type: &Record) -> SyncResult<RecordType> {
    match (
        content_type.str_value("app_label"),
        content_type.str_value("model"),
    ) {
        (Some(app_label), Some(model)) => Ok(RecordType::new(app_label, model)),
        _ => Err(SyncError::Configuration(format!(
            "Content type {} is missing app_label or model",
            content_type.id
        ))),
    }
}

/// Resolve `(app_label, model)` to a registered record type
pub fn lookup<S>(
    store: &S,
    cache: &mut OrmCache,
    app_label: &str,
    model: &str,
) -> SyncResult<RecordType>
where
    S: BackingStore + ?Sized,
{
    let mut parameters = Parameters::new();
    parameters.insert("app_label".to_string(), Value::from(app_label));
    parameters.insert("model".to_string(), Value::from(model));

    match cache.get_or_fetch(store, &builtin::content_type(), &parameters) {
        Ok(content_type) => record_type_of(&content_type),
        Err(SyncError::NotFound { .. }) => Err(SyncError::UnknownContentType {
            app_label: app_label.to_string(),
            model: model.to_string(),
        }),
        Err(err) => Err(err),
    }
}

/// Resolve a content-type record id to its record type
pub fn by_id<S>(store: &S, cache: &mut OrmCache, id: RecordId) -> SyncResult<RecordType>
where
    S: BackingStore + ?Sized,
{
    let mut parameters = Parameters::new();
    parameters.insert("id".to_string(), Value::String(id.to_string()));
    let content_type = cache.get_or_fetch(store, &builtin::content_type(), &parameters)?;
    record_type_of(&content_type)
}
