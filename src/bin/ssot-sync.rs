// Copyright (c) 2025 - Cowboy AI, Inc.
//! Source-of-Truth Sync Runner
//!
//! Runs one synchronization described by a JSON bundle against an in-memory
//! source of truth and prints the run report.
//!
//! Run with: SSOT_BUNDLE=bundle.json cargo run --bin ssot-sync
//!
//! Environment:
//! - `SSOT_BUNDLE`: path to the bundle (required)
//! - `SSOT_OUTPUT`: where to write the resulting store snapshot (optional)
//! - `SSOT_DELETE_UNMATCHED`, `SSOT_SKIP_UNMATCHED_SOURCE`,
//!   `SSOT_CONTINUE_ON_FAILURE`, `SSOT_RETRY_DEFERRED_RELATIONSHIPS`,
//!   `SSOT_DRY_RUN`, `SSOT_LOAD_POLICY`: run policy
//!
//! Bundle layout:
//!
//! ```json
//! {
//!   "target": { "schemas": [...], "records": [...] },
//!   "relationships": [
//!     { "label": "vrf_prefixes", "type": "one-to-many",
//!       "source_type": "ipam.vrf", "destination_type": "ipam.prefix" }
//!   ],
//!   "top_level": ["status", "device"],
//!   "models": [ { "kind": "status", "record_type": "extras.status", ... } ],
//!   "source": [
//!     { "kind": "status", "parameters": { "name": "Active" } },
//!     { "kind": "interface", "parent": { "kind": "device", "unique_id": "edge01" },
//!       "parameters": { "name": "eth0", "device__name": "edge01" } }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use cim_ssot::{
    store::{BackingStore, StoreSnapshot},
    Adapter, InMemoryStore, ModelRegistry, ModelSpec, OrmCache, Parameters, RecordType,
    RelationshipKind, SyncConfig, SyncObject, Synchronizer,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

/// Everything one run needs
#[derive(Debug, Deserialize)]
struct SyncBundle {
    #[serde(default)]
    target: StoreSnapshot,
    #[serde(default)]
    relationships: Vec<RelationshipDeclaration>,
    top_level: Vec<String>,
    models: Vec<ModelSpec>,
    #[serde(default)]
    source: Vec<SourceObject>,
}

#[derive(Debug, Deserialize)]
struct RelationshipDeclaration {
    label: String,
    #[serde(rename = "type")]
    kind: RelationshipKind,
    source_type: RecordType,
    destination_type: RecordType,
}

#[derive(Debug, Deserialize)]
struct ParentRef {
    kind: String,
    unique_id: String,
}

#[derive(Debug, Deserialize)]
struct SourceObject {
    kind: String,
    #[serde(default)]
    parent: Option<ParentRef>,
    parameters: Parameters,
}

fn build_store(bundle: &mut SyncBundle) -> Result<InMemoryStore> {
    let snapshot = std::mem::take(&mut bundle.target);
    let mut store = InMemoryStore::from_snapshot(snapshot).context("Failed to load target snapshot")?;

    for relationship in &bundle.relationships {
        let mut by_label = Parameters::new();
        by_label.insert("label".to_string(), Value::from(relationship.label.as_str()));
        if !store
            .filter(&cim_ssot::store::builtin::relationship(), &by_label)?
            .is_empty()
        {
            continue;
        }
        store
            .define_relationship(
                &relationship.label,
                relationship.kind,
                &relationship.source_type,
                &relationship.destination_type,
            )
            .with_context(|| format!("Failed to define relationship '{}'", relationship.label))?;
        info!("🔗 Defined relationship '{}' ({})", relationship.label, relationship.kind);
    }

    Ok(store)
}

fn build_source(bundle: &SyncBundle, registry: &ModelRegistry) -> Result<Adapter> {
    let mut source = Adapter::for_registry("source", registry);
    for declared in &bundle.source {
        let spec = registry.get(&declared.kind)?.spec();
        let object = SyncObject::from_parameters(spec, declared.parameters.clone())
            .with_context(|| format!("Invalid source object of kind '{}'", declared.kind))?;
        match &declared.parent {
            Some(parent) => source.add_child(&parent.kind, &parent.unique_id, object)?,
            None => source.add(object)?,
        }
    }
    Ok(source)
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Starting source-of-truth sync");

    let config = SyncConfig::from_env().context("Invalid SSOT_* configuration")?;
    let bundle_path = std::env::var("SSOT_BUNDLE").context("SSOT_BUNDLE not set")?;
    info!("📋 Configuration loaded:");
    info!("  - Bundle: {}", bundle_path);
    info!("  - Delete unmatched: {}", config.delete_unmatched);
    info!("  - Dry run: {}", config.dry_run);

    let raw = std::fs::read_to_string(&bundle_path)
        .with_context(|| format!("Failed to read {}", bundle_path))?;
    let mut bundle: SyncBundle = serde_json::from_str(&raw).context("Failed to parse bundle")?;

    let mut store = build_store(&mut bundle)?;
    let registry = ModelRegistry::register(bundle.top_level.clone(), bundle.models.clone(), &store)
        .context("Failed to register models")?;
    let mut source = build_source(&bundle, &registry)?;
    info!("✅ Source adapter holds {} objects", source.len());

    let mut cache = OrmCache::new();
    let outcome = Synchronizer::new(&registry, &mut store, &mut cache, config)
        .run(&mut source)
        .context("Synchronization failed")?;

    if !outcome.report.is_clean() {
        warn!("⚠️  {} objects failed to synchronize", outcome.report.failures.len());
    }
    info!("📊 Cache served {} lookups", cache.total_hits());
    println!("{}", serde_json::to_string_pretty(&outcome.report)?);

    if let Ok(path) = std::env::var("SSOT_OUTPUT") {
        let snapshot = serde_json::to_string_pretty(&store.snapshot())?;
        std::fs::write(&path, snapshot).with_context(|| format!("Failed to write {}", path))?;
        info!("💾 Wrote store snapshot to {}", path);
    }

    Ok(())
}
