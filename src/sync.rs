// Copyright (c) 2025 - Cowboy AI, Inc.
//! Synchronization pipeline
//!
//! One run is a straight line: load the target from the backing store, sort
//! both sides, diff, apply. Each object's create, update or delete runs in its
//! own transaction; a failure rolls back that object only and is reported.
//!
//! # Ordering
//!
//! - Creates and updates apply first, in declaration order, parents before
//!   children
//! - Deletes apply afterwards, in reverse declaration order, children before
//!   the parent
//! - Children of a parent whose create failed are skipped
//! - Custom relationships whose peer did not exist yet are retried once the
//!   whole diff has been applied

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::adapter::Adapter;
use crate::cache::OrmCache;
use crate::config::SyncConfig;
use crate::diff::{Diff, DiffAction, DiffElement, DiffSummary};
use crate::errors::{SyncError, SyncResult};
use crate::model::{DeferredRelationship, ModelRegistry, SyncObject};
use crate::sorting::sort_relationships;
use crate::store::{BackingStore, Parameters};

/// Step of the run an object failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
    DeferredRelationship,
}

impl From<DiffAction> for SyncOperation {
    fn from(action: DiffAction) -> Self {
        match action {
            DiffAction::Create => SyncOperation::Create,
            DiffAction::Update => SyncOperation::Update,
            DiffAction::Delete => SyncOperation::Delete,
        }
    }
}

/// One object that could not be synchronized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectFailure {
    pub kind: String,
    pub key: String,
    pub identifiers: Parameters,
    pub operation: SyncOperation,
    pub error: String,
    /// The low-level cause beneath any CRUD wrapping
    pub cause: String,
}

/// Outcome counts of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub aborted: bool,
    pub diff: DiffSummary,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub deferred_resolved: usize,
    pub deferred_failed: usize,
    pub failures: Vec<ObjectFailure>,
}

impl SyncReport {
    fn new(diff: &Diff, dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            dry_run,
            aborted: false,
            diff: diff.summary(),
            created: 0,
            updated: 0,
            deleted: 0,
            unchanged: 0,
            failed: 0,
            deferred_resolved: 0,
            deferred_failed: 0,
            failures: Vec::new(),
        }
    }

    /// Whether anything was written
    pub fn has_changes(&self) -> bool {
        self.created + self.updated + self.deleted + self.deferred_resolved > 0
    }

    /// Whether every object synchronized
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.deferred_failed == 0 && !self.aborted
    }

    fn record_failure(&mut self, element: &DiffElement, operation: SyncOperation, err: &SyncError) {
        self.failures.push(ObjectFailure {
            kind: element.kind.clone(),
            key: element.unique_id.clone(),
            identifiers: element.identifiers.clone(),
            operation,
            error: err.to_string(),
            cause: err.root_cause().to_string(),
        });
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub diff: Diff,
    /// Target graph, updated to reflect what was applied
    pub target: Adapter,
    pub report: SyncReport,
}

/// Drives a run against one backing store
pub struct Synchronizer<'a, S: BackingStore> {
    registry: &'a ModelRegistry,
    store: &'a mut S,
    cache: &'a mut OrmCache,
    config: SyncConfig,
}

impl<'a, S: BackingStore> Synchronizer<'a, S> {
    pub fn new(registry: &'a ModelRegistry, store: &'a mut S, cache: &'a mut OrmCache, config: SyncConfig) -> Self {
        Self {
            registry,
            store,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Build the target graph from the backing store
    pub fn load_target(&mut self) -> SyncResult<Adapter> {
        let mut target = Adapter::for_registry("target", self.registry).with_load_policy(self.config.load_policy);
        target.load(self.registry, &*self.store, &mut *self.cache)?;
        info!("Loaded {} target objects", target.len());
        Ok(target)
    }

    /// Load, sort, diff and (unless dry-running) apply
    pub fn run(&mut self, source: &mut Adapter) -> SyncResult<SyncOutcome> {
        let started_at = Utc::now();
        info!("Starting synchronization from {}", source.name());

        let mut target = self.load_target()?;
        sort_relationships(source, &mut target);

        let diff = Diff::compute(source, &target, self.config.diff_flags())?;
        let summary = diff.summary();
        info!(
            "Diff: {} to create, {} to update, {} to delete, {} unchanged",
            summary.create, summary.update, summary.delete, summary.no_change
        );

        let mut report = if self.config.dry_run {
            info!("Dry run, nothing will be written");
            SyncReport::new(&diff, true)
        } else {
            self.apply(&diff, &mut target)?
        };
        report.started_at = started_at;
        report.finished_at = Utc::now();

        info!(
            "Synchronization finished: {} created, {} updated, {} deleted, {} unchanged, {} failed",
            report.created, report.updated, report.deleted, report.unchanged, report.failed
        );
        Ok(SyncOutcome { diff, target, report })
    }

    /// Apply a diff to the backing store, mirroring results into `target`
    pub fn apply(&mut self, diff: &Diff, target: &mut Adapter) -> SyncResult<SyncReport> {
        let mut report = SyncReport::new(diff, false);
        let mut deferred = Vec::new();

        self.apply_upserts(&diff.elements, None, target, &mut report, &mut deferred)?;
        if !report.aborted {
            self.apply_deletes(&diff.elements, target, &mut report)?;
        }

        if report.aborted {
            warn!("Synchronization aborted after the first failure");
        } else if !deferred.is_empty() {
            self.retry_deferred(deferred, &mut report)?;
        }

        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Creates and updates, parents first, in declaration order
    fn apply_upserts(
        &mut self,
        elements: &[DiffElement],
        parent: Option<(&str, &str)>,
        target: &mut Adapter,
        report: &mut SyncReport,
        deferred: &mut Vec<DeferredRelationship>,
    ) -> SyncResult<()> {
        for element in elements {
            if report.aborted {
                break;
            }
            let this = Some((element.kind.as_str(), element.unique_id.as_str()));

            match element.action {
                Some(DiffAction::Delete) => {}
                None => {
                    report.unchanged += 1;
                    self.apply_upserts(&element.children, this, target, report, deferred)?;
                }
                Some(DiffAction::Create) => match self.create(element, parent, target) {
                    Ok(mut applied) => {
                        report.created += 1;
                        deferred.append(&mut applied);
                        self.apply_upserts(&element.children, this, target, report, deferred)?;
                    }
                    Err(err) => {
                        self.fail(element, SyncOperation::Create, &err, report);
                        skip_children(element, report);
                    }
                },
                Some(DiffAction::Update) => {
                    match self.update(element, target) {
                        Ok(mut applied) => {
                            report.updated += 1;
                            deferred.append(&mut applied);
                        }
                        Err(err) => self.fail(element, SyncOperation::Update, &err, report),
                    }
                    self.apply_upserts(&element.children, this, target, report, deferred)?;
                }
            }
        }
        Ok(())
    }

    /// Deletes, children first, in reverse declaration order
    ///
    /// Runs after every create and update so that records of later kinds stop
    /// referencing earlier ones before those are removed.
    fn apply_deletes(&mut self, elements: &[DiffElement], target: &mut Adapter, report: &mut SyncReport) -> SyncResult<()> {
        for element in elements.iter().rev() {
            if report.aborted {
                break;
            }
            match element.action {
                Some(DiffAction::Create) => {}
                Some(DiffAction::Delete) => {
                    self.apply_deletes(&element.children, target, report)?;
                    if report.aborted {
                        break;
                    }
                    match self.delete(element, target) {
                        Ok(()) => report.deleted += 1,
                        Err(err) => self.fail(element, SyncOperation::Delete, &err, report),
                    }
                }
                Some(DiffAction::Update) | None => self.apply_deletes(&element.children, target, report)?,
            }
        }
        Ok(())
    }

    fn create(
        &mut self,
        element: &DiffElement,
        parent: Option<(&str, &str)>,
        target: &mut Adapter,
    ) -> SyncResult<Vec<DeferredRelationship>> {
        let model = self.registry.get(&element.kind)?;
        let source_attributes = element.source_attributes.clone().unwrap_or_default();
        let mut parameters = element.identifiers.clone();
        parameters.extend(source_attributes.clone());

        let defer = self.config.retry_deferred_relationships;
        let cache = &mut *self.cache;
        let result = self
            .store
            .atomic(|store| model.create(store, cache, parameters, defer));
        let applied = match result {
            Ok(applied) => applied,
            Err(err) => {
                self.cache.invalidate(false);
                return Err(err);
            }
        };

        info!("Created {} '{}'", element.kind, element.unique_id);
        let object = SyncObject::new(model.spec(), element.identifiers.clone(), source_attributes)?
            .with_pk(applied.record.id);
        target.add(object)?;
        if let Some((parent_kind, parent_id)) = parent {
            target.link_child(parent_kind, parent_id, &element.kind, &element.unique_id);
        }
        Ok(applied.deferred)
    }

    fn update(&mut self, element: &DiffElement, target: &mut Adapter) -> SyncResult<Vec<DeferredRelationship>> {
        let model = self.registry.get(&element.kind)?;
        let pk = element.target_pk.ok_or_else(|| SyncError::ObjectNotFound {
            kind: element.kind.clone(),
            key: element.unique_id.clone(),
        })?;
        let changed = element.update_parameters();

        let defer = self.config.retry_deferred_relationships;
        let key = element.unique_id.as_str();
        let cache = &mut *self.cache;
        let attributes = changed.clone();
        let result = self
            .store
            .atomic(|store| model.update(store, cache, pk, key, attributes, defer));
        let applied = match result {
            Ok(applied) => applied,
            Err(err) => {
                self.cache.invalidate(false);
                return Err(err);
            }
        };

        info!(
            "Updated {} '{}' ({} attributes)",
            element.kind,
            element.unique_id,
            changed.len()
        );
        if let Some(object) = target.get_mut(&element.kind, &element.unique_id) {
            let attributes = changed
                .into_iter()
                .filter(|(name, _)| !element.identifiers.contains_key(name));
            object.attributes.extend(attributes);
        }
        Ok(applied.deferred)
    }

    fn delete(&mut self, element: &DiffElement, target: &mut Adapter) -> SyncResult<()> {
        let model = self.registry.get(&element.kind)?;
        let pk = element.target_pk.ok_or_else(|| SyncError::ObjectNotFound {
            kind: element.kind.clone(),
            key: element.unique_id.clone(),
        })?;

        let key = element.unique_id.as_str();
        let cache = &mut *self.cache;
        let result = self.store.atomic(|store| model.delete(store, cache, pk, key));
        if let Err(err) = result {
            self.cache.invalidate(false);
            return Err(err);
        }

        info!("Deleted {} '{}'", element.kind, element.unique_id);
        target.remove(&element.kind, &element.unique_id);
        Ok(())
    }

    fn fail(&mut self, element: &DiffElement, operation: SyncOperation, err: &SyncError, report: &mut SyncReport) {
        error!(
            "Failed to {:?} {} '{}': {}",
            operation, element.kind, element.unique_id, err
        );
        report.failed += 1;
        report.record_failure(element, operation, err);
        if !self.config.continue_on_failure {
            report.aborted = true;
        }
    }

    fn retry_deferred(&mut self, deferred: Vec<DeferredRelationship>, report: &mut SyncReport) -> SyncResult<()> {
        info!("Retrying {} deferred relationship assignments", deferred.len());

        for pending in deferred {
            let model = self.registry.get(&pending.kind)?;
            let cache = &mut *self.cache;
            let result = self
                .store
                .atomic(|store| model.assign_deferred(store, cache, &pending));

            match result {
                Ok(()) => {
                    report.deferred_resolved += 1;
                    info!(
                        "Resolved deferred relationship on {} '{}'",
                        pending.kind, pending.key
                    );
                }
                Err(err) => {
                    self.cache.invalidate(false);
                    error!(
                        "Deferred relationship on {} '{}' is still unresolved: {}",
                        pending.kind, pending.key, err
                    );
                    report.deferred_failed += 1;
                    report.failures.push(ObjectFailure {
                        kind: pending.kind.clone(),
                        key: pending.key.clone(),
                        identifiers: pending.parameters.clone(),
                        operation: SyncOperation::DeferredRelationship,
                        error: err.to_string(),
                        cause: err.root_cause().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Report every pending descendant of a failed create as skipped
fn skip_children(element: &DiffElement, report: &mut SyncReport) {
    for child in &element.children {
        if let Some(action) = child.action {
            let err = SyncError::ParentNotSynced {
                kind: element.kind.clone(),
                key: element.unique_id.clone(),
            };
            report.failed += 1;
            report.record_failure(child, action.into(), &err);
        }
        skip_children(child, report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_from_action() {
        assert_eq!(SyncOperation::from(DiffAction::Create), SyncOperation::Create);
        assert_eq!(SyncOperation::from(DiffAction::Delete), SyncOperation::Delete);
    }

    #[test]
    fn test_empty_report_is_clean() {
        let report = SyncReport::new(&Diff::default(), true);
        assert!(report.is_clean());
        assert!(!report.has_changes());
        assert_eq!(report.diff, DiffSummary::default());
    }
}
