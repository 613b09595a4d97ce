// Copyright (c) 2025 - Cowboy AI, Inc.
//! Diff computation between two adapters
//!
//! Objects are matched by kind and unique id. A matched pair whose compared
//! attributes differ becomes an update; a source-only object a create; a
//! target-only object a delete. Elements are emitted in top-level declaration
//! order, then source registration order, with target-only objects last.
//! Children are diffed beneath their parent element.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::adapter::Adapter;
use crate::errors::{SyncError, SyncResult};
use crate::model::SyncObject;
use crate::store::{Parameters, RecordId, PATH_SEPARATOR};

/// What applying an element does to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for DiffAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = match self {
            DiffAction::Create => "create",
            DiffAction::Update => "update",
            DiffAction::Delete => "delete",
        };
        f.write_str(action)
    }
}

/// Which unmatched objects to leave alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffFlags {
    /// Emit no create for objects only present in the source
    pub skip_unmatched_source: bool,
    /// Emit no delete for objects only present in the target
    pub skip_unmatched_destination: bool,
}

/// One object's entry in a diff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffElement {
    pub kind: String,
    pub unique_id: String,
    pub identifiers: Parameters,
    /// `None` when both sides agree
    pub action: Option<DiffAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_attributes: Option<Parameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_attributes: Option<Parameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_pk: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DiffElement>,
}

impl DiffElement {
    fn from_source(object: &SyncObject, action: Option<DiffAction>) -> Self {
        Self {
            kind: object.kind.clone(),
            unique_id: object.unique_id.clone(),
            identifiers: object.identifiers.clone(),
            action,
            source_attributes: Some(object.attributes.clone()),
            target_attributes: None,
            target_pk: None,
            children: Vec::new(),
        }
    }

    /// Source attribute values that differ from the target
    pub fn changed_attributes(&self) -> Parameters {
        let Some(source) = &self.source_attributes else {
            return Parameters::new();
        };
        let target = self.target_attributes.as_ref();
        source
            .iter()
            .filter(|(name, value)| {
                target.and_then(|t| t.get(*name)).unwrap_or(&Value::Null) != *value
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Parameters an update has to write
    ///
    /// A related record is looked up from every dotted parameter sharing its
    /// first path segment, so a change to one of them carries its siblings
    /// (identifiers included) along with it.
    pub fn update_parameters(&self) -> Parameters {
        let mut parameters = self.changed_attributes();
        let heads: HashSet<String> = parameters
            .keys()
            .filter_map(|name| name.split_once(PATH_SEPARATOR))
            .map(|(head, _)| head.to_string())
            .collect();
        if heads.is_empty() {
            return parameters;
        }

        let source = self.source_attributes.iter().flatten();
        for (name, value) in self.identifiers.iter().chain(source) {
            let shares_head = name
                .split_once(PATH_SEPARATOR)
                .is_some_and(|(head, _)| heads.contains(head));
            if shares_head {
                parameters
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        parameters
    }

    /// Whether this element or any descendant changes something
    pub fn has_diffs(&self) -> bool {
        self.action.is_some() || self.children.iter().any(DiffElement::has_diffs)
    }
}

/// Per-action element counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

/// Ordered set of differences between a source and a target adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub elements: Vec<DiffElement>,
}

impl Diff {
    /// Compare `source` against `target`
    pub fn compute(source: &Adapter, target: &Adapter, flags: DiffFlags) -> SyncResult<Self> {
        let mut elements = Vec::new();
        for kind in source.top_level() {
            elements.extend(diff_kind(
                source,
                target,
                flags,
                kind,
                source.ids(kind),
                target.ids(kind),
            )?);
        }
        Ok(Self { elements })
    }

    /// Every element, depth first
    pub fn iter(&self) -> impl Iterator<Item = &DiffElement> {
        fn walk<'a>(elements: &'a [DiffElement], out: &mut Vec<&'a DiffElement>) {
            for element in elements {
                out.push(element);
                walk(&element.children, out);
            }
        }
        let mut flat = Vec::new();
        walk(&self.elements, &mut flat);
        flat.into_iter()
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for element in self.iter() {
            match element.action {
                Some(DiffAction::Create) => summary.create += 1,
                Some(DiffAction::Update) => summary.update += 1,
                Some(DiffAction::Delete) => summary.delete += 1,
                None => summary.no_change += 1,
            }
        }
        summary
    }

    pub fn has_diffs(&self) -> bool {
        self.elements.iter().any(DiffElement::has_diffs)
    }
}

fn lookup<'a>(adapter: &'a Adapter, kind: &str, unique_id: &str) -> SyncResult<&'a SyncObject> {
    adapter
        .get(kind, unique_id)
        .ok_or_else(|| SyncError::ObjectNotFound {
            kind: kind.to_string(),
            key: unique_id.to_string(),
        })
}

fn child_ids<'a>(object: Option<&'a SyncObject>, kind: &str) -> &'a [String] {
    object
        .and_then(|o| o.children.get(kind))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn diff_kind(
    source: &Adapter,
    target: &Adapter,
    flags: DiffFlags,
    kind: &str,
    source_ids: &[String],
    target_ids: &[String],
) -> SyncResult<Vec<DiffElement>> {
    let spec = source.spec(kind)?;
    let child_kinds: Vec<&String> = spec.children.keys().collect();
    let mut elements = Vec::new();

    for uid in source_ids {
        let src = lookup(source, kind, uid)?;
        let dst = target.get(kind, uid);

        let mut element = match dst {
            Some(dst) => {
                let changed = spec.attributes.iter().any(|name| {
                    src.attributes.get(name).unwrap_or(&Value::Null)
                        != dst.attributes.get(name).unwrap_or(&Value::Null)
                });
                let mut element =
                    DiffElement::from_source(src, changed.then_some(DiffAction::Update));
                element.target_attributes = Some(dst.attributes.clone());
                element.target_pk = dst.pk;
                element
            }
            None if flags.skip_unmatched_source => continue,
            None => DiffElement::from_source(src, Some(DiffAction::Create)),
        };

        for child_kind in &child_kinds {
            element.children.extend(diff_kind(
                source,
                target,
                flags,
                child_kind,
                child_ids(Some(src), child_kind),
                child_ids(dst, child_kind),
            )?);
        }
        elements.push(element);
    }

    if !flags.skip_unmatched_destination {
        let in_source: HashSet<&String> = source_ids.iter().collect();
        for uid in target_ids.iter().filter(|uid| !in_source.contains(uid)) {
            let dst = lookup(target, kind, uid)?;
            let mut element = DiffElement {
                kind: dst.kind.clone(),
                unique_id: dst.unique_id.clone(),
                identifiers: dst.identifiers.clone(),
                action: Some(DiffAction::Delete),
                source_attributes: None,
                target_attributes: Some(dst.attributes.clone()),
                target_pk: dst.pk,
                children: Vec::new(),
            };
            for child_kind in &child_kinds {
                element.children.extend(diff_kind(
                    source,
                    target,
                    flags,
                    child_kind,
                    &[],
                    child_ids(Some(dst), child_kind),
                )?);
            }
            elements.push(element);
        }
    }

    Ok(elements)
}
