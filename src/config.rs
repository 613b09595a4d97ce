// Copyright (c) 2025 - Cowboy AI, Inc.
//! Synchronization run configuration

use serde::{Deserialize, Serialize};

use crate::adapter::LoadPolicy;
use crate::diff::DiffFlags;
use crate::errors::{SyncError, SyncResult};

/// Policy knobs for one synchronization run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Emit deletes for target objects missing from the source
    #[serde(default = "default_true")]
    pub delete_unmatched: bool,

    /// Ignore source objects missing from the target instead of creating them
    #[serde(default)]
    pub skip_unmatched_source: bool,

    /// Keep applying after a per-object failure
    #[serde(default = "default_true")]
    pub continue_on_failure: bool,

    /// Retry custom relationships whose peer was created later in the run
    #[serde(default = "default_true")]
    pub retry_deferred_relationships: bool,

    /// Compute the diff without writing anything
    #[serde(default)]
    pub dry_run: bool,

    /// What to do when a target record fails to load
    #[serde(default)]
    pub load_policy: LoadPolicy,
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            delete_unmatched: true,
            skip_unmatched_source: false,
            continue_on_failure: true,
            retry_deferred_relationships: true,
            dry_run: false,
            load_policy: LoadPolicy::Strict,
        }
    }
}

impl SyncConfig {
    /// Load configuration from `SSOT_*` environment variables
    pub fn from_env() -> SyncResult<Self> {
        let defaults = Self::default();
        let flag = |name: &str, default: bool| -> SyncResult<bool> {
            match std::env::var(name) {
                Ok(raw) => parse_flag(name, &raw),
                Err(_) => Ok(default),
            }
        };

        let load_policy = match std::env::var("SSOT_LOAD_POLICY") {
            Ok(raw) => parse_load_policy(&raw)?,
            Err(_) => defaults.load_policy,
        };

        Ok(Self {
            delete_unmatched: flag("SSOT_DELETE_UNMATCHED", defaults.delete_unmatched)?,
            skip_unmatched_source: flag("SSOT_SKIP_UNMATCHED_SOURCE", defaults.skip_unmatched_source)?,
            continue_on_failure: flag("SSOT_CONTINUE_ON_FAILURE", defaults.continue_on_failure)?,
            retry_deferred_relationships: flag(
                "SSOT_RETRY_DEFERRED_RELATIONSHIPS",
                defaults.retry_deferred_relationships,
            )?,
            dry_run: flag("SSOT_DRY_RUN", defaults.dry_run)?,
            load_policy,
        })
    }

    /// Diff flags implied by this configuration
    pub fn diff_flags(&self) -> DiffFlags {
        DiffFlags {
            skip_unmatched_source: self.skip_unmatched_source,
            skip_unmatched_destination: !self.delete_unmatched,
        }
    }
}

fn parse_flag(name: &str, raw: &str) -> SyncResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SyncError::Configuration(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}

fn parse_load_policy(raw: &str) -> SyncResult<LoadPolicy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "strict" => Ok(LoadPolicy::Strict),
        "permissive" => Ok(LoadPolicy::Permissive),
        other => Err(SyncError::Configuration(format!(
            "SSOT_LOAD_POLICY must be strict or permissive, got '{}'",
            other
        ))),
    }
}
