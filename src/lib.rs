// Copyright (c) 2025 - Cowboy AI, Inc.
//! Source-of-truth synchronization for the Composable Information Machine
//!
//! This crate reconciles an external inventory (a discovery tool, a CMDB, a
//! network management platform) against a relational source of truth. It
//! provides declarative synchronizable models, reflective attribute loading,
//! a per-run lookup cache, graph diffing and transactional apply.
//!
//! ```text
//! source adapter ─┐
//!                 ├─ sort ─ diff ─ apply ─▶ backing store
//! target adapter ─┘                 ▲
//!       ▲                           │
//!       └──── load (OrmCache) ──────┘
//! ```

pub mod adapter;
pub mod attributes;
pub mod cache;
pub mod config;
pub mod content_type;
pub mod diff;
pub mod errors;
pub mod model;
pub mod relationship;
pub mod sorting;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use adapter::{Adapter, LoadPolicy};
pub use attributes::{AttributeInterface, AttributeKind};
pub use cache::OrmCache;
pub use config::SyncConfig;
pub use diff::{Diff, DiffAction, DiffElement, DiffFlags, DiffSummary};
pub use errors::{SyncError, SyncResult};
pub use model::{Annotation, ModelRegistry, ModelSpec, ScalarKind, Shape, SyncModel, SyncObject};
pub use relationship::{RelationshipKind, RelationshipSide};
pub use store::{BackingStore, InMemoryStore, Parameters, Record, RecordRef, RecordType};
pub use sync::{SyncOutcome, SyncReport, Synchronizer};
