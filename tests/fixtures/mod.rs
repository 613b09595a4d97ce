// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-ssot
//!
//! Provides a small, deterministic DCIM/IPAM source of truth and the model
//! declarations the integration tests synchronize against it.
//!
//! # Design Principles
//! - Every seeded record has a fixed primary key (no `Uuid::now_v7()`)
//! - Schemas, relationships and models are declared here and nowhere else
//! - Tests describe source objects as JSON parameter maps

#![allow(dead_code)]

use serde_json::Value;
use uuid::Uuid;

use cim_ssot::model::ScalarKind;
use cim_ssot::store::{FieldKind, RecordSchema};
use cim_ssot::{
    Adapter, Annotation, BackingStore, InMemoryStore, ModelRegistry, ModelSpec, Parameters,
    Record, RecordType, RelationshipKind, RelationshipSide, Shape, SyncObject,
};

// Fixed primary keys (UUID v7 format, but deterministic for testing)
pub const STATUS_ACTIVE_ID: &str = "01934f4a-0001-7000-8000-000000000001";
pub const STATUS_PLANNED_ID: &str = "01934f4a-0002-7000-8000-000000000002";

pub const ROLE_ROUTER_ID: &str = "01934f4a-1001-7000-8000-000000001001";
pub const ROLE_SWITCH_ID: &str = "01934f4a-1002-7000-8000-000000001002";

pub const LOCATION_DC1_ID: &str = "01934f4a-2001-7000-8000-000000002001";
pub const LOCATION_DC2_ID: &str = "01934f4a-2002-7000-8000-000000002002";

pub const TAG_CORE_ID: &str = "01934f4a-3001-7000-8000-000000003001";
pub const TAG_EDGE_ID: &str = "01934f4a-3002-7000-8000-000000003002";
pub const TAG_MGMT_ID: &str = "01934f4a-3003-7000-8000-000000003003";

pub const DEVICE_EDGE01_ID: &str = "01934f4a-4001-7000-8000-000000004001";

/// Relationship between VRFs (source) and the prefixes they hold (destination)
pub const VRF_PREFIXES: &str = "vrf_prefixes";

/// Parse a fixed UUID from a constant string
pub fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).expect("Invalid UUID in test fixture")
}

/// A new record with a fixed primary key
pub fn record(record_type: RecordType, id: &str) -> Record {
    Record {
        id: parse_uuid(id),
        ..Record::new(record_type)
    }
}

/// Build lookup parameters from a JSON object
pub fn params(value: Value) -> Parameters {
    serde_json::from_value(value).expect("Fixture parameters must be a JSON object")
}

// ============================================================================
// Record types
// ============================================================================

pub fn status() -> RecordType {
    RecordType::new("extras", "status")
}

pub fn role() -> RecordType {
    RecordType::new("dcim", "role")
}

pub fn location() -> RecordType {
    RecordType::new("dcim", "location")
}

pub fn tag() -> RecordType {
    RecordType::new("extras", "tag")
}

pub fn device() -> RecordType {
    RecordType::new("dcim", "device")
}

pub fn interface() -> RecordType {
    RecordType::new("dcim", "interface")
}

pub fn vrf() -> RecordType {
    RecordType::new("ipam", "vrf")
}

pub fn prefix() -> RecordType {
    RecordType::new("ipam", "prefix")
}

pub fn ip_address() -> RecordType {
    RecordType::new("ipam", "ipaddress")
}

fn named(record_type: RecordType) -> RecordSchema {
    RecordSchema::new(record_type)
        .field_kind("name", FieldKind::required_scalar())
        .unique(&["name"])
}

/// Register every schema and relationship, without any records
pub fn empty_store() -> InMemoryStore {
    let mut store = InMemoryStore::new();

    store.register_schema(named(status()).field_kind("color", FieldKind::scalar()));
    store.register_schema(named(role()));
    store.register_schema(named(tag()));
    store.register_schema(named(location()).field_kind("parent", FieldKind::foreign_key(location())));
    store.register_schema(
        RecordSchema::new(device())
            .field_kind("name", FieldKind::required_scalar())
            .field_kind("location", FieldKind::required_foreign_key(location()))
            .field_kind("role", FieldKind::foreign_key(role()))
            .field_kind("status", FieldKind::foreign_key(status()))
            .field_kind("serial", FieldKind::scalar())
            .field_kind("tags", FieldKind::ManyToMany { target: tag() })
            .field_kind(
                "interfaces",
                FieldKind::OneToMany {
                    target: interface(),
                    via: "device".to_string(),
                },
            )
            .with_custom_fields()
            .unique(&["name", "location"]),
    );
    store.register_schema(
        RecordSchema::new(interface())
            .field_kind("name", FieldKind::required_scalar())
            .field_kind("device", FieldKind::required_foreign_key(device()))
            .field_kind("description", FieldKind::scalar())
            .unique(&["device", "name"]),
    );
    store.register_schema(named(vrf()));
    store.register_schema(
        RecordSchema::new(prefix())
            .field_kind("network", FieldKind::required_scalar())
            .unique(&["network"]),
    );
    store.register_schema(
        RecordSchema::new(ip_address())
            .field_kind("address", FieldKind::required_scalar())
            .field_kind("assigned_object", FieldKind::GenericForeignKey { required: false })
            .unique(&["address"]),
    );

    store
        .define_relationship(VRF_PREFIXES, RelationshipKind::OneToMany, &vrf(), &prefix())
        .expect("Failed to define relationship fixture");
    store
}

/// Schemas plus the reference data every scenario starts from
///
/// Statuses Active/Planned, roles Router/Switch, locations DC1/DC2 and tags
/// core/edge/mgmt.
pub fn dcim_store() -> InMemoryStore {
    let mut store = empty_store();
    let seed = [
        (status(), STATUS_ACTIVE_ID, "Active"),
        (status(), STATUS_PLANNED_ID, "Planned"),
        (role(), ROLE_ROUTER_ID, "Router"),
        (role(), ROLE_SWITCH_ID, "Switch"),
        (location(), LOCATION_DC1_ID, "DC1"),
        (location(), LOCATION_DC2_ID, "DC2"),
        (tag(), TAG_CORE_ID, "core"),
        (tag(), TAG_EDGE_ID, "edge"),
        (tag(), TAG_MGMT_ID, "mgmt"),
    ];
    for (record_type, id, name) in seed {
        store
            .save(record(record_type, id).with_value("name", name))
            .expect("Failed to seed reference record");
    }
    store.reset_reads();
    store
}

/// Fetch exactly one record or panic
pub fn find(store: &InMemoryStore, record_type: &RecordType, parameters: Value) -> Record {
    store
        .get(record_type, &params(parameters))
        .expect("Fixture lookup must match exactly one record")
}

/// Seed `edge01` in DC1 with the given role
pub fn seed_edge01(store: &mut InMemoryStore, role_name: &str) -> Record {
    let dc1 = find(store, &location(), serde_json::json!({"name": "DC1"}));
    let role = find(store, &role(), serde_json::json!({"name": role_name}));
    store
        .save(
            record(device(), DEVICE_EDGE01_ID)
                .with_value("name", "edge01")
                .with_relation("location", &dc1)
                .with_relation("role", &role),
        )
        .expect("Failed to seed device")
}

/// Seed an interface on a device
pub fn seed_interface(store: &mut InMemoryStore, device: &Record, name: &str) -> Record {
    store
        .save(
            Record::new(interface())
                .with_value("name", name)
                .with_relation("device", device),
        )
        .expect("Failed to seed interface")
}

pub fn seed_vrf(store: &mut InMemoryStore, name: &str) -> Record {
    store
        .save(Record::new(vrf()).with_value("name", name))
        .expect("Failed to seed VRF")
}

pub fn seed_prefix(store: &mut InMemoryStore, network: &str) -> Record {
    store
        .save(Record::new(prefix()).with_value("network", network))
        .expect("Failed to seed prefix")
}

// ============================================================================
// Model declarations
// ============================================================================

pub fn status_spec() -> ModelSpec {
    ModelSpec::new("status", status())
        .identifier("name", Annotation::string())
        .attribute("color", Annotation::optional(ScalarKind::String))
}

pub fn role_spec() -> ModelSpec {
    ModelSpec::new("role", role()).identifier("name", Annotation::string())
}

pub fn tag_shape() -> Shape {
    Shape::new("TagDict").sort_field("name", ScalarKind::String)
}

pub fn device_spec() -> ModelSpec {
    ModelSpec::new("device", device())
        .identifier("name", Annotation::string())
        .identifier("location__name", Annotation::string())
        .attribute("role__name", Annotation::optional(ScalarKind::String))
        .attribute("status__name", Annotation::optional(ScalarKind::String))
        .attribute("serial", Annotation::optional(ScalarKind::String))
        .attribute("tags", Annotation::list(tag_shape()))
        .attribute(
            "owner",
            Annotation::optional(ScalarKind::String).custom_field("owner"),
        )
        .child("interface", "interfaces")
}

pub fn interface_spec() -> ModelSpec {
    ModelSpec::new("interface", interface())
        .identifier("name", Annotation::string())
        .identifier("device__name", Annotation::string())
        .attribute("description", Annotation::optional(ScalarKind::String))
}

pub fn location_spec() -> ModelSpec {
    ModelSpec::new("location", location())
        .identifier("name", Annotation::string())
        .attribute("parent__name", Annotation::optional(ScalarKind::String))
        .attribute("parent__parent__name", Annotation::optional(ScalarKind::String))
        .attribute(
            "parent__parent__parent__name",
            Annotation::optional(ScalarKind::String),
        )
}

pub fn prefix_shape() -> Shape {
    Shape::new("PrefixDict").sort_field("network", ScalarKind::String)
}

/// VRF with the prefixes it holds, read from the source side
pub fn vrf_spec() -> ModelSpec {
    ModelSpec::new("vrf", vrf())
        .identifier("name", Annotation::string())
        .attribute(
            "prefixes",
            Annotation::list(prefix_shape())
                .custom_relationship(VRF_PREFIXES, RelationshipSide::Source),
        )
}

/// VRF without relationship attributes
pub fn bare_vrf_spec() -> ModelSpec {
    ModelSpec::new("vrf", vrf()).identifier("name", Annotation::string())
}

/// Prefix with its VRF name, read from the destination side
pub fn prefix_spec() -> ModelSpec {
    ModelSpec::new("prefix", prefix())
        .identifier("network", Annotation::string())
        .attribute(
            "vrf__name",
            Annotation::optional(ScalarKind::String)
                .custom_relationship(VRF_PREFIXES, RelationshipSide::Destination),
        )
}

/// Prefix with its VRF as a single shaped object
pub fn prefix_object_spec() -> ModelSpec {
    ModelSpec::new("prefix", prefix())
        .identifier("network", Annotation::string())
        .attribute(
            "vrf",
            Annotation::shape(Shape::new("VrfDict").field("name", ScalarKind::String))
                .custom_relationship(VRF_PREFIXES, RelationshipSide::Destination),
        )
}

pub fn ip_address_spec() -> ModelSpec {
    ModelSpec::new("ip_address", ip_address())
        .identifier("address", Annotation::string())
        .attribute(
            "assigned_object__app_label",
            Annotation::optional(ScalarKind::String),
        )
        .attribute("assigned_object__model", Annotation::optional(ScalarKind::String))
        .attribute("assigned_object__name", Annotation::optional(ScalarKind::String))
}

/// Register `specs` against `store` with the given top-level load order
pub fn registry(store: &InMemoryStore, top_level: &[&str], specs: Vec<ModelSpec>) -> ModelRegistry {
    ModelRegistry::register(
        top_level.iter().map(|kind| kind.to_string()).collect(),
        specs,
        store,
    )
    .expect("Fixture models must register")
}

/// Build a source object from a JSON parameter map
pub fn object(registry: &ModelRegistry, kind: &str, parameters: Value) -> SyncObject {
    let spec = registry.get(kind).expect("Unknown fixture kind").spec();
    SyncObject::from_parameters(spec, params(parameters)).expect("Invalid fixture object")
}

/// An empty source adapter declaring every model of `registry`
pub fn source(registry: &ModelRegistry) -> Adapter {
    Adapter::for_registry("source", registry)
}
