// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Attribute Dispatch
//!
//! The factory must pick exactly one interface variant for every combination
//! of custom-field marker, custom-relationship marker, dotted name and native
//! to-many field, following the first-match rule table.

use proptest::prelude::*;
use std::collections::HashSet;

use cim_ssot::model::ScalarKind;
use cim_ssot::store::{FieldKind, RecordSchema};
use cim_ssot::{Annotation, AttributeInterface, AttributeKind, RecordType, RelationshipSide, Shape};

// ============================================================================
// Reference Rule Table
// ============================================================================

fn rule_table(custom_field: bool, custom_relationship: bool, dotted: bool, native_many: bool) -> AttributeKind {
    match (custom_field, custom_relationship, dotted, native_many) {
        (true, _, _, _) => AttributeKind::CustomField,
        (false, true, true, _) => AttributeKind::CustomForeignKey,
        (false, false, true, _) => AttributeKind::ForeignKey,
        (false, true, false, _) => AttributeKind::CustomManyRelationship,
        (false, false, false, true) => AttributeKind::ManyRelationship,
        (false, false, false, false) => AttributeKind::Standard,
    }
}

fn widget() -> RecordType {
    RecordType::new("inventory", "widget")
}

fn widget_schema() -> RecordSchema {
    RecordSchema::new(widget())
        .field_kind("label", FieldKind::scalar())
        .field_kind("owner", FieldKind::foreign_key(widget()))
        .field_kind("members", FieldKind::ManyToMany { target: widget() })
        .with_custom_fields()
}

/// An attribute declaration exhibiting the given flags on `widget_schema`
fn declaration(custom_field: bool, custom_relationship: bool, dotted: bool, native_many: bool) -> (&'static str, Annotation) {
    let name = match (dotted, native_many) {
        (true, _) => "owner__label",
        (false, true) => "members",
        (false, false) => "label",
    };

    let mut annotation = match rule_table(custom_field, custom_relationship, dotted, native_many) {
        AttributeKind::ManyRelationship | AttributeKind::CustomManyRelationship => {
            Annotation::list(Shape::new("WidgetDict").field("label", ScalarKind::String))
        }
        _ => Annotation::optional(ScalarKind::String),
    };
    if custom_field {
        annotation = annotation.custom_field("widget_note");
    }
    if custom_relationship {
        annotation = annotation.custom_relationship("widget_links", RelationshipSide::Source);
    }
    (name, annotation)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// The classifier agrees with the reference table on every input
    #[test]
    fn prop_classify_follows_rule_table(
        custom_field in any::<bool>(),
        custom_relationship in any::<bool>(),
        dotted in any::<bool>(),
        native_many in any::<bool>(),
    ) {
        prop_assert_eq!(
            AttributeKind::classify(custom_field, custom_relationship, dotted, native_many),
            rule_table(custom_field, custom_relationship, dotted, native_many)
        );
    }

    /// Resolving a real declaration binds the interface the table selects
    #[test]
    fn prop_resolve_binds_selected_variant(
        custom_field in any::<bool>(),
        custom_relationship in any::<bool>(),
        dotted in any::<bool>(),
        native_many in any::<bool>(),
    ) {
        // A dotted name never names a native field, so it cannot also be to-many
        prop_assume!(!(dotted && native_many));

        let (name, annotation) = declaration(custom_field, custom_relationship, dotted, native_many);
        let interface = AttributeInterface::resolve(name, &annotation, &widget_schema());
        prop_assert!(interface.is_ok(), "{:?}", interface);
        let interface = interface.unwrap();

        prop_assert_eq!(interface.kind(), rule_table(custom_field, custom_relationship, dotted, native_many));
        prop_assert_eq!(interface.name(), name);
    }
}

#[test]
fn test_every_variant_is_reachable() {
    let mut seen = HashSet::new();
    for bits in 0u8..16 {
        let flag = |bit: u8| bits & (1 << bit) != 0;
        seen.insert(AttributeKind::classify(flag(0), flag(1), flag(2), flag(3)));
    }
    assert_eq!(seen.len(), 6);
}
