//! Shorthands for building Terraform schemas

use std::collections::HashMap;
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Block, Description, Schema};

fn attribute(attr_type: AttributeType, description: &'static str, constraint: AttributeConstraint) -> Attribute {
    Attribute {
        attr_type,
        description: Description::plain(description),
        constraint,
        ..Default::default()
    }
}

pub fn required(attr_type: AttributeType, description: &'static str) -> Attribute {
    attribute(attr_type, description, AttributeConstraint::Required)
}

pub fn optional(attr_type: AttributeType, description: &'static str) -> Attribute {
    attribute(attr_type, description, AttributeConstraint::Optional)
}

pub fn computed(attr_type: AttributeType, description: &'static str) -> Attribute {
    attribute(attr_type, description, AttributeConstraint::Computed)
}

pub fn optional_computed(attr_type: AttributeType, description: &'static str) -> Attribute {
    attribute(attr_type, description, AttributeConstraint::OptionalComputed)
}

pub fn sensitive(mut attribute: Attribute) -> Attribute {
    attribute.sensitive = true;
    attribute
}

pub fn string_list() -> AttributeType {
    AttributeType::List(AttributeType::String.into())
}

/// List of objects with the given attribute types
pub fn object_list(fields: HashMap<String, AttributeType>) -> AttributeType {
    AttributeType::List(AttributeType::Object(fields).into())
}

pub fn schema(description: &'static str, attributes: HashMap<String, Attribute>) -> Schema {
    Schema {
        version: 1,
        block: Block {
            version: 1,
            description: Description::plain(description),
            attributes,
            ..Default::default()
        },
    }
}
