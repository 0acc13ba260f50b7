//! Dynamics 365 metadata models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute (column) metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeMetadata {
    pub logical_name: String,
    pub attribute_type: AttributeType,
    pub is_valid_for_create: bool,
    pub is_valid_for_update: bool,
    /// Target entities for lookups (more than one for polymorphic lookups)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    /// Target entity -> navigation property name used in `@odata.bind` keys
    /// This comes from ManyToOneRelationships.ReferencingEntityNavigationPropertyName
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub navigation_properties: BTreeMap<String, String>,
}

impl AttributeMetadata {
    /// Whether the attribute can be written on the target at all
    pub fn is_importable(&self) -> bool {
        self.is_valid_for_create || self.is_valid_for_update
    }

    /// Navigation property for binding this lookup to a record of `target`
    pub fn navigation_property(&self, target: &str) -> Option<&str> {
        self.navigation_properties.get(target).map(String::as_str)
    }
}

/// Attribute data types in Dynamics 365
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Memo,
    Integer,
    BigInt,
    Decimal,
    Double,
    Money,
    Boolean,
    DateTime,
    Picklist,
    State,
    Status,
    Lookup,
    Customer,
    Owner,
    Uniqueidentifier,
    Other(String),
}

impl AttributeType {
    /// Parse the `AttributeType` string returned by the Web API
    pub fn from_api(value: &str) -> Self {
        match value {
            "String" => Self::String,
            "Memo" => Self::Memo,
            "Integer" => Self::Integer,
            "BigInt" => Self::BigInt,
            "Decimal" => Self::Decimal,
            "Double" => Self::Double,
            "Money" => Self::Money,
            "Boolean" => Self::Boolean,
            "DateTime" => Self::DateTime,
            "Picklist" => Self::Picklist,
            "State" => Self::State,
            "Status" => Self::Status,
            "Lookup" => Self::Lookup,
            "Customer" => Self::Customer,
            "Owner" => Self::Owner,
            "Uniqueidentifier" => Self::Uniqueidentifier,
            other => Self::Other(other.to_string()),
        }
    }

    /// Lookups are decoded as references rather than bare identifiers
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::Lookup | Self::Customer | Self::Owner)
    }

    pub fn is_option_set(&self) -> bool {
        matches!(self, Self::Picklist | Self::State | Self::Status)
    }
}

/// Many-to-many relationship metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Relationship schema name, also the navigation property used to associate
    pub schema_name: String,
    /// Logical name of the intersect (association) entity
    pub intersect_entity: String,
    pub entity1: String,
    /// Attribute on the intersect entity holding the entity1 id
    pub entity1_intersect_attribute: String,
    pub entity2: String,
    /// Attribute on the intersect entity holding the entity2 id
    pub entity2_intersect_attribute: String,
}

impl Relationship {
    /// The entity on the other side of the relationship, if `entity` takes part
    pub fn other_side(&self, entity: &str) -> Option<&str> {
        if self.entity1 == entity {
            Some(&self.entity2)
        } else if self.entity2 == entity {
            Some(&self.entity1)
        } else {
            None
        }
    }
}

/// Complete entity metadata needed to move records of one type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityTypeDescriptor {
    pub logical_name: String,
    pub schema_name: String,
    pub display_name: Option<String>,
    /// Pure association entity of a many-to-many relationship
    pub is_intersect: bool,
    /// Entity set name for OData URLs (e.g., "accounts", "adx_webpages")
    #[serde(default)]
    pub entity_set_name: Option<String>,
    /// Primary ID attribute name (e.g., "accountid")
    #[serde(default)]
    pub primary_id_attribute: Option<String>,
    /// Primary name attribute, used to label records in progress messages
    #[serde(default)]
    pub primary_name_attribute: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeMetadata>,
    #[serde(default)]
    pub many_to_many: Vec<Relationship>,
}

impl EntityTypeDescriptor {
    pub fn attribute(&self, logical_name: &str) -> Option<&AttributeMetadata> {
        self.attributes.iter().find(|a| a.logical_name == logical_name)
    }

    pub fn has_attribute(&self, logical_name: &str) -> bool {
        self.attribute(logical_name).is_some()
    }

    /// Whether any lookup of this entity can point at `target`
    pub fn has_lookup_to(&self, target: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.attribute_type.is_lookup() && a.targets.iter().any(|t| t == target))
    }
}

#[cfg(test)]
impl EntityTypeDescriptor {
    /// Bare descriptor for fixtures
    pub fn new(logical_name: impl Into<String>) -> Self {
        let logical_name = logical_name.into();
        Self {
            schema_name: logical_name.clone(),
            logical_name,
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn intersect(mut self) -> Self {
        self.is_intersect = true;
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.many_to_many.push(relationship);
        self
    }

    pub fn with_attribute(mut self, attribute: AttributeMetadata) -> Self {
        self.attributes.push(attribute);
        self
    }
}
