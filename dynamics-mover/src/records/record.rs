//! Records and record references

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AttributeValue;

/// Pointer to a record by entity logical name and id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityReference {
    /// Entity logical name (e.g., "adx_webpage")
    pub entity_type: String,
    /// Record id
    pub id: Uuid,
}

impl EntityReference {
    pub fn new(entity_type: impl Into<String>, id: Uuid) -> Self {
        EntityReference {
            entity_type: entity_type.into(),
            id,
        }
    }
}

impl std::fmt::Display for EntityReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

/// One entity instance being migrated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Entity logical name
    pub entity_type: String,
    /// Record id, preserved between source and target
    pub id: Uuid,
    /// Attribute values by logical name
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Record {
    /// Create a record without attributes
    pub fn new(entity_type: impl Into<String>, id: Uuid) -> Self {
        Record {
            entity_type: entity_type.into(),
            id,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Reference to this record
    pub fn to_reference(&self) -> EntityReference {
        EntityReference::new(self.entity_type.clone(), self.id)
    }

    /// Lookup value of an attribute, if it is one
    pub fn reference(&self, name: &str) -> Option<&EntityReference> {
        self.get(name).and_then(AttributeValue::as_reference)
    }

    /// Bare identifier value of an attribute, if it is one
    pub fn identifier(&self, name: &str) -> Option<Uuid> {
        self.get(name).and_then(AttributeValue::as_identifier)
    }

    /// All lookup attributes with their names
    pub fn references(&self) -> impl Iterator<Item = (&str, &EntityReference)> {
        self.attributes
            .iter()
            .filter_map(|(name, value)| value.as_reference().map(|r| (name.as_str(), r)))
    }

    /// All bare identifier values
    pub fn identifiers(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.attributes.values().filter_map(AttributeValue::as_identifier)
    }

    /// Move every lookup attribute into a new reference-only fragment
    ///
    /// The fragment carries the same identity. Returns `None` (and leaves the
    /// record untouched) when there is no lookup to move.
    pub fn split_references(&mut self) -> Option<Record> {
        let names: Vec<String> = self
            .attributes
            .iter()
            .filter(|(_, value)| value.is_reference())
            .map(|(name, _)| name.clone())
            .collect();

        if names.is_empty() {
            return None;
        }

        let mut fragment = Record::new(self.entity_type.clone(), self.id);
        for name in names {
            if let Some(value) = self.attributes.remove(&name) {
                fragment.attributes.insert(name, value);
            }
        }

        Some(fragment)
    }

    /// Union another record's attributes into this one; values from `other` win
    pub fn merge_from(&mut self, other: Record) {
        self.attributes.extend(other.attributes);
    }

    /// Human-readable label for progress messages
    ///
    /// Uses the primary name attribute when it holds a string, else the id.
    pub fn label(&self, primary_name_attribute: Option<&str>) -> String {
        primary_name_attribute
            .and_then(|name| self.get(name))
            .and_then(AttributeValue::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_references_moves_lookups_only() {
        let parent = Uuid::new_v4();
        let mut record = Record::new("adx_webpage", Uuid::new_v4())
            .with("adx_name", AttributeValue::string("About"))
            .with("adx_parentpageid", AttributeValue::reference("adx_webpage", parent));

        let fragment = record.split_references().unwrap();

        assert_eq!(fragment.id, record.id);
        assert_eq!(fragment.entity_type, "adx_webpage");
        assert_eq!(fragment.len(), 1);
        assert_eq!(
            fragment.reference("adx_parentpageid").map(|r| r.id),
            Some(parent)
        );
        assert_eq!(record.len(), 1);
        assert!(record.contains("adx_name"));
    }

    #[test]
    fn test_split_without_references() {
        let mut record =
            Record::new("contact", Uuid::new_v4()).with("fullname", AttributeValue::string("Jo"));
        assert!(record.split_references().is_none());
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_merge_is_union_with_later_values_winning() {
        let id = Uuid::new_v4();
        let mut first = Record::new("account", id)
            .with("name", AttributeValue::string("old"))
            .with("a", AttributeValue::int(1));
        let second = Record::new("account", id)
            .with("name", AttributeValue::string("new"))
            .with("b", AttributeValue::int(2));

        first.merge_from(second);

        assert_eq!(first.len(), 3);
        assert_eq!(first.get("name").and_then(|v| v.as_str()), Some("new"));
    }

    #[test]
    fn test_label_falls_back_to_id() {
        let record = Record::new("account", Uuid::new_v4()).with("name", AttributeValue::int(3));
        assert_eq!(record.label(Some("name")), record.id.to_string());
        assert_eq!(record.label(None), record.id.to_string());

        let named = Record::new("account", Uuid::new_v4()).with("name", AttributeValue::string("Contoso"));
        assert_eq!(named.label(Some("name")), "Contoso");
    }
}
