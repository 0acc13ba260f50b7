//! Parsing of the Web API `EntityDefinitions` response into an [`EntityCatalog`]

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use super::{AttributeMetadata, AttributeType, EntityCatalog, EntityTypeDescriptor, Relationship};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEntity {
    logical_name: String,
    #[serde(default)]
    schema_name: Option<String>,
    #[serde(default)]
    entity_set_name: Option<String>,
    #[serde(default)]
    primary_id_attribute: Option<String>,
    #[serde(default)]
    primary_name_attribute: Option<String>,
    #[serde(default)]
    is_intersect: Option<bool>,
    #[serde(default)]
    display_name: Option<RawLabel>,
    #[serde(default)]
    attributes: Vec<RawAttribute>,
    #[serde(default)]
    many_to_many_relationships: Vec<RawManyToMany>,
    #[serde(default)]
    many_to_one_relationships: Vec<RawManyToOne>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawLabel {
    #[serde(default)]
    user_localized_label: Option<RawLocalizedLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawLocalizedLabel {
    label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAttribute {
    logical_name: String,
    #[serde(default)]
    attribute_type: Option<String>,
    #[serde(default)]
    is_valid_for_create: Option<bool>,
    #[serde(default)]
    is_valid_for_update: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawManyToMany {
    schema_name: String,
    intersect_entity_name: String,
    entity1_logical_name: String,
    entity1_intersect_attribute: String,
    entity2_logical_name: String,
    entity2_intersect_attribute: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawManyToOne {
    referencing_attribute: String,
    referenced_entity: String,
    #[serde(default)]
    referencing_entity_navigation_property_name: Option<String>,
}

/// Build the catalog from an `EntityDefinitions` response
///
/// Accepts either the collection envelope (`{"value": [...]}`) or a bare array.
/// Lookup targets and navigation properties come from the many-to-one
/// relationships, since `Targets` is not part of the base attribute metadata.
pub fn parse_entity_definitions(json: &Value) -> Result<EntityCatalog> {
    let items = json
        .get("value")
        .unwrap_or(json)
        .as_array()
        .context("EntityDefinitions response is not an array")?;

    let mut entities = Vec::with_capacity(items.len());
    for item in items {
        let raw: RawEntity = serde_json::from_value(item.clone())
            .context("Failed to parse entity definition")?;
        entities.push(convert_entity(raw));
    }

    log::debug!("Parsed {} entity definitions", entities.len());
    Ok(EntityCatalog::new(entities))
}

fn convert_entity(raw: RawEntity) -> EntityTypeDescriptor {
    let mut targets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut navigation: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    for rel in &raw.many_to_one_relationships {
        let entry = targets.entry(rel.referencing_attribute.clone()).or_default();
        if !entry.contains(&rel.referenced_entity) {
            entry.push(rel.referenced_entity.clone());
        }
        if let Some(nav) = &rel.referencing_entity_navigation_property_name {
            navigation
                .entry(rel.referencing_attribute.clone())
                .or_default()
                .insert(rel.referenced_entity.clone(), nav.clone());
        }
    }

    let attributes = raw
        .attributes
        .into_iter()
        .map(|a| AttributeMetadata {
            attribute_type: a
                .attribute_type
                .as_deref()
                .map(AttributeType::from_api)
                .unwrap_or_else(|| AttributeType::Other(String::new())),
            is_valid_for_create: a.is_valid_for_create.unwrap_or(false),
            is_valid_for_update: a.is_valid_for_update.unwrap_or(false),
            targets: targets.remove(&a.logical_name).unwrap_or_default(),
            navigation_properties: navigation.remove(&a.logical_name).unwrap_or_default(),
            logical_name: a.logical_name,
        })
        .collect();

    let many_to_many = raw
        .many_to_many_relationships
        .into_iter()
        .map(|r| Relationship {
            schema_name: r.schema_name,
            intersect_entity: r.intersect_entity_name,
            entity1: r.entity1_logical_name,
            entity1_intersect_attribute: r.entity1_intersect_attribute,
            entity2: r.entity2_logical_name,
            entity2_intersect_attribute: r.entity2_intersect_attribute,
        })
        .collect();

    EntityTypeDescriptor {
        schema_name: raw.schema_name.unwrap_or_else(|| raw.logical_name.clone()),
        display_name: raw
            .display_name
            .and_then(|d| d.user_localized_label)
            .map(|l| l.label),
        is_intersect: raw.is_intersect.unwrap_or(false),
        entity_set_name: raw.entity_set_name,
        primary_id_attribute: raw.primary_id_attribute,
        primary_name_attribute: raw.primary_name_attribute,
        attributes,
        many_to_many,
        logical_name: raw.logical_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn webpage_definition() -> Value {
        json!({
            "value": [
                {
                    "LogicalName": "adx_webpage",
                    "SchemaName": "adx_webpage",
                    "EntitySetName": "adx_webpages",
                    "PrimaryIdAttribute": "adx_webpageid",
                    "PrimaryNameAttribute": "adx_name",
                    "IsIntersect": false,
                    "DisplayName": {"UserLocalizedLabel": {"Label": "Web Page"}},
                    "Attributes": [
                        {"LogicalName": "adx_name", "AttributeType": "String", "IsValidForCreate": true, "IsValidForUpdate": true},
                        {"LogicalName": "adx_parentpageid", "AttributeType": "Lookup", "IsValidForCreate": true, "IsValidForUpdate": true},
                        {"LogicalName": "createdon", "AttributeType": "DateTime", "IsValidForCreate": false, "IsValidForUpdate": false}
                    ],
                    "ManyToManyRelationships": [],
                    "ManyToOneRelationships": [
                        {
                            "ReferencingAttribute": "adx_parentpageid",
                            "ReferencedEntity": "adx_webpage",
                            "ReferencingEntityNavigationPropertyName": "adx_parentpageid"
                        }
                    ]
                },
                {
                    "LogicalName": "adx_webrole_contact",
                    "SchemaName": "adx_webrole_contact",
                    "IsIntersect": true,
                    "DisplayName": {"UserLocalizedLabel": null},
                    "ManyToManyRelationships": [
                        {
                            "SchemaName": "adx_webrole_contact",
                            "IntersectEntityName": "adx_webrole_contact",
                            "Entity1LogicalName": "adx_webrole",
                            "Entity1IntersectAttribute": "adx_webroleid",
                            "Entity2LogicalName": "contact",
                            "Entity2IntersectAttribute": "contactid"
                        }
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_parse_entity_definitions() {
        let catalog = parse_entity_definitions(&webpage_definition()).unwrap();
        assert_eq!(catalog.len(), 2);

        let page = catalog.get("adx_webpage").unwrap();
        assert_eq!(page.display_name.as_deref(), Some("Web Page"));
        assert_eq!(page.entity_set_name.as_deref(), Some("adx_webpages"));
        assert_eq!(page.primary_name_attribute.as_deref(), Some("adx_name"));

        let parent = page.attribute("adx_parentpageid").unwrap();
        assert!(parent.attribute_type.is_lookup());
        assert_eq!(parent.targets, vec!["adx_webpage".to_string()]);
        assert_eq!(parent.navigation_property("adx_webpage"), Some("adx_parentpageid"));
        assert!(!page.attribute("createdon").unwrap().is_importable());
    }

    #[test]
    fn test_parse_intersect_without_label() {
        let catalog = parse_entity_definitions(&webpage_definition()).unwrap();
        let intersect = catalog.get("adx_webrole_contact").unwrap();

        assert!(intersect.is_intersect);
        assert!(intersect.display_name.is_none());
        assert!(catalog.relationship_for_intersect("adx_webrole_contact").is_some());
    }

    #[test]
    fn test_rejects_non_array() {
        assert!(parse_entity_definitions(&json!({"value": 3})).is_err());
    }
}
