//! Read-only catalog of the entity types known to an environment

use std::collections::HashMap;

use super::models::{EntityTypeDescriptor, Relationship};

/// Entity metadata of one environment, indexed by logical name
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entities: Vec<EntityTypeDescriptor>,
    index: HashMap<String, usize>,
}

impl EntityCatalog {
    pub fn new(entities: Vec<EntityTypeDescriptor>) -> Self {
        let index = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.logical_name.clone(), i))
            .collect();

        Self { entities, index }
    }

    pub fn get(&self, logical_name: &str) -> Option<&EntityTypeDescriptor> {
        self.index.get(logical_name).map(|&i| &self.entities[i])
    }

    pub fn contains(&self, logical_name: &str) -> bool {
        self.index.contains_key(logical_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityTypeDescriptor> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Find the many-to-many relationship whose intersect entity is `intersect_entity`
    pub fn relationship_for_intersect(&self, intersect_entity: &str) -> Option<&Relationship> {
        self.entities
            .iter()
            .flat_map(|e| e.many_to_many.iter())
            .find(|r| r.intersect_entity == intersect_entity)
    }

    /// Entity set name used in Web API URLs
    pub fn entity_set_name(&self, logical_name: &str) -> Option<&str> {
        self.get(logical_name)
            .and_then(|e| e.entity_set_name.as_deref())
    }

    /// Descriptors of the selected entities, or all of them when none is selected
    pub fn selected(&self, names: &[String]) -> Vec<&EntityTypeDescriptor> {
        if names.is_empty() {
            return self.entities.iter().collect();
        }

        self.entities
            .iter()
            .filter(|e| names.contains(&e.logical_name))
            .collect()
    }
}

impl FromIterator<EntityTypeDescriptor> for EntityCatalog {
    fn from_iter<T: IntoIterator<Item = EntityTypeDescriptor>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webrole_contact() -> Relationship {
        Relationship {
            schema_name: "adx_webrole_contact".to_string(),
            intersect_entity: "adx_webrole_contact".to_string(),
            entity1: "adx_webrole".to_string(),
            entity1_intersect_attribute: "adx_webroleid".to_string(),
            entity2: "contact".to_string(),
            entity2_intersect_attribute: "contactid".to_string(),
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let catalog: EntityCatalog = vec![
            EntityTypeDescriptor::new("contact"),
            EntityTypeDescriptor::new("adx_webrole"),
        ]
        .into_iter()
        .collect();

        assert!(catalog.contains("contact"));
        assert!(!catalog.contains("account"));
        assert_eq!(catalog.get("adx_webrole").unwrap().logical_name, "adx_webrole");
    }

    #[test]
    fn test_relationship_for_intersect() {
        let catalog = EntityCatalog::new(vec![
            EntityTypeDescriptor::new("adx_webrole").with_relationship(webrole_contact()),
            EntityTypeDescriptor::new("adx_webrole_contact").intersect(),
        ]);

        let rel = catalog.relationship_for_intersect("adx_webrole_contact").unwrap();
        assert_eq!(rel.entity2, "contact");
        assert_eq!(rel.other_side("contact"), Some("adx_webrole"));
        assert!(catalog.relationship_for_intersect("contact").is_none());
    }

    #[test]
    fn test_selected_defaults_to_all() {
        let catalog = EntityCatalog::new(vec![
            EntityTypeDescriptor::new("a"),
            EntityTypeDescriptor::new("b"),
        ]);

        assert_eq!(catalog.selected(&[]).len(), 2);
        assert_eq!(catalog.selected(&["b".to_string()])[0].logical_name, "b");
    }
}
