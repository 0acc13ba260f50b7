//! Per-entity progress counters for an import run

use std::collections::HashMap;

use serde::Serialize;

use crate::api::metadata::EntityCatalog;
use crate::records::{EntityReference, Record};

/// Counters for one record type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityProgress {
    pub entity_type: String,
    pub display_name: String,
    /// Input records of this type
    pub total_count: usize,
    /// Records that went through a phase 1 commit attempt
    pub processed_count: usize,
    pub succeeded_phase1: usize,
    pub failed_phase1: usize,
    pub succeeded_phase2: usize,
    pub failed_phase2: usize,
    pub succeeded_deactivation: usize,
    pub failed_deactivation: usize,
}

impl EntityProgress {
    pub fn new(entity_type: impl Into<String>, display_name: impl Into<String>, total_count: usize) -> Self {
        Self {
            entity_type: entity_type.into(),
            display_name: display_name.into(),
            total_count,
            ..Default::default()
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed_phase1 + self.failed_phase2 + self.failed_deactivation > 0
    }
}

/// Progress of every record type seen during one engine invocation
#[derive(Debug, Default)]
pub struct ImportProgress {
    entries: Vec<EntityProgress>,
    index: HashMap<String, usize>,
    totals: HashMap<String, usize>,
    missing_schema: Vec<EntityReference>,
}

impl ImportProgress {
    /// Create a tracker for the given input batch
    pub fn new(records: &[Record]) -> Self {
        let mut totals: HashMap<String, usize> = HashMap::new();
        for record in records {
            *totals.entry(record.entity_type.clone()).or_default() += 1;
        }

        Self {
            totals,
            ..Default::default()
        }
    }

    /// Progress entry for `record_type`, registered on first sighting
    ///
    /// Returns `None` when the type is absent from the catalog.
    pub fn get_or_create(
        &mut self,
        record_type: &str,
        catalog: &EntityCatalog,
    ) -> Option<&mut EntityProgress> {
        if let Some(&i) = self.index.get(record_type) {
            return Some(&mut self.entries[i]);
        }

        let display_name = display_name(record_type, catalog)?;
        let total = self.totals.get(record_type).copied().unwrap_or(0);

        self.index.insert(record_type.to_string(), self.entries.len());
        self.entries
            .push(EntityProgress::new(record_type, display_name, total));
        self.entries.last_mut()
    }

    /// Note a record whose type does not exist in the target schema
    pub fn note_missing_schema(&mut self, reference: EntityReference) {
        if !self.missing_schema.contains(&reference) {
            self.missing_schema.push(reference);
        }
    }

    /// Entries in first-sighting order
    #[cfg(test)]
    pub fn entries(&self) -> &[EntityProgress] {
        &self.entries
    }

    pub fn into_parts(self) -> (Vec<EntityProgress>, Vec<EntityReference>) {
        (self.entries, self.missing_schema)
    }
}

/// Resolve the label shown for a record type
fn display_name(record_type: &str, catalog: &EntityCatalog) -> Option<String> {
    let descriptor = catalog.get(record_type)?;

    if let Some(name) = &descriptor.display_name {
        return Some(name.clone());
    }

    if descriptor.is_intersect {
        if let Some(rel) = catalog.relationship_for_intersect(&descriptor.logical_name) {
            let side = |logical: &str| {
                catalog
                    .get(logical)
                    .and_then(|d| d.display_name.clone())
                    .unwrap_or_else(|| logical.to_string())
            };
            return Some(format!("{} / {}", side(&rel.entity1), side(&rel.entity2)));
        }
    }

    Some(descriptor.schema_name.clone())
}
