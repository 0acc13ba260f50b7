//! In-memory record store for tests
//!
//! Enforces the referential rules of a real target: a lookup to a record that
//! does not exist fails the write, updating a missing record fails, and a
//! repeated association reports `AlreadyAssociated`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::store::{AssociateOutcome, RecordStore, StoreError, UpsertOutcome};
use crate::api::query::Query;
use crate::records::{EntityReference, Record};

/// Store call, in issue order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Upsert(EntityReference),
    Update(EntityReference),
    Associate {
        relationship: String,
        id1: Uuid,
        id2: Uuid,
    },
    Query(String),
    Delete(EntityReference),
}

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<EntityReference, Record>,
    associations: BTreeSet<(String, Uuid, Uuid)>,
    calls: Vec<Call>,
    failing: HashSet<Uuid>,
    rejected_types: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn does_not_exist(reference: &EntityReference) -> StoreError {
    StoreError::Rejected {
        status: 404,
        code: Some("0x80040217".to_string()),
        message: format!(
            "{} With Id = {} Does Not Exist",
            reference.entity_type, reference.id
        ),
    }
}

fn injected(id: Uuid) -> StoreError {
    StoreError::Rejected {
        status: 500,
        code: None,
        message: format!("Injected failure for {}", id),
    }
}

impl State {
    fn check_references(&self, record: &Record) -> Result<(), StoreError> {
        for (_, target) in record.references() {
            if !self.records.contains_key(target) {
                return Err(does_not_exist(target));
            }
        }
        Ok(())
    }

    fn check_failing(&self, id: Uuid) -> Result<(), StoreError> {
        if self.failing.contains(&id) {
            return Err(injected(id));
        }
        Ok(())
    }

    fn write(&mut self, record: &Record) {
        let stored = self
            .records
            .entry(record.to_reference())
            .or_insert_with(|| Record::new(record.entity_type.clone(), record.id));
        stored.merge_from(record.clone());
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Seed a record without logging a call
    pub fn with_record(self, record: Record) -> Self {
        self.lock().write(&record);
        self
    }

    pub fn with_association(self, relationship: &str, id1: Uuid, id2: Uuid) -> Self {
        self.lock()
            .associations
            .insert((relationship.to_string(), id1, id2));
        self
    }

    /// Every write touching `id` fails
    pub fn fail_on(self, id: Uuid) -> Self {
        self.lock().failing.insert(id);
        self
    }

    /// Records of this type cannot be written directly
    pub fn reject_type(self, entity_type: &str) -> Self {
        self.lock().rejected_types.insert(entity_type.to_string());
        self
    }

    pub fn record(&self, entity_type: &str, id: Uuid) -> Option<Record> {
        self.lock()
            .records
            .get(&EntityReference::new(entity_type, id))
            .cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn is_associated(&self, relationship: &str, id1: Uuid, id2: Uuid) -> bool {
        self.lock()
            .associations
            .contains(&(relationship.to_string(), id1, id2))
    }

    pub fn association_count(&self) -> usize {
        self.lock().associations.len()
    }

    /// Stored records and associations, for before/after comparisons
    pub fn snapshot(&self) -> (Vec<Record>, Vec<(String, Uuid, Uuid)>) {
        let state = self.lock();
        (
            state.records.values().cloned().collect(),
            state.associations.iter().cloned().collect(),
        )
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.lock();
        state.calls.push(Call::Upsert(record.to_reference()));
        state.check_failing(record.id)?;

        if state.rejected_types.contains(&record.entity_type) {
            return Err(StoreError::Rejected {
                status: 400,
                code: None,
                message: format!("{} records cannot be created directly", record.entity_type),
            });
        }
        state.check_references(record)?;

        let existed = state.records.contains_key(&record.to_reference());
        state.write(record);

        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    async fn update(&self, record: &Record) -> Result<(), StoreError> {
        let mut state = self.lock();
        let reference = record.to_reference();
        state.calls.push(Call::Update(reference.clone()));
        state.check_failing(record.id)?;

        if !state.records.contains_key(&reference) {
            return Err(does_not_exist(&reference));
        }
        state.check_references(record)?;
        state.write(record);
        Ok(())
    }

    async fn associate(
        &self,
        entity1: &str,
        id1: Uuid,
        relationship: &str,
        entity2: &str,
        id2: Uuid,
    ) -> Result<AssociateOutcome, StoreError> {
        let mut state = self.lock();
        state.calls.push(Call::Associate {
            relationship: relationship.to_string(),
            id1,
            id2,
        });
        state.check_failing(id1)?;

        for side in [EntityReference::new(entity1, id1), EntityReference::new(entity2, id2)] {
            if !state.records.contains_key(&side) {
                return Err(does_not_exist(&side));
            }
        }

        if state
            .associations
            .insert((relationship.to_string(), id1, id2))
        {
            Ok(AssociateOutcome::Associated)
        } else {
            Ok(AssociateOutcome::AlreadyAssociated)
        }
    }

    async fn query(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        let mut state = self.lock();
        state.calls.push(Call::Query(query.entity.clone()));

        Ok(state
            .records
            .values()
            .filter(|r| r.entity_type == query.entity)
            .filter(|r| query.filter.as_ref().map(|f| f.matches(r)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn delete(&self, entity_type: &str, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.lock();
        let reference = EntityReference::new(entity_type, id);
        state.calls.push(Call::Delete(reference.clone()));
        state.check_failing(id)?;

        state
            .records
            .remove(&reference)
            .map(|_| ())
            .ok_or_else(|| does_not_exist(&reference))
    }
}
