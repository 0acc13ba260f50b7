//! Import reconciliation engine
//!
//! Commits a batch of related records into the target store in three phases:
//!
//! 1. A single reverse scan over the batch. Records whose lookups target a
//!    record that is not created yet have those lookups split off into a
//!    reference-only fragment; records holding the bare id of another pending
//!    record are deferred wholesale. Everything else is upserted.
//! 2. Deferred entries are written. Wholesale records are upserted first without
//!    their lookups; then fragments and those lookups are applied as updates and
//!    three-identifier records become many-to-many associations.
//! 3. Records that were inactive in the source are deactivated.
//!
//! Annotations are committed last so their parents exist.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use super::dependency::{bare_identifier_dependency, has_pending_reference};
use super::options::ImportOptions;
use super::progress::{EntityProgress, ImportProgress};
use super::sink::{Phase, ProgressSink};
use super::store::{AssociateOutcome, RecordStore};
use crate::api::metadata::EntityCatalog;
use crate::api::query::{Filter, FilterValue, Query};
use crate::records::{AttributeValue, EntityReference, Record};

/// Errors that abort an import before anything is committed
#[derive(Debug, Clone, PartialEq)]
pub enum ImportError {
    /// Nothing to import
    EmptyBatch,
    /// Referenced websites that do not exist in the target, even after mapping
    UnmappedWebsites(Vec<Uuid>),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::EmptyBatch => write!(f, "No record to import"),
            ImportError::UnmappedWebsites(ids) => {
                let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                write!(
                    f,
                    "Websites not found in the target environment and not mapped: {}",
                    ids.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for ImportError {}

/// Where every input record ended after phase 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Phase1Summary {
    pub total: usize,
    pub committed: usize,
    pub failed: usize,
    pub deferred_whole: usize,
    pub missing_schema: usize,
}

impl Phase1Summary {
    /// Every input record is accounted for exactly once
    pub fn is_balanced(&self) -> bool {
        self.committed + self.failed + self.deferred_whole + self.missing_schema == self.total
    }
}

/// Result of an import run
#[derive(Debug, Clone)]
pub struct ImportReport {
    /// Per-type counters in first-sighting order
    pub progress: Vec<EntityProgress>,
    /// Records whose type does not exist in the target
    pub missing_schema: Vec<EntityReference>,
    pub phase1: Phase1Summary,
    /// Distinct deferred identifiers handled in phase 2
    pub deferred: usize,
    /// Records queued for deactivation
    pub deactivation_queued: usize,
    /// Records left in the batch without a commit attempt
    pub unresolved: Vec<Record>,
}

impl ImportReport {
    pub fn has_failures(&self) -> bool {
        !self.missing_schema.is_empty() || self.progress.iter().any(EntityProgress::has_failures)
    }
}

struct DeferredEntry {
    record: Record,
    /// Deferred wholesale at least once, so never created in phase 1
    whole: bool,
}

/// Records postponed to phase 2, keyed by id in insertion order
#[derive(Default)]
struct DeferredSet {
    entries: Vec<DeferredEntry>,
    index: HashMap<Uuid, usize>,
}

impl DeferredSet {
    /// Add a record or fragment; a second contribution for the same id is unioned in
    fn push(&mut self, record: Record, whole: bool) {
        match self.index.get(&record.id) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                entry.record.merge_from(record);
                entry.whole |= whole;
            }
            None => {
                self.index.insert(record.id, self.entries.len());
                self.entries.push(DeferredEntry { record, whole });
            }
        }
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.index.contains_key(id)
    }

    fn is_whole(&self, id: &Uuid) -> bool {
        self.index
            .get(id)
            .map(|&i| self.entries[i].whole)
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Identifiers still present in the batch, with multiplicity
#[derive(Default)]
struct Remaining(HashMap<Uuid, usize>);

impl Remaining {
    fn from_batch(batch: &[Record]) -> Self {
        let mut counts = HashMap::new();
        for record in batch {
            *counts.entry(record.id).or_insert(0) += 1;
        }
        Self(counts)
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.0.contains_key(id)
    }

    fn release(&mut self, id: Uuid) {
        if let Some(count) = self.0.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.0.remove(&id);
            }
        }
    }
}

/// Imports a batch of records into a target store
pub struct RecordImporter<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    catalog: &'a EntityCatalog,
    options: ImportOptions,
    sink: &'a dyn ProgressSink,
}

impl<'a, S: RecordStore + ?Sized> RecordImporter<'a, S> {
    pub fn new(
        store: &'a S,
        catalog: &'a EntityCatalog,
        options: ImportOptions,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            store,
            catalog,
            options,
            sink,
        }
    }

    /// Run all three phases over `records`
    pub async fn run(&self, records: Vec<Record>) -> Result<ImportReport, ImportError> {
        if records.is_empty() {
            return Err(ImportError::EmptyBatch);
        }

        let batch = self.order_batch(records);
        let input_ids: HashSet<Uuid> = batch.iter().map(|r| r.id).collect();
        let mut progress = ImportProgress::new(&batch);
        let mut deferred = DeferredSet::default();
        let mut deactivation = Vec::new();

        log::debug!("Importing {} records", batch.len());

        let (phase1, unresolved) = self
            .commit_phase(batch, &input_ids, &mut progress, &mut deferred, &mut deactivation)
            .await;

        let deferred_count = deferred.len();
        self.deferred_phase(deferred, &mut progress, &mut deactivation)
            .await;
        self.deactivation_phase(&deactivation, &mut progress).await;

        let (progress, missing_schema) = progress.into_parts();
        Ok(ImportReport {
            progress,
            missing_schema,
            phase1,
            deferred: deferred_count,
            deactivation_queued: deactivation.len(),
            unresolved,
        })
    }

    /// Annotations first, so the reverse scan reaches them last
    fn order_batch(&self, records: Vec<Record>) -> Vec<Record> {
        let (mut annotations, others): (Vec<Record>, Vec<Record>) = records
            .into_iter()
            .partition(|r| self.options.is_annotation(&r.entity_type));
        annotations.extend(others);
        annotations
    }

    fn primary_name(&self, entity_type: &str) -> Option<&str> {
        self.catalog
            .get(entity_type)
            .and_then(|d| d.primary_name_attribute.as_deref())
    }

    fn label(&self, record: &Record) -> String {
        record.label(self.primary_name(&record.entity_type))
    }

    /// Strip state and status of an inactive record and queue it for deactivation
    fn take_inactive_state(&self, record: &mut Record, deactivation: &mut Vec<EntityReference>) -> bool {
        let state = record
            .get(&self.options.state_attribute)
            .and_then(AttributeValue::as_option_set);
        if state != Some(self.options.inactive_state) {
            return false;
        }

        record.remove(&self.options.state_attribute);
        record.remove(&self.options.status_attribute);
        deactivation.push(record.to_reference());
        true
    }

    /// Counters for the record's type, or note the record as missing from the target schema
    fn entity_progress<'p>(
        &self,
        progress: &'p mut ImportProgress,
        record: &Record,
        phase: Phase,
    ) -> Option<&'p mut EntityProgress> {
        if !self.catalog.contains(&record.entity_type) {
            self.sink.warn(
                phase,
                format!(
                    "Record {}/{} not present in the target schema",
                    record.entity_type, record.id
                ),
            );
            progress.note_missing_schema(record.to_reference());
            return None;
        }
        progress.get_or_create(&record.entity_type, self.catalog)
    }

    fn withdraw_deactivation(record: &Record, deactivation: &mut Vec<EntityReference>) {
        let reference = record.to_reference();
        if let Some(pos) = deactivation.iter().rposition(|r| *r == reference) {
            deactivation.remove(pos);
        }
    }

    async fn commit_phase(
        &self,
        mut batch: Vec<Record>,
        input_ids: &HashSet<Uuid>,
        progress: &mut ImportProgress,
        deferred: &mut DeferredSet,
        deactivation: &mut Vec<EntityReference>,
    ) -> (Phase1Summary, Vec<Record>) {
        let mut remaining = Remaining::from_batch(&batch);
        let mut summary = Phase1Summary {
            total: batch.len(),
            ..Default::default()
        };
        let mut unresolved = Vec::new();

        while let Some(mut record) = batch.pop() {
            let is_annotation = self.options.is_annotation(&record.entity_type);

            if !is_annotation
                && !deferred.contains(&record.id)
                && has_pending_reference(&record, |id| {
                    remaining.contains(id) || deferred.is_whole(id)
                })
            {
                if let Some(fragment) = record.split_references() {
                    log::debug!(
                        "Deferring {} reference(s) of {}/{}",
                        fragment.len(),
                        record.entity_type,
                        record.id
                    );
                    deferred.push(fragment, false);
                }
            }

            if self.options.detect_bare_identifiers
                && bare_identifier_dependency(&record, |id| remaining.contains(id))
            {
                self.sink.info(
                    Phase::Commit,
                    format!(
                        "Record {} ({}/{}) depends on a record not imported yet: deferred",
                        self.label(&record),
                        record.entity_type,
                        record.id
                    ),
                );
                remaining.release(record.id);
                summary.deferred_whole += 1;
                deferred.push(record, true);
                continue;
            }

            let Some(entity_progress) = self.entity_progress(progress, &record, Phase::Commit) else {
                summary.missing_schema += 1;
                unresolved.push(record);
                continue;
            };

            record.remove(&self.options.owner_attribute);

            let label = self.label(&record);
            let queued = self.take_inactive_state(&mut record, deactivation);
            if queued {
                self.sink.info(
                    Phase::Commit,
                    format!("Record {} is inactive: added for deactivation step", label),
                );
            }

            match self.store.upsert(&record).await {
                Ok(outcome) => {
                    entity_progress.succeeded_phase1 += 1;
                    summary.committed += 1;
                    self.sink.info(
                        Phase::Commit,
                        format!(
                            "Record {} {} ({}/{})",
                            label,
                            outcome.as_str(),
                            record.entity_type,
                            record.id
                        ),
                    );

                    if is_annotation && self.options.clean_orphan_annotations {
                        self.clean_orphan_annotations(&record, input_ids).await;
                    }
                }
                Err(e) => {
                    entity_progress.failed_phase1 += 1;
                    summary.failed += 1;
                    if queued {
                        Self::withdraw_deactivation(&record, deactivation);
                    }
                    self.sink.error(
                        Phase::Commit,
                        format!("{} ({}/{}): {}", label, record.entity_type, record.id, e),
                    );
                }
            }

            entity_progress.processed_count += 1;
            remaining.release(record.id);
        }

        if !summary.is_balanced() {
            log::warn!("Phase 1 accounting mismatch: {:?}", summary);
        }

        (summary, unresolved)
    }

    /// Delete annotations of the same web file that are not part of this import
    async fn clean_orphan_annotations(&self, annotation: &Record, input_ids: &HashSet<Uuid>) {
        let Some(parent) = annotation.reference(&self.options.annotation_parent_attribute) else {
            return;
        };
        if !self.options.is_file_parent(&parent.entity_type) {
            return;
        }

        self.sink.info(
            Phase::Commit,
            format!("Searching for extra annotations in web file {}", parent.id),
        );

        let query = Query::new(self.options.annotation_entity.clone()).filter(Filter::eq(
            self.options.annotation_parent_attribute.clone(),
            FilterValue::Reference(parent.id),
        ));

        let extras = match self.store.query(&query).await {
            Ok(records) => records,
            Err(e) => {
                self.sink.warn(
                    Phase::Commit,
                    format!("Could not search annotations of web file {}: {}", parent.id, e),
                );
                return;
            }
        };

        for extra in extras
            .iter()
            .filter(|r| r.id != annotation.id && !input_ids.contains(&r.id))
        {
            self.sink
                .info(Phase::Commit, format!("Deleting extra note {}", extra.id));
            if let Err(e) = self.store.delete(&extra.entity_type, extra.id).await {
                self.sink.warn(
                    Phase::Commit,
                    format!("Could not delete extra note {}: {}", extra.id, e),
                );
            }
        }
    }

    async fn deferred_phase(
        &self,
        deferred: DeferredSet,
        progress: &mut ImportProgress,
        deactivation: &mut Vec<EntityReference>,
    ) {
        if deferred.entries.is_empty() {
            return;
        }

        self.sink.info(
            Phase::Deferred,
            "Updating records to add references and processing many-to-many relationships..."
                .to_string(),
        );

        // Every wholesale record exists, without its lookups, before any update runs
        let mut updates = Vec::with_capacity(deferred.entries.len());
        for DeferredEntry { mut record, whole } in deferred.entries {
            let Some(entity_progress) = self.entity_progress(progress, &record, Phase::Deferred)
            else {
                continue;
            };

            record.remove(&self.options.owner_attribute);

            if whole {
                entity_progress.processed_count += 1;
            }
            if !whole || is_association(&record) {
                updates.push(record);
                continue;
            }

            let fragment = record.split_references();
            match self.create_deferred(record, deactivation).await {
                Ok(message) => {
                    self.sink.info(Phase::Deferred, message);
                    match fragment {
                        Some(fragment) => updates.push(fragment),
                        None => entity_progress.succeeded_phase2 += 1,
                    }
                }
                Err(message) => {
                    entity_progress.failed_phase2 += 1;
                    self.sink.error(Phase::Deferred, message);
                }
            }
        }

        for record in updates {
            let Some(entity_progress) = self.entity_progress(progress, &record, Phase::Deferred)
            else {
                continue;
            };

            let result = if is_association(&record) {
                self.sink.info(
                    Phase::Deferred,
                    format!(
                        "Creating association {} ({})",
                        entity_progress.display_name, record.id
                    ),
                );
                self.associate(&record).await.map(|outcome| match outcome {
                    AssociateOutcome::Associated => format!(
                        "Association {} ({}) created",
                        entity_progress.display_name, record.id
                    ),
                    AssociateOutcome::AlreadyAssociated => format!(
                        "Association {} ({}) already exists",
                        entity_progress.display_name, record.id
                    ),
                })
            } else {
                self.store
                    .update(&record)
                    .await
                    .map(|_| {
                        format!(
                            "Record {}/{} references updated",
                            record.entity_type, record.id
                        )
                    })
                    .map_err(|e| e.to_string())
            };

            match result {
                Ok(message) => {
                    entity_progress.succeeded_phase2 += 1;
                    self.sink.info(Phase::Deferred, message);
                }
                Err(message) => {
                    entity_progress.failed_phase2 += 1;
                    self.sink.error(
                        Phase::Deferred,
                        format!(
                            "An error occured updating {}/{}: {}",
                            record.entity_type, record.id, message
                        ),
                    );
                }
            }
        }
    }

    /// Upsert a wholesale-deferred record stripped of its lookups
    async fn create_deferred(
        &self,
        mut record: Record,
        deactivation: &mut Vec<EntityReference>,
    ) -> Result<String, String> {
        let label = self.label(&record);
        let queued = self.take_inactive_state(&mut record, deactivation);
        match self.store.upsert(&record).await {
            Ok(outcome) => Ok(format!(
                "Record {} {} ({}/{})",
                label,
                outcome.as_str(),
                record.entity_type,
                record.id
            )),
            Err(e) => {
                if queued {
                    Self::withdraw_deactivation(&record, deactivation);
                }
                Err(format!(
                    "An error occured creating {}/{}: {}",
                    record.entity_type, record.id, e
                ))
            }
        }
    }

    async fn associate(&self, record: &Record) -> Result<AssociateOutcome, String> {
        let rel = self
            .catalog
            .relationship_for_intersect(&record.entity_type)
            .ok_or_else(|| {
                format!(
                    "No many-to-many relationship uses {} as intersect entity",
                    record.entity_type
                )
            })?;

        let id1 = record
            .identifier(&rel.entity1_intersect_attribute)
            .ok_or_else(|| format!("Missing {}", rel.entity1_intersect_attribute))?;
        let id2 = record
            .identifier(&rel.entity2_intersect_attribute)
            .ok_or_else(|| format!("Missing {}", rel.entity2_intersect_attribute))?;

        self.store
            .associate(&rel.entity1, id1, &rel.schema_name, &rel.entity2, id2)
            .await
            .map_err(|e| e.to_string())
    }

    async fn deactivation_phase(&self, deactivation: &[EntityReference], progress: &mut ImportProgress) {
        if deactivation.is_empty() {
            return;
        }

        self.sink
            .info(Phase::Deactivation, "Deactivating records...".to_string());

        for reference in deactivation {
            let Some(entity_progress) = progress.get_or_create(&reference.entity_type, self.catalog)
            else {
                continue;
            };

            let record = Record::new(reference.entity_type.clone(), reference.id)
                .with(
                    self.options.state_attribute.clone(),
                    AttributeValue::option_set(self.options.inactive_state),
                )
                .with(
                    self.options.status_attribute.clone(),
                    AttributeValue::option_set(self.options.inactive_status),
                );

            match self.store.update(&record).await {
                Ok(()) => {
                    entity_progress.succeeded_deactivation += 1;
                    self.sink
                        .info(Phase::Deactivation, format!("Record {} deactivated", reference));
                }
                Err(e) => {
                    entity_progress.failed_deactivation += 1;
                    self.sink.error(
                        Phase::Deactivation,
                        format!("Could not deactivate {}: {}", reference, e),
                    );
                }
            }
        }
    }
}

/// Exactly three attributes, all bare identifiers: an intersect record
fn is_association(record: &Record) -> bool {
    record.len() == 3 && record.attributes.values().all(AttributeValue::is_identifier)
}
