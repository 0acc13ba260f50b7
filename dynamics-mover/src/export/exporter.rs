//! Record retrieval for export
//!
//! Per-entity queries run `batch_count` at a time and a failed query only
//! loses the records of that entity. Intersect records of many-to-many
//! relationships among the selected entities and the notes of web files are
//! retrieved afterwards.

use std::collections::HashSet;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::api::metadata::{EntityCatalog, EntityTypeDescriptor, Relationship};
use crate::api::query::{Filter, FilterValue, Query};
use crate::import::sink::{Phase, ProgressSink};
use crate::import::store::RecordStore;
use crate::records::Record;

/// Ids per `In` condition, keeps request URLs short
const IN_CHUNK_SIZE: usize = 50;

const WEB_FILE_ENTITY: &str = "adx_webfile";
const ANNOTATION_ENTITY: &str = "annotation";
const WEBSITE_ENTITY: &str = "adx_website";

/// What to export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Entity logical names; all entities of the catalog when empty
    pub selected_entities: Vec<String>,
    /// Records created on or after
    pub created_since: Option<DateTime<Utc>>,
    /// Records modified on or after
    pub modified_since: Option<DateTime<Utc>>,
    /// Restrict website-bound entities to this website
    pub website: Option<Uuid>,
    /// Only records with statecode 0
    pub active_only: bool,
    /// Queries in flight at the same time
    pub batch_count: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            selected_entities: Vec::new(),
            created_since: None,
            modified_since: None,
            website: None,
            active_only: false,
            batch_count: 10,
        }
    }
}

pub struct Exporter<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    catalog: &'a EntityCatalog,
    options: &'a ExportOptions,
    sink: &'a dyn ProgressSink,
}

impl<'a, S: RecordStore + ?Sized> Exporter<'a, S> {
    pub fn new(
        store: &'a S,
        catalog: &'a EntityCatalog,
        options: &'a ExportOptions,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            store,
            catalog,
            options,
            sink,
        }
    }

    /// Retrieve and prepare every record to export
    pub async fn export(&self) -> Result<Vec<Record>> {
        let descriptors = self.catalog.selected(&self.options.selected_entities);
        if descriptors.is_empty() {
            bail!(
                "None of the selected entities exist in the source environment: {}",
                self.options.selected_entities.join(", ")
            );
        }
        for name in &self.options.selected_entities {
            if !self.catalog.contains(name) {
                self.sink.warn(
                    Phase::Export,
                    format!("Entity {} not found in the source environment", name),
                );
            }
        }

        let mut records = self.retrieve_records(&descriptors).await;

        self.sink.info(
            Phase::Export,
            "Retrieving many to many relationships records.".to_string(),
        );
        let intersect = self.retrieve_intersect_records(&descriptors, &records).await;
        records.extend(intersect);

        let web_files: Vec<Uuid> = records
            .iter()
            .filter(|r| r.entity_type == WEB_FILE_ENTITY)
            .map(|r| r.id)
            .collect();
        if !web_files.is_empty() {
            let mut notes = self.retrieve_web_file_annotations(&web_files).await;
            notes.append(&mut records);
            records = notes;
        }

        self.prepare_attributes(&mut records);

        self.sink.info(
            Phase::Export,
            format!("{} records retrieved for export", records.len()),
        );
        Ok(records)
    }

    /// Query for the records of one entity according to the filters
    pub fn entity_query(&self, descriptor: &EntityTypeDescriptor) -> Query {
        let mut conditions = Vec::new();

        let mut dates = Vec::new();
        if let Some(since) = self.options.created_since {
            dates.push(Filter::ge("createdon", FilterValue::DateTime(since)));
        }
        if let Some(since) = self.options.modified_since {
            dates.push(Filter::ge("modifiedon", FilterValue::DateTime(since)));
        }
        conditions.extend(Filter::any(dates));

        if let Some(website) = self.options.website {
            if descriptor.has_lookup_to(WEBSITE_ENTITY) {
                conditions.push(Filter::eq("adx_websiteid", FilterValue::Reference(website)));
            }
        }

        if self.options.active_only && descriptor.has_attribute("statecode") {
            conditions.push(Filter::eq("statecode", FilterValue::Integer(0)));
        }

        Query::new(descriptor.logical_name.clone()).filter_opt(Filter::all(conditions))
    }

    /// Run labelled queries `batch_count` at a time, keeping their order
    async fn run_queries(&self, queries: Vec<(String, Query)>) -> Vec<Record> {
        let results: Vec<_> = stream::iter(queries.into_iter().map(|(label, query)| async move {
            let result = self.store.query(&query).await;
            (label, result)
        }))
        .buffered(self.options.batch_count.max(1))
        .collect()
        .await;

        let mut records = Vec::new();
        for (label, result) in results {
            match result {
                Ok(found) if found.is_empty() => {}
                Ok(found) => {
                    self.sink.info(
                        Phase::Export,
                        format!("Adding records for export - Entity: {}, Count: {}", label, found.len()),
                    );
                    records.extend(found);
                }
                Err(e) => self.sink.error(
                    Phase::Export,
                    format!("Could not retrieve {} records: {}", label, e),
                ),
            }
        }
        records
    }

    async fn retrieve_records(&self, descriptors: &[&EntityTypeDescriptor]) -> Vec<Record> {
        let queries = descriptors
            .iter()
            .filter(|d| !d.is_intersect)
            .map(|d| (d.logical_name.clone(), self.entity_query(d)))
            .collect();

        self.run_queries(queries).await
    }

    /// Relationships whose both sides are selected, distinct by intersect entity
    fn selected_relationships<'d>(&self, descriptors: &[&'d EntityTypeDescriptor]) -> Vec<&'d Relationship> {
        let selected: HashSet<&str> = descriptors.iter().map(|d| d.logical_name.as_str()).collect();
        let mut seen = HashSet::new();
        let mut relationships = Vec::new();

        for &descriptor in descriptors {
            for rel in &descriptor.many_to_many {
                let valid = rel
                    .other_side(&descriptor.logical_name)
                    .map(|other| selected.contains(other))
                    .unwrap_or(false);
                if valid && seen.insert(rel.intersect_entity.as_str()) {
                    relationships.push(rel);
                }
            }
        }

        relationships
    }

    async fn retrieve_intersect_records(
        &self,
        descriptors: &[&EntityTypeDescriptor],
        records: &[Record],
    ) -> Vec<Record> {
        let mut queries = Vec::new();

        for rel in self.selected_relationships(descriptors) {
            let ids: Vec<FilterValue> = records
                .iter()
                .filter(|r| r.entity_type == rel.entity1)
                .map(|r| FilterValue::Guid(r.id))
                .collect();
            if ids.is_empty() {
                continue;
            }

            let primary_id = self
                .catalog
                .get(&rel.intersect_entity)
                .and_then(|d| d.primary_id_attribute.clone())
                .unwrap_or_else(|| format!("{}id", rel.intersect_entity));

            for chunk in ids.chunks(IN_CHUNK_SIZE) {
                let mut query = Query::new(rel.intersect_entity.clone()).filter(Filter::is_in(
                    rel.entity1_intersect_attribute.clone(),
                    chunk.to_vec(),
                ));
                // Only the three identifiers, so the importer sees an association
                query.select = vec![
                    primary_id.clone(),
                    rel.entity1_intersect_attribute.clone(),
                    rel.entity2_intersect_attribute.clone(),
                ];
                queries.push((rel.intersect_entity.clone(), query));
            }
        }

        self.run_queries(queries).await
    }

    async fn retrieve_web_file_annotations(&self, web_files: &[Uuid]) -> Vec<Record> {
        self.sink.info(
            Phase::Export,
            format!("Retrieving Web File Annotations for {} records", web_files.len()),
        );

        let queries = web_files
            .chunks(IN_CHUNK_SIZE)
            .map(|chunk| {
                let ids = chunk.iter().map(|id| FilterValue::Reference(*id)).collect();
                (
                    ANNOTATION_ENTITY.to_string(),
                    Query::new(ANNOTATION_ENTITY).filter(Filter::is_in("objectid", ids)),
                )
            })
            .collect();

        self.run_queries(queries).await
    }

    /// Keep only attributes the target accepts, and drop lookups to contacts
    fn prepare_attributes(&self, records: &mut [Record]) {
        for record in records.iter_mut() {
            let Some(descriptor) = self.catalog.get(&record.entity_type) else {
                continue;
            };
            if descriptor.is_intersect {
                continue;
            }

            record.attributes.retain(|name, value| {
                let importable = descriptor
                    .attribute(name)
                    .map(|a| a.is_importable())
                    .unwrap_or(false);
                let contact_lookup = value
                    .as_reference()
                    .map(|r| r.entity_type == "contact")
                    .unwrap_or(false);
                importable && !contact_lookup
            });
        }
    }
}
