//! Batch preparation before the engine runs

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::engine::ImportError;
use super::sink::{Phase, ProgressSink};
use super::store::RecordStore;
use crate::api::query::Query;
use crate::records::{AttributeValue, Record};

pub const WEBSITE_ENTITY: &str = "adx_website";

/// Maps a website id of the source environment to the one in the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebsiteMapping {
    pub source_id: Uuid,
    pub target_id: Uuid,
}

/// Distinct website ids referenced by the batch
fn referenced_websites(records: &[Record]) -> BTreeSet<Uuid> {
    records
        .iter()
        .flat_map(|r| r.references())
        .filter(|(_, target)| target.entity_type == WEBSITE_ENTITY)
        .map(|(_, target)| target.id)
        .collect()
}

fn unknown_websites(records: &[Record], target: &BTreeSet<Uuid>) -> Vec<Uuid> {
    referenced_websites(records)
        .into_iter()
        .filter(|id| !target.contains(id))
        .collect()
}

/// Make every website reference point at a website of the target
///
/// When some referenced website is unknown to the target, every lookup whose id
/// matches a mapping's source id is rewritten to its target id. Fails when a
/// website is still unknown afterwards.
pub async fn remap_websites<S: RecordStore + ?Sized>(
    records: &mut [Record],
    mappings: &[WebsiteMapping],
    store: &S,
    sink: &dyn ProgressSink,
) -> anyhow::Result<()> {
    if referenced_websites(records).is_empty() {
        return Ok(());
    }

    let target: BTreeSet<Uuid> = store
        .query(&Query::new(WEBSITE_ENTITY).select(&["adx_name"]))
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();

    if unknown_websites(records, &target).is_empty() {
        return Ok(());
    }

    let mut rewritten = 0;
    for mapping in mappings {
        for record in records.iter_mut() {
            for value in record.attributes.values_mut() {
                if let AttributeValue::Reference(reference) = value {
                    if reference.id == mapping.source_id {
                        reference.id = mapping.target_id;
                        rewritten += 1;
                    }
                }
            }
        }
    }

    if rewritten > 0 {
        sink.info(
            Phase::Prepare,
            format!("Mapped {} website reference(s) to the target environment", rewritten),
        );
    }

    let unmapped = unknown_websites(records, &target);
    if !unmapped.is_empty() {
        return Err(ImportError::UnmappedWebsites(unmapped).into());
    }

    Ok(())
}
