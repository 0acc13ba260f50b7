//! Export command handler

use anyhow::{Context, Result};

use crate::api::{DataverseStore, DynamicsClient};
use crate::cli::auth::{SOURCE_TOKEN_VAR, resolve_token};
use crate::config::ExportPlan;
use crate::export::Exporter;
use crate::files::{ExportFile, write_records};
use crate::import::{Phase, ProgressSink};

/// Export from the source environment and write the file; returns the record count
pub async fn handle_export(plan: &ExportPlan, sink: &dyn ProgressSink) -> Result<usize> {
    sink.info(
        Phase::Export,
        format!(
            "Beginning the export - SourceEnvironment: {}, ExportFilename: {}",
            plan.source_environment,
            plan.path.display()
        ),
    );

    let token = resolve_token(SOURCE_TOKEN_VAR, &plan.source_environment)?;
    let client = DynamicsClient::new(&plan.source_environment, token)?;
    let catalog = client
        .fetch_entity_catalog()
        .await
        .context("Failed to load metadata of the source environment")?;
    let store = DataverseStore::new(client, catalog);

    let records = Exporter::new(&store, store.catalog(), &plan.options, sink)
        .export()
        .await?;
    let count = records.len();

    let file = ExportFile::new(Some(plan.source_environment.clone()), records);
    write_records(&plan.path, &file, plan.folder_structure)
        .with_context(|| format!("Failed to save export to {}", plan.path.display()))?;

    sink.info(
        Phase::Export,
        format!("{} records exported to {}", count, plan.path.display()),
    );
    Ok(count)
}
