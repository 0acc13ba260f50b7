//! Import command handler

use anyhow::{Context, Result, bail};
use dialoguer::Confirm;
use is_terminal::IsTerminal;

use crate::api::{DataverseStore, DynamicsClient};
use crate::cli::auth::{TARGET_TOKEN_VAR, resolve_token};
use crate::config::ImportPlan;
use crate::files::read_records;
use crate::import::{
    ImportError, ImportOptions, ImportReport, Phase, ProgressSink, RecordImporter, remap_websites,
};

fn confirm_import(count: usize, plan: &ImportPlan) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        bail!("Cannot ask for confirmation without a terminal; pass --yes to import");
    }

    Confirm::new()
        .with_prompt(format!(
            "Import {} records from {} into {}?",
            count,
            plan.path.display(),
            plan.target_environment
        ))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// Read the import file and run the importer against the target environment
pub async fn handle_import(plan: &ImportPlan, sink: &dyn ProgressSink, confirmed: bool) -> Result<ImportReport> {
    let file = read_records(&plan.path)?;
    if file.records.is_empty() {
        return Err(ImportError::EmptyBatch.into());
    }

    if !confirmed && !confirm_import(file.records.len(), plan)? {
        bail!("Import cancelled");
    }

    sink.info(
        Phase::Prepare,
        format!(
            "Beginning the Import - TargetEnvironment: {}, ImportFilename: {}",
            plan.target_environment,
            plan.path.display()
        ),
    );
    if let Some(source) = &file.source {
        sink.info(Phase::Prepare, format!("Records were exported from {}", source));
    }

    let token = resolve_token(TARGET_TOKEN_VAR, &plan.target_environment)?;
    let client = DynamicsClient::new(&plan.target_environment, token)?;
    let catalog = client
        .fetch_entity_catalog()
        .await
        .context("Failed to load metadata of the target environment")?;
    let store = DataverseStore::new(client, catalog);

    let mut records = file.records;
    remap_websites(&mut records, &plan.website_mappings, &store, sink).await?;

    let options = ImportOptions::builder()
        .clean_orphan_annotations(plan.clean_web_files)
        .build();
    let report = RecordImporter::new(&store, store.catalog(), options, sink)
        .run(records)
        .await?;

    Ok(report)
}
