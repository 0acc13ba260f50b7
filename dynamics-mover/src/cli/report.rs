//! Run plan and import summary output

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use colored::*;

use crate::config::ResolvedSettings;
use crate::import::{EntityProgress, ImportReport};

/// Print what the run is about to do
pub fn print_plan(resolved: &ResolvedSettings) {
    if let Some(plan) = &resolved.export {
        println!("{}", "Export".bold());
        println!("  Source:      {}", plan.source_environment.cyan());
        println!("  File:        {}", plan.path.display().to_string().cyan());
        if let Some(website) = plan.options.website {
            println!("  Website:     {}", website);
        }
        if let Some(date) = plan.options.created_since {
            println!("  Created on:  >= {}", date.format("%Y-%m-%d %H:%M"));
        }
        if let Some(date) = plan.options.modified_since {
            println!("  Modified on: >= {}", date.format("%Y-%m-%d %H:%M"));
        }
        if plan.options.active_only {
            println!("  Active records only");
        }
        if !plan.options.selected_entities.is_empty() {
            println!("  Entities:    {}", plan.options.selected_entities.join(", "));
        }
    }

    if let Some(plan) = &resolved.import {
        println!("{}", "Import".bold());
        println!("  Target:      {}", plan.target_environment.cyan());
        println!("  File:        {}", plan.path.display().to_string().cyan());
        for mapping in &plan.website_mappings {
            println!("  Website:     {} -> {}", mapping.source_id, mapping.target_id);
        }
        if !plan.clean_web_files {
            println!("  Web file notes of the target are kept");
        }
    }
    println!();
}

fn ratio(succeeded: usize, failed: usize) -> String {
    format!("{}/{}", succeeded, failed)
}

/// Print per-entity counters as a table
pub fn print_summary(report: &ImportReport) {
    let name_width = report
        .progress
        .iter()
        .map(|p| p.display_name.len())
        .max()
        .unwrap_or(0)
        .max("Entity".len());

    println!();
    println!(
        "{:<width$}  {:>7}  {:>9}  {:>9}  {:>9}  {:>10}",
        "Entity".bold(),
        "Total".bold(),
        "Processed".bold(),
        "Import".bold(),
        "Refs".bold(),
        "Deactivate".bold(),
        width = name_width
    );

    for entry in &report.progress {
        let line = format!(
            "{:<width$}  {:>7}  {:>9}  {:>9}  {:>9}  {:>10}",
            entry.display_name,
            entry.total_count,
            entry.processed_count,
            ratio(entry.succeeded_phase1, entry.failed_phase1),
            ratio(entry.succeeded_phase2, entry.failed_phase2),
            ratio(entry.succeeded_deactivation, entry.failed_deactivation),
            width = name_width
        );
        if entry.has_failures() {
            println!("{}", line.red());
        } else {
            println!("{}", line.green());
        }
    }
    println!("{}", "(succeeded/failed)".dimmed());

    if !report.missing_schema.is_empty() {
        println!();
        println!(
            "{}",
            format!(
                "{} records skipped, their entity does not exist in the target:",
                report.missing_schema.len()
            )
            .yellow()
        );
        for reference in &report.missing_schema {
            println!("  {}", reference);
        }
    }

    println!();
    if report.has_failures() {
        println!("{}", "Import finished with errors".red().bold());
    } else {
        println!("{}", "Import finished".green().bold());
    }
}

/// Write per-entity counters as CSV
pub fn write_csv_report(path: &Path, report: &ImportReport) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create report {}", path.display()))?;

    for entry in &report.progress {
        writer
            .serialize(entry)
            .with_context(|| format!("Failed to write report row for {}", entry.entity_type))?;
    }

    // Skipped types have no counters, list them with their record count
    let mut missing: BTreeMap<&str, usize> = BTreeMap::new();
    for reference in &report.missing_schema {
        *missing.entry(reference.entity_type.as_str()).or_default() += 1;
    }
    for (entity_type, count) in missing {
        let row = EntityProgress::new(entity_type, entity_type, count);
        writer.serialize(&row).context("Failed to write report row")?;
    }

    writer.flush().context("Failed to flush report")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::engine::Phase1Summary;
    use crate::records::EntityReference;
    use uuid::Uuid;
    use tempfile::TempDir;

    fn report() -> ImportReport {
        let mut page = EntityProgress::new("adx_webpage", "Web Page", 3);
        page.processed_count = 3;
        page.succeeded_phase1 = 2;
        page.failed_phase1 = 1;
        page.succeeded_phase2 = 1;

        ImportReport {
            progress: vec![page],
            missing_schema: Vec::new(),
            phase1: Phase1Summary::default(),
            deferred: 1,
            deactivation_queued: 0,
            unresolved: Vec::new(),
        }
    }

    #[test]
    fn test_csv_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");

        write_csv_report(&path, &report()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "entity_type,display_name,total_count,processed_count,succeeded_phase1,failed_phase1,\
             succeeded_phase2,failed_phase2,succeeded_deactivation,failed_deactivation"
        );
        assert_eq!(lines.next().unwrap(), "adx_webpage,Web Page,3,3,2,1,1,0,0,0");
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_csv_report_lists_skipped_types() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");
        let mut report = report();
        report.missing_schema = vec![
            EntityReference::new("adx_legacy", Uuid::new_v4()),
            EntityReference::new("adx_legacy", Uuid::new_v4()),
        ];

        write_csv_report(&path, &report).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().last().unwrap(), "adx_legacy,adx_legacy,2,0,0,0,0,0,0,0");
    }
}
