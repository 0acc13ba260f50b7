//! Command line arguments

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::config::{DateFilterOptions, MoverSettings, SettingsError, parse_date};

/// Move portal records between Dynamics 365 environments
#[derive(Parser, Debug)]
#[command(name = "dynamics-mover")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (JSON with PascalCase keys)
    #[arg(long, short, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export records from the source environment to a file
    Export(RunArgs),
    /// Import records from a file into the target environment
    Import(RunArgs),
    /// Export, then import the exported records
    Run(RunArgs),
}

impl Commands {
    pub fn args(&self) -> &RunArgs {
        match self {
            Commands::Export(args) | Commands::Import(args) | Commands::Run(args) => args,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: SettingsArgs,

    /// Import without asking for confirmation
    #[arg(long, short)]
    pub yes: bool,

    /// Write per-entity import counters to a CSV file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Run log location (default: "dynamics-mover <date>.log")
    #[arg(long, value_name = "FILE", conflicts_with = "no_log_file")]
    pub log_file: Option<PathBuf>,

    /// Do not write a run log
    #[arg(long)]
    pub no_log_file: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

fn date_arg(value: &str) -> Result<DateTime<Utc>, SettingsError> {
    parse_date(value)
}

/// Values overriding the settings file
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Export records created on or after this date
    #[arg(long, value_name = "DATE", value_parser = date_arg)]
    pub created_on: Option<DateTime<Utc>>,

    /// Export records modified on or after this date
    #[arg(long, value_name = "DATE", value_parser = date_arg)]
    pub modified_on: Option<DateTime<Utc>>,

    /// Export records of the last DAYS days (overrides both dates)
    #[arg(long, value_name = "DAYS")]
    pub prior_days: Option<i64>,

    /// CreateOnly, ModifyOnly or CreateAndModify
    #[arg(long, value_name = "OPTION")]
    pub date_filter_options: Option<DateFilterOptions>,

    /// Only export active records
    #[arg(long, value_name = "BOOL")]
    pub active_only: Option<bool>,

    /// Website whose records are exported
    #[arg(long, value_name = "ID")]
    pub website: Option<Uuid>,

    /// Export destination, may contain {date} masks
    #[arg(long, value_name = "PATH")]
    pub export_file: Option<String>,

    /// Import source, may contain {date} masks
    #[arg(long, value_name = "PATH")]
    pub import_file: Option<String>,

    /// Source environment URL
    #[arg(long, value_name = "URL")]
    pub source_env: Option<String>,

    /// Target environment URL
    #[arg(long, value_name = "URL")]
    pub target_env: Option<String>,

    /// Delete web file notes of the target that are not imported
    #[arg(long, value_name = "BOOL")]
    pub clean_web_files: Option<bool>,

    /// Write one file per record in a folder tree
    #[arg(long, value_name = "BOOL")]
    pub folder_structure: Option<bool>,

    /// Export queries in flight at the same time
    #[arg(long, value_name = "N")]
    pub batch_count: Option<usize>,

    /// Entity to export (repeatable, replaces SelectedEntities)
    #[arg(long = "entity", value_name = "NAME")]
    pub entities: Vec<String>,
}

impl SettingsArgs {
    pub fn apply(&self, settings: &mut MoverSettings) {
        if let Some(date) = self.created_on {
            settings.create_filter = Some(date);
        }
        if let Some(date) = self.modified_on {
            settings.modify_filter = Some(date);
        }
        if let Some(days) = self.prior_days {
            settings.prior_days_to_retrieve = Some(days);
        }
        if let Some(options) = self.date_filter_options {
            settings.date_filter_options = options;
        }
        if let Some(active) = self.active_only {
            settings.active_items_only = active;
        }
        if let Some(website) = self.website {
            settings.website_filter = Some(website);
        }
        if let Some(path) = &self.export_file {
            settings.export_filename = Some(path.clone());
        }
        if let Some(path) = &self.import_file {
            settings.import_filename = Some(path.clone());
        }
        if let Some(url) = &self.source_env {
            settings.source_environment = Some(url.clone());
        }
        if let Some(url) = &self.target_env {
            settings.target_environment = Some(url.clone());
        }
        if let Some(clean) = self.clean_web_files {
            settings.clean_web_files = clean;
        }
        if let Some(folders) = self.folder_structure {
            settings.export_in_folder_structure = folders;
        }
        if let Some(count) = self.batch_count {
            settings.batch_count = count;
        }
        if !self.entities.is_empty() {
            settings.selected_entities = self.entities.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "dynamics-mover",
            "run",
            "--settings",
            "mover.json",
            "--prior-days",
            "7",
            "--date-filter-options",
            "ModifyOnly",
            "--active-only",
            "true",
            "--entity",
            "adx_webpage",
            "--entity",
            "adx_webfile",
            "--yes",
        ])
        .unwrap();

        assert_eq!(cli.settings, Some(PathBuf::from("mover.json")));
        assert!(matches!(cli.command, Commands::Run(_)));

        let args = cli.command.args();
        assert!(args.yes);
        assert_eq!(args.overrides.prior_days, Some(7));
        assert_eq!(args.overrides.date_filter_options, Some(DateFilterOptions::ModifyOnly));
        assert_eq!(args.overrides.entities, vec!["adx_webpage", "adx_webfile"]);
    }

    #[test]
    fn test_log_file_flags_conflict() {
        let result = Cli::try_parse_from([
            "dynamics-mover",
            "import",
            "--log-file",
            "run.log",
            "--no-log-file",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_replace_settings() {
        let mut settings = MoverSettings {
            export_filename: Some("from-file.json".to_string()),
            selected_entities: vec!["adx_webpage".to_string()],
            ..Default::default()
        };
        let website = Uuid::new_v4();
        let overrides = SettingsArgs {
            website: Some(website),
            export_file: Some("override.json".to_string()),
            clean_web_files: Some(false),
            created_on: Some(parse_date("2024-02-01").unwrap()),
            ..Default::default()
        };

        overrides.apply(&mut settings);

        assert_eq!(settings.website_filter, Some(website));
        assert_eq!(settings.export_filename.as_deref(), Some("override.json"));
        assert!(!settings.clean_web_files);
        assert!(settings.create_filter.is_some());
        // Not overridden
        assert_eq!(settings.selected_entities, vec!["adx_webpage"]);
    }
}
