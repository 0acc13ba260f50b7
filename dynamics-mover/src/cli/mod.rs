//! Command line front end: settings resolution, export and import runs

mod args;
mod auth;
pub mod commands;
mod report;

use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::{Local, NaiveDateTime};

pub use args::{Cli, Commands, RunArgs};

use crate::config::{Mode, MoverSettings, ResolvedSettings};
use crate::import::LogSink;

fn default_log_file(now: NaiveDateTime) -> PathBuf {
    PathBuf::from(format!("dynamics-mover {}.log", now.format("%Y-%m-%d %H.%M.%S")))
}

/// Resolve settings and run the requested command
pub async fn run(cli: Cli) -> Result<()> {
    let mode = match cli.command {
        Commands::Export(_) => Mode::Export,
        Commands::Import(_) => Mode::Import,
        Commands::Run(_) => Mode::Run,
    };
    let args = cli.command.args();

    if args.no_color {
        colored::control::set_override(false);
    }

    let mut settings = match &cli.settings {
        Some(path) => MoverSettings::load(path)?,
        None => MoverSettings::default(),
    };
    args.overrides.apply(&mut settings);

    let now = Local::now().naive_local();
    let resolved = settings.resolve(mode, now)?;
    report::print_plan(&resolved);

    let sink = LogSink::new();
    let result = execute(&resolved, args, &sink).await;

    if !args.no_log_file && !sink.is_empty() {
        let path = args.log_file.clone().unwrap_or_else(|| default_log_file(now));
        match sink.save(&path) {
            Ok(()) => log::info!("Log file saved to {}", path.display()),
            Err(e) => log::warn!("{:#}", e),
        }
    }

    result
}

async fn execute(resolved: &ResolvedSettings, args: &RunArgs, sink: &LogSink) -> Result<()> {
    if let Some(plan) = &resolved.export {
        commands::export::handle_export(plan, sink).await?;
    }

    if let Some(plan) = &resolved.import {
        let report = commands::import::handle_import(plan, sink, args.yes).await?;
        report::print_summary(&report);

        if let Some(path) = &args.report {
            report::write_csv_report(path, &report)?;
            log::info!("Report saved to {}", path.display());
        }
        if report.has_failures() {
            bail!("Import finished with failures");
        }
    }

    Ok(())
}
