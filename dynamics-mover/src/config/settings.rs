//! Mover settings file and its resolution into export and import plans

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::mask::expand_filename;
use crate::export::ExportOptions;
use crate::import::WebsiteMapping;

/// Invalid or incomplete settings
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsError {
    /// A required value is not set
    Missing(&'static str),
    /// Neither a create nor a modify date is set
    MissingDateFilter,
    InvalidDateFilterOption(String),
    InvalidPriorDays(String),
    InvalidDate(String),
    InvalidMask(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Missing(name) => write!(f, "{} must be specified", name),
            SettingsError::MissingDateFilter => {
                write!(f, "Either CreateFilter, ModifyFilter or PriorDaysToRetrieve must be specified")
            }
            SettingsError::InvalidDateFilterOption(value) => write!(
                f,
                "Invalid DateFilterOptions '{}' (expected CreateOnly, ModifyOnly or CreateAndModify)",
                value
            ),
            SettingsError::InvalidPriorDays(value) => {
                write!(f, "Invalid PriorDaysToRetrieve '{}'", value)
            }
            SettingsError::InvalidDate(value) => write!(f, "Invalid date '{}'", value),
            SettingsError::InvalidMask(message) => write!(f, "Invalid filename mask: {}", message),
        }
    }
}

impl std::error::Error for SettingsError {}

/// Which dates of the window are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "NumberOrText")]
pub enum DateFilterOptions {
    CreateOnly,
    ModifyOnly,
    #[default]
    CreateAndModify,
}

/// Settings values may be written as JSON numbers or strings
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Text(String),
}

impl TryFrom<NumberOrText> for DateFilterOptions {
    type Error = SettingsError;

    fn try_from(value: NumberOrText) -> Result<Self, Self::Error> {
        match value {
            NumberOrText::Number(n) => Self::from_number(n),
            NumberOrText::Text(text) => text.parse(),
        }
    }
}

impl DateFilterOptions {
    fn from_number(value: i64) -> Result<Self, SettingsError> {
        match value {
            // Unset in legacy files
            0 => Ok(Self::CreateAndModify),
            1 => Ok(Self::CreateOnly),
            2 => Ok(Self::ModifyOnly),
            3 => Ok(Self::CreateAndModify),
            other => Err(SettingsError::InvalidDateFilterOption(other.to_string())),
        }
    }
}

impl FromStr for DateFilterOptions {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Self::from_number(n);
        }
        match trimmed.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "createonly" => Ok(Self::CreateOnly),
            "modifyonly" => Ok(Self::ModifyOnly),
            "createandmodify" => Ok(Self::CreateAndModify),
            _ => Err(SettingsError::InvalidDateFilterOption(s.to_string())),
        }
    }
}

/// Parse a date the way legacy settings files write them
///
/// RFC 3339, a date-time without offset (taken as UTC) or a plain date.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, SettingsError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| SettingsError::InvalidDate(value.to_string()))
}

fn optional_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_date(text).map(Some).map_err(serde::de::Error::custom),
    }
}

fn optional_days<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<NumberOrText> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(SettingsError::InvalidPriorDays(text))),
    }
}

fn default_true() -> bool {
    true
}

fn default_batch_count() -> usize {
    10
}

/// Contents of the settings file
///
/// Keys are PascalCase so files written for the legacy mover keep working;
/// keys it had that are not used here (credentials, plugin switches) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MoverSettings {
    #[serde(default)]
    pub active_items_only: bool,
    #[serde(default, deserialize_with = "optional_date")]
    pub create_filter: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_date")]
    pub modify_filter: Option<DateTime<Utc>>,
    /// Overrides both dates with today minus this many days
    #[serde(default, deserialize_with = "optional_days")]
    pub prior_days_to_retrieve: Option<i64>,
    #[serde(default)]
    pub date_filter_options: DateFilterOptions,
    #[serde(default)]
    pub website_filter: Option<Uuid>,
    #[serde(default)]
    pub website_id_mapping: Vec<WebsiteMapping>,
    #[serde(default)]
    pub export_filename: Option<String>,
    #[serde(default)]
    pub import_filename: Option<String>,
    #[serde(default)]
    pub source_environment: Option<String>,
    #[serde(default)]
    pub target_environment: Option<String>,
    #[serde(default)]
    pub selected_entities: Vec<String>,
    /// Remove web file notes that are not part of the import
    #[serde(default = "default_true")]
    pub clean_web_files: bool,
    #[serde(default)]
    pub export_in_folder_structure: bool,
    /// Export queries in flight at the same time
    #[serde(default = "default_batch_count")]
    pub batch_count: usize,
}

impl Default for MoverSettings {
    fn default() -> Self {
        Self {
            active_items_only: false,
            create_filter: None,
            modify_filter: None,
            prior_days_to_retrieve: None,
            date_filter_options: DateFilterOptions::default(),
            website_filter: None,
            website_id_mapping: Vec::new(),
            export_filename: None,
            import_filename: None,
            source_environment: None,
            target_environment: None,
            selected_entities: Vec::new(),
            clean_web_files: true,
            export_in_folder_structure: false,
            batch_count: default_batch_count(),
        }
    }
}

/// Which steps a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Export,
    Import,
    /// Export, then import the exported file
    Run,
}

impl Mode {
    pub fn exports(&self) -> bool {
        matches!(self, Mode::Export | Mode::Run)
    }

    pub fn imports(&self) -> bool {
        matches!(self, Mode::Import | Mode::Run)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlan {
    pub source_environment: String,
    pub path: PathBuf,
    pub folder_structure: bool,
    pub options: ExportOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportPlan {
    pub target_environment: String,
    pub path: PathBuf,
    pub website_mappings: Vec<WebsiteMapping>,
    pub clean_web_files: bool,
}

/// Validated settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub export: Option<ExportPlan>,
    pub import: Option<ImportPlan>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl MoverSettings {
    /// Read a settings file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Effective (create, modify) dates for `today`
    pub fn date_window(&self, today: NaiveDate) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), SettingsError> {
        let (mut created, mut modified) = (self.create_filter, self.modify_filter);

        if let Some(days) = self.prior_days_to_retrieve {
            let start = Duration::try_days(days)
                .filter(|_| days >= 0)
                .and_then(|delta| today.checked_sub_signed(delta))
                .ok_or_else(|| SettingsError::InvalidPriorDays(days.to_string()))?;
            let start = start.and_time(NaiveTime::MIN).and_utc();
            created = Some(start);
            modified = Some(start);
        }

        match self.date_filter_options {
            DateFilterOptions::ModifyOnly => created = None,
            DateFilterOptions::CreateOnly => modified = None,
            DateFilterOptions::CreateAndModify => {}
        }

        Ok((created, modified))
    }

    /// Validate the settings for `mode` and compute the run plans
    ///
    /// `now` is the local time of the run, used for the date window and the
    /// filename masks.
    pub fn resolve(&self, mode: Mode, now: NaiveDateTime) -> Result<ResolvedSettings, SettingsError> {
        let export = if mode.exports() {
            Some(self.export_plan(now)?)
        } else {
            None
        };

        let import = if mode.imports() {
            let path = match (non_empty(&self.import_filename), &export) {
                (Some(name), _) => PathBuf::from(expand_filename(name, now)?),
                (None, Some(plan)) => plan.path.clone(),
                (None, None) => return Err(SettingsError::Missing("ImportFilename")),
            };
            let target_environment = non_empty(&self.target_environment)
                .ok_or(SettingsError::Missing("TargetEnvironment"))?
                .to_string();

            Some(ImportPlan {
                target_environment,
                path,
                website_mappings: self.website_id_mapping.clone(),
                clean_web_files: self.clean_web_files,
            })
        } else {
            None
        };

        Ok(ResolvedSettings { export, import })
    }

    fn export_plan(&self, now: NaiveDateTime) -> Result<ExportPlan, SettingsError> {
        let website = self
            .website_filter
            .filter(|id| !id.is_nil())
            .ok_or(SettingsError::Missing("WebsiteFilter"))?;

        let (created_since, modified_since) = self.date_window(now.date())?;
        if created_since.is_none() && modified_since.is_none() {
            return Err(SettingsError::MissingDateFilter);
        }

        let filename = non_empty(&self.export_filename).ok_or(SettingsError::Missing("ExportFilename"))?;
        let source_environment = non_empty(&self.source_environment)
            .ok_or(SettingsError::Missing("SourceEnvironment"))?
            .to_string();

        Ok(ExportPlan {
            source_environment,
            path: PathBuf::from(expand_filename(filename, now)?),
            folder_structure: self.export_in_folder_structure,
            options: ExportOptions {
                selected_entities: self.selected_entities.clone(),
                created_since,
                modified_since,
                website: Some(website),
                active_only: self.active_items_only,
                batch_count: self.batch_count.max(1),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn complete() -> MoverSettings {
        MoverSettings {
            create_filter: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            website_filter: Some(Uuid::new_v4()),
            export_filename: Some("portal {date}.json".to_string()),
            source_environment: Some("https://source.crm4.dynamics.com".to_string()),
            target_environment: Some("https://target.crm4.dynamics.com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_legacy_settings() {
        let website = Uuid::new_v4();
        let settings: MoverSettings = serde_json::from_value(json!({
            "ActiveItemsOnly": true,
            "CreateFilter": "2024-01-15T00:00:00",
            "ModifyFilter": null,
            "PriorDaysToRetrieve": "7",
            "DateFilterOptions": "2",
            "WebsiteFilter": website,
            "WebsiteIdMapping": [{"SourceId": website, "TargetId": website}],
            "ExportFilename": "export.json",
            "SourceUsername": "ignored",
            "DeactivateWebPagePlugins": true
        }))
        .unwrap();

        assert!(settings.active_items_only);
        assert_eq!(settings.create_filter, Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()));
        assert_eq!(settings.modify_filter, None);
        assert_eq!(settings.prior_days_to_retrieve, Some(7));
        assert_eq!(settings.date_filter_options, DateFilterOptions::ModifyOnly);
        assert_eq!(settings.website_id_mapping.len(), 1);
        assert!(settings.clean_web_files);
        assert_eq!(settings.batch_count, 10);
    }

    #[test]
    fn test_date_filter_option_forms() {
        let parse = |value: serde_json::Value| {
            serde_json::from_value::<MoverSettings>(json!({ "DateFilterOptions": value }))
                .map(|s| s.date_filter_options)
        };

        assert_eq!(parse(json!("CreateOnly")).unwrap(), DateFilterOptions::CreateOnly);
        assert_eq!(parse(json!(1)).unwrap(), DateFilterOptions::CreateOnly);
        assert_eq!(parse(json!(0)).unwrap(), DateFilterOptions::CreateAndModify);
        assert!(parse(json!("Sometimes")).is_err());
        assert_eq!("modify-only".parse::<DateFilterOptions>().unwrap(), DateFilterOptions::ModifyOnly);
    }

    #[test]
    fn test_prior_days_override_both_dates() {
        let settings = MoverSettings {
            prior_days_to_retrieve: Some(3),
            ..complete()
        };

        let (created, modified) = settings.date_window(now().date()).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap();
        assert_eq!(created, Some(expected));
        assert_eq!(modified, Some(expected));
    }

    #[test]
    fn test_date_filter_options_drop_dates() {
        let settings = MoverSettings {
            prior_days_to_retrieve: Some(1),
            date_filter_options: DateFilterOptions::ModifyOnly,
            ..complete()
        };
        let (created, modified) = settings.date_window(now().date()).unwrap();
        assert!(created.is_none());
        assert!(modified.is_some());

        let settings = MoverSettings {
            date_filter_options: DateFilterOptions::CreateOnly,
            modify_filter: Some(Utc::now()),
            ..complete()
        };
        let (created, modified) = settings.date_window(now().date()).unwrap();
        assert!(created.is_some());
        assert!(modified.is_none());
    }

    #[test]
    fn test_negative_prior_days_rejected() {
        let settings = MoverSettings {
            prior_days_to_retrieve: Some(-2),
            ..complete()
        };
        assert!(matches!(
            settings.date_window(now().date()),
            Err(SettingsError::InvalidPriorDays(_))
        ));
    }

    #[test]
    fn test_resolve_export() {
        let settings = complete();
        let resolved = settings.resolve(Mode::Export, now()).unwrap();

        let plan = resolved.export.unwrap();
        assert_eq!(plan.path, PathBuf::from("portal 2024-03-10.json"));
        assert_eq!(plan.options.website, settings.website_filter);
        assert_eq!(plan.options.created_since, settings.create_filter);
        assert!(resolved.import.is_none());
    }

    #[test]
    fn test_run_imports_the_exported_file() {
        let resolved = complete().resolve(Mode::Run, now()).unwrap();

        let export = resolved.export.unwrap();
        let import = resolved.import.unwrap();
        assert_eq!(import.path, export.path);
        assert_eq!(import.target_environment, "https://target.crm4.dynamics.com");
        assert!(import.clean_web_files);
    }

    #[test]
    fn test_export_validation() {
        let missing_website = MoverSettings {
            website_filter: Some(Uuid::nil()),
            ..complete()
        };
        assert_eq!(
            missing_website.resolve(Mode::Export, now()),
            Err(SettingsError::Missing("WebsiteFilter"))
        );

        let missing_dates = MoverSettings {
            create_filter: None,
            ..complete()
        };
        assert_eq!(
            missing_dates.resolve(Mode::Export, now()),
            Err(SettingsError::MissingDateFilter)
        );

        let missing_source = MoverSettings {
            source_environment: Some("  ".to_string()),
            ..complete()
        };
        assert_eq!(
            missing_source.resolve(Mode::Export, now()),
            Err(SettingsError::Missing("SourceEnvironment"))
        );
    }

    #[test]
    fn test_import_validation() {
        // Import alone needs neither website nor dates
        let settings = MoverSettings {
            import_filename: Some("in.json".to_string()),
            target_environment: Some("https://target.crm4.dynamics.com".to_string()),
            ..Default::default()
        };
        let plan = settings.resolve(Mode::Import, now()).unwrap().import.unwrap();
        assert_eq!(plan.path, PathBuf::from("in.json"));

        let no_file = MoverSettings {
            import_filename: None,
            ..settings.clone()
        };
        assert_eq!(
            no_file.resolve(Mode::Import, now()),
            Err(SettingsError::Missing("ImportFilename"))
        );

        let no_target = MoverSettings {
            target_environment: None,
            ..settings
        };
        assert_eq!(
            no_target.resolve(Mode::Import, now()),
            Err(SettingsError::Missing("TargetEnvironment"))
        );
    }

    #[test]
    fn test_parse_date_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_date("2024-05-01").unwrap(), expected);
        assert_eq!(parse_date("2024-05-01T00:00:00").unwrap(), expected);
        assert_eq!(parse_date("2024-05-01T02:00:00+02:00").unwrap(), expected);
        assert!(parse_date("yesterday").is_err());
    }
}
