//! Date masks in export and import filenames
//!
//! `{date}` expands to the run date as `YYYY-MM-DD`, `{date:<strftime>}` uses
//! the given format (e.g. `export {date:%Y%m%d-%H%M}.json`).

use chrono::NaiveDateTime;
use chrono::format::{Item, StrftimeItems};
use regex::{Captures, Regex};

use super::SettingsError;

const MASK_PATTERN: &str = r"\{date(?::([^}]*))?\}";
const DEFAULT_FORMAT: &str = "%Y-%m-%d";

/// Replace every date mask in `template` with `now`
pub fn expand_filename(template: &str, now: NaiveDateTime) -> Result<String, SettingsError> {
    let pattern = Regex::new(MASK_PATTERN).map_err(|e| SettingsError::InvalidMask(e.to_string()))?;

    for captures in pattern.captures_iter(template) {
        let format = captures.get(1).map(|m| m.as_str()).unwrap_or(DEFAULT_FORMAT);
        if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(SettingsError::InvalidMask(format!(
                "unsupported date format '{}' in '{}'",
                format, template
            )));
        }
    }

    Ok(pattern
        .replace_all(template, |captures: &Captures| {
            let format = captures.get(1).map(|m| m.as_str()).unwrap_or(DEFAULT_FORMAT);
            now.format(format).to_string()
        })
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(14, 5, 9)
            .unwrap()
    }

    #[test]
    fn test_default_mask() {
        assert_eq!(
            expand_filename("portal {date}.json", now()).unwrap(),
            "portal 2024-03-07.json"
        );
    }

    #[test]
    fn test_custom_format() {
        assert_eq!(
            expand_filename("out/{date:%Y}/export-{date:%Y%m%d-%H%M}.zip", now()).unwrap(),
            "out/2024/export-20240307-1405.zip"
        );
    }

    #[test]
    fn test_without_mask() {
        assert_eq!(expand_filename("export.json", now()).unwrap(), "export.json");
    }

    #[test]
    fn test_invalid_format() {
        assert!(matches!(
            expand_filename("export {date:%K}.json", now()),
            Err(SettingsError::InvalidMask(_))
        ));
        assert!(expand_filename("export {date:}.json", now()).is_err());
    }
}
