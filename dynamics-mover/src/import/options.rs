//! Import engine options

use serde::{Deserialize, Serialize};

/// Attribute names and switches used by the import engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Entity type committed after everything else
    pub annotation_entity: String,
    /// Lookup on annotations pointing at their parent record
    pub annotation_parent_attribute: String,
    /// Parent types whose extra annotations are removed after import
    pub file_parent_types: Vec<String>,
    /// Attribute stripped before every write
    pub owner_attribute: String,
    pub state_attribute: String,
    pub status_attribute: String,
    /// State value marking a record as inactive
    pub inactive_state: i32,
    /// Status reason written together with the inactive state (-1 = default for the state)
    pub inactive_status: i32,
    /// Delete annotations of a web file that are not part of the import
    pub clean_orphan_annotations: bool,
    /// Defer records holding a bare identifier of another pending record
    pub detect_bare_identifiers: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            annotation_entity: "annotation".to_string(),
            annotation_parent_attribute: "objectid".to_string(),
            file_parent_types: vec!["adx_webfile".to_string()],
            owner_attribute: "ownerid".to_string(),
            state_attribute: "statecode".to_string(),
            status_attribute: "statuscode".to_string(),
            inactive_state: 1,
            inactive_status: -1,
            clean_orphan_annotations: true,
            detect_bare_identifiers: true,
        }
    }
}

impl ImportOptions {
    pub fn builder() -> ImportOptionsBuilder {
        ImportOptionsBuilder::new()
    }

    pub fn is_annotation(&self, entity_type: &str) -> bool {
        entity_type == self.annotation_entity
    }

    pub fn is_file_parent(&self, entity_type: &str) -> bool {
        self.file_parent_types.iter().any(|t| t == entity_type)
    }
}

/// Builder for ImportOptions
#[derive(Debug)]
pub struct ImportOptionsBuilder {
    options: ImportOptions,
}

impl ImportOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: ImportOptions::default(),
        }
    }

    /// Enable/disable removal of annotations not part of the import
    pub fn clean_orphan_annotations(mut self, enabled: bool) -> Self {
        self.options.clean_orphan_annotations = enabled;
        self
    }

    /// Enable/disable deferral on bare identifier matches
    pub fn detect_bare_identifiers(mut self, enabled: bool) -> Self {
        self.options.detect_bare_identifiers = enabled;
        self
    }

    /// Build the final options
    pub fn build(self) -> ImportOptions {
        self.options
    }
}

impl Default for ImportOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ImportOptions::default();
        assert!(options.is_annotation("annotation"));
        assert!(options.is_file_parent("adx_webfile"));
        assert_eq!(options.inactive_state, 1);
        assert_eq!(options.inactive_status, -1);
        assert!(options.detect_bare_identifiers);
    }

    #[test]
    fn test_builder_overrides() {
        let options = ImportOptions::builder()
            .clean_orphan_annotations(false)
            .detect_bare_identifiers(false)
            .build();

        assert!(!options.clean_orphan_annotations);
        assert!(!options.detect_bare_identifiers);
        assert_eq!(options.owner_attribute, "ownerid");
    }
}
