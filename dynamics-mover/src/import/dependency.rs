//! Forward-dependency predicates used by the phase 1 scan

use uuid::Uuid;

use crate::records::Record;

/// Whether any lookup of `record` targets a record that is not created yet
pub fn has_pending_reference(record: &Record, is_pending: impl Fn(&Uuid) -> bool) -> bool {
    record.references().any(|(_, target)| is_pending(&target.id))
}

/// Whether a bare identifier of `record` equals the id of another pending record
///
/// Intersect records carry the two side ids as plain identifiers, so such a
/// record cannot be created before both sides exist. The record's own id is
/// ignored.
pub fn bare_identifier_dependency(record: &Record, is_pending: impl Fn(&Uuid) -> bool) -> bool {
    record
        .identifiers()
        .any(|id| id != record.id && is_pending(&id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::AttributeValue;
    use std::collections::HashSet;

    #[test]
    fn test_pending_reference() {
        let parent = Uuid::new_v4();
        let record = Record::new("adx_webpage", Uuid::new_v4())
            .with("adx_parentpageid", AttributeValue::reference("adx_webpage", parent));

        let pending: HashSet<Uuid> = [parent].into_iter().collect();
        assert!(has_pending_reference(&record, |id| pending.contains(id)));
        assert!(!has_pending_reference(&record, |_| false));
    }

    #[test]
    fn test_self_reference_counts_as_pending() {
        let id = Uuid::new_v4();
        let record = Record::new("adx_webpage", id)
            .with("adx_rootwebpageid", AttributeValue::reference("adx_webpage", id));

        assert!(has_pending_reference(&record, |other| *other == id));
    }

    #[test]
    fn test_bare_identifier_ignores_own_id() {
        let id = Uuid::new_v4();
        let role = Uuid::new_v4();
        let record = Record::new("adx_webrole_contact", id)
            .with("adx_webrole_contactid", AttributeValue::identifier(id))
            .with("adx_webroleid", AttributeValue::identifier(role));

        assert!(!bare_identifier_dependency(&record, |other| *other == id));
        assert!(bare_identifier_dependency(&record, |other| *other == role));
    }

    #[test]
    fn test_lookups_are_not_bare_identifiers() {
        let target = Uuid::new_v4();
        let record = Record::new("adx_webpage", Uuid::new_v4())
            .with("adx_websiteid", AttributeValue::reference("adx_website", target));

        assert!(!bare_identifier_dependency(&record, |id| *id == target));
    }
}
