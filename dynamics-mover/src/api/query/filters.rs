//! Filter trees for OData `$filter` expressions

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::records::{AttributeValue, Record, Scalar};

/// Comparison value in a filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FilterValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    /// Plain unique identifier column
    Guid(Uuid),
    /// Lookup column, rendered against the `_<attribute>_value` property
    Reference(Uuid),
}

/// Comparison operators supported by the exporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ge,
}

/// Filter expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Condition {
        field: String,
        operator: Operator,
        value: FilterValue,
    },
    /// Field equals any of the values
    In { field: String, values: Vec<FilterValue> },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl FilterValue {
    fn to_odata(&self) -> String {
        match self {
            FilterValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            FilterValue::Integer(i) => i.to_string(),
            FilterValue::Boolean(b) => b.to_string(),
            FilterValue::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
            FilterValue::Guid(id) | FilterValue::Reference(id) => id.to_string(),
        }
    }

    fn is_reference(&self) -> bool {
        matches!(self, FilterValue::Reference(_))
    }

    /// Whether an attribute value satisfies `value <operator> self`
    fn compare(&self, operator: Operator, value: &AttributeValue) -> bool {
        match (self, value, operator) {
            (FilterValue::Reference(id), AttributeValue::Reference(r), Operator::Eq) => r.id == *id,
            (FilterValue::Guid(id), AttributeValue::Identifier(v), Operator::Eq) => v == id,
            (FilterValue::String(s), AttributeValue::Scalar(Scalar::String(v)), Operator::Eq) => v == s,
            (FilterValue::Boolean(b), AttributeValue::Scalar(Scalar::Bool(v)), Operator::Eq) => v == b,
            (FilterValue::Integer(i), AttributeValue::Scalar(Scalar::Int(v)), op) => compare_ord(op, v, i),
            (FilterValue::Integer(i), AttributeValue::Scalar(Scalar::OptionSet(v)), op) => {
                compare_ord(op, &i64::from(*v), i)
            }
            (FilterValue::DateTime(dt), AttributeValue::Scalar(Scalar::DateTime(v)), op) => {
                compare_ord(op, v, dt)
            }
            _ => false,
        }
    }
}

fn compare_ord<T: PartialOrd>(operator: Operator, left: &T, right: &T) -> bool {
    match operator {
        Operator::Eq => left == right,
        Operator::Ge => left >= right,
    }
}

fn property_name(field: &str, reference: bool) -> String {
    if reference {
        format!("_{}_value", field)
    } else {
        field.to_string()
    }
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: FilterValue) -> Self {
        Filter::Condition {
            field: field.into(),
            operator: Operator::Eq,
            value,
        }
    }

    pub fn ge(field: impl Into<String>, value: FilterValue) -> Self {
        Filter::Condition {
            field: field.into(),
            operator: Operator::Ge,
            value,
        }
    }

    pub fn is_in(field: impl Into<String>, values: Vec<FilterValue>) -> Self {
        Filter::In {
            field: field.into(),
            values,
        }
    }

    /// Combine filters with `and`, collapsing trivial groups
    pub fn all(mut filters: Vec<Filter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::And(filters)),
        }
    }

    /// Combine filters with `or`, collapsing trivial groups
    pub fn any(mut filters: Vec<Filter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::Or(filters)),
        }
    }

    /// Render as an OData `$filter` expression (not URL-encoded)
    pub fn to_odata(&self) -> String {
        match self {
            Filter::Condition {
                field,
                operator,
                value,
            } => {
                let op = match operator {
                    Operator::Eq => "eq",
                    Operator::Ge => "ge",
                };
                format!(
                    "{} {} {}",
                    property_name(field, value.is_reference()),
                    op,
                    value.to_odata()
                )
            }
            Filter::In { field, values } => {
                if values.is_empty() {
                    return "false".to_string();
                }
                let parts: Vec<String> = values
                    .iter()
                    .map(|v| format!("{} eq {}", property_name(field, v.is_reference()), v.to_odata()))
                    .collect();
                format!("({})", parts.join(" or "))
            }
            Filter::And(filters) => join(filters, "and"),
            Filter::Or(filters) => join(filters, "or"),
        }
    }

    /// Evaluate the filter against a record held in memory
    ///
    /// The primary key (`<entity>id`) resolves to the record's own id.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Condition {
                field,
                operator,
                value,
            } => field_value(record, field)
                .map(|v| value.compare(*operator, &v))
                .unwrap_or(false),
            Filter::In { field, values } => field_value(record, field)
                .map(|v| values.iter().any(|value| value.compare(Operator::Eq, &v)))
                .unwrap_or(false),
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}

fn join(filters: &[Filter], op: &str) -> String {
    let parts: Vec<String> = filters.iter().map(|f| f.to_odata()).collect();
    format!("({})", parts.join(&format!(" {} ", op)))
}

fn field_value(record: &Record, field: &str) -> Option<AttributeValue> {
    if field == format!("{}id", record.entity_type) {
        return Some(AttributeValue::Identifier(record.id));
    }
    record.get(field).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_date_window() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let filter = Filter::all(vec![
            Filter::any(vec![
                Filter::ge("createdon", FilterValue::DateTime(since)),
                Filter::ge("modifiedon", FilterValue::DateTime(since)),
            ])
            .unwrap(),
            Filter::eq("statecode", FilterValue::Integer(0)),
        ])
        .unwrap();

        assert_eq!(
            filter.to_odata(),
            "((createdon ge 2024-03-01T00:00:00Z or modifiedon ge 2024-03-01T00:00:00Z) and statecode eq 0)"
        );
    }

    #[test]
    fn test_render_reference_uses_value_property() {
        let id = Uuid::nil();
        let filter = Filter::eq("adx_websiteid", FilterValue::Reference(id));
        assert_eq!(
            filter.to_odata(),
            "_adx_websiteid_value eq 00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_render_string_escapes_quotes() {
        let filter = Filter::eq("name", FilterValue::String("O'Neil".to_string()));
        assert_eq!(filter.to_odata(), "name eq 'O''Neil'");
        assert_eq!(Filter::is_in("x", vec![]).to_odata(), "false");
    }

    #[test]
    fn test_matches_record() {
        let website = Uuid::new_v4();
        let record = Record::new("adx_webpage", Uuid::new_v4())
            .with("adx_websiteid", AttributeValue::reference("adx_website", website))
            .with("statecode", AttributeValue::option_set(0));

        assert!(Filter::eq("adx_websiteid", FilterValue::Reference(website)).matches(&record));
        assert!(Filter::eq("statecode", FilterValue::Integer(0)).matches(&record));
        assert!(!Filter::eq("statecode", FilterValue::Integer(1)).matches(&record));
        assert!(Filter::is_in("adx_webpageid", vec![FilterValue::Guid(record.id)]).matches(&record));
        assert!(!Filter::eq("missing", FilterValue::Integer(0)).matches(&record));
    }
}
