//! Record write operations against the Dynamics 365 Web API

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// A single write request, addressed by entity set name and record id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operation {
    /// Create or update by id
    /// PATCH /entityset(id) without a concurrency header
    Upsert {
        /// Entity set name (e.g., "adx_webpages")
        entity_set: String,
        id: Uuid,
        /// Record data as JSON
        data: Value,
    },
    /// Update an existing record, never create it
    /// PATCH /entityset(id) with If-Match: *
    Update {
        entity_set: String,
        id: Uuid,
        data: Value,
    },
    /// DELETE /entityset(id)
    Delete { entity_set: String, id: Uuid },
    /// Associate records via navigation property (N:N relationships using $ref)
    /// POST /entityset(id)/navigation_property/$ref with body {"@odata.id": "target"}
    AssociateRef {
        entity_set: String,
        id: Uuid,
        /// Relationship schema name
        navigation_property: String,
        /// Absolute URL of the target record
        target_ref: String,
    },
}

/// Result of executing an Operation
#[derive(Debug, Clone)]
pub struct OperationResult {
    /// HTTP status code from the response
    pub status_code: u16,
    /// Response body, when the service returned one
    pub data: Option<Value>,
}

impl Operation {
    pub fn upsert(entity_set: impl Into<String>, id: Uuid, data: Value) -> Self {
        Self::Upsert {
            entity_set: entity_set.into(),
            id,
            data,
        }
    }

    pub fn update(entity_set: impl Into<String>, id: Uuid, data: Value) -> Self {
        Self::Update {
            entity_set: entity_set.into(),
            id,
            data,
        }
    }

    pub fn delete(entity_set: impl Into<String>, id: Uuid) -> Self {
        Self::Delete {
            entity_set: entity_set.into(),
            id,
        }
    }

    pub fn associate_ref(
        entity_set: impl Into<String>,
        id: Uuid,
        navigation_property: impl Into<String>,
        target_ref: impl Into<String>,
    ) -> Self {
        Self::AssociateRef {
            entity_set: entity_set.into(),
            id,
            navigation_property: navigation_property.into(),
            target_ref: target_ref.into(),
        }
    }

    /// Get the HTTP method for this operation
    pub fn http_method(&self) -> Method {
        match self {
            Self::Upsert { .. } | Self::Update { .. } => Method::PATCH,
            Self::Delete { .. } => Method::DELETE,
            Self::AssociateRef { .. } => Method::POST,
        }
    }

    /// Path relative to the Web API root
    pub fn path(&self) -> String {
        match self {
            Self::Upsert { entity_set, id, .. }
            | Self::Update { entity_set, id, .. }
            | Self::Delete { entity_set, id } => format!("{}({})", entity_set, id),
            Self::AssociateRef {
                entity_set,
                id,
                navigation_property,
                ..
            } => format!("{}({})/{}/$ref", entity_set, id, navigation_property),
        }
    }

    /// JSON body, if the request carries one
    pub fn body(&self) -> Option<Value> {
        match self {
            Self::Upsert { data, .. } | Self::Update { data, .. } => Some(data.clone()),
            Self::Delete { .. } => None,
            Self::AssociateRef { target_ref, .. } => {
                Some(serde_json::json!({ "@odata.id": target_ref }))
            }
        }
    }

    /// Extra headers for this operation
    pub fn headers(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            // Returns 201 on create and 200 on update, which tells the two apart
            Self::Upsert { .. } => vec![("Prefer", "return=representation")],
            Self::Update { .. } => vec![("If-Match", "*")],
            _ => Vec::new(),
        }
    }

    /// Get the operation type as a string
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Upsert { .. } => "upsert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::AssociateRef { .. } => "associate_ref",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_request_shape() {
        let id = Uuid::nil();
        let op = Operation::upsert("adx_webpages", id, json!({"adx_name": "Home"}));

        assert_eq!(op.http_method(), Method::PATCH);
        assert_eq!(op.path(), format!("adx_webpages({})", id));
        assert_eq!(op.headers(), vec![("Prefer", "return=representation")]);
        assert_eq!(op.body(), Some(json!({"adx_name": "Home"})));
    }

    #[test]
    fn test_update_never_creates() {
        let op = Operation::update("contacts", Uuid::nil(), json!({}));
        assert_eq!(op.headers(), vec![("If-Match", "*")]);
        assert_eq!(op.operation_type(), "update");
    }

    #[test]
    fn test_associate_ref_shape() {
        let op = Operation::associate_ref(
            "adx_webroles",
            Uuid::nil(),
            "adx_webrole_contact",
            "https://org.crm.dynamics.com/api/data/v9.2/contacts(00000000-0000-0000-0000-000000000000)",
        );

        assert_eq!(op.http_method(), Method::POST);
        assert!(op.path().ends_with("/adx_webrole_contact/$ref"));
        assert_eq!(
            op.body().unwrap()["@odata.id"],
            json!("https://org.crm.dynamics.com/api/data/v9.2/contacts(00000000-0000-0000-0000-000000000000)")
        );
        assert!(Operation::delete("contacts", Uuid::nil()).body().is_none());
    }
}
