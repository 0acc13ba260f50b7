//! Web API implementation of the record store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::client::{ApiError, DynamicsClient};
use super::metadata::{AttributeType, EntityCatalog, EntityTypeDescriptor};
use super::operations::Operation;
use super::query::Query;
use crate::import::store::{AssociateOutcome, RecordStore, StoreError, UpsertOutcome};
use crate::records::{AttributeValue, EntityReference, Record, Scalar};

/// Fault code for "Cannot insert duplicate key" on associate
const DUPLICATE_KEY_CODES: [&str; 2] = ["0x80040237", "-2147220937"];

const LOOKUP_LOGICAL_NAME: &str = "@Microsoft.Dynamics.CRM.lookuplogicalname";

impl From<ApiError> for StoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Http {
                status,
                code,
                message,
            } => StoreError::Rejected {
                status,
                code,
                message,
            },
            ApiError::Network(message) => StoreError::Transport(message),
            ApiError::Decode(message) => StoreError::Decode(message),
        }
    }
}

/// Record store backed by one Dataverse environment
pub struct DataverseStore {
    client: DynamicsClient,
    catalog: EntityCatalog,
}

impl DataverseStore {
    pub fn new(client: DynamicsClient, catalog: EntityCatalog) -> Self {
        Self { client, catalog }
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    fn descriptor(&self, entity_type: &str) -> Result<&EntityTypeDescriptor, StoreError> {
        self.catalog
            .get(entity_type)
            .ok_or_else(|| StoreError::Schema(format!("Unknown entity '{}'", entity_type)))
    }

    fn entity_set(&self, entity_type: &str) -> Result<&str, StoreError> {
        self.catalog.entity_set_name(entity_type).ok_or_else(|| {
            StoreError::Schema(format!(
                "Missing entity set name for entity '{}' - cannot build URL",
                entity_type
            ))
        })
    }

    /// Build the JSON body for a write
    ///
    /// Lookups become `<NavigationProperty>@odata.bind` entries, the primary id
    /// is carried by the URL.
    pub fn to_payload(&self, record: &Record) -> Result<Value, StoreError> {
        let descriptor = self.descriptor(&record.entity_type)?;
        let mut payload = Map::new();

        for (name, value) in &record.attributes {
            if descriptor.primary_id_attribute.as_deref() == Some(name.as_str()) {
                continue;
            }

            match value {
                AttributeValue::Reference(target) => {
                    let navigation = descriptor
                        .attribute(name)
                        .and_then(|a| a.navigation_property(&target.entity_type))
                        .unwrap_or(name.as_str());
                    let target_set = self.entity_set(&target.entity_type)?;
                    payload.insert(
                        format!("{}@odata.bind", navigation),
                        Value::String(bind_path(target_set, target)),
                    );
                }
                other => {
                    if let Some(json) = other.to_json() {
                        payload.insert(name.clone(), json);
                    }
                }
            }
        }

        Ok(Value::Object(payload))
    }

    /// Decode one entity JSON object returned by the Web API
    pub fn from_json(&self, entity_type: &str, json: &Value) -> Result<Record, StoreError> {
        let descriptor = self.descriptor(entity_type)?;
        let object = json
            .as_object()
            .ok_or_else(|| StoreError::Decode(format!("{} record is not an object", entity_type)))?;

        let id_attribute = descriptor
            .primary_id_attribute
            .clone()
            .unwrap_or_else(|| format!("{}id", entity_type));
        let id = object
            .get(&id_attribute)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                StoreError::Decode(format!("{} record without {}", entity_type, id_attribute))
            })?;

        let mut record = Record::new(entity_type, id);

        for (key, value) in object {
            if key.contains('@') || value.is_null() {
                continue;
            }

            if let Some(name) = key.strip_prefix('_').and_then(|k| k.strip_suffix("_value")) {
                let target_type = object
                    .get(&format!("{}{}", key, LOOKUP_LOGICAL_NAME))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .or_else(|| {
                        descriptor
                            .attribute(name)
                            .and_then(|a| a.targets.first().cloned())
                    });
                let target_id = value.as_str().and_then(|s| Uuid::parse_str(s).ok());

                if let (Some(target_type), Some(target_id)) = (target_type, target_id) {
                    record.set(name, AttributeValue::reference(target_type, target_id));
                }
                continue;
            }

            // Intersect columns are side keys even without attribute metadata
            let attribute_type = match descriptor.attribute(key) {
                _ if *key == id_attribute => Some(AttributeType::Uniqueidentifier),
                None if descriptor.is_intersect => Some(AttributeType::Uniqueidentifier),
                attribute => attribute.map(|a| a.attribute_type.clone()),
            };

            if let Some(decoded) = decode_value(attribute_type.as_ref(), value) {
                record.set(key.clone(), decoded);
            }
        }

        Ok(record)
    }
}

/// Decode a JSON property using the attribute type when known
fn decode_value(attribute_type: Option<&AttributeType>, value: &Value) -> Option<AttributeValue> {
    let decoded = match (attribute_type, value) {
        (Some(AttributeType::Uniqueidentifier), Value::String(s)) => {
            AttributeValue::Identifier(Uuid::parse_str(s).ok()?)
        }
        (Some(AttributeType::DateTime), Value::String(s)) => {
            let parsed = DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc);
            Scalar::DateTime(parsed).into()
        }
        (Some(t), Value::Number(n)) if t.is_option_set() => {
            Scalar::OptionSet(i32::try_from(n.as_i64()?).ok()?).into()
        }
        (Some(AttributeType::Money), Value::Number(n)) => Scalar::Money(n.as_f64()?).into(),
        (Some(AttributeType::Decimal | AttributeType::Double), Value::Number(n)) => {
            Scalar::Float(n.as_f64()?).into()
        }
        (_, Value::String(s)) => AttributeValue::string(s.clone()),
        (_, Value::Bool(b)) => AttributeValue::bool(*b),
        (_, Value::Number(n)) => match n.as_i64() {
            Some(i) => AttributeValue::int(i),
            None => Scalar::Float(n.as_f64()?).into(),
        },
        _ => return None,
    };

    Some(decoded)
}

fn is_duplicate_association(err: &ApiError) -> bool {
    match err {
        ApiError::Http { code: Some(code), .. } => {
            DUPLICATE_KEY_CODES.iter().any(|c| c.eq_ignore_ascii_case(code))
        }
        _ => false,
    }
}

#[async_trait]
impl RecordStore for DataverseStore {
    async fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError> {
        let entity_set = self.entity_set(&record.entity_type)?;
        let payload = self.to_payload(record)?;

        let result = self
            .client
            .execute(&Operation::upsert(entity_set, record.id, payload))
            .await?;

        Ok(if result.status_code == 201 {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn update(&self, record: &Record) -> Result<(), StoreError> {
        let entity_set = self.entity_set(&record.entity_type)?;
        let payload = self.to_payload(record)?;

        self.client
            .execute(&Operation::update(entity_set, record.id, payload))
            .await?;
        Ok(())
    }

    async fn associate(
        &self,
        entity1: &str,
        id1: Uuid,
        relationship: &str,
        entity2: &str,
        id2: Uuid,
    ) -> Result<AssociateOutcome, StoreError> {
        let set1 = self.entity_set(entity1)?;
        let set2 = self.entity_set(entity2)?;
        let target_ref = self.client.api_url(&format!("{}({})", set2, id2));

        match self
            .client
            .execute(&Operation::associate_ref(set1, id1, relationship, target_ref))
            .await
        {
            Ok(_) => Ok(AssociateOutcome::Associated),
            Err(e) if is_duplicate_association(&e) => Ok(AssociateOutcome::AlreadyAssociated),
            Err(e) => Err(e.into()),
        }
    }

    async fn query(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        let entity_set = self.entity_set(&query.entity)?;
        let query_string = query.to_query_string();
        let path = if query_string.is_empty() {
            entity_set.to_string()
        } else {
            format!("{}?{}", entity_set, query_string)
        };

        let items = self.client.retrieve_all(&path).await?;
        log::debug!("Retrieved {} {} record(s)", items.len(), query.entity);

        items
            .iter()
            .map(|item| self.from_json(&query.entity, item))
            .collect()
    }

    async fn delete(&self, entity_type: &str, id: Uuid) -> Result<(), StoreError> {
        let entity_set = self.entity_set(entity_type)?;
        self.client
            .execute(&Operation::delete(entity_set, id))
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for DataverseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataverseStore")
            .field("base_url", &self.client.base_url())
            .field("entities", &self.catalog.len())
            .finish()
    }
}

/// Reference to a record as written in `@odata.bind` values
fn bind_path(entity_set: &str, reference: &EntityReference) -> String {
    format!("/{}({})", entity_set, reference.id)
}
