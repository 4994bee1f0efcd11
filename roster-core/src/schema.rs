//! Response schemas and the payload types they validate into.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{InvariantError, SchemaError};

/// Names the response-shape validator applied to a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaId {
    Directory,
    Users,
}

impl SchemaId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Users => "users",
        }
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaId {
    type Err = InvariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directory" => Ok(Self::Directory),
            "users" => Ok(Self::Users),
            other => Err(InvariantError::InvalidValue {
                field: "schemaId".to_string(),
                reason: format!("unknown schema '{}'", other),
            }),
        }
    }
}

/// A payload type that a response body can be validated into.
///
/// Deserialization checks the shape; [`ResponseSchema::validate`] checks
/// the constraints serde cannot express.
pub trait ResponseSchema:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    const SCHEMA_ID: SchemaId;

    fn validate(&self) -> Result<(), SchemaError> {
        Ok(())
    }
}

fn require_ids<'a>(
    schema: SchemaId,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), SchemaError> {
    for (index, id) in ids.enumerate() {
        if id.trim().is_empty() {
            return Err(SchemaError::InvalidField {
                schema: schema.to_string(),
                field: format!("data[{}]._id", index),
                reason: "must not be empty".to_string(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// DIRECTORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub job_position: String,
    pub department: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryPayload {
    pub data: Vec<DirectoryUser>,
}

impl ResponseSchema for DirectoryPayload {
    const SCHEMA_ID: SchemaId = SchemaId::Directory;

    fn validate(&self) -> Result<(), SchemaError> {
        require_ids(Self::SCHEMA_ID, self.data.iter().map(|u| u.id.as_str()))
    }
}

// ============================================================================
// USERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    pub last_name: String,
    pub job_position: String,
    pub department: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_location: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersPayload {
    pub data: Vec<UserRecord>,
    pub pages: u64,
    pub total_documents: u64,
}

impl ResponseSchema for UsersPayload {
    const SCHEMA_ID: SchemaId = SchemaId::Users;

    fn validate(&self) -> Result<(), SchemaError> {
        require_ids(Self::SCHEMA_ID, self.data.iter().map(|u| u.id.as_str()))?;
        if (self.data.len() as u64) > self.total_documents {
            return Err(SchemaError::InvalidField {
                schema: Self::SCHEMA_ID.to_string(),
                field: "totalDocuments".to_string(),
                reason: format!(
                    "{} records returned but totalDocuments is {}",
                    self.data.len(),
                    self.total_documents
                ),
            });
        }
        Ok(())
    }
}
