use mongodb::bson::{oid::ObjectId, Document};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::{error::AppError, utils::json_object_to_document};

/// One player's persisted record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub score: i64,
    pub cost: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i64>,
}

impl LeaderboardEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            score: 0,
            cost: 0,
            rank: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct LeaderboardEntryResponse {
    pub id: Option<String>,
    pub name: String,
    pub score: i64,
    pub cost: i64,
    pub rank: Option<i64>,
}

impl From<LeaderboardEntry> for LeaderboardEntryResponse {
    fn from(e: LeaderboardEntry) -> Self {
        LeaderboardEntryResponse {
            id: e.id.map(|oid| oid.to_hex()),
            name: e.name,
            score: e.score,
            cost: e.cost,
            rank: e.rank,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct InsertRequest {
    pub name: String,
}

impl InsertRequest {
    pub fn validated_name(&self) -> Result<&str, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Name cannot be empty".into()));
        }
        Ok(name)
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateRequest {
    #[schema(value_type = Object)]
    pub filter: Map<String, Value>,
    #[schema(value_type = Object)]
    pub update: Map<String, Value>,
}

const INTEGER_FIELDS: [&str; 3] = ["score", "cost", "rank"];

impl UpdateRequest {
    /// Checks the request and converts it into a store filter and a set of
    /// fields to replace.
    pub fn into_documents(self) -> Result<(Document, Document), AppError> {
        if self.filter.is_empty() || self.update.is_empty() {
            return Err(AppError::Validation(
                "Filter and update fields cannot be empty".into(),
            ));
        }

        reject_operators(&self.filter)?;
        reject_operators(&self.update)?;

        if self.update.contains_key("_id") {
            return Err(AppError::Validation("_id cannot be updated".into()));
        }

        for (key, value) in &self.update {
            match key.as_str() {
                "name" => {
                    if !value.as_str().is_some_and(|n| !n.trim().is_empty()) {
                        return Err(AppError::Validation(
                            "name must be a non-empty string".into(),
                        ));
                    }
                }
                field if INTEGER_FIELDS.contains(&field) => {
                    if !value.is_i64() {
                        return Err(AppError::Validation(format!("{field} must be an integer")));
                    }
                }
                _ => {}
            }
        }

        Ok((
            json_object_to_document(self.filter)?,
            json_object_to_document(self.update)?,
        ))
    }
}

/// Rejects `$`-prefixed keys at any depth, including objects nested in arrays.
fn reject_operators(fields: &Map<String, Value>) -> Result<(), AppError> {
    for (key, value) in fields {
        if key.starts_with('$') {
            return Err(AppError::Validation(format!("Operator {key} is not allowed")));
        }
        reject_nested_operators(value)?;
    }
    Ok(())
}

fn reject_nested_operators(value: &Value) -> Result<(), AppError> {
    match value {
        Value::Object(fields) => reject_operators(fields),
        Value::Array(items) => items.iter().try_for_each(reject_nested_operators),
        _ => Ok(()),
    }
}
