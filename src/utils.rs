use mongodb::bson::{oid::ObjectId, Bson, Document};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Converts a JSON object from a request body into a BSON document. A
/// top-level `_id` given as a 24-digit hex string is matched as an ObjectId.
pub fn json_object_to_document(object: Map<String, Value>) -> Result<Document, AppError> {
    let mut document = mongodb::bson::to_document(&object)
        .map_err(|e| AppError::Validation(format!("Unsupported value: {e}")))?;

    let object_id = match document.get("_id") {
        Some(Bson::String(hex)) => ObjectId::parse_str(hex).ok(),
        _ => None,
    };
    if let Some(oid) = object_id {
        document.insert("_id", oid);
    }

    Ok(document)
}
