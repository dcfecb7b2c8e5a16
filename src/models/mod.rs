// Data contracts for the resume API
//
// Upstream bodies are checked by deserializing into these types at the
// boundary; a mismatch is a contract violation, not a panic.

pub mod auth;
pub mod resume;
pub mod user;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Standard `{ message, result }` wrapper used by every resume API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub message: Option<String>,
    pub result: T,
}

/// Deserialize an upstream body into its typed contract
pub fn validate<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Validation(e.to_string()))
}
