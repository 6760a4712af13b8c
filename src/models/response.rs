use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::profile::DatasetProfile;
use crate::models::turn::{SessionPhase, Turn};

/// Response for dataset upload: the freshly built profile doubles as the
/// preview payload for the UI.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub session_id: Uuid,
    pub profile: DatasetProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Request body for a natural language query against the active dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

/// Response for a processed query: the turn that was just recorded.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub session_id: Uuid,
    pub turn: Turn,
}

/// Full ordered history of the active session.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub turns: Vec<Turn>,
}

/// Error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status_code: u16,
}
