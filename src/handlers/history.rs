use actix_web::{web, Error, HttpResponse};

use crate::models::response::{ErrorResponse, HistoryResponse};
use crate::services::SessionStore;

fn no_dataset() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        error: "no dataset has been uploaded yet".to_string(),
        status_code: 404,
    })
}

/// Ordered conversation history of the active session, for display.
pub async fn get_history(store: web::Data<SessionStore>) -> Result<HttpResponse, Error> {
    match store.history() {
        Ok(Some((session_id, phase, turns))) => Ok(HttpResponse::Ok().json(HistoryResponse {
            session_id,
            phase,
            turns,
        })),
        Ok(None) => Ok(no_dataset()),
        Err(e) => Ok(HttpResponse::InternalServerError().json(ErrorResponse {
            error: format!("Failed to read history: {}", e),
            status_code: 500,
        })),
    }
}

/// The active dataset's profile (also returned at upload time).
pub async fn get_profile(store: web::Data<SessionStore>) -> Result<HttpResponse, Error> {
    match store.profile() {
        Ok(Some((session_id, profile))) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "session_id": session_id,
            "profile": profile,
        }))),
        Ok(None) => Ok(no_dataset()),
        Err(e) => Ok(HttpResponse::InternalServerError().json(ErrorResponse {
            error: format!("Failed to read profile: {}", e),
            status_code: 500,
        })),
    }
}
