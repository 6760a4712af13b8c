use actix_web::{web, Error, HttpResponse};
use actix_multipart::Multipart;
use futures::StreamExt;
use std::io::Write;

use crate::models::response::{ErrorResponse, UploadResponse};
use crate::services::{profile, SessionStore};

/// Handle a dataset upload: decode, parse, profile, and start a fresh
/// session (dropping any previous history).
pub async fn upload_dataset(
    mut payload: Multipart,
    store: web::Data<SessionStore>,
) -> Result<HttpResponse, Error> {
    let mut file_content = Vec::new();
    let mut filename = String::new();

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let content_disposition = field.content_disposition();

        if let Some(name) = content_disposition.get_name() {
            if name == "file" {
                if let Some(fname) = content_disposition.get_filename() {
                    filename = fname.to_string();
                }

                while let Some(chunk) = field.next().await {
                    let data = chunk?;
                    file_content.write_all(&data)?;
                }
            }
        }
    }

    if file_content.is_empty() {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: "No file uploaded".to_string(),
            status_code: 400,
        }));
    }

    if !filename.to_lowercase().ends_with(".csv") {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: "File must be a CSV".to_string(),
            status_code: 400,
        }));
    }

    let frame = match profile::load_frame(&file_content) {
        Ok(frame) => frame,
        Err(e) => {
            return Ok(HttpResponse::BadRequest().json(ErrorResponse {
                error: e.to_string(),
                status_code: 400,
            }));
        }
    };

    let dataset_profile = match profile::build_profile(&frame) {
        Ok(p) => p,
        Err(e) => {
            log::error!("Failed to profile uploaded dataset: {}", e);
            return Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: format!("Failed to profile dataset: {}", e),
                status_code: 500,
            }));
        }
    };

    match store.reset(frame, dataset_profile.clone()) {
        Ok(session_id) => Ok(HttpResponse::Ok().json(UploadResponse {
            session_id,
            profile: dataset_profile,
            message: Some("Dataset loaded, conversation reset".to_string()),
        })),
        Err(e) => {
            log::error!("Failed to store session: {}", e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: format!("Failed to store session: {}", e),
                status_code: 500,
            }))
        }
    }
}
