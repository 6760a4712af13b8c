use actix_web::{web, Error, HttpResponse};
use log::{error, info};

use crate::error::PipelineError;
use crate::models::response::{ErrorResponse, QueryRequest};
use crate::services::{AnalystService, CompletionBackend};

/// Handle one natural language query against the active dataset.
///
/// Execution failures inside generated code still answer 200 with a
/// recorded turn; only pre-execution failures map to error statuses.
pub async fn submit_query<C>(
    query_req: web::Json<QueryRequest>,
    analyst: web::Data<AnalystService<C>>,
) -> Result<HttpResponse, Error>
where
    C: CompletionBackend + Clone,
{
    info!("Received query: {}", query_req.query);

    match analyst.ask(&query_req.query).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => {
            error!("Query aborted: {}", e);
            let status_code = match &e {
                PipelineError::EmptyQuery => 400,
                PipelineError::NoDataset
                | PipelineError::Busy
                | PipelineError::SessionReplaced => 409,
                PipelineError::EmptyCode => 422,
                PipelineError::CompletionTransport(_) => 502,
            };
            let body = ErrorResponse {
                error: e.to_string(),
                status_code,
            };
            let mut builder = match status_code {
                400 => HttpResponse::BadRequest(),
                409 => HttpResponse::Conflict(),
                422 => HttpResponse::UnprocessableEntity(),
                _ => HttpResponse::BadGateway(),
            };
            Ok(builder.json(body))
        }
    }
}
