use log::{error, info};

use crate::error::PipelineError;
use crate::models::response::QueryResponse;
use crate::services::completion::CompletionBackend;
use crate::services::session::SessionStore;
use crate::services::{extract, prompt, sandbox};

/// Runs one natural-language query through the full pipeline:
/// compose prompt, call the completion service, extract the script,
/// execute it, record the turn.
#[derive(Clone)]
pub struct AnalystService<C>
where
    C: CompletionBackend + Clone,
{
    completion: C,
    store: SessionStore,
}

impl<C> AnalystService<C>
where
    C: CompletionBackend + Clone,
{
    pub fn new(completion: C, store: SessionStore) -> Self {
        Self { completion, store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// One query, one turn. Failures before execution abort the turn and
    /// leave history untouched; execution failures are contained in the
    /// recorded turn.
    pub async fn ask(&self, query: &str) -> Result<QueryResponse, PipelineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        // Locks the session into the Generating phase; every early return
        // below must release it via abort_turn.
        let context = match self.store.begin_turn() {
            Ok(outcome) => outcome?,
            Err(e) => {
                error!("Session store unavailable: {}", e);
                return Err(PipelineError::NoDataset);
            }
        };

        info!("Processing query: {}", query);
        let prompt = prompt::compose(&context.profile, query);

        let raw = match self.completion.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Completion request failed: {}", e);
                let _ = self.store.abort_turn(context.session_id);
                return Err(PipelineError::CompletionTransport(e.to_string()));
            }
        };

        let code = match extract::extract_code(&raw) {
            Ok(code) => code,
            Err(e) => {
                info!("Completion contained no executable code");
                let _ = self.store.abort_turn(context.session_id);
                return Err(e);
            }
        };

        // Execution never fails the turn: errors land in the output text.
        let outcome = sandbox::run(&context.frame, &code);

        let turn = match self
            .store
            .record_turn(context.session_id, query.to_string(), code, outcome)
        {
            Ok(Some(turn)) => turn,
            Ok(None) => {
                info!("Dataset replaced mid-query; dropping the turn");
                return Err(PipelineError::SessionReplaced);
            }
            Err(e) => {
                error!("Failed to record turn: {}", e);
                return Err(PipelineError::SessionReplaced);
            }
        };

        Ok(QueryResponse {
            session_id: context.session_id,
            turn,
        })
    }
}
