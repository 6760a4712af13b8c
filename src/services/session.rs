use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::info;
use polars::prelude::DataFrame;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::profile::DatasetProfile;
use crate::models::turn::{ExecutionOutcome, SessionPhase, Turn};

/// One dataset and its conversation. History is append-only for the
/// session's lifetime; uploading a new dataset replaces the whole session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub frame: DataFrame,
    pub profile: DatasetProfile,
    pub history: Vec<Turn>,
    pub phase: SessionPhase,
}

/// Inputs the pipeline needs for one turn, cloned out of the store so no
/// lock is held across the completion call.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub session_id: Uuid,
    pub frame: DataFrame,
    pub profile: DatasetProfile,
}

/// In-memory store for the single active session.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<Option<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any existing session with a fresh one for a new upload.
    /// Prior history is dropped: it was grounded in the old profile.
    pub fn reset(&self, frame: DataFrame, profile: DatasetProfile) -> Result<Uuid> {
        let session = Session {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            frame,
            profile,
            history: Vec::new(),
            phase: SessionPhase::Ready,
        };
        let id = session.id;
        let mut guard = self.lock()?;
        if let Some(old) = guard.as_ref() {
            info!(
                "Replacing session {} ({} turns) with session {}",
                old.id,
                old.history.len(),
                id
            );
        }
        *guard = Some(session);
        Ok(id)
    }

    /// Move the session into the `Generating` phase and hand out the data
    /// the pipeline needs. Rejects overlapping queries.
    pub fn begin_turn(&self) -> Result<Result<TurnContext, PipelineError>> {
        let mut guard = self.lock()?;
        let session = match guard.as_mut() {
            Some(session) => session,
            None => return Ok(Err(PipelineError::NoDataset)),
        };
        if session.phase == SessionPhase::Generating {
            return Ok(Err(PipelineError::Busy));
        }
        session.phase = SessionPhase::Generating;
        Ok(Ok(TurnContext {
            session_id: session.id,
            frame: session.frame.clone(),
            profile: session.profile.clone(),
        }))
    }

    /// Append exactly one turn and return to `Ready`. Called once per
    /// executed query, after execution completed (success or caught error).
    ///
    /// Returns `None` when the session the turn began on is no longer the
    /// active one: an upload landed while the query was in flight, and a
    /// turn grounded in the old profile must not reach the new history.
    pub fn record_turn(
        &self,
        session_id: Uuid,
        query: String,
        code: String,
        outcome: ExecutionOutcome,
    ) -> Result<Option<Turn>> {
        let mut guard = self.lock()?;
        let session = match guard.as_mut() {
            Some(session) if session.id == session_id => session,
            _ => {
                info!("Dropping turn for replaced session {}", session_id);
                return Ok(None);
            }
        };
        let turn = Turn {
            index: session.history.len(),
            query,
            code,
            output: outcome.output,
            figure: outcome.figure,
            timestamp: Utc::now(),
        };
        session.history.push(turn.clone());
        session.phase = SessionPhase::Ready;
        info!(
            "Recorded turn {} for session {}",
            turn.index, session.id
        );
        Ok(Some(turn))
    }

    /// Return to `Ready` after a turn aborted before recording, but only
    /// if the turn's session is still the active one. History is untouched.
    pub fn abort_turn(&self, session_id: Uuid) -> Result<()> {
        let mut guard = self.lock()?;
        if let Some(session) = guard.as_mut() {
            if session.id == session_id {
                session.phase = SessionPhase::Ready;
            }
        }
        Ok(())
    }

    pub fn history(&self) -> Result<Option<(Uuid, SessionPhase, Vec<Turn>)>> {
        let guard = self.lock()?;
        Ok(guard
            .as_ref()
            .map(|s| (s.id, s.phase, s.history.clone())))
    }

    pub fn profile(&self) -> Result<Option<(Uuid, DatasetProfile)>> {
        let guard = self.lock()?;
        Ok(guard.as_ref().map(|s| (s.id, s.profile.clone())))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Session>>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("Failed to acquire lock on session store"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::profile::build_profile;
    use polars::prelude::*;

    fn store_with_dataset() -> SessionStore {
        let df = DataFrame::new(vec![Series::new("age", &[30i64, 40])]).unwrap();
        let profile = build_profile(&df).unwrap();
        let store = SessionStore::new();
        store.reset(df, profile).unwrap();
        store
    }

    fn outcome(text: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            output: text.to_string(),
            figure: None,
        }
    }

    #[test]
    fn history_is_append_only_and_ordered() {
        let store = store_with_dataset();
        for i in 0..3 {
            let ctx = store.begin_turn().unwrap().unwrap();
            store
                .record_turn(ctx.session_id, format!("q{}", i), "print(1)".into(), outcome("1"))
                .unwrap();
        }
        let (_, phase, turns) = store.history().unwrap().unwrap();
        assert_eq!(phase, SessionPhase::Ready);
        assert_eq!(turns.len(), 3);
        for (i, turn) in turns.iter().enumerate() {
            assert_eq!(turn.index, i);
            assert_eq!(turn.query, format!("q{}", i));
        }
    }

    #[test]
    fn busy_session_rejects_overlapping_queries() {
        let store = store_with_dataset();
        let ctx = store.begin_turn().unwrap().unwrap();
        assert!(matches!(
            store.begin_turn().unwrap(),
            Err(PipelineError::Busy)
        ));
        store.abort_turn(ctx.session_id).unwrap();
        assert!(store.begin_turn().unwrap().is_ok());
    }

    #[test]
    fn aborted_turn_leaves_history_unchanged() {
        let store = store_with_dataset();
        let ctx = store.begin_turn().unwrap().unwrap();
        store.abort_turn(ctx.session_id).unwrap();
        let (_, _, turns) = store.history().unwrap().unwrap();
        assert!(turns.is_empty());
    }

    #[test]
    fn new_upload_resets_history() {
        let store = store_with_dataset();
        let ctx = store.begin_turn().unwrap().unwrap();
        store
            .record_turn(ctx.session_id, "q".into(), "print(1)".into(), outcome("1"))
            .unwrap();

        let df = DataFrame::new(vec![Series::new("x", &[1i64])]).unwrap();
        let profile = build_profile(&df).unwrap();
        store.reset(df, profile).unwrap();
        let (_, _, turns) = store.history().unwrap().unwrap();
        assert!(turns.is_empty());
    }

    #[test]
    fn turn_from_a_replaced_session_is_dropped() {
        let store = store_with_dataset();
        let ctx = store.begin_turn().unwrap().unwrap();

        // Upload lands while the turn is in flight.
        let df = DataFrame::new(vec![Series::new("x", &[1i64])]).unwrap();
        let profile = build_profile(&df).unwrap();
        store.reset(df, profile).unwrap();

        let recorded = store
            .record_turn(ctx.session_id, "q".into(), "print(1)".into(), outcome("1"))
            .unwrap();
        assert!(recorded.is_none());
        let (_, phase, turns) = store.history().unwrap().unwrap();
        assert!(turns.is_empty());
        assert_eq!(phase, SessionPhase::Ready);
    }

    #[test]
    fn stale_abort_does_not_touch_the_new_session() {
        let store = store_with_dataset();
        let old = store.begin_turn().unwrap().unwrap();

        let df = DataFrame::new(vec![Series::new("x", &[1i64])]).unwrap();
        let profile = build_profile(&df).unwrap();
        store.reset(df, profile).unwrap();

        let fresh = store.begin_turn().unwrap().unwrap();
        store.abort_turn(old.session_id).unwrap();
        // The new session's in-flight turn is still the active one.
        assert!(matches!(
            store.begin_turn().unwrap(),
            Err(PipelineError::Busy)
        ));
        store.abort_turn(fresh.session_id).unwrap();
        assert!(store.begin_turn().unwrap().is_ok());
    }

    #[test]
    fn empty_store_reports_no_dataset() {
        let store = SessionStore::new();
        assert!(matches!(
            store.begin_turn().unwrap(),
            Err(PipelineError::NoDataset)
        ));
        assert!(store.history().unwrap().is_none());
    }
}
