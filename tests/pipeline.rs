//! End-to-end pipeline scenarios with a stubbed completion service.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use polars::prelude::*;

use datalyst::error::PipelineError;
use datalyst::models::turn::SessionPhase;
use datalyst::services::profile::build_profile;
use datalyst::services::{AnalystService, CompletionBackend, SessionStore};

/// Plays back canned completion responses in order.
#[derive(Clone, Default)]
struct StubCompletion {
    responses: Arc<Mutex<VecDeque<Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl StubCompletion {
    fn respond_with(response: &str) -> Self {
        let stub = Self::default();
        stub.push_ok(response);
        stub
    }

    fn push_ok(&self, response: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.to_string()));
    }

    fn push_err(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for StubCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("stub has no more responses")),
        }
    }
}

fn analyst_with_people(stub: StubCompletion) -> AnalystService<StubCompletion> {
    let df = DataFrame::new(vec![
        Series::new("name", &["ann", "bob"]),
        Series::new("age", &[30i64, 40]),
    ])
    .unwrap();
    let profile = build_profile(&df).unwrap();
    let store = SessionStore::new();
    store.reset(df, profile).unwrap();
    AnalystService::new(stub, store)
}

fn history_len(analyst: &AnalystService<StubCompletion>) -> usize {
    analyst.store().history().unwrap().unwrap().2.len()
}

#[tokio::test]
async fn mean_query_records_a_turn_with_the_computed_value() {
    let stub = StubCompletion::respond_with("```python\nprint(df.mean(\"age\"))\n```");
    let analyst = analyst_with_people(stub.clone());

    let response = analyst.ask("average age").await.unwrap();
    assert_eq!(response.turn.code, "print(df.mean(\"age\"))");
    assert_eq!(response.turn.output.trim(), "35");
    assert!(response.turn.figure.is_none());
    assert_eq!(response.turn.index, 0);
    assert_eq!(history_len(&analyst), 1);

    // The prompt carried the literal query and the dataset shape.
    let prompts = stub.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("average age"));
    assert!(prompts[0].contains("2 rows, 2 columns"));
}

#[tokio::test]
async fn blank_fenced_body_is_empty_code_and_leaves_history_unchanged() {
    let stub = StubCompletion::respond_with("```python\n\n```");
    let analyst = analyst_with_people(stub);

    let err = analyst.ask("average age").await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyCode));
    assert_eq!(history_len(&analyst), 0);

    // The session is back to Ready and accepts the next submission.
    let (_, phase, _) = analyst.store().history().unwrap().unwrap();
    assert_eq!(phase, SessionPhase::Ready);
}

#[tokio::test]
async fn erroring_generated_code_still_records_exactly_one_turn() {
    let stub = StubCompletion::respond_with("```\nprint(df.mean(\"salary\"))\n```");
    let analyst = analyst_with_people(stub);

    let response = analyst.ask("average salary").await.unwrap();
    assert!(response.turn.output.contains("Error executing generated code"));
    assert!(response.turn.figure.is_none());
    assert_eq!(history_len(&analyst), 1);
}

#[tokio::test]
async fn transport_failure_aborts_before_any_turn_exists() {
    let stub = StubCompletion::default();
    stub.push_err("connection refused");
    let analyst = analyst_with_people(stub.clone());

    let err = analyst.ask("average age").await.unwrap_err();
    assert!(matches!(err, PipelineError::CompletionTransport(_)));
    assert_eq!(history_len(&analyst), 0);

    // Resubmission works once the service recovers.
    stub.push_ok("print(df.count())");
    let response = analyst.ask("how many rows").await.unwrap();
    assert_eq!(response.turn.output.trim(), "2");
    assert_eq!(history_len(&analyst), 1);
}

#[tokio::test]
async fn empty_query_never_reaches_the_completion_service() {
    let stub = StubCompletion::default();
    let analyst = analyst_with_people(stub.clone());

    let err = analyst.ask("   ").await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyQuery));
    assert!(stub.prompts().is_empty());
    assert_eq!(history_len(&analyst), 0);
}

#[tokio::test]
async fn figures_do_not_leak_into_the_next_turn() {
    let stub = StubCompletion::default();
    stub.push_ok("```\nplt.bar(\"name\", \"age\")\n```");
    stub.push_ok("```\nprint(df.count())\n```");
    let analyst = analyst_with_people(stub);

    let first = analyst.ask("chart the ages").await.unwrap();
    let figure = first.turn.figure.expect("first turn should carry a figure");
    assert_eq!(figure.chart_type, "bar");
    assert!(first.turn.output.is_empty());

    let second = analyst.ask("how many rows").await.unwrap();
    assert!(second.turn.figure.is_none());
    assert_eq!(second.turn.output.trim(), "2");
}

#[tokio::test]
async fn history_preserves_submission_order() {
    let stub = StubCompletion::default();
    for _ in 0..3 {
        stub.push_ok("print(df.count())");
    }
    let analyst = analyst_with_people(stub);

    for query in ["first", "second", "third"] {
        analyst.ask(query).await.unwrap();
    }

    let (_, _, turns) = analyst.store().history().unwrap().unwrap();
    let queries: Vec<&str> = turns.iter().map(|t| t.query.as_str()).collect();
    assert_eq!(queries, vec!["first", "second", "third"]);
    assert_eq!(turns[2].index, 2);
}

/// Replaces the active dataset while the completion call is outstanding,
/// then answers normally.
#[derive(Clone)]
struct ReplacingCompletion {
    store: SessionStore,
    reply: String,
}

#[async_trait]
impl CompletionBackend for ReplacingCompletion {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let df = DataFrame::new(vec![Series::new("x", &[1i64, 2, 3])]).unwrap();
        let profile = build_profile(&df).unwrap();
        self.store.reset(df, profile).unwrap();
        Ok(self.reply.clone())
    }
}

#[tokio::test]
async fn upload_during_a_query_drops_the_in_flight_turn() {
    let df = DataFrame::new(vec![
        Series::new("name", &["ann", "bob"]),
        Series::new("age", &[30i64, 40]),
    ])
    .unwrap();
    let profile = build_profile(&df).unwrap();
    let store = SessionStore::new();
    store.reset(df, profile).unwrap();

    let completion = ReplacingCompletion {
        store: store.clone(),
        reply: "print(df.count())".to_string(),
    };
    let analyst = AnalystService::new(completion, store.clone());

    let err = analyst.ask("how many rows").await.unwrap_err();
    assert!(matches!(err, PipelineError::SessionReplaced));

    // The replacement session keeps a clean history and stays usable.
    let (_, phase, turns) = store.history().unwrap().unwrap();
    assert!(turns.is_empty());
    assert_eq!(phase, SessionPhase::Ready);
}

#[tokio::test]
async fn per_turn_mutation_does_not_persist() {
    let stub = StubCompletion::default();
    stub.push_ok("```\ndf = df.head(1)\nprint(df.count())\n```");
    stub.push_ok("```\nprint(df.count())\n```");
    let analyst = analyst_with_people(stub);

    let first = analyst.ask("keep one row").await.unwrap();
    assert_eq!(first.turn.output.trim(), "1");

    // The next turn sees the original upload again.
    let second = analyst.ask("how many rows").await.unwrap();
    assert_eq!(second.turn.output.trim(), "2");
}
