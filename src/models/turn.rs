use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chart captured from the plotting surface after one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedFigure {
    /// Chart family, e.g. "bar" or "scatter".
    pub chart_type: String,
    pub title: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Rendered SVG document, base64-encoded for transport.
    pub svg_base64: String,
}

/// What one execution of generated code produced.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    /// Captured print output in emission order. On a caught execution
    /// error this holds the error message instead.
    pub output: String,
    pub figure: Option<CapturedFigure>,
}

/// One recorded (query, code, output, figure) tuple in the conversation
/// history. Immutable once created; index equals chronological order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub index: usize,
    pub query: String,
    pub code: String,
    pub output: String,
    pub figure: Option<CapturedFigure>,
    pub timestamp: DateTime<Utc>,
}

/// Whether the session can accept a new query. Held on the session so the
/// busy indication is state, not UI plumbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "generating")]
    Generating,
}
