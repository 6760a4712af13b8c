use thiserror::Error;

/// Failures of the query pipeline that abort a turn before it is recorded.
///
/// Execution failures are deliberately absent: generated code that fails at
/// runtime is caught inside the sandbox and still produces a recorded turn.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("no dataset has been uploaded yet")]
    NoDataset,

    #[error("another query is still being processed")]
    Busy,

    #[error("completion request failed: {0}")]
    CompletionTransport(String),

    #[error("model returned empty or invalid code")]
    EmptyCode,

    #[error("dataset was replaced while the query was being processed")]
    SessionReplaced,
}

/// Failures while turning an uploaded file into a usable dataframe.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("could not decode file with UTF-8 or ISO-8859-1")]
    Decoding,

    #[error("failed to parse CSV data: {0}")]
    Parse(String),
}
