pub mod analyst;
pub mod completion;
pub mod extract;
pub mod figure;
pub mod profile;
pub mod prompt;
pub mod sandbox;
pub mod script;
pub mod session;

pub use analyst::AnalystService;
pub use completion::{CompletionBackend, HttpCompletionService};
pub use session::SessionStore;
