pub mod history;
pub mod query;
pub mod upload;

pub use history::*;
pub use query::*;
pub use upload::*;
