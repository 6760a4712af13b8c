pub mod profile;
pub mod response;
pub mod turn;
