pub mod client;
pub mod config;
pub mod credentials;
pub mod journal;
pub mod models;
pub mod plans;
/// In-memory backend replaying scripted responses (tests, offline runs).
pub mod scripted;
pub mod session;
pub mod store;
pub mod traits;
pub mod transport;
