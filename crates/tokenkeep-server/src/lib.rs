pub mod config;
pub mod handlers;
pub mod jobs;
pub mod observability;
pub mod server;

pub use config::Settings;
pub use server::{AppState, ServerBuilder, TokenkeepServer, build_app};
