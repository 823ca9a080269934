//! Storage traits for refresh tokens.
//!
//! Implementations:
//! - [`InMemoryRefreshTokenStorage`] - process-local backend for tests and development
//! - `tokenkeep-auth-postgres` - PostgreSQL backend

pub mod memory;
pub mod refresh_token;

pub use memory::InMemoryRefreshTokenStorage;
pub use refresh_token::RefreshTokenStorage;
