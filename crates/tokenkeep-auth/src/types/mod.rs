//! Domain types.

pub mod refresh_token;

pub use refresh_token::{NewRefreshToken, RefreshToken, TokenStatus, UserId};
