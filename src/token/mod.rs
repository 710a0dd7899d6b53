//! Token Management
//!
//! Cached, proactively refreshed client credentials tokens.

pub mod manager;

pub use manager::{DefaultTokenManager, MockTokenManager, TokenManager};
