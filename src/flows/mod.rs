//! OAuth2 Flows
//!
//! Grant implementations used by the token manager.

pub mod client_credentials;

pub use client_credentials::ClientCredentialsFlow;
