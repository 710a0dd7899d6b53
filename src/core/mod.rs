//! Token Manager Core Components
//!
//! Injected collaborators: HTTP transport and clock.

pub mod clock;
pub mod transport;

pub use clock::*;
pub use transport::*;
