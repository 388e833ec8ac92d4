//! Registry HTTP API v2 client: transport, high-level operations, and
//! the recursive copy engine built on top of them.

pub mod client;
pub mod copy;
pub mod transport;

pub use client::RegistryClient;
pub use copy::{copy, CopyOutcome};
pub use transport::AuthenticatedTransport;
