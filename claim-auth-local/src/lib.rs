//! Local credential provider for claim-auth.
//!
//! Keeps accounts in process memory with bcrypt password hashes. Failures are
//! reported with provider-style string codes, so the sign-in service
//! classifies them exactly as it would a remote provider's.

pub mod provider;

pub use provider::*;
