//! Per-user Flickr credentials.
//!
//! Provides the credential stores and the onboarding flows that fill them.

mod onboarding;
mod store;

pub use onboarding::{AuthorizationRequest, AuthorizedUser, ExchangeOutcome, Onboarding};
pub use store::{validate_key, CredentialStore, FileStore, MemoryStore};
