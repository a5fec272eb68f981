//! Flickr new-photo digest.
//!
//! This crate provides:
//! - OAuth 1.0a onboarding of Flickr accounts (interactive, two-step and
//!   legacy-token flows) with per-user credential storage
//! - Polling of every registered account for recently updated photos
//! - A handlebars-rendered HTML digest mailed over SMTP
//! - A flat TOML state file holding API keys, SMTP settings and the
//!   last-checked timestamp

pub mod credentials;
pub mod digest;
pub mod error;
pub mod flickr;
pub mod pipeline;
pub mod state;

// Re-export main types
pub use credentials::{CredentialStore, FileStore, MemoryStore, Onboarding};
pub use digest::{DigestGenerator, DigestSender, EmailSender, SmtpConfig};
pub use error::{Error, Result};
pub use flickr::{ApiCredentials, FlickrClient, TokenPair};
pub use pipeline::{DigestRun, RunOptions, RunSummary};
pub use state::{State, StateFile};
