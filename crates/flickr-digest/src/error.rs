//! Error types for the digest tool.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error returned by the credential flows and the digest run.
#[derive(Debug, Error)]
pub enum Error {
    /// State file could not be read, parsed or written
    #[error(transparent)]
    State(#[from] StateError),

    /// Credential store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Flickr request failed
    #[error(transparent)]
    Flickr(#[from] FlickrError),

    /// Rendering or mailing the digest failed
    #[error(transparent)]
    Digest(#[from] DigestError),

    /// `api_key`/`api_secret` are absent or still placeholders
    #[error("Please fill in the api_key and api_secret in {}", path.display())]
    MissingApiKeys { path: PathBuf },

    /// No user credential is registered
    #[error("No users registered; add one with --user-add-interactive or --user-add")]
    NoUsers,

    /// None of the pending request tokens accepted the verifier
    #[error("No matching pre-authorization found")]
    NoMatchingPending,

    /// Deletion target does not exist
    #[error("Could not remove the user {0}: no such credential")]
    UnknownUser(String),

    /// Reading the verifier from the console failed
    #[error("Console input failed: {0}")]
    Console(String),
}

/// Errors raised by the state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to access state file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {key}: expected {expected}, found {found}")]
    InvalidValue {
        key: String,
        expected: &'static str,
        found: String,
    },
}

/// Errors raised by a credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Credential store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key would escape the store directory or is empty
    #[error("Invalid credential name: {0:?}")]
    InvalidKey(String),

    #[error("Corrupt credential record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Errors raised while talking to Flickr.
#[derive(Debug, Error)]
pub enum FlickrError {
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("Flickr responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// `stat=fail` payload
    #[error("Flickr responded: {message} (code {code})")]
    Api { code: i64, message: String },

    #[error("Failed to decode Flickr response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Flickr response is missing {0}")]
    MissingField(&'static str),

    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

impl FlickrError {
    /// Whether the service answered and refused the request, as opposed to
    /// the request never completing.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Api { .. })
    }
}

/// Errors raised while rendering or mailing the digest.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("Failed to read template {}: {source}", path.display())]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid template: {0}")]
    Template(String),

    #[error("Failed to render digest: {0}")]
    Render(String),

    #[error("Invalid email address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    /// An `smtp_*` key holds an unusable value
    #[error("Invalid SMTP settings: {0}")]
    Config(#[source] StateError),

    #[error("No recipients configured (smtp_to, smtp_cc and smtp_bcc are all empty)")]
    NoRecipients,

    #[error("Failed to build email message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("Failed to send email via SMTP: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

impl DigestError {
    /// Whether the failure happened while building or sending the email,
    /// i.e. is most likely fixed by editing the SMTP settings.
    #[must_use]
    pub fn is_mail_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Address { .. }
                | Self::NoRecipients
                | Self::Message(_)
                | Self::Smtp(_)
        )
    }
}
