//! Email digest of new photos.
//!
//! Renders the poll result through a handlebars template and mails it over
//! SMTP with the settings kept in the state file.

mod config;
mod email;
mod generator;

pub use config::{split_addresses, SmtpConfig, SMTP_HINT};
pub use email::{DigestSender, EmailSender};
pub use generator::{DigestContext, DigestGenerator, BUILTIN_TEMPLATE};
