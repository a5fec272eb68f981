//! SMTP configuration for the digest mailer.

use crate::error::{DigestError, StateError};
use crate::state::{keys, State};

/// Default SMTP host.
pub const DEFAULT_SMTP_HOST: &str = "localhost";

/// Default SMTP port (plain SMTP).
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Default subject line.
pub const DEFAULT_SUBJECT: &str = "New photos";

/// Printed when the digest could not be mailed.
pub const SMTP_HINT: &str = "Can't send email, you can set SMTP options in the state file; \
set smtp_tls = true, smtp_user and smtp_password for encrypted and authenticated SMTP";

/// Mailer settings derived from the state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    /// SMTP server hostname.
    pub server: String,
    /// SMTP server port.
    pub port: u16,
    /// Upgrade the connection with STARTTLS.
    pub tls: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Sender address.
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    /// Envelope-only recipients.
    pub bcc: Vec<String>,
    pub subject: String,
}

impl SmtpConfig {
    /// Read the `smtp_*` keys.
    pub fn from_state(state: &State) -> Result<Self, DigestError> {
        Self::read(state).map_err(DigestError::Config)
    }

    fn read(state: &State) -> Result<Self, StateError> {
        let port = match state.get_int(keys::SMTP_PORT)? {
            Some(port) => u16::try_from(port).map_err(|_| StateError::InvalidValue {
                key: keys::SMTP_PORT.to_string(),
                expected: "a port number",
                found: port.to_string(),
            })?,
            None => DEFAULT_SMTP_PORT,
        };

        Ok(Self {
            server: state
                .get_nonempty(keys::SMTP_SERVER)
                .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            port,
            tls: state.get_bool(keys::SMTP_TLS)?.unwrap_or(false),
            user: state.get_nonempty(keys::SMTP_USER),
            password: state.get_nonempty(keys::SMTP_PASSWORD),
            from: state.get_string(keys::SMTP_FROM).unwrap_or_default(),
            to: split_addresses(&state.get_string(keys::SMTP_TO).unwrap_or_default()),
            cc: split_addresses(&state.get_string(keys::SMTP_CC).unwrap_or_default()),
            bcc: split_addresses(&state.get_string(keys::SMTP_BCC).unwrap_or_default()),
            subject: state
                .get_nonempty(keys::SMTP_SUBJECT)
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
        })
    }

    /// User and password, when both are configured.
    #[must_use]
    pub fn login(&self) -> Option<(&str, &str)> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    /// Whether anybody would receive the message.
    #[must_use]
    pub fn has_recipients(&self) -> bool {
        !(self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty())
    }
}

/// Split a comma-separated address list, dropping blanks.
#[must_use]
pub fn split_addresses(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}
