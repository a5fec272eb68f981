//! Account onboarding and removal.
//!
//! Four flows, one per invocation:
//! - interactive: request token, authorization URL, verifier from the console
//! - two-step: park the request token, later match a verifier against every
//!   parked token
//! - legacy: trade a pre-OAuth auth token for an access token
//! - delete: drop a stored credential

use tracing::{debug, info, warn};

use super::store::CredentialStore;
use crate::error::{Error, FlickrError};
use crate::flickr::{FlickrClient, TokenPair, READ_PERMS};

/// A request token waiting for the account owner's approval.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub request_token: TokenPair,
    /// URL to open in a browser.
    pub url: String,
}

/// Account whose credential was just stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedUser {
    pub username: String,
    pub nsid: String,
}

impl std::fmt::Display for AuthorizedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.username, self.nsid)
    }
}

/// Result of trying one request token against a verifier.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// The token was approved with this verifier.
    Authorized {
        user: AuthorizedUser,
        token: TokenPair,
    },
    /// Flickr refused the token or the verifier.
    Rejected(FlickrError),
}

/// Runs the credential flows against a user store and a pending store.
pub struct Onboarding<'a> {
    client: &'a FlickrClient,
    users: &'a dyn CredentialStore,
    pending: &'a dyn CredentialStore,
}

impl<'a> Onboarding<'a> {
    #[must_use]
    pub fn new(
        client: &'a FlickrClient,
        users: &'a dyn CredentialStore,
        pending: &'a dyn CredentialStore,
    ) -> Self {
        Self {
            client,
            users,
            pending,
        }
    }

    /// Obtain a request token and the URL approving it.
    pub async fn begin(&self) -> Result<AuthorizationRequest, Error> {
        let request_token = self.client.request_token().await?;
        let url = self.client.authorize_url(&request_token, READ_PERMS)?;
        debug!(request_token = %request_token.token, "Obtained request token");
        Ok(AuthorizationRequest { request_token, url })
    }

    /// Interactive flow. `read_verifier` shows the request to the operator
    /// and returns the verifier they paste back.
    pub async fn add_interactive<F, E>(&self, read_verifier: F) -> Result<AuthorizedUser, Error>
    where
        F: FnOnce(&AuthorizationRequest) -> Result<String, E>,
        E: std::fmt::Display,
    {
        let request = self.begin().await?;
        let verifier = read_verifier(&request).map_err(|e| Error::Console(e.to_string()))?;
        let verifier = verifier.trim();

        match self.exchange(&request.request_token, verifier).await? {
            ExchangeOutcome::Authorized { user, token } => self.register(user, &token),
            ExchangeOutcome::Rejected(e) => Err(e.into()),
        }
    }

    /// First half of the two-step flow: park the request token.
    pub async fn start_two_step(&self) -> Result<AuthorizationRequest, Error> {
        let request = self.begin().await?;
        self.pending
            .put(&request.request_token.token, &request.request_token)?;
        info!(request_token = %request.request_token.token, "Saved pending authorization");
        Ok(request)
    }

    /// Second half of the two-step flow: find the parked token the verifier
    /// belongs to. Non-matching tokens are left in place.
    pub async fn finish_two_step(&self, verifier: &str) -> Result<AuthorizedUser, Error> {
        for key in self.pending.list()? {
            let request_token = match self.pending.get(&key) {
                Ok(Some(token)) => token,
                Ok(None) => continue,
                Err(e) => {
                    warn!(pending = %key, error = %e, "Skipping unreadable pending authorization");
                    continue;
                }
            };

            match self.exchange(&request_token, verifier).await? {
                ExchangeOutcome::Authorized { user, token } => {
                    let user = self.register(user, &token)?;
                    self.pending.remove(&key)?;
                    return Ok(user);
                }
                ExchangeOutcome::Rejected(e) => {
                    debug!(pending = %key, reason = %e, "Verifier does not match");
                }
            }
        }

        Err(Error::NoMatchingPending)
    }

    /// Legacy flow: exchange a pre-OAuth token.
    pub async fn add_legacy(&self, auth_token: &str) -> Result<AuthorizedUser, Error> {
        let token = self.client.exchange_legacy_token(auth_token).await?;
        let login = self.client.test_login(&token).await?;
        let user = AuthorizedUser {
            username: login.username,
            nsid: login.id,
        };
        self.register(user, &token)
    }

    /// Remove a stored credential.
    pub fn delete(&self, username: &str) -> Result<(), Error> {
        if self.users.remove(username)? {
            info!(user = %username, "Removed user");
            Ok(())
        } else {
            Err(Error::UnknownUser(username.to_string()))
        }
    }

    /// Try one request token. Refusals come back tagged; transport failures
    /// are errors.
    pub async fn exchange(
        &self,
        request_token: &TokenPair,
        verifier: &str,
    ) -> Result<ExchangeOutcome, Error> {
        let token = match self.client.access_token(request_token, verifier).await {
            Ok(token) => token,
            Err(e) if e.is_rejection() => return Ok(ExchangeOutcome::Rejected(e)),
            Err(e) => return Err(e.into()),
        };

        let login = self.client.test_login(&token).await?;
        Ok(ExchangeOutcome::Authorized {
            user: AuthorizedUser {
                username: login.username,
                nsid: login.id,
            },
            token,
        })
    }

    fn register(&self, user: AuthorizedUser, token: &TokenPair) -> Result<AuthorizedUser, Error> {
        if user.username.is_empty() {
            return Err(FlickrError::MissingField("username").into());
        }
        self.users.put(&user.username, token)?;
        info!(user = %user.username, nsid = %user.nsid, "Authorized user");
        Ok(user)
    }
}
