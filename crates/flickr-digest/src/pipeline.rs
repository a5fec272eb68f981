//! Digest run - orchestrates the poll-render-send-save flow.

use chrono::{DateTime, Duration, Utc};

use crate::credentials::CredentialStore;
use crate::digest::{DigestContext, DigestGenerator, DigestSender};
use crate::error::{Error, StateError};
use crate::flickr::{FlickrClient, PhotoPoller};
use crate::state::{State, StateFile};

/// Knobs for a single run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Look back this far instead of using the recorded `last_date`.
    pub lookback: Option<Duration>,
    /// Render but neither send nor save.
    pub dry_run: bool,
}

/// What a run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Start of the window that was checked.
    pub since: Option<DateTime<Utc>>,
    pub users_checked: usize,
    pub users_with_photos: usize,
    /// Shared photos in the digest.
    pub total: usize,
    /// Private photos left out.
    pub skipped_private: usize,
    /// The digest went out.
    pub sent: bool,
    /// `last_date` was advanced and written.
    pub saved: bool,
    /// Rendered digest, when there was anything to render.
    pub html: Option<String>,
}

/// One digest run over the registered users.
pub struct DigestRun<'a> {
    client: &'a FlickrClient,
    users: &'a dyn CredentialStore,
    generator: &'a DigestGenerator,
    sender: &'a dyn DigestSender,
    state_file: &'a StateFile,
    options: RunOptions,
}

impl<'a> DigestRun<'a> {
    #[must_use]
    pub fn new(
        client: &'a FlickrClient,
        users: &'a dyn CredentialStore,
        generator: &'a DigestGenerator,
        sender: &'a dyn DigestSender,
        state_file: &'a StateFile,
        options: RunOptions,
    ) -> Self {
        Self {
            client,
            users,
            generator,
            sender,
            state_file,
            options,
        }
    }

    /// Run starting now.
    pub async fn run(&self, state: &mut State) -> Result<RunSummary, Error> {
        self.run_at(state, Utc::now()).await
    }

    /// Run as if started at `started_at`, which becomes the new `last_date`.
    /// State is written only after the digest was sent, or when there was
    /// nothing to send.
    pub async fn run_at(
        &self,
        state: &mut State,
        started_at: DateTime<Utc>,
    ) -> Result<RunSummary, Error> {
        let since = match self.options.lookback {
            Some(lookback) => started_at.checked_sub_signed(lookback).ok_or_else(|| {
                StateError::InvalidValue {
                    key: "lookback".to_string(),
                    expected: "a window within the supported date range",
                    found: format!("{} hours", lookback.num_hours()),
                }
            })?,
            None => state.last_checked()?,
        };
        tracing::info!(since = %since, dry_run = self.options.dry_run, "Starting digest run");

        let result = PhotoPoller::new(self.client, self.users).poll(since).await?;
        let mut summary = RunSummary {
            since: Some(since),
            users_checked: result.users_checked,
            users_with_photos: result.users.len(),
            total: result.total,
            skipped_private: result.skipped_private,
            ..RunSummary::default()
        };

        if result.total == 0 {
            tracing::info!("No new photos");
        } else {
            let context = DigestContext::new(&result, since, started_at);
            let html = self.generator.render(&context)?;

            if self.options.dry_run {
                tracing::info!(total = result.total, "Dry run, not sending digest");
            } else {
                self.sender.send(&html).await?;
                summary.sent = true;
            }
            summary.html = Some(html);
        }

        if !self.options.dry_run {
            state.set_last_checked(started_at);
            self.state_file.save(state)?;
            summary.saved = true;
        }

        Ok(summary)
    }
}
