//! Per-user photo poller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::client::FlickrClient;
use super::oauth::TokenPair;
use super::types::{Photo, Profile};
use crate::credentials::CredentialStore;
use crate::error::{Error, FlickrError};

/// New photos of one registered account.
#[derive(Debug, Clone, Serialize)]
pub struct UserPhotos {
    /// Name the credential is stored under.
    pub username: String,
    pub profile: Profile,
    /// Photos in the order Flickr returned them.
    pub photos: Vec<Photo>,
    /// Same photos, oldest taken date first.
    pub photos_by_taken: Vec<Photo>,
    pub photo_count: usize,
}

impl UserPhotos {
    /// Bundle a user's photos, deriving the taken-date ordering.
    #[must_use]
    pub fn new(username: String, profile: Profile, photos: Vec<Photo>) -> Self {
        let photos_by_taken = sort_by_taken(&photos);
        Self {
            username,
            profile,
            photo_count: photos.len(),
            photos,
            photos_by_taken,
        }
    }
}

/// Outcome of polling every registered account.
#[derive(Debug, Default)]
pub struct PollResult {
    /// Number of credentials checked.
    pub users_checked: usize,
    /// Users with at least one new shared photo, keyed by username.
    pub users: BTreeMap<String, UserPhotos>,
    /// Shared photos across all users.
    pub total: usize,
    /// Private photos dropped.
    pub skipped_private: usize,
}

/// Keep only photos somebody else can see, with their permalinks.
#[must_use]
pub fn select_shared(photos: Vec<Photo>) -> Vec<Photo> {
    photos
        .into_iter()
        .filter(Photo::is_shared)
        .map(Photo::decorated)
        .collect()
}

/// Copy of `photos` ordered by taken date, undated photos first. Ties keep
/// their original order.
#[must_use]
pub fn sort_by_taken(photos: &[Photo]) -> Vec<Photo> {
    let mut sorted = photos.to_vec();
    sorted.sort_by_key(Photo::taken_at);
    sorted
}

/// Walks the registered credentials and collects new photos.
pub struct PhotoPoller<'a> {
    client: &'a FlickrClient,
    users: &'a dyn CredentialStore,
}

impl<'a> PhotoPoller<'a> {
    /// Create a poller over the given credential store.
    #[must_use]
    pub fn new(client: &'a FlickrClient, users: &'a dyn CredentialStore) -> Self {
        Self { client, users }
    }

    /// Collect shared photos updated at or after `since` for every user.
    pub async fn poll(&self, since: DateTime<Utc>) -> Result<PollResult, Error> {
        let usernames = self.users.list()?;
        if usernames.is_empty() {
            return Err(Error::NoUsers);
        }

        let mut result = PollResult::default();
        for username in usernames {
            let Some(token) = self.users.get(&username)? else {
                continue;
            };
            result.users_checked += 1;

            let fetched = self.fetch_updated(&token, since).await?;
            let fetched_count = fetched.len();
            let photos = select_shared(fetched);
            result.skipped_private += fetched_count - photos.len();

            tracing::debug!(
                user = %username,
                fetched = fetched_count,
                shared = photos.len(),
                "Checked recent uploads"
            );
            if photos.is_empty() {
                continue;
            }

            let login = self.client.test_login(&token).await?;
            let profile = self
                .client
                .people_info(&token, &login.id)
                .await?
                .decorated();

            result.total += photos.len();
            result
                .users
                .insert(username.clone(), UserPhotos::new(username, profile, photos));
        }

        tracing::info!(
            users = result.users_checked,
            with_photos = result.users.len(),
            total = result.total,
            skipped_private = result.skipped_private,
            "Poll complete"
        );
        Ok(result)
    }

    /// Every page of `flickr.photos.recentlyUpdated` since `since`.
    async fn fetch_updated(
        &self,
        token: &TokenPair,
        since: DateTime<Utc>,
    ) -> Result<Vec<Photo>, FlickrError> {
        let mut photos = Vec::new();
        let mut page = 1;
        loop {
            let batch = self
                .client
                .recently_updated(token, since.timestamp(), page)
                .await?;
            photos.extend(batch.photo);
            if page >= batch.pages {
                break;
            }
            page += 1;
        }
        Ok(photos)
    }
}
