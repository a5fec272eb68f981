//! Digest content generator.
//!
//! Renders the poll result through a handlebars template. The template
//! sees:
//! - `user_photos`: username -> photos, in service order
//! - `user_photos_by_taken`: username -> photos, oldest taken first
//! - `users`: username -> profile (with `buddyicon`)
//! - `digests`: one entry per user with `username`, `profile`, `photos`,
//!   `photos_by_taken` and `photo_count`
//! - `total`, `since`, `generated_at`

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;

use crate::error::DigestError;
use crate::flickr::{Photo, PollResult, Profile, UserPhotos};

/// Template used when no template file is available.
pub const BUILTIN_TEMPLATE: &str = include_str!("../../templates/email.hbs");

const TEMPLATE_NAME: &str = "digest";

const DATE_FORMAT: &str = "%B %d, %Y %H:%M UTC";

/// Render variables.
#[derive(Debug, Serialize)]
pub struct DigestContext<'a> {
    pub user_photos: BTreeMap<&'a str, &'a [Photo]>,
    pub users: BTreeMap<&'a str, &'a Profile>,
    pub user_photos_by_taken: BTreeMap<&'a str, &'a [Photo]>,
    pub digests: Vec<&'a UserPhotos>,
    pub total: usize,
    pub since: String,
    pub generated_at: String,
}

impl<'a> DigestContext<'a> {
    /// Build the render variables from a poll result.
    #[must_use]
    pub fn new(result: &'a PollResult, since: DateTime<Utc>, generated_at: DateTime<Utc>) -> Self {
        let mut context = Self {
            user_photos: BTreeMap::new(),
            users: BTreeMap::new(),
            user_photos_by_taken: BTreeMap::new(),
            digests: Vec::with_capacity(result.users.len()),
            total: result.total,
            since: since.format(DATE_FORMAT).to_string(),
            generated_at: generated_at.format(DATE_FORMAT).to_string(),
        };

        for (username, user) in &result.users {
            context.user_photos.insert(username, &user.photos);
            context
                .user_photos_by_taken
                .insert(username, &user.photos_by_taken);
            context.users.insert(username, &user.profile);
            context.digests.push(user);
        }
        context
    }
}

/// Compiled digest template.
pub struct DigestGenerator {
    registry: Handlebars<'static>,
}

impl DigestGenerator {
    /// Compile a template.
    pub fn new(template: &str) -> Result<Self, DigestError> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| DigestError::Template(e.to_string()))?;
        Ok(Self { registry })
    }

    /// Compile the built-in template.
    pub fn builtin() -> Result<Self, DigestError> {
        Self::new(BUILTIN_TEMPLATE)
    }

    /// Compile the template stored at `path`.
    pub fn from_file(path: &Path) -> Result<Self, DigestError> {
        let template = std::fs::read_to_string(path).map_err(|source| DigestError::TemplateRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(&template)
    }

    /// Compile `path` if it exists, the built-in template otherwise.
    pub fn from_path_or_builtin(path: &Path) -> Result<Self, DigestError> {
        if path.exists() {
            tracing::debug!(path = %path.display(), "Using template file");
            Self::from_file(path)
        } else {
            tracing::info!(
                path = %path.display(),
                "Template file not found, using built-in template"
            );
            Self::builtin()
        }
    }

    /// Render the digest HTML.
    pub fn render(&self, context: &DigestContext<'_>) -> Result<String, DigestError> {
        self.registry
            .render(TEMPLATE_NAME, context)
            .map_err(|e| DigestError::Render(e.to_string()))
    }
}
