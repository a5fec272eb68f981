//! Flickr access: OAuth signing, the REST client and the photo poller.

mod client;
pub mod oauth;
mod poller;
mod types;

pub use client::{Endpoints, FlickrClient, PER_PAGE, PHOTO_EXTRAS, READ_PERMS};
pub use oauth::{ApiCredentials, TokenPair};
pub use poller::{select_shared, sort_by_taken, PhotoPoller, PollResult, UserPhotos};
pub use types::{LoginUser, Photo, PhotoPage, Profile};
