//! Flickr data types.
//!
//! Flickr's JSON is loose about types (`"ispublic": 1`, `"total": "3"`,
//! text wrapped in `{"_content": ...}`), so several fields go through the
//! lenient deserializers at the bottom of this file.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Format of `datetaken`.
pub const TAKEN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Icon shown for accounts that never uploaded a buddy icon.
pub const DEFAULT_BUDDYICON: &str = "https://www.flickr.com/images/buddyicon.gif";

/// A photo returned by `flickr.photos.recentlyUpdated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    /// Photo ID.
    pub id: String,
    /// Owner NSID.
    #[serde(default)]
    pub owner: String,
    /// Owner display name (`owner_name` extra).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownername: Option<String>,
    #[serde(default)]
    pub secret: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub server: String,
    #[serde(default, deserialize_with = "loose_u32")]
    pub farm: u32,
    #[serde(default)]
    pub title: String,
    /// Description text (`description` extra).
    #[serde(default, deserialize_with = "content_text")]
    pub description: String,
    /// Visible to everyone.
    #[serde(default, deserialize_with = "flag")]
    pub ispublic: bool,
    /// Visible to contacts marked as friends.
    #[serde(default, deserialize_with = "flag")]
    pub isfriend: bool,
    /// Visible to contacts marked as family.
    #[serde(default, deserialize_with = "flag")]
    pub isfamily: bool,
    /// Taken date as reported, `YYYY-MM-DD HH:MM:SS` (`date_taken` extra).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetaken: Option<String>,
    /// Unix time of the last change (`last_update` extra).
    #[serde(default, deserialize_with = "loose_string")]
    pub lastupdate: String,
    /// Medium-size image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_m: Option<String>,
    /// Original image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_o: Option<String>,
    /// Photo page, filled in locally.
    #[serde(default)]
    pub permalink: String,
}

impl Photo {
    /// Whether anybody besides the owner can see the photo.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.ispublic || self.isfriend || self.isfamily
    }

    /// Photo page URL.
    #[must_use]
    pub fn page_url(&self) -> String {
        format!("https://www.flickr.com/photos/{}/{}/", self.owner, self.id)
    }

    /// Fill in locally derived fields.
    #[must_use]
    pub fn decorated(mut self) -> Self {
        self.permalink = self.page_url();
        self
    }

    /// Parsed taken date.
    #[must_use]
    pub fn taken_at(&self) -> Option<NaiveDateTime> {
        self.datetaken
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s, TAKEN_FORMAT).ok())
    }
}

/// One page of a photo listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoPage {
    #[serde(default, deserialize_with = "loose_u32")]
    pub page: u32,
    #[serde(default, deserialize_with = "loose_u32")]
    pub pages: u32,
    #[serde(default, deserialize_with = "loose_u32")]
    pub total: u32,
    #[serde(default)]
    pub photo: Vec<Photo>,
}

/// Account profile from `flickr.people.getInfo`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub nsid: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub iconserver: String,
    #[serde(default, deserialize_with = "loose_u32")]
    pub iconfarm: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_alias: Option<String>,
    #[serde(default, deserialize_with = "content_text")]
    pub username: String,
    #[serde(default, deserialize_with = "content_text")]
    pub realname: String,
    #[serde(default, deserialize_with = "content_text")]
    pub location: String,
    #[serde(default, deserialize_with = "content_text")]
    pub photosurl: String,
    #[serde(default, deserialize_with = "content_text")]
    pub profileurl: String,
    /// Avatar URL, filled in locally.
    #[serde(default)]
    pub buddyicon: String,
}

impl Profile {
    /// Avatar URL built from the icon server and farm.
    #[must_use]
    pub fn buddyicon_url(&self) -> String {
        if self.iconserver.is_empty() || self.iconserver == "0" {
            return DEFAULT_BUDDYICON.to_string();
        }
        format!(
            "https://farm{}.staticflickr.com/{}/buddyicons/{}.jpg",
            self.iconfarm, self.iconserver, self.nsid
        )
    }

    /// Fill in locally derived fields.
    #[must_use]
    pub fn decorated(mut self) -> Self {
        self.buddyicon = self.buddyicon_url();
        self
    }
}

/// Identity returned by `flickr.test.login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    /// NSID.
    pub id: String,
    #[serde(default, deserialize_with = "content_text")]
    pub username: String,
}

/// Accept `1`/`0`, `true`/`false` or their string forms.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// Accept a plain string, a number, or `{"_content": ...}`.
fn content_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Object(map) => match map.get("_content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        },
        _ => String::new(),
    })
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn loose_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}
