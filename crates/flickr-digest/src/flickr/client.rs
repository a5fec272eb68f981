//! Flickr API client.
//!
//! Every call is a signed `GET`; OAuth parameters travel in the query
//! string, which Flickr accepts for both the token endpoints and the REST
//! endpoint.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::oauth::{self, ApiCredentials, TokenPair};
use super::types::{LoginUser, PhotoPage, Profile};
use crate::error::FlickrError;

/// Base of the OAuth endpoints.
pub const DEFAULT_OAUTH_BASE: &str = "https://www.flickr.com/services/oauth";

/// REST endpoint.
pub const DEFAULT_REST_URL: &str = "https://api.flickr.com/services/rest/";

/// Permission requested during authorization.
pub const READ_PERMS: &str = "read";

/// Extras requested with photo listings.
pub const PHOTO_EXTRAS: &str = "description,date_taken,last_update,owner_name,url_m,url_o";

/// Largest page size Flickr allows.
pub const PER_PAGE: u32 = 500;

/// Method used by the legacy token exchange.
const LEGACY_EXCHANGE_METHOD: &str = "flickr.auth.oauth.getAccessToken";

/// Where the client sends its requests.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// `.../services/oauth`, without trailing slash.
    pub oauth_base: String,
    /// `.../services/rest/`.
    pub rest_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            oauth_base: DEFAULT_OAUTH_BASE.to_string(),
            rest_url: DEFAULT_REST_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Serve every endpoint from one host, using Flickr's paths.
    #[must_use]
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            oauth_base: format!("{base}/services/oauth"),
            rest_url: format!("{base}/services/rest/"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user: LoginUser,
}

#[derive(Debug, Deserialize)]
struct PhotosResponse {
    photos: PhotoPage,
}

#[derive(Debug, Deserialize)]
struct PersonResponse {
    person: Profile,
}

#[derive(Debug, Deserialize)]
struct LegacyExchangeResponse {
    auth: LegacyAuth,
}

#[derive(Debug, Deserialize)]
struct LegacyAuth {
    access_token: LegacyAccessToken,
}

#[derive(Debug, Deserialize)]
struct LegacyAccessToken {
    oauth_token: String,
    oauth_token_secret: String,
}

/// Flickr API client bound to one application key.
pub struct FlickrClient {
    client: Client,
    credentials: ApiCredentials,
    endpoints: Endpoints,
}

impl FlickrClient {
    /// Create a client for the public Flickr endpoints.
    pub fn new(credentials: ApiCredentials) -> Result<Self, FlickrError> {
        Self::with_endpoints(credentials, Endpoints::default())
    }

    /// Create a client for custom endpoints.
    pub fn with_endpoints(
        credentials: ApiCredentials,
        endpoints: Endpoints,
    ) -> Result<Self, FlickrError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            credentials,
            endpoints,
        })
    }

    /// Obtain a request token for out-of-band authorization.
    pub async fn request_token(&self) -> Result<TokenPair, FlickrError> {
        let url = format!("{}/request_token", self.endpoints.oauth_base);
        let mut params = BTreeMap::new();
        params.insert("oauth_callback".to_string(), "oob".to_string());

        let body = self.signed_get(&url, params, None).await?;
        let fields = parse_form(&body);
        Ok(TokenPair::new(
            take(&fields, "oauth_token")?,
            take(&fields, "oauth_token_secret")?,
        ))
    }

    /// URL the account owner opens to approve the request token.
    pub fn authorize_url(
        &self,
        request_token: &TokenPair,
        perms: &str,
    ) -> Result<String, FlickrError> {
        let url = url::Url::parse_with_params(
            &format!("{}/authorize", self.endpoints.oauth_base),
            &[("oauth_token", request_token.token.as_str()), ("perms", perms)],
        )?;
        Ok(url.into())
    }

    /// Exchange an approved request token and its verifier for an access
    /// token.
    pub async fn access_token(
        &self,
        request_token: &TokenPair,
        verifier: &str,
    ) -> Result<TokenPair, FlickrError> {
        let url = format!("{}/access_token", self.endpoints.oauth_base);
        let mut params = BTreeMap::new();
        params.insert("oauth_verifier".to_string(), verifier.trim().to_string());

        let body = self.signed_get(&url, params, Some(request_token)).await?;
        let fields = parse_form(&body);
        Ok(TokenPair::new(
            take(&fields, "oauth_token")?,
            take(&fields, "oauth_token_secret")?,
        ))
    }

    /// Exchange a pre-OAuth auth token for an OAuth access token.
    pub async fn exchange_legacy_token(&self, auth_token: &str) -> Result<TokenPair, FlickrError> {
        let mut params = BTreeMap::new();
        params.insert("method".to_string(), LEGACY_EXCHANGE_METHOD.to_string());
        params.insert("api_key".to_string(), self.credentials.key.clone());
        params.insert("auth_token".to_string(), auth_token.trim().to_string());
        params.insert("format".to_string(), "json".to_string());
        params.insert("nojsoncallback".to_string(), "1".to_string());
        let api_sig = oauth::legacy_api_sig(&self.credentials.secret, &params);
        params.insert("api_sig".to_string(), api_sig);

        debug!(method = LEGACY_EXCHANGE_METHOD, "GET request");
        let response = self
            .client
            .get(&self.endpoints.rest_url)
            .query(&params)
            .send()
            .await?;
        let body = read_body(response).await?;
        let value = check_stat(serde_json::from_str(&body)?)?;

        let exchanged: LegacyExchangeResponse = serde_json::from_value(value)?;
        let access = exchanged.auth.access_token;
        Ok(TokenPair::new(access.oauth_token, access.oauth_token_secret))
    }

    /// Call a REST method on behalf of the owner of `token`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        args: &[(&str, String)],
        token: &TokenPair,
    ) -> Result<T, FlickrError> {
        let mut params: BTreeMap<String, String> = args
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        params.insert("method".to_string(), method.to_string());
        params.insert("format".to_string(), "json".to_string());
        params.insert("nojsoncallback".to_string(), "1".to_string());

        let body = self
            .signed_get(&self.endpoints.rest_url, params, Some(token))
            .await?;
        let value = check_stat(serde_json::from_str(&body)?)?;
        Ok(serde_json::from_value(value)?)
    }

    /// `flickr.test.login`: who owns this token.
    pub async fn test_login(&self, token: &TokenPair) -> Result<LoginUser, FlickrError> {
        let response: LoginResponse = self.call("flickr.test.login", &[], token).await?;
        Ok(response.user)
    }

    /// `flickr.photos.recentlyUpdated`: one page of the caller's photos
    /// changed at or after `min_date` (unix seconds).
    pub async fn recently_updated(
        &self,
        token: &TokenPair,
        min_date: i64,
        page: u32,
    ) -> Result<PhotoPage, FlickrError> {
        let args = [
            ("min_date", min_date.to_string()),
            ("extras", PHOTO_EXTRAS.to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("page", page.to_string()),
        ];
        let response: PhotosResponse = self
            .call("flickr.photos.recentlyUpdated", &args, token)
            .await?;
        Ok(response.photos)
    }

    /// `flickr.people.getInfo` for `user_id`.
    pub async fn people_info(
        &self,
        token: &TokenPair,
        user_id: &str,
    ) -> Result<Profile, FlickrError> {
        let args = [("user_id", user_id.to_string())];
        let response: PersonResponse = self.call("flickr.people.getInfo", &args, token).await?;
        Ok(response.person)
    }

    async fn signed_get(
        &self,
        url: &str,
        params: BTreeMap<String, String>,
        token: Option<&TokenPair>,
    ) -> Result<String, FlickrError> {
        let signed = oauth::sign_request(
            "GET",
            url,
            params,
            &self.credentials,
            token,
            &oauth::nonce(),
            Utc::now().timestamp(),
        );

        debug!(url = %url, method = signed.get("method").map(String::as_str), "GET request");
        let response = self.client.get(url).query(&signed).send().await?;
        read_body(response).await
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, FlickrError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(FlickrError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// Turn a `stat=fail` payload into an error.
fn check_stat(value: Value) -> Result<Value, FlickrError> {
    if value.get("stat").and_then(Value::as_str) == Some("ok") {
        return Ok(value);
    }
    Err(FlickrError::Api {
        code: value.get("code").and_then(Value::as_i64).unwrap_or_default(),
        message: value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    })
}

fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

fn take(fields: &HashMap<String, String>, name: &'static str) -> Result<String, FlickrError> {
    fields
        .get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or(FlickrError::MissingField(name))
}
