//! OAuth 1.0a request signing and the legacy `api_sig` scheme.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Application key pair issued by Flickr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    /// Consumer key (`api_key`).
    pub key: String,
    /// Consumer secret (`api_secret`).
    pub secret: String,
}

impl ApiCredentials {
    /// Create a key pair.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

/// OAuth token and its secret. Used both for request tokens awaiting
/// verification and for access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub token: String,
    pub secret: String,
}

impl TokenPair {
    /// Create a token pair.
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }
}

/// RFC 3986 percent-encoding: everything but `A-Z a-z 0-9 - . _ ~`.
#[must_use]
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Build the signature base string for a request.
///
/// `url` must not carry a query string; every parameter, including the
/// `oauth_*` ones, goes in `params`.
#[must_use]
pub fn signature_base_string(method: &str, url: &str, params: &BTreeMap<String, String>) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&normalized)
    )
}

/// HMAC-SHA1 signature of a base string, base64-encoded.
#[must_use]
pub fn hmac_sha1_signature(
    base: &str,
    consumer_secret: &str,
    token_secret: Option<&str>,
) -> String {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret.unwrap_or_default())
    );

    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(base.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Fresh nonce for a signed request.
#[must_use]
pub fn nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Add the `oauth_*` protocol parameters and the signature to `params`.
pub fn sign_request(
    method: &str,
    url: &str,
    mut params: BTreeMap<String, String>,
    consumer: &ApiCredentials,
    token: Option<&TokenPair>,
    nonce: &str,
    timestamp: i64,
) -> BTreeMap<String, String> {
    params.insert("oauth_consumer_key".into(), consumer.key.clone());
    params.insert("oauth_nonce".into(), nonce.to_string());
    params.insert("oauth_signature_method".into(), "HMAC-SHA1".into());
    params.insert("oauth_timestamp".into(), timestamp.to_string());
    params.insert("oauth_version".into(), "1.0".into());
    if let Some(token) = token {
        params.insert("oauth_token".into(), token.token.clone());
    }

    let base = signature_base_string(method, url, &params);
    let signature = hmac_sha1_signature(&base, &consumer.secret, token.map(|t| t.secret.as_str()));
    params.insert("oauth_signature".into(), signature);
    params
}

/// Pre-OAuth `api_sig`: MD5 over the secret followed by every parameter
/// name and value, in name order.
#[must_use]
pub fn legacy_api_sig(secret: &str, params: &BTreeMap<String, String>) -> String {
    let mut hasher = Md5::new();
    hasher.update(secret.as_bytes());
    for (name, value) in params {
        hasher.update(name.as_bytes());
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_percent_encode_reserved() {
        assert_eq!(
            percent_encode("Hello Ladies + Gentlemen, a signed OAuth request!"),
            "Hello%20Ladies%20%2B%20Gentlemen%2C%20a%20signed%20OAuth%20request%21"
        );
        assert_eq!(percent_encode("a-b.c_d~e"), "a-b.c_d~e");
    }

    #[test]
    fn test_base_string_sorts_and_encodes() {
        let base = signature_base_string(
            "get",
            "https://www.flickr.com/services/oauth/request_token",
            &params(&[("oauth_callback", "oob"), ("b", "2"), ("a", "1")]),
        );

        assert_eq!(
            base,
            "GET&https%3A%2F%2Fwww.flickr.com%2Fservices%2Foauth%2Frequest_token\
             &a%3D1%26b%3D2%26oauth_callback%3Doob"
        );
    }

    #[test]
    fn test_signature_depends_on_token_secret() {
        let base = "GET&https%3A%2F%2Fexample.com&a%3D1";
        let without = hmac_sha1_signature(base, "consumer", None);
        let with = hmac_sha1_signature(base, "consumer", Some("token"));

        // base64 of a 20-byte digest
        assert_eq!(without.len(), 28);
        assert_ne!(without, with);
        assert_eq!(without, hmac_sha1_signature(base, "consumer", None));
    }

    #[test]
    fn test_sign_request_adds_protocol_params() {
        let consumer = ApiCredentials::new("key", "secret");
        let token = TokenPair::new("tok", "toksecret");
        let signed = sign_request(
            "GET",
            "https://api.flickr.com/services/rest/",
            params(&[("method", "flickr.test.login")]),
            &consumer,
            Some(&token),
            "abc",
            1_318_622_958,
        );

        assert_eq!(signed["oauth_consumer_key"], "key");
        assert_eq!(signed["oauth_token"], "tok");
        assert_eq!(signed["oauth_nonce"], "abc");
        assert_eq!(signed["oauth_timestamp"], "1318622958");
        assert_eq!(signed["oauth_signature_method"], "HMAC-SHA1");
        assert_eq!(signed["method"], "flickr.test.login");

        let mut unsigned = signed.clone();
        let signature = unsigned.remove("oauth_signature").unwrap();
        let base = signature_base_string("GET", "https://api.flickr.com/services/rest/", &unsigned);
        assert_eq!(signature, hmac_sha1_signature(&base, "secret", Some("toksecret")));
    }

    #[test]
    fn test_nonce_is_unique() {
        assert_ne!(nonce(), nonce());
    }

    #[test]
    fn test_legacy_api_sig_orders_by_name() {
        let sig = legacy_api_sig(
            "SECRET",
            &params(&[
                ("method", "flickr.auth.oauth.getAccessToken"),
                ("nojsoncallback", "1"),
                ("auth_token", "TOKEN"),
                ("format", "json"),
                ("api_key", "KEY"),
            ]),
        );

        let expected = hex::encode(Md5::digest(
            concat!(
                "SECRETapi_keyKEYauth_tokenTOKENformatjson",
                "methodflickr.auth.oauth.getAccessTokennojsoncallback1"
            )
            .as_bytes(),
        ));
        assert_eq!(sig, expected);
        assert_eq!(sig.len(), 32);
    }
}
