//! End-to-end digest runs against a mocked Flickr and a capturing sender.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use flickr_digest::credentials::MemoryStore;
use flickr_digest::digest::{DigestGenerator, DigestSender};
use flickr_digest::error::{DigestError, Error, StateError};
use flickr_digest::flickr::{ApiCredentials, Endpoints, FlickrClient, TokenPair};
use flickr_digest::pipeline::{DigestRun, RunOptions};
use flickr_digest::state::{keys, State, StateFile};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct CapturingSender {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl DigestSender for CapturingSender {
    async fn send(&self, html: &str) -> Result<(), DigestError> {
        if self.fail {
            return Err(DigestError::NoRecipients);
        }
        self.sent.lock().unwrap().push(html.to_string());
        Ok(())
    }
}

impl CapturingSender {
    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

fn started_at() -> DateTime<Utc> {
    Utc.timestamp_opt(1_710_000_000, 0).unwrap()
}

fn last_run() -> DateTime<Utc> {
    Utc.timestamp_opt(1_709_900_000, 0).unwrap()
}

fn client(server: &MockServer) -> FlickrClient {
    FlickrClient::with_endpoints(
        ApiCredentials::new("app-key", "app-secret"),
        Endpoints::with_base(&server.uri()),
    )
    .unwrap()
}

fn state() -> State {
    let mut state = State::with_defaults(last_run());
    state.set(keys::API_KEY, "app-key");
    state.set(keys::API_SECRET, "app-secret");
    state.set_last_checked(last_run());
    state
}

async fn mock_photos(server: &MockServer, token: &str, photos: Value) {
    let count = photos.as_array().map_or(0, Vec::len);
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .and(query_param("method", "flickr.photos.recentlyUpdated"))
        .and(query_param("oauth_token", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "photos": { "page": 1, "pages": 1, "perpage": 500, "total": count, "photo": photos },
            "stat": "ok"
        })))
        .mount(server)
        .await;
}

async fn mock_profile(server: &MockServer, token: &str, nsid: &str, username: &str) {
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .and(query_param("method", "flickr.test.login"))
        .and(query_param("oauth_token", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "id": nsid, "username": { "_content": username } },
            "stat": "ok"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .and(query_param("method", "flickr.people.getInfo"))
        .and(query_param("oauth_token", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "person": {
                "id": nsid,
                "nsid": nsid,
                "iconserver": "0",
                "iconfarm": 0,
                "username": { "_content": username },
                "realname": { "_content": "" },
                "photosurl": { "_content": format!("https://www.flickr.com/photos/{username}/") }
            },
            "stat": "ok"
        })))
        .mount(server)
        .await;
}

fn photo(id: &str, owner: &str, title: &str, public: u8) -> Value {
    json!({
        "id": id,
        "owner": owner,
        "secret": "abc",
        "server": "65535",
        "farm": 66,
        "title": title,
        "ispublic": public,
        "isfriend": 0,
        "isfamily": 0,
        "datetaken": "2024-03-09 12:00:00",
        "description": { "_content": "" },
        "url_m": format!("https://live.staticflickr.com/65535/{id}_abc.jpg")
    })
}

#[tokio::test]
async fn test_run_sends_shared_photos_and_advances_last_date() {
    let server = MockServer::start().await;
    mock_photos(
        &server,
        "tok-alice",
        json!([
            photo("101", "7@N01", "Harbour", 1),
            photo("102", "7@N01", "Private diary", 0)
        ]),
    )
    .await;
    mock_profile(&server, "tok-alice", "7@N01", "alice").await;
    mock_photos(&server, "tok-bob", json!([])).await;

    let dir = TempDir::new().unwrap();
    let state_file = StateFile::new(dir.path().join("state.toml"));
    let client = client(&server);
    let users = MemoryStore::with_entries([
        ("alice", TokenPair::new("tok-alice", "s1")),
        ("bob", TokenPair::new("tok-bob", "s2")),
    ]);
    let generator = DigestGenerator::builtin().unwrap();
    let sender = CapturingSender::default();
    let mut state = state();

    let summary = DigestRun::new(
        &client,
        &users,
        &generator,
        &sender,
        &state_file,
        RunOptions::default(),
    )
    .run_at(&mut state, started_at())
        .await
        .unwrap();

    assert_eq!(summary.users_checked, 2);
    assert_eq!(summary.users_with_photos, 1);
    assert_eq!(summary.total, 1);
    assert_eq!(summary.skipped_private, 1);
    assert!(summary.sent);
    assert!(summary.saved);

    let sent = sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Harbour"));
    assert!(sent[0].contains("https://www.flickr.com/photos/7@N01/101/"));
    assert!(!sent[0].contains("Private diary"));

    let saved = state_file.load().unwrap();
    assert_eq!(saved.last_checked().unwrap(), started_at());
}

#[tokio::test]
async fn test_no_photos_skips_email_but_saves() {
    let server = MockServer::start().await;
    mock_photos(&server, "tok-alice", json!([])).await;

    let dir = TempDir::new().unwrap();
    let state_file = StateFile::new(dir.path().join("state.toml"));
    let client = client(&server);
    let users = MemoryStore::with_entries([("alice", TokenPair::new("tok-alice", "s1"))]);
    let generator = DigestGenerator::builtin().unwrap();
    let sender = CapturingSender::default();
    let mut state = state();

    let summary = DigestRun::new(
        &client,
        &users,
        &generator,
        &sender,
        &state_file,
        RunOptions::default(),
    )
    .run_at(&mut state, started_at())
        .await
        .unwrap();

    assert_eq!(summary.total, 0);
    assert!(summary.html.is_none());
    assert!(!summary.sent);
    assert_eq!(sender.count(), 0);
    assert_eq!(state_file.load().unwrap().last_checked().unwrap(), started_at());
}

#[tokio::test]
async fn test_dry_run_renders_without_sending_or_saving() {
    let server = MockServer::start().await;
    mock_photos(&server, "tok-alice", json!([photo("101", "7@N01", "Harbour", 1)])).await;
    mock_profile(&server, "tok-alice", "7@N01", "alice").await;

    let dir = TempDir::new().unwrap();
    let state_file = StateFile::new(dir.path().join("state.toml"));
    let client = client(&server);
    let users = MemoryStore::with_entries([("alice", TokenPair::new("tok-alice", "s1"))]);
    let generator = DigestGenerator::builtin().unwrap();
    let sender = CapturingSender::default();
    let mut state = state();
    let options = RunOptions {
        lookback: Some(Duration::hours(48)),
        dry_run: true,
    };

    let summary = DigestRun::new(
        &client,
        &users,
        &generator,
        &sender,
        &state_file,
        options,
    )
    .run_at(&mut state, started_at())
        .await
        .unwrap();

    assert_eq!(summary.since, Some(started_at() - Duration::hours(48)));
    assert!(summary.html.as_deref().is_some_and(|html| html.contains("Harbour")));
    assert!(!summary.sent);
    assert!(!summary.saved);
    assert_eq!(sender.count(), 0);
    assert!(!state_file.path().exists());
    assert_eq!(state.last_checked().unwrap(), last_run());
}

#[tokio::test]
async fn test_failed_send_keeps_last_date() {
    let server = MockServer::start().await;
    mock_photos(&server, "tok-alice", json!([photo("101", "7@N01", "Harbour", 1)])).await;
    mock_profile(&server, "tok-alice", "7@N01", "alice").await;

    let dir = TempDir::new().unwrap();
    let state_file = StateFile::new(dir.path().join("state.toml"));
    let client = client(&server);
    let users = MemoryStore::with_entries([("alice", TokenPair::new("tok-alice", "s1"))]);
    let generator = DigestGenerator::builtin().unwrap();
    let sender = CapturingSender {
        fail: true,
        ..CapturingSender::default()
    };
    let mut state = state();

    let err = DigestRun::new(
        &client,
        &users,
        &generator,
        &sender,
        &state_file,
        RunOptions::default(),
    )
    .run_at(&mut state, started_at())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Digest(ref e) if e.is_mail_error()));
    assert!(!state_file.path().exists());
}

#[tokio::test]
async fn test_remote_failure_aborts_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stat": "fail",
            "code": 98,
            "message": "Invalid auth token"
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let state_file = StateFile::new(dir.path().join("state.toml"));
    let client = client(&server);
    let users = MemoryStore::with_entries([("alice", TokenPair::new("revoked", "s1"))]);
    let generator = DigestGenerator::builtin().unwrap();
    let sender = CapturingSender::default();
    let mut state = state();

    let err = DigestRun::new(
        &client,
        &users,
        &generator,
        &sender,
        &state_file,
        RunOptions::default(),
    )
    .run_at(&mut state, started_at())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Flickr(_)));
    assert!(!state_file.path().exists());
}

#[tokio::test]
async fn test_no_users() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let state_file = StateFile::new(dir.path().join("state.toml"));
    let client = client(&server);
    let users = MemoryStore::new();
    let generator = DigestGenerator::builtin().unwrap();
    let sender = CapturingSender::default();
    let mut state = state();

    let err = DigestRun::new(
        &client,
        &users,
        &generator,
        &sender,
        &state_file,
        RunOptions::default(),
    )
    .run_at(&mut state, started_at())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NoUsers));
}

#[tokio::test]
async fn test_oversized_lookback_is_an_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let state_file = StateFile::new(dir.path().join("state.toml"));
    let client = client(&server);
    let users = MemoryStore::with_entries([("alice", TokenPair::new("tok-alice", "s1"))]);
    let generator = DigestGenerator::builtin().unwrap();
    let sender = CapturingSender::default();
    let mut state = state();
    let options = RunOptions {
        lookback: Some(Duration::hours(i64::from(u32::MAX))),
        dry_run: false,
    };

    let err = DigestRun::new(
        &client,
        &users,
        &generator,
        &sender,
        &state_file,
        options,
    )
    .run_at(&mut state, started_at())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::State(StateError::InvalidValue { ref key, .. }) if key == "lookback"
    ));
    assert_eq!(sender.count(), 0);
    assert!(!state_file.path().exists());
    assert!(server.received_requests().await.unwrap().is_empty());
}
