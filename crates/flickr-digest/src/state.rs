//! Flat key-value state file.
//!
//! Holds the API keys, the last-checked timestamp and the SMTP settings.
//! The file is a flat TOML table; values may be strings, integers or
//! booleans and the typed getters accept the loose spellings an operator is
//! likely to type by hand (`smtp_port = "25"`, `smtp_tls = "yes"`).

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use toml::{Table, Value};

use crate::error::{Error, StateError};
use crate::flickr::ApiCredentials;

/// Key names understood by the tool.
pub mod keys {
    pub const API_KEY: &str = "api_key";
    pub const API_SECRET: &str = "api_secret";
    pub const LAST_DATE: &str = "last_date";
    pub const SMTP_FROM: &str = "smtp_from";
    pub const SMTP_TO: &str = "smtp_to";
    pub const SMTP_CC: &str = "smtp_cc";
    pub const SMTP_BCC: &str = "smtp_bcc";
    pub const SMTP_SUBJECT: &str = "smtp_subject";
    pub const SMTP_PORT: &str = "smtp_port";
    pub const SMTP_SERVER: &str = "smtp_server";
    pub const SMTP_TLS: &str = "smtp_tls";
    pub const SMTP_USER: &str = "smtp_user";
    pub const SMTP_PASSWORD: &str = "smtp_password";
}

/// Value written for a missing `api_key` so the operator knows what to edit.
pub const PLACEHOLDER_API_KEY: &str = "API_KEY";

/// Value written for a missing `api_secret`.
pub const PLACEHOLDER_API_SECRET: &str = "API_SECRET";

/// How far back the first run looks when no `last_date` is stored.
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// In-memory view of the state file.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    values: Table,
}

impl Default for State {
    fn default() -> Self {
        Self::with_defaults(Utc::now())
    }
}

impl State {
    /// Create a state holding only the documented defaults.
    #[must_use]
    pub fn with_defaults(now: DateTime<Utc>) -> Self {
        let mut values = Table::new();
        let last_date = now - Duration::hours(DEFAULT_LOOKBACK_HOURS);
        values.insert(keys::LAST_DATE.into(), Value::Integer(last_date.timestamp()));
        values.insert(keys::SMTP_FROM.into(), "admin@example.com".into());
        values.insert(keys::SMTP_TO.into(), "clients@example.com".into());
        values.insert(keys::SMTP_CC.into(), "".into());
        values.insert(keys::SMTP_BCC.into(), "".into());
        values.insert(keys::SMTP_SUBJECT.into(), "New photos".into());
        values.insert(keys::SMTP_PORT.into(), Value::Integer(25));
        values.insert(keys::SMTP_SERVER.into(), "localhost".into());
        values.insert(keys::SMTP_TLS.into(), Value::Boolean(false));
        Self { values }
    }

    /// Overlay every key of `table` on top of the current values.
    pub fn merge(&mut self, table: Table) {
        self.values.extend(table);
    }

    /// Raw access to a value.
    #[must_use]
    /// Read a value as a string. Integers and booleans are rendered.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Read a non-blank string value.
    #[must_use]
    pub fn get_nonempty(&self, key: &str) -> Option<String> {
        self.get_string(key).filter(|s| !s.trim().is_empty())
    }

    /// Read a value as an integer.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, StateError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::Integer(i)) => Ok(Some(*i)),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| invalid(key, "an integer", s)),
            Some(other) => Err(invalid(key, "an integer", &other.to_string())),
        }
    }

    /// Read a value as a boolean.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, StateError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::Boolean(b)) => Ok(Some(*b)),
            Some(Value::Integer(1)) => Ok(Some(true)),
            Some(Value::Integer(0)) => Ok(Some(false)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Some(true)),
                "false" | "no" | "off" | "0" => Ok(Some(false)),
                _ => Err(invalid(key, "a boolean", s)),
            },
            Some(other) => Err(invalid(key, "a boolean", &other.to_string())),
        }
    }

    /// Set a value, replacing any previous one.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// API credentials, if both are set to something other than the
    /// placeholders.
    #[must_use]
    pub fn api_credentials(&self) -> Option<ApiCredentials> {
        let key = self
            .get_nonempty(keys::API_KEY)
            .filter(|k| k != PLACEHOLDER_API_KEY)?;
        let secret = self
            .get_nonempty(keys::API_SECRET)
            .filter(|s| s != PLACEHOLDER_API_SECRET)?;
        Some(ApiCredentials::new(key, secret))
    }

    /// Write placeholders for whichever API credential is absent.
    pub fn fill_api_placeholders(&mut self) {
        if self.get_nonempty(keys::API_KEY).is_none() {
            self.set(keys::API_KEY, PLACEHOLDER_API_KEY);
        }
        if self.get_nonempty(keys::API_SECRET).is_none() {
            self.set(keys::API_SECRET, PLACEHOLDER_API_SECRET);
        }
    }

    /// Timestamp of the last completed digest run.
    pub fn last_checked(&self) -> Result<DateTime<Utc>, StateError> {
        let secs = self
            .get_int(keys::LAST_DATE)?
            .ok_or_else(|| invalid(keys::LAST_DATE, "a unix timestamp", "nothing"))?;
        Utc.timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| invalid(keys::LAST_DATE, "a unix timestamp", &secs.to_string()))
    }

    /// Record the start of a completed digest run.
    pub fn set_last_checked(&mut self, at: DateTime<Utc>) {
        self.set(keys::LAST_DATE, Value::Integer(at.timestamp()));
    }

    /// Underlying table, in key order.
    #[must_use]
    pub fn as_table(&self) -> &Table {
        &self.values
    }
}

fn invalid(key: &str, expected: &'static str, found: &str) -> StateError {
    StateError::InvalidValue {
        key: key.to_string(),
        expected,
        found: found.to_string(),
    }
}

/// The state file on disk.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    /// Refer to a state file; nothing is read until [`StateFile::load`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the previous contents are copied to on every save.
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".bak");
        self.path.with_file_name(name)
    }

    /// Load the state, seeded with defaults computed from the current time.
    pub fn load(&self) -> Result<State, StateError> {
        self.load_at(Utc::now())
    }

    /// Load the state with defaults computed from `now`.
    pub fn load_at(&self, now: DateTime<Utc>) -> Result<State, StateError> {
        let mut state = State::with_defaults(now);

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No state file yet, using defaults");
                return Ok(state);
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let table: Table = toml::from_str(&content).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), keys = table.len(), "Loaded state file");
        state.merge(table);
        Ok(state)
    }

    /// Write the state back. The previous file, if any, is copied to
    /// [`StateFile::backup_path`] first; the new contents replace the file
    /// atomically.
    pub fn save(&self, state: &State) -> Result<(), StateError> {
        let io_err = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        if self.path.exists() {
            std::fs::copy(&self.path, self.backup_path()).map_err(io_err)?;
        }

        let content = toml::to_string(state.as_table())?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(content.as_bytes()).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        tracing::debug!(path = %self.path.display(), "Saved state file");
        Ok(())
    }

    /// Return the API credentials, or write placeholders into the file and
    /// fail so the operator can fill them in.
    pub fn require_api_credentials(&self, state: &mut State) -> Result<ApiCredentials, Error> {
        if let Some(credentials) = state.api_credentials() {
            return Ok(credentials);
        }

        state.fill_api_placeholders();
        self.save(state)?;
        Err(Error::MissingApiKeys {
            path: self.path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixed_now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("state.toml"));

        let state = file.load_at(fixed_now()).unwrap();

        assert_eq!(state.get_int(keys::LAST_DATE).unwrap(), Some(1_700_000_000 - 86_400));
        assert_eq!(state.get_string(keys::SMTP_SERVER).as_deref(), Some("localhost"));
        assert_eq!(state.get_int(keys::SMTP_PORT).unwrap(), Some(25));
        assert_eq!(state.get_bool(keys::SMTP_TLS).unwrap(), Some(false));
        assert!(state.api_credentials().is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        std::fs::write(
            &path,
            "api_key = \"k\"\napi_secret = \"s\"\nsmtp_port = \"587\"\nsmtp_tls = \"yes\"\n",
        )
        .unwrap();

        let state = StateFile::new(&path).load_at(fixed_now()).unwrap();

        assert_eq!(state.get_int(keys::SMTP_PORT).unwrap(), Some(587));
        assert_eq!(state.get_bool(keys::SMTP_TLS).unwrap(), Some(true));
        assert_eq!(state.get_string(keys::SMTP_SUBJECT).as_deref(), Some("New photos"));
        let creds = state.api_credentials().unwrap();
        assert_eq!(creds.key, "k");
        assert_eq!(creds.secret, "s");
    }

    #[test]
    fn test_round_trip_with_backup() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("state.toml"));

        let mut state = file.load_at(fixed_now()).unwrap();
        state.set(keys::API_KEY, "key");
        state.set(keys::API_SECRET, "secret");
        file.save(&state).unwrap();
        assert!(!file.backup_path().exists());

        let reloaded = file.load_at(fixed_now()).unwrap();
        assert_eq!(reloaded, state);

        let first_contents = std::fs::read_to_string(file.path()).unwrap();
        let mut updated = reloaded.clone();
        updated.set_last_checked(fixed_now());
        file.save(&updated).unwrap();

        assert_eq!(std::fs::read_to_string(file.backup_path()).unwrap(), first_contents);
        assert_eq!(file.load_at(fixed_now()).unwrap(), updated);
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        let file = StateFile::new("/tmp/conf/state.toml");
        assert_eq!(file.backup_path(), PathBuf::from("/tmp/conf/state.toml.bak"));
    }

    #[test]
    fn test_invalid_values_name_the_key() {
        let mut state = State::with_defaults(fixed_now());
        state.set(keys::SMTP_PORT, "twenty-five");
        state.set(keys::SMTP_TLS, "maybe");

        let err = state.get_int(keys::SMTP_PORT).unwrap_err();
        assert!(err.to_string().contains("smtp_port"));
        let err = state.get_bool(keys::SMTP_TLS).unwrap_err();
        assert!(err.to_string().contains("smtp_tls"));
    }

    #[test]
    fn test_last_checked_round_trip() {
        let mut state = State::with_defaults(fixed_now());
        state.set_last_checked(fixed_now());
        assert_eq!(state.last_checked().unwrap(), fixed_now());
    }

    #[test]
    fn test_placeholders_are_not_credentials() {
        let mut state = State::with_defaults(fixed_now());
        state.fill_api_placeholders();
        assert_eq!(state.get_string(keys::API_KEY).as_deref(), Some(PLACEHOLDER_API_KEY));
        assert!(state.api_credentials().is_none());
    }

    #[test]
    fn test_require_api_credentials_writes_placeholders() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("state.toml"));
        let mut state = file.load_at(fixed_now()).unwrap();

        let err = file.require_api_credentials(&mut state).unwrap_err();
        assert!(matches!(err, Error::MissingApiKeys { .. }));

        let written = file.load_at(fixed_now()).unwrap();
        assert_eq!(written.get_string(keys::API_KEY).as_deref(), Some(PLACEHOLDER_API_KEY));
        assert_eq!(
            written.get_string(keys::API_SECRET).as_deref(),
            Some(PLACEHOLDER_API_SECRET)
        );
    }
}
