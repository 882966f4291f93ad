use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Token lifetime granted by the backend (`ACCESS_TOKEN_EXPIRE_MINUTES`).
const TOKEN_EXPIRY_MINUTES: i64 = 60 * 24 * 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub token_type: String,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: impl Into<String>, username: Option<String>) -> Self {
        Self {
            token: token.into(),
            token_type: "bearer".to_string(),
            username,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.created_at + Duration::minutes(TOKEN_EXPIRY_MINUTES)
    }

    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Process-wide credential state.
///
/// Cloning shares the same state. Set on login, cleared on logout or when the
/// backend answers 401. Consumers observe changes through [`Session::watch`].
#[derive(Clone)]
pub struct Session {
    state: Arc<watch::Sender<Option<SessionData>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { state: Arc::new(tx) }
    }

    pub fn with_data(data: SessionData) -> Self {
        let session = Self::new();
        session.set(data);
        session
    }

    pub fn set(&self, data: SessionData) {
        debug!(username = ?data.username, "Session credential set");
        self.state.send_replace(Some(data));
    }

    /// Drop the credential. Returns whether one was present.
    pub fn clear(&self) -> bool {
        let previous = self.state.send_replace(None);
        if previous.is_some() {
            debug!("Session credential cleared");
        }
        previous.is_some()
    }

    pub fn data(&self) -> Option<SessionData> {
        self.state.borrow().clone()
    }

    /// The `Authorization` header value, if authenticated.
    pub fn authorization(&self) -> Option<String> {
        self.state.borrow().as_ref().map(SessionData::authorization)
    }

    pub fn is_authenticated(&self) -> bool {
        self.state
            .borrow()
            .as_ref()
            .map(|d| !d.is_expired())
            .unwrap_or(false)
    }

    /// Subscribe to credential changes.
    pub fn watch(&self) -> watch::Receiver<Option<SessionData>> {
        self.state.subscribe()
    }
}

/// Session metadata kept on disk. The token itself lives in the OS keychain
/// (see [`CredentialStore`](super::CredentialStore)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub username: String,
    pub token_type: String,
    pub created_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn from_data(data: &SessionData) -> Option<Self> {
        Some(Self {
            username: data.username.clone()?,
            token_type: data.token_type.clone(),
            created_at: data.created_at,
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.created_at + Duration::minutes(TOKEN_EXPIRY_MINUTES)
    }

    pub fn with_token(self, token: impl Into<String>) -> SessionData {
        SessionData {
            token: token.into(),
            token_type: self.token_type,
            username: Some(self.username),
            created_at: self.created_at,
        }
    }
}

/// Persists session metadata between runs of the CLI.
pub struct SessionFile {
    cache_dir: PathBuf,
}

impl SessionFile {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Load non-expired session metadata from disk
    pub fn load(&self) -> Result<Option<StoredSession>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let stored: StoredSession =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        if stored.is_expired() {
            debug!(username = %stored.username, "Stored session has expired");
            return Ok(None);
        }
        Ok(Some(stored))
    }

    pub fn save(&self, stored: &StoredSession) -> Result<()> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(stored)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_set_and_clear() {
        let session = Session::new();
        assert!(!session.is_authenticated());
        assert!(session.authorization().is_none());

        session.set(SessionData::new("abc", Some("dispatch@ridge.org".into())));
        assert!(session.is_authenticated());
        assert_eq!(session.authorization().as_deref(), Some("Bearer abc"));

        assert!(session.clear());
        assert!(!session.clear());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_clones_share_state() {
        let session = Session::new();
        let other = session.clone();
        session.set(SessionData::new("tok", None));
        assert_eq!(other.data().map(|d| d.token), Some("tok".to_string()));
    }

    #[tokio::test]
    async fn test_watch_observes_logout() {
        let session = Session::with_data(SessionData::new("tok", None));
        let mut rx = session.watch();
        session.clear();
        rx.changed().await.expect("sender alive");
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn test_expired_session() {
        let mut data = SessionData::new("tok", None);
        data.created_at = Utc::now() - Duration::days(9);
        assert!(data.is_expired());
        assert!(!Session::with_data(data).is_authenticated());
    }

    #[test]
    fn test_session_file_round_trip_and_expiry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = SessionFile::new(dir.path().to_path_buf());
        assert!(file.load().unwrap().is_none());

        let data = SessionData::new("tok", Some("a@b.c".into()));
        let stored = StoredSession::from_data(&data).unwrap();
        file.save(&stored).unwrap();

        let contents = std::fs::read_to_string(dir.path().join(SESSION_FILE)).unwrap();
        assert!(!contents.contains("tok\""));
        let loaded = file.load().unwrap().unwrap();
        assert_eq!(loaded.with_token("tok"), data);

        let mut old = stored;
        old.created_at = Utc::now() - Duration::days(30);
        file.save(&old).unwrap();
        assert!(file.load().unwrap().is_none());

        file.clear().unwrap();
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_anonymous_session_is_not_stored() {
        assert!(StoredSession::from_data(&SessionData::new("tok", None)).is_none());
    }
}
