use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info};

/// Signed-in state and the daily token counters reported by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSnapshot {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub email: Option<String>,
    pub tokens_used_today: u32,
    pub tokens_remaining_today: u32,
    /// `YYYY-MM-DD` of the last usage update.
    pub last_usage_date: Option<String>,
}

impl SessionSnapshot {
    pub fn is_signed_in(&self) -> bool {
        self.access_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }

    fn record_usage(&mut self, used_today: u32, remaining: u32) {
        self.tokens_used_today = used_today;
        self.tokens_remaining_today = remaining;
        self.last_usage_date = Some(today());
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn access_token(&self) -> Option<String>;

    async fn update_usage(&self, used_today: u32, remaining: u32) -> Result<()>;

    fn subscribe(&self) -> watch::Receiver<SessionSnapshot>;

    fn snapshot(&self) -> SessionSnapshot {
        self.subscribe().borrow().clone()
    }
}

fn today() -> String {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn usable_token(snapshot: &SessionSnapshot) -> Option<String> {
    snapshot
        .access_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Session kept only in memory.
#[derive(Debug)]
pub struct MemorySessionStore {
    tx: watch::Sender<SessionSnapshot>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionSnapshot::default());
        Self { tx }
    }

    pub fn signed_in(token: &str) -> Self {
        let (tx, _) = watch::channel(SessionSnapshot {
            access_token: Some(token.to_string()),
            ..SessionSnapshot::default()
        });
        Self { tx }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn access_token(&self) -> Option<String> {
        usable_token(&self.tx.borrow())
    }

    async fn update_usage(&self, used_today: u32, remaining: u32) -> Result<()> {
        self.tx
            .send_modify(|snapshot| snapshot.record_usage(used_today, remaining));
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }
}

/// Session persisted as JSON, normally at `paths::session_file()`.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    tx: watch::Sender<SessionSnapshot>,
}

impl FileSessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read session file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse session file {}", path.display()))?
        } else {
            SessionSnapshot::default()
        };

        debug!(path = %path.display(), signed_in = snapshot.is_signed_in(), "Session loaded");
        let (tx, _) = watch::channel(snapshot);
        Ok(Self { path, tx })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        email: Option<String>,
    ) -> Result<()> {
        self.tx.send_modify(|snapshot| {
            snapshot.access_token = Some(access_token);
            snapshot.refresh_token = refresh_token;
            snapshot.email = email;
        });
        self.persist().await?;
        info!("🔑 Session saved");
        Ok(())
    }

    /// Signs out: forgets tokens and counters and removes the file.
    pub async fn clear(&self) -> Result<()> {
        self.tx.send_replace(SessionSnapshot::default());
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            tokio::fs::remove_file(&self.path)
                .await
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        info!("👋 Session cleared");
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let snapshot = self.tx.borrow().clone();
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create session directory")?;
        }
        let json = serde_json::to_string_pretty(&snapshot).context("Failed to serialize session")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn access_token(&self) -> Option<String> {
        usable_token(&self.tx.borrow())
    }

    async fn update_usage(&self, used_today: u32, remaining: u32) -> Result<()> {
        self.tx
            .send_modify(|snapshot| snapshot.record_usage(used_today, remaining));
        self.persist().await
    }

    fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn blank_tokens_do_not_count_as_signed_in() {
        let store = MemorySessionStore::signed_in("   ");
        assert_eq!(store.access_token().await, None);
        assert!(!store.snapshot().is_signed_in());
    }

    #[tokio::test]
    async fn file_store_round_trips_tokens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileSessionStore::open(&path).unwrap();
        assert_eq!(store.access_token().await, None);

        store
            .save_tokens(
                "abc".to_string(),
                Some("refresh".to_string()),
                Some("me@example.com".to_string()),
            )
            .await
            .unwrap();
        store.update_usage(120, 880).await.unwrap();

        let reopened = FileSessionStore::open(&path).unwrap();
        let snapshot = reopened.snapshot();
        assert_eq!(reopened.access_token().await.as_deref(), Some("abc"));
        assert_eq!(snapshot.email.as_deref(), Some("me@example.com"));
        assert_eq!(snapshot.tokens_used_today, 120);
        assert_eq!(snapshot.tokens_remaining_today, 880);
        assert_eq!(snapshot.last_usage_date.map(|date| date.len()), Some(10));
    }

    #[tokio::test]
    async fn clear_signs_out_and_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::open(&path).unwrap();
        store.save_tokens("abc".to_string(), None, None).await.unwrap();
        assert!(path.exists());

        let mut updates = store.subscribe();
        store.clear().await.unwrap();
        assert!(!path.exists());
        assert!(updates.has_changed().unwrap());
        assert_eq!(*updates.borrow_and_update(), SessionSnapshot::default());
    }

    #[test]
    fn corrupt_session_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();
        assert!(FileSessionStore::open(&path).is_err());
    }
}
