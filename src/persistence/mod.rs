use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::{fs, sync::Mutex};
use uuid::Uuid;

use crate::GameSession;

/// Durable storage for in-progress games, keyed by lobby
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, lobby_id: &str, session: &GameSession) -> Result<()>;
    async fn load(&self, lobby_id: &str) -> Result<Option<GameSession>>;
    async fn remove(&self, lobby_id: &str) -> Result<()>;
}

/// Stores each game as a JSON document in one directory
pub struct FileSnapshotStore {
    dir: PathBuf,
    /// Per-lobby write lock holding the revision last written
    written: DashMap<String, Arc<Mutex<u64>>>,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: DashMap::new(),
        }
    }

    fn slot(&self, lobby_id: &str) -> Arc<Mutex<u64>> {
        self.written.entry(lobby_id.to_string()).or_default().clone()
    }

    fn path_for(&self, lobby_id: &str) -> PathBuf {
        let file_name: String = lobby_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, lobby_id: &str, session: &GameSession) -> Result<()> {
        let slot = self.slot(lobby_id);
        let mut last_written = slot.lock().await;
        if session.revision < *last_written {
            tracing::debug!(
                "Skipping stale snapshot {} for lobby {} (have {})",
                session.revision,
                lobby_id,
                *last_written
            );
            return Ok(());
        }

        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create snapshot dir {}", self.dir.display()))?;

        let json = serde_json::to_vec(session).context("Failed to serialize game snapshot")?;
        let path = self.path_for(lobby_id);
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4()));

        // readers only ever see a complete file
        fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;

        *last_written = session.revision;
        tracing::debug!("Saved snapshot {} for lobby {}", session.revision, lobby_id);
        Ok(())
    }

    async fn load(&self, lobby_id: &str) -> Result<Option<GameSession>> {
        let path = self.path_for(lobby_id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let session = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt snapshot {}", path.display()))?;
        Ok(Some(session))
    }

    async fn remove(&self, lobby_id: &str) -> Result<()> {
        let slot = self.slot(lobby_id);
        let _guard = slot.lock().await;
        match fs::remove_file(self.path_for(lobby_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{game::Game, Seat};
    use tokio_test::assert_ok;

    fn temp_store() -> FileSnapshotStore {
        FileSnapshotStore::new(std::env::temp_dir().join(format!("snapshots-{}", Uuid::new_v4())))
    }

    fn session() -> GameSession {
        GameSession::new(
            vec![
                Seat { user_id: 1, username: "Ada".to_string() },
                Seat { user_id: 2, username: "Grace".to_string() },
            ],
            Game::new(2).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = temp_store();
        let session = session();

        assert_ok!(store.save("custom:ABC123", &session).await);
        let loaded = assert_ok!(store.load("custom:ABC123").await).unwrap();

        assert_eq!(loaded.game_id, session.game_id);
        assert_eq!(loaded.seats, session.seats);
        assert_eq!(loaded.game, session.game);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_none() {
        let store = temp_store();
        assert!(assert_ok!(store.load("custom:NOPE42").await).is_none());
    }

    #[tokio::test]
    async fn test_remove_snapshot() {
        let store = temp_store();
        assert_ok!(store.save("custom:ABC123", &session()).await);
        assert_ok!(store.remove("custom:ABC123").await);
        assert!(assert_ok!(store.load("custom:ABC123").await).is_none());
        assert_ok!(store.remove("custom:ABC123").await);
    }

    #[tokio::test]
    async fn test_older_revision_does_not_overwrite_newer() {
        let store = temp_store();
        let mut newer = session();
        newer.revision = 5;
        let mut older = newer.clone();
        older.revision = 3;

        assert_ok!(store.save("custom:ABC123", &newer).await);
        assert_ok!(store.save("custom:ABC123", &older).await);

        let loaded = assert_ok!(store.load("custom:ABC123").await).unwrap();
        assert_eq!(loaded.revision, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_keep_latest_revision() {
        let store = Arc::new(temp_store());
        let base = session();

        for round in 0..20u64 {
            let handles: Vec<_> = (1..=8u64)
                .map(|n| {
                    let store = store.clone();
                    let mut snapshot = base.clone();
                    snapshot.revision = round * 8 + n;
                    tokio::spawn(async move { store.save("custom:BUSY", &snapshot).await })
                })
                .collect();

            for handle in handles {
                assert_ok!(handle.await.unwrap());
            }

            let loaded = assert_ok!(store.load("custom:BUSY").await).unwrap();
            assert_eq!(loaded.revision, round * 8 + 8);
        }

        // no temporary files left behind
        let mut entries = assert_ok!(fs::read_dir(&store.dir).await);
        while let Some(entry) = assert_ok!(entries.next_entry().await) {
            assert_eq!(entry.file_name(), "custom_BUSY.json");
        }
    }

    #[test]
    fn test_lobby_id_is_sanitized() {
        let store = FileSnapshotStore::new("/tmp/snaps");
        assert_eq!(
            store.path_for("custom:AB/../C"),
            PathBuf::from("/tmp/snaps/custom_AB____C.json")
        );
    }
}
