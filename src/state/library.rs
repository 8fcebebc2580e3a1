use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::data::MarkStatus;
use crate::error::StoreError;
use crate::pipeline::AssetId;

/// Persistence for the user's keep/delete decisions
pub trait MarkStore: Send + 'static {
    fn load_all_marks(&self) -> Result<HashMap<AssetId, MarkStatus>, StoreError>;

    /// Record a decision; `MarkStatus::None` forgets the asset
    fn save_mark(&self, id: &AssetId, status: MarkStatus) -> Result<(), StoreError>;

    fn remove_marks(&self, ids: &[AssetId]) -> Result<(), StoreError>;

    /// Flush and release the backing storage
    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// The mark database, one row per decided asset
pub struct SqliteMarkStore {
    conn: Option<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteMarkStore {
    /// Open or create the database at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(db_path)?;
        log::info!("Mark store opened at {}", db_path.display());

        let store = SqliteMarkStore {
            conn: Some(conn),
            db_path: Some(db_path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open the database in the user's data directory:
    /// - Linux: ~/.local/share/media-sweep/marks.db
    /// - macOS: ~/Library/Application Support/media-sweep/marks.db
    /// - Windows: %APPDATA%\media-sweep\marks.db
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(Self::default_path()?)
    }

    pub fn default_path() -> Result<PathBuf, StoreError> {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or(StoreError::NoDataDir)?;
        path.push("media-sweep");
        path.push("marks.db");
        Ok(path)
    }

    /// A throwaway store, mostly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = SqliteMarkStore {
            conn: Some(Connection::open_in_memory()?),
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn()?.execute(
            "CREATE TABLE IF NOT EXISTS marks (
                id          TEXT PRIMARY KEY,
                status      INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Number of assets with a recorded decision
    pub fn mark_count(&self) -> Result<i64, StoreError> {
        let count = self.conn()?.query_row("SELECT COUNT(*) FROM marks", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl MarkStore for SqliteMarkStore {
    fn load_all_marks(&self) -> Result<HashMap<AssetId, MarkStatus>, StoreError> {
        let mut stmt = self.conn()?.prepare("SELECT id, status FROM marks")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut marks = HashMap::new();
        for row in rows {
            let (id, code) = row?;
            marks.insert(AssetId::new(id), MarkStatus::from_code(code)?);
        }

        log::debug!("Loaded {} marks", marks.len());
        Ok(marks)
    }

    fn save_mark(&self, id: &AssetId, status: MarkStatus) -> Result<(), StoreError> {
        if status == MarkStatus::None {
            return self.remove_marks(std::slice::from_ref(id));
        }

        self.conn()?.execute(
            "INSERT INTO marks (id, status, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
            rusqlite::params![id.as_str(), status.code(), Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn remove_marks(&self, ids: &[AssetId]) -> Result<(), StoreError> {
        let tx = self.conn()?.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM marks WHERE id = ?1")?;
            for id in ids {
                stmt.execute([id.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| StoreError::Sqlite(err))?;
            log::info!("Mark store closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqliteMarkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMarkStore")
            .field("db_path", &self.db_path)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

enum StoreCommand {
    Save(AssetId, MarkStatus),
    Remove(Vec<AssetId>),
    Flush(oneshot::Sender<()>),
}

/// Writes marks on the blocking pool so the caller never waits on disk
pub struct MarkRecorder {
    tx: mpsc::UnboundedSender<StoreCommand>,
    worker: JoinHandle<Box<dyn MarkStore>>,
}

impl MarkRecorder {
    pub fn spawn(store: Box<dyn MarkStore>, runtime: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let worker = runtime.spawn_blocking(move || {
            while let Some(command) = rx.blocking_recv() {
                match command {
                    StoreCommand::Save(id, status) => {
                        if let Err(err) = store.save_mark(&id, status) {
                            log::error!("Failed to save mark for {}: {}", id, err);
                        }
                    }
                    StoreCommand::Remove(ids) => {
                        if let Err(err) = store.remove_marks(&ids) {
                            log::error!("Failed to remove {} marks: {}", ids.len(), err);
                        }
                    }
                    StoreCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            store
        });

        Self { tx, worker }
    }

    pub fn record(&self, id: AssetId, status: MarkStatus) {
        if self.tx.send(StoreCommand::Save(id, status)).is_err() {
            log::warn!("Mark recorder stopped, dropping mark");
        }
    }

    pub fn forget(&self, ids: Vec<AssetId>) {
        if ids.is_empty() {
            return;
        }
        if self.tx.send(StoreCommand::Remove(ids)).is_err() {
            log::warn!("Mark recorder stopped, dropping removal");
        }
    }

    /// Wait until every earlier command has been written
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(StoreCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Drain outstanding writes and close the store
    pub async fn shutdown(self) -> Result<(), StoreError> {
        let MarkRecorder { tx, worker } = self;
        drop(tx);
        let mut store = worker.await.map_err(|err| StoreError::Join(err.to_string()))?;
        tokio::task::spawn_blocking(move || store.close())
            .await
            .map_err(|err| StoreError::Join(err.to_string()))?
    }
}
