//! SQLite-backed record store.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tokio::sync::mpsc;
use tracing::{debug, info};
use voicehue_core::Rgb;

use crate::schema::migrations;
use crate::{Batch, ColorRecord, Result, StoreError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Change feed entry. Delivered in commit order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A batch was committed; records are in insertion order.
    Inserted(Vec<ColorRecord>),
}

/// Append-only store of color records.
///
/// Writes go through a dedicated connection guarded by a lock, so concurrent
/// batches are serialized and each commits in a single transaction. Queries
/// use a second connection and see only committed batches.
pub struct RecordStore {
    path: PathBuf,
    writer: Mutex<Option<Connection>>,
    reader: Mutex<Option<Connection>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<StoreEvent>>>,
}

impl RecordStore {
    /// Open (creating if needed) the store at `path`. Any failure here is a
    /// [`StoreError::Bootstrap`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bootstrap = |source: Box<dyn std::error::Error + Send + Sync>| StoreError::Bootstrap {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| bootstrap(e.into()))?;
        }

        let mut writer = Connection::open(&path).map_err(|e| bootstrap(e.into()))?;
        writer
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .map_err(|e| bootstrap(e.into()))?;
        writer
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| bootstrap(e.into()))?;
        migrations()
            .to_latest(&mut writer)
            .map_err(|e| bootstrap(e.into()))?;

        let reader = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| bootstrap(e.into()))?;
        reader
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| bootstrap(e.into()))?;

        info!(path = ?path, "Opened color store");

        Ok(Self {
            path,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Commit every candidate in `batch`, or none of them.
    ///
    /// Timestamps earlier than the newest stored record are raised to it, so
    /// creation times never decrease in insertion order even when batches
    /// built concurrently commit out of order.
    pub fn insert_batch(&self, batch: Batch) -> Result<Vec<ColorRecord>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.writer.lock();
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;

        let tx = conn.transaction().map_err(StoreError::Write)?;
        let mut floor: Option<i64> = tx
            .query_row("SELECT MAX(created_at) FROM colors", [], |row| row.get(0))
            .map_err(StoreError::Write)?;

        let mut records = Vec::with_capacity(batch.len());
        {
            let mut insert = tx
                .prepare_cached(
                    "INSERT INTO colors (red, green, blue, created_at) VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(StoreError::Write)?;

            for candidate in batch.candidates() {
                let micros = candidate.created_at.timestamp_micros();
                let micros = floor.map_or(micros, |f| micros.max(f));
                floor = Some(micros);

                let rgb = candidate.rgb;
                insert
                    .execute(params![
                        f64::from(rgb.red),
                        f64::from(rgb.green),
                        f64::from(rgb.blue),
                        micros
                    ])
                    .map_err(StoreError::Write)?;

                records.push(ColorRecord::new(
                    tx.last_insert_rowid(),
                    rgb,
                    from_micros(micros)?,
                ));
            }
        }

        // Dropping an uncommitted transaction rolls it back.
        tx.commit().map_err(StoreError::Write)?;

        debug!(records = records.len(), "Committed batch");
        self.notify(StoreEvent::Inserted(records.clone()));

        Ok(records)
    }

    /// All records, ascending by creation time, ties in insertion order.
    pub fn query(&self) -> Result<Vec<ColorRecord>> {
        let guard = self.reader.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let mut stmt = conn
            .prepare_cached(
                "SELECT id, red, green, blue, created_at FROM colors \
                 ORDER BY created_at ASC, id ASC",
            )
            .map_err(StoreError::Read)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(StoreError::Read)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, red, green, blue, created_at) = row.map_err(StoreError::Read)?;
            records.push(ColorRecord::new(
                id,
                Rgb::new(red as f32, green as f32, blue as f32),
                from_micros(created_at)?,
            ));
        }

        Ok(records)
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize> {
        let guard = self.reader.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM colors", [], |row| row.get(0))
            .map_err(StoreError::Read)?;
        Ok(count as usize)
    }

    /// Receive an event for every batch committed from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Close both connections and end all change feeds. Later calls fail
    /// with [`StoreError::Closed`].
    pub fn close(&self) {
        let writer = self.writer.lock().take();
        let reader = self.reader.lock().take();
        self.subscribers.lock().clear();
        if writer.is_some() || reader.is_some() {
            info!(path = ?self.path, "Closed color store");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.writer.lock().is_none()
    }

    fn notify(&self, event: StoreEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        self.close();
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::InvalidRecord(format!("timestamp out of range: {micros}")))
}
