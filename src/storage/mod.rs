//! Persistence for time entries and configuration. The core only ever talks to the
//! [EntryStore] trait; [JsonEntryStore] is the bundled file-backed realization.

use std::{io::ErrorKind, path::PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::tracker::{config::TrackerConfig, entry::TimeEntry};

const OPEN_ENTRY_FILE: &str = "current.json";
const ENTRIES_FILE: &str = "entries.jsonl";
const CONFIG_FILE: &str = "config.json";

/// Interface for abstracting storage of entries and configuration.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Records a freshly opened entry so it can be recovered after an unclean shutdown.
    async fn create_entry(&self, entry: &TimeEntry) -> Result<()>;

    /// Persists the closed entry (end time, settled duration and idle intervals included) and
    /// clears the open-entry checkpoint.
    async fn close_entry(&self, entry: &TimeEntry) -> Result<()>;

    /// Retrieves an entry left open by a previous run, if any.
    async fn get_open_entry(&self) -> Result<Option<TimeEntry>>;

    async fn load_config(&self) -> Result<Option<TrackerConfig>>;

    async fn save_config(&self, config: &TrackerConfig) -> Result<()>;
}

/// Stores everything as JSON files under one directory: the open entry as a checkpoint file,
/// closed entries appended as JSON lines, config as a single document.
pub struct JsonEntryStore {
    dir: PathBuf,
}

impl JsonEntryStore {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Reads every recorded entry. Illegal lines are skipped; they might appear after a
    /// shutdown cutting off a write.
    pub async fn list_entries(&self) -> Result<Vec<TimeEntry>> {
        let path = self.dir.join(ENTRIES_FILE);
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        let buffer = BufReader::new(file);
        let mut lines = buffer.lines();
        let mut entries = vec![];
        while let Ok(Some(line)) = lines.next_line().await {
            match serde_json::from_str::<TimeEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("During parsing in path {path:?} found illegal json string {line}: {e}")
                }
            }
        }

        lines.into_inner().into_inner().unlock_async().await?;

        Ok(entries)
    }
}

#[async_trait]
impl EntryStore for JsonEntryStore {
    async fn create_entry(&self, entry: &TimeEntry) -> Result<()> {
        let encoded = serde_json::to_vec(entry)?;
        tokio::fs::write(self.dir.join(OPEN_ENTRY_FILE), encoded).await?;
        debug!(id = %entry.id, "checkpointed open entry");
        Ok(())
    }

    async fn close_entry(&self, entry: &TimeEntry) -> Result<()> {
        let file = File::options()
            .append(true)
            .create(true)
            .open(self.dir.join(ENTRIES_FILE))
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = append_entry(file, entry).await;
        result?;

        match tokio::fs::remove_file(self.dir.join(OPEN_ENTRY_FILE)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(id = %entry.id, "recorded closed entry");
        Ok(())
    }

    async fn get_open_entry(&self) -> Result<Option<TimeEntry>> {
        let path = self.dir.join(OPEN_ENTRY_FILE);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<TimeEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // Might happen due to shutdown cutting off the write into the file.
                warn!("Open entry checkpoint at {path:?} was corrupted: {e}");
                Ok(None)
            }
        }
    }

    async fn load_config(&self) -> Result<Option<TrackerConfig>> {
        let path = self.dir.join(CONFIG_FILE);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<TrackerConfig>(&raw) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                warn!("Config at {path:?} was corrupted, falling back to defaults: {e}");
                Ok(None)
            }
        }
    }

    async fn save_config(&self, config: &TrackerConfig) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(config)?;
        tokio::fs::write(self.dir.join(CONFIG_FILE), encoded).await?;
        Ok(())
    }
}

async fn append_entry(mut file: File, entry: &TimeEntry) -> Result<()> {
    let mut buffer = serde_json::to_vec(entry)?;
    buffer.push(b'\n');
    file.write_all(&buffer).await?;
    file.flush().await?;
    file.unlock_async().await?;
    Ok(())
}
