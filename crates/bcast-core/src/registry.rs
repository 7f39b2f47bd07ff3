use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

use crate::{domain::RecipientId, errors::Error, Result};

/// Profile attributes kept per recipient.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub registered_at: String,
}

/// Key-value store of broadcast recipients.
#[async_trait]
pub trait RecipientRegistry: Send + Sync {
    async fn list_all_ids(&self) -> Result<Vec<RecipientId>>;

    async fn exists(&self, id: &RecipientId) -> Result<bool>;

    /// Insert a new recipient (empty wallet) or refresh the names of an existing one.
    async fn upsert_user(&self, id: &RecipientId, username: &str, first_name: &str) -> Result<()>;

    /// Fails with `Error::NotFound` for unknown recipients.
    async fn set_wallet_address(&self, id: &RecipientId, wallet_address: &str) -> Result<()>;

    /// Fails with `Error::NotFound` for unknown recipients.
    async fn get_user(&self, id: &RecipientId) -> Result<UserRecord>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFileData {
    users: BTreeMap<String, UserRecord>,
}

/// One journal line: the full record of a user after a mutation.
#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    id: String,
    record: UserRecord,
}

/// Journal entries tolerated before a mutation folds them into the snapshot.
const MIN_COMPACT_ENTRIES: usize = 1024;

struct RegistryState {
    data: RegistryFileData,
    journal: File,
    journal_entries: usize,
}

/// Registry persisted as a JSON snapshot plus an append-only journal.
///
/// A mutation appends one line to `<path>.log`; `close` (and a journal that
/// has outgrown the snapshot) rewrites the snapshot via temp file + rename and
/// empties the journal. `open` replays whatever the journal holds.
pub struct JsonFileRegistry {
    path: PathBuf,
    state: Mutex<RegistryState>,
}

impl JsonFileRegistry {
    /// Load the registry at `path`; a missing or empty file is an empty registry.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut data = match tokio::fs::read_to_string(&path).await {
            Ok(txt) if txt.trim().is_empty() => RegistryFileData::default(),
            Ok(txt) => serde_json::from_str(&txt)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryFileData::default(),
            Err(e) => return Err(e.into()),
        };

        let journal_path = journal_path(&path);
        let replayed = replay_journal(&journal_path, &mut data).await?;
        if replayed > 0 {
            save_registry_file(&path, &data).await?;
        }
        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .await?;
        if replayed > 0 {
            journal.set_len(0).await?;
        }

        tracing::info!(
            path = %path.display(),
            users = data.users.len(),
            replayed,
            "opened recipient registry"
        );
        Ok(Self {
            path,
            state: Mutex::new(RegistryState {
                data,
                journal,
                journal_entries: 0,
            }),
        })
    }

    /// Fold the journal into the snapshot.
    ///
    /// Takes `&self` so a registry still shared with in-flight handlers can be
    /// flushed at shutdown; later mutations are journaled as usual.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        compact(&self.path, &mut state).await?;
        tracing::info!(
            path = %self.path.display(),
            users = state.data.users.len(),
            "closed recipient registry"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn record(&self, state: &mut RegistryState, id: &str) -> Result<()> {
        let Some(record) = state.data.users.get(id) else {
            return Ok(());
        };
        let entry = JournalEntry {
            id: id.to_string(),
            record: record.clone(),
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        state.journal.write_all(&line).await?;
        state.journal.flush().await?;
        state.journal_entries += 1;

        if state.journal_entries >= MIN_COMPACT_ENTRIES.max(state.data.users.len()) {
            compact(&self.path, state).await?;
        }
        Ok(())
    }
}

fn journal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".log");
    PathBuf::from(name)
}

/// Apply journal lines to `data`; returns how many were applied.
///
/// A final line that does not parse is a write cut short by a crash and is
/// dropped. A bad line followed by good ones is corruption.
async fn replay_journal(path: &Path, data: &mut RegistryFileData) -> Result<usize> {
    let txt = match tokio::fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let lines: Vec<&str> = txt.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut applied = 0;
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str::<JournalEntry>(line) {
            Ok(entry) => {
                data.users.insert(entry.id, entry.record);
                applied += 1;
            }
            Err(e) if i + 1 == lines.len() => {
                tracing::warn!(path = %path.display(), "ignoring torn registry journal line: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(applied)
}

async fn compact(path: &Path, state: &mut RegistryState) -> Result<()> {
    save_registry_file(path, &state.data).await?;
    state.journal.set_len(0).await?;
    state.journal_entries = 0;
    Ok(())
}

async fn save_registry_file(path: &Path, data: &RegistryFileData) -> Result<()> {
    let txt = serde_json::to_string_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, txt).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl RecipientRegistry for JsonFileRegistry {
    async fn list_all_ids(&self) -> Result<Vec<RecipientId>> {
        let state = self.state.lock().await;
        Ok(state.data.users.keys().map(|k| RecipientId(k.clone())).collect())
    }

    async fn exists(&self, id: &RecipientId) -> Result<bool> {
        Ok(self.state.lock().await.data.users.contains_key(id.as_str()))
    }

    async fn upsert_user(&self, id: &RecipientId, username: &str, first_name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state
            .data
            .users
            .entry(id.as_str().to_string())
            .or_insert_with(|| UserRecord {
                registered_at: chrono::Utc::now().to_rfc3339(),
                ..UserRecord::default()
            });
        record.username = username.to_string();
        record.first_name = first_name.to_string();
        self.record(&mut state, id.as_str()).await
    }

    async fn set_wallet_address(&self, id: &RecipientId, wallet_address: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(record) = state.data.users.get_mut(id.as_str()) else {
            return Err(Error::NotFound(format!("user {id}")));
        };
        record.wallet_address = wallet_address.to_string();
        self.record(&mut state, id.as_str()).await
    }

    async fn get_user(&self, id: &RecipientId) -> Result<UserRecord> {
        self.state
            .lock()
            .await
            .data
            .users
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("user {id}")))
    }
}
