use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{fs::File, io::AsyncReadExt};

use crate::{
    dispatch::tokenizer::IdTokenizer, domain::RecipientId, errors::Error,
    registry::RecipientRegistry, Result,
};

/// Approximate encoded width of one `"123456789",` entry.
pub const DEFAULT_BYTES_PER_ID: u64 = 15;

const READ_CHUNK: usize = 8 * 1024;

/// Forward-only supply of recipients for one run.
///
/// Restarting means building a new source; there is no seek.
#[async_trait]
pub trait RecipientSource: Send + Sync {
    /// Up to `max` next recipients; empty once the source is exhausted.
    async fn next_batch(&mut self, max: usize) -> Result<Vec<RecipientId>>;

    /// Cheap population estimate. Must not consume the source.
    async fn estimate_count(&self) -> Result<u64>;

    /// Exact population, when known without reading the source.
    fn exact_len(&self) -> Option<u64> {
        None
    }
}

/// Source over an already-loaded list.
#[derive(Clone, Debug, Default)]
pub struct MaterializedSource {
    ids: Vec<RecipientId>,
    cursor: usize,
}

impl MaterializedSource {
    pub fn new(ids: Vec<RecipientId>) -> Self {
        Self { ids, cursor: 0 }
    }

    pub async fn from_registry(registry: &dyn RecipientRegistry) -> Result<Self> {
        Ok(Self::new(registry.list_all_ids().await?))
    }

    /// Parse a whole recipients file (`["1","2",...]`) into memory.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let ids: Vec<RecipientId> = serde_json::from_str(&raw).map_err(|e| Error::RecipientList {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(ids))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[async_trait]
impl RecipientSource for MaterializedSource {
    async fn next_batch(&mut self, max: usize) -> Result<Vec<RecipientId>> {
        let end = self.cursor.saturating_add(max).min(self.ids.len());
        let batch = self.ids[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(batch)
    }

    async fn estimate_count(&self) -> Result<u64> {
        Ok(self.ids.len() as u64)
    }

    fn exact_len(&self) -> Option<u64> {
        Some(self.ids.len() as u64)
    }
}

/// Source that parses a recipients file incrementally.
///
/// Holds at most the ids of one read chunk beyond the requested batch.
pub struct StreamingSource {
    path: PathBuf,
    file: File,
    tokenizer: IdTokenizer,
    pending: VecDeque<RecipientId>,
    done: bool,
    chunk_size: usize,
    bytes_per_id: u64,
}

impl StreamingSource {
    /// Open `path` for streaming. Fails with `Error::Io` if it cannot be read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        Ok(Self {
            path,
            file,
            tokenizer: IdTokenizer::new(),
            pending: VecDeque::new(),
            done: false,
            chunk_size: READ_CHUNK,
            bytes_per_id: DEFAULT_BYTES_PER_ID,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_bytes_per_id(mut self, bytes_per_id: u64) -> Self {
        self.bytes_per_id = bytes_per_id.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn fill(&mut self, want: usize) -> Result<()> {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut parsed = Vec::new();
        while !self.done && self.pending.len() < want {
            let n = self.file.read(&mut chunk).await?;
            if n == 0 {
                self.done = true;
                if !self.tokenizer.started() {
                    return Err(Error::RecipientList {
                        path: self.path.clone(),
                        reason: "no opening '[' found".to_string(),
                    });
                }
                if !self.tokenizer.finished() {
                    tracing::warn!(
                        path = %self.path.display(),
                        "recipient list ended without closing ']'"
                    );
                    self.tokenizer.end_of_input(&mut parsed);
                    self.pending.extend(parsed.drain(..));
                }
                break;
            }

            self.tokenizer.feed(&chunk[..n], &mut parsed);
            self.pending.extend(parsed.drain(..));
            if self.tokenizer.finished() {
                self.done = true;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecipientSource for StreamingSource {
    async fn next_batch(&mut self, max: usize) -> Result<Vec<RecipientId>> {
        self.fill(max).await?;
        let take = max.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }

    async fn estimate_count(&self) -> Result<u64> {
        let len = tokio::fs::metadata(&self.path).await?.len();
        Ok(len / self.bytes_per_id)
    }
}
