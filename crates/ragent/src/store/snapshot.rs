use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{ConversationStore, StoreError};
use crate::models::{ChannelId, CommunityId, LogEntry};

type Messages = BTreeMap<CommunityId, Vec<LogEntry>>;
type Listening = BTreeMap<CommunityId, bool>;

#[derive(Debug, Default)]
struct StoreState {
    messages: Messages,
    listening: Listening,
}

/// File-backed store that rewrites a full JSON snapshot after every mutation.
///
/// The read-modify-write-persist sequence runs under one mutex, so concurrent
/// handlers on the multi-threaded runtime observe mutations in lock order and
/// snapshots on disk never interleave.
pub struct SnapshotStore {
    messages_path: PathBuf,
    listening_path: PathBuf,
    state: Mutex<StoreState>,
}

impl SnapshotStore {
    /// Load both snapshots from `directory`. Missing files start as empty
    /// mappings and are written once immediately.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, StoreError> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory).map_err(|source| StoreError::Io {
            path: directory.to_path_buf(),
            source,
        })?;

        let messages_path = directory.join("messages.json");
        let listening_path = directory.join("listening.json");

        let messages: Messages = load_or_init(&messages_path)?;
        let listening: Listening = load_or_init(&listening_path)?;

        info!(
            "Conversation store loaded: {} guild logs, {} listening flags ({})",
            messages.len(),
            listening.len(),
            directory.display()
        );

        Ok(Self {
            messages_path,
            listening_path,
            state: Mutex::new(StoreState {
                messages,
                listening,
            }),
        })
    }

    fn persist_messages(&self, state: &StoreState) -> Result<(), StoreError> {
        write_snapshot(&self.messages_path, &state.messages)
    }

    fn persist_listening(&self, state: &StoreState) -> Result<(), StoreError> {
        write_snapshot(&self.listening_path, &state.listening)
    }
}

impl ConversationStore for SnapshotStore {
    fn append(&self, community_id: CommunityId, entry: LogEntry) -> Result<(), StoreError> {
        self.append_all(community_id, vec![entry])
    }

    fn append_all(
        &self,
        community_id: CommunityId,
        entries: Vec<LogEntry>,
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();
        let log = state.messages.entry(community_id).or_default();
        log.extend(entries);
        debug!("Guild {} log now holds {} entries", community_id, log.len());

        self.persist_messages(&state)
    }

    fn list(&self, community_id: CommunityId, channel_id: Option<ChannelId>) -> Vec<LogEntry> {
        let state = self.state.lock();
        state
            .messages
            .get(&community_id)
            .map(|log| {
                log.iter()
                    .filter(|entry| channel_id.map_or(true, |id| entry.channel_id == id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn clear(&self, community_id: CommunityId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let had_log = state.messages.remove(&community_id).is_some();
        let had_flag = state.listening.remove(&community_id).is_some();
        debug!(
            "Cleared guild {} (log: {}, listening flag: {})",
            community_id, had_log, had_flag
        );

        self.persist_messages(&state)?;
        self.persist_listening(&state)
    }

    fn set_listening(&self, community_id: CommunityId, listening: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.listening.insert(community_id, listening);
        self.persist_listening(&state)
    }

    fn is_listening(&self, community_id: CommunityId) -> bool {
        self.state
            .lock()
            .listening
            .get(&community_id)
            .copied()
            .unwrap_or(false)
    }

    fn communities(&self) -> Vec<CommunityId> {
        self.state
            .lock()
            .messages
            .iter()
            .filter(|(_, log)| !log.is_empty())
            .map(|(id, _)| *id)
            .collect()
    }
}

fn load_or_init<T>(path: &Path) -> Result<T, StoreError>
where
    T: DeserializeOwned + Serialize + Default,
{
    if !path.is_file() {
        let empty = T::default();
        write_snapshot(path, &empty)?;
        return Ok(empty);
    }

    let raw = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| StoreError::Serialization {
        path: path.to_path_buf(),
        source,
    })
}

/// Write to a sibling temp file, then rename over the snapshot
fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
