//! Conversation memory store
//!
//! Per-guild ordered log of remembered messages plus the listening flag.
//! The store is the only owner of mutable shared state; handlers receive it as
//! `Arc<dyn ConversationStore>`.

mod snapshot;

pub use snapshot::SnapshotStore;

use std::path::PathBuf;
use thiserror::Error;

use crate::models::{ChannelId, CommunityId, CommunityState, LogEntry};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot {path} is not valid: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait ConversationStore: Send + Sync {
    /// Append to the guild's log, creating its state when absent. No dedup.
    fn append(&self, community_id: CommunityId, entry: LogEntry) -> Result<(), StoreError>;

    /// Append several entries under a single snapshot write
    fn append_all(
        &self,
        community_id: CommunityId,
        entries: Vec<LogEntry>,
    ) -> Result<(), StoreError> {
        for entry in entries {
            self.append(community_id, entry)?;
        }
        Ok(())
    }

    /// Entries in append order, optionally restricted to one channel
    fn list(&self, community_id: CommunityId, channel_id: Option<ChannelId>) -> Vec<LogEntry>;

    /// Drop log and listening flag. Missing state is not an error.
    fn clear(&self, community_id: CommunityId) -> Result<(), StoreError>;

    fn set_listening(&self, community_id: CommunityId, listening: bool) -> Result<(), StoreError>;

    /// `false` for guilds never toggled
    fn is_listening(&self, community_id: CommunityId) -> bool;

    /// Guilds with a non-empty log, ascending
    fn communities(&self) -> Vec<CommunityId>;

    fn community(&self, community_id: CommunityId) -> CommunityState {
        CommunityState {
            listening: self.is_listening(community_id),
            log: self.list(community_id, None),
        }
    }

    /// `display_text` lines for export
    fn transcript(&self, community_id: CommunityId, channel_id: Option<ChannelId>) -> Vec<String> {
        self.list(community_id, channel_id)
            .into_iter()
            .map(|entry| entry.display_text)
            .collect()
    }
}
