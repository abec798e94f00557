//! Long-term recall over remembered messages
//!
//! The index stores one point per remembered text message, tagged with the
//! guild and channel it came from. Recall ranks by similarity to the mean of
//! the seed embeddings, then hands the candidates to a [`RecencyPolicy`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::embedding_service::EmbeddingProvider;
use crate::models::{ChannelId, CommunityId, LogEntry};
use crate::utils::similarity::{cosine_similarity, mean_vector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallRecord {
    pub id: Uuid,
    pub community_id: CommunityId,
    pub channel_id: ChannelId,
    pub author: String,
    pub posted_at: DateTime<Utc>,
    /// Rendered line for text entries, data URI for images
    pub text: String,
    pub is_image: bool,
}

impl RecallRecord {
    pub fn from_entry(community_id: CommunityId, entry: &LogEntry) -> Self {
        let text = if entry.is_image {
            entry.payload.clone()
        } else {
            entry.display_text.clone()
        };

        Self {
            id: Uuid::new_v4(),
            community_id,
            channel_id: entry.channel_id,
            author: entry.author.clone(),
            posted_at: entry.posted_at,
            text,
            is_image: entry.is_image,
        }
    }
}

/// Restricts recall to one guild, optionally one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecallFilter {
    pub community_id: CommunityId,
    pub channel_id: Option<ChannelId>,
}

impl RecallFilter {
    pub fn community(community_id: CommunityId) -> Self {
        Self {
            community_id,
            channel_id: None,
        }
    }

    pub fn matches(&self, record: &RecallRecord) -> bool {
        record.community_id == self.community_id
            && self.channel_id.map_or(true, |id| record.channel_id == id)
    }
}

/// Keep the `top_k` newest candidates by the `date_field` metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecencyPolicy {
    pub top_k: usize,
    pub date_field: String,
}

impl Default for RecencyPolicy {
    fn default() -> Self {
        Self {
            top_k: 8,
            date_field: "posted_at".to_string(),
        }
    }
}

impl RecencyPolicy {
    pub fn apply(&self, mut hits: Vec<RecallHit>) -> Vec<RecallHit> {
        if self.date_field == "posted_at" {
            // Stable: equal timestamps keep similarity order
            hits.sort_by(|a, b| b.record.posted_at.cmp(&a.record.posted_at));
        } else {
            debug!(
                "Recency field '{}' is not tracked, keeping similarity order",
                self.date_field
            );
        }
        hits.truncate(self.top_k);
        hits
    }
}

#[derive(Debug, Clone)]
pub struct RecallRequest {
    pub query: String,
    /// Texts whose embeddings are averaged into the probe; the query when empty
    pub seeds: Vec<String>,
    pub filter: RecallFilter,
    pub policy: RecencyPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecallHit {
    pub record: RecallRecord,
    pub score: f32,
}

#[async_trait]
pub trait RecallIndex: Send + Sync {
    async fn index(&self, records: Vec<RecallRecord>) -> Result<()>;

    async fn recall(&self, request: &RecallRequest) -> Result<Vec<RecallHit>>;

    /// Drop every point of the guild; unknown guilds are a no-op
    async fn delete_community(&self, community_id: CommunityId) -> Result<()>;
}

struct IndexedPoint {
    record: RecallRecord,
    embedding: Vec<f32>,
}

/// In-process index backed by an [`EmbeddingProvider`]
pub struct EmbeddedRecallIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    similarity_top_k: usize,
    points: RwLock<Vec<IndexedPoint>>,
}

impl EmbeddedRecallIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, similarity_top_k: usize) -> Self {
        Self {
            embedder,
            similarity_top_k,
            points: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecallIndex for EmbeddedRecallIndex {
    /// Records that fail to embed are skipped; the batch only fails when
    /// none of its text records could be embedded.
    async fn index(&self, records: Vec<RecallRecord>) -> Result<()> {
        let mut embedded = Vec::with_capacity(records.len());
        let mut failed = 0;
        let mut last_error = None;

        for record in records {
            if record.is_image {
                debug!("Image record {} kept out of the text index", record.id);
                continue;
            }
            match self.embedder.embed(&record.text).await {
                Ok(embedding) => embedded.push(IndexedPoint { record, embedding }),
                Err(e) => {
                    warn!("Skipping record {}: embedding failed: {:#}", record.id, e);
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if embedded.is_empty() {
            return match last_error {
                Some(e) => Err(e.context(format!("Failed to embed all {} records", failed))),
                None => Ok(()),
            };
        }

        let mut points = self.points.write();
        points.extend(embedded);
        if failed > 0 {
            warn!("Indexed batch with {} records skipped", failed);
        }
        debug!("Recall index holds {} points", points.len());
        Ok(())
    }

    async fn recall(&self, request: &RecallRequest) -> Result<Vec<RecallHit>> {
        let seeds = if request.seeds.is_empty() {
            vec![request.query.clone()]
        } else {
            request.seeds.clone()
        };

        let vectors = self
            .embedder
            .embed_batch(&seeds)
            .await
            .context("Failed to embed recall seeds")?;
        let probe = mean_vector(&vectors)?;

        let mut candidates: Vec<RecallHit> = {
            let points = self.points.read();
            points
                .iter()
                .filter(|p| request.filter.matches(&p.record))
                .filter_map(|p| {
                    cosine_similarity(&probe, &p.embedding)
                        .ok()
                        .map(|score| RecallHit {
                            record: p.record.clone(),
                            score,
                        })
                })
                .collect()
        };

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        candidates.truncate(self.similarity_top_k);

        let hits = request.policy.apply(candidates);
        debug!(
            "Recall for guild {} returned {} hits from {} seeds",
            request.filter.community_id,
            hits.len(),
            seeds.len()
        );
        Ok(hits)
    }

    async fn delete_community(&self, community_id: CommunityId) -> Result<()> {
        let mut points = self.points.write();
        let before = points.len();
        points.retain(|p| p.record.community_id != community_id);
        info!(
            "Removed {} recall points for guild {}",
            before - points.len(),
            community_id
        );
        Ok(())
    }
}
