//! Mutation events and the commit hook.
//!
//! A write registers a [`PendingMutation`] on its [`CommitHooks`] while the transaction
//! is open. Only [`CommitHooks::commit_then`] can turn it into a [`CommittedMutation`],
//! and only once the commit future has succeeded. Listeners therefore never observe a
//! mutation that could still roll back.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::entities::{PropertyId, PropertyRecord};

/// What happened to a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    Created,
    Updated,
    Deleted,
    /// A related collection (amenities) changed without touching the row itself.
    RelationChanged,
}

impl MutationAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            MutationAction::Created => "created",
            MutationAction::Updated => "updated",
            MutationAction::Deleted => "deleted",
            MutationAction::RelationChanged => "relation_changed",
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single mutation as seen by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    PendingCommit,
    Committed,
    Invalidated,
}

/// A mutation registered inside an open transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub entity_id: PropertyId,
    pub entity_label: String,
    pub action: MutationAction,
    pub updated_at: OffsetDateTime,
}

impl PendingMutation {
    pub fn for_record(record: &PropertyRecord, action: MutationAction) -> Self {
        Self {
            entity_id: record.id,
            entity_label: record.label(),
            action,
            updated_at: record.updated_at,
        }
    }

    pub fn state(&self) -> MutationState {
        MutationState::PendingCommit
    }
}

/// A mutation whose transaction is durably committed.
///
/// There is no public constructor; values come from [`CommitHooks::commit_then`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedMutation {
    inner: PendingMutation,
}

impl CommittedMutation {
    pub fn entity_id(&self) -> PropertyId {
        self.inner.entity_id
    }

    pub fn entity_label(&self) -> &str {
        &self.inner.entity_label
    }

    pub fn action(&self) -> MutationAction {
        self.inner.action
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.inner.updated_at
    }

    pub fn state(&self) -> MutationState {
        MutationState::Committed
    }
}

/// Receives committed mutations, in commit order for a given transaction.
#[async_trait]
pub trait CommitListener: Send + Sync {
    async fn on_committed(&self, mutation: CommittedMutation);
}

/// Deferred callbacks bound to one transaction.
///
/// Dropping the hooks without calling [`CommitHooks::commit_then`] discards every
/// pending mutation, which is exactly what a rollback needs.
#[derive(Debug, Default)]
pub struct CommitHooks {
    pending: Vec<PendingMutation>,
}

impl CommitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&mut self, mutation: PendingMutation) {
        debug!(
            entity_id = mutation.entity_id,
            action = %mutation.action,
            state = ?mutation.state(),
            "Invalidation deferred until commit"
        );
        self.pending.push(mutation);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Await `commit`; notify `listener` of each pending mutation only if it succeeded.
    pub async fn commit_then<T, E, F>(self, commit: F, listener: &dyn CommitListener) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        match commit.await {
            Ok(value) => {
                for mutation in self.pending {
                    listener.on_committed(CommittedMutation { inner: mutation }).await;
                }
                Ok(value)
            }
            Err(err) => {
                if !self.pending.is_empty() {
                    info!(
                        discarded = self.pending.len(),
                        "Commit failed; deferred invalidations discarded"
                    );
                }
                Err(err)
            }
        }
    }
}

/// Whether the pattern sweep of an invalidation ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepOutcome {
    Complete,
    /// The store cannot enumerate keys; only exact keys were removed.
    Unsupported,
    /// The store failed part-way; some matching keys may remain.
    Failed,
}

/// Record of one committed mutation's invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub id: Uuid,
    pub entity_id: PropertyId,
    pub entity_label: String,
    pub action: MutationAction,
    /// Keys that were present and removed, exact keys first.
    pub deleted_keys: Vec<String>,
    pub sweep: SweepOutcome,
    /// The listing's `updated_at` at commit time.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(mutation: &CommittedMutation, deleted_keys: Vec<String>, sweep: SweepOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id: mutation.entity_id(),
            entity_label: mutation.entity_label().to_string(),
            action: mutation.action(),
            deleted_keys,
            sweep,
            timestamp: mutation.updated_at(),
            recorded_at: OffsetDateTime::now_utc(),
        }
    }
}
