// Snapshot source contract: the remote side of reconciliation.

use thiserror::Error;

use super::model::{EntityId, EntityKind};

/// Why a snapshot fetch failed. All variants are transient: the pass is
/// aborted, state stays frozen at last good values, and the next tick
/// retries at the regular interval.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("snapshot source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed snapshot payload: {0}")]
    Malformed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entity as reported by the remote side.
#[derive(Debug, Clone)]
pub struct RemoteEntity<D> {
    pub id: EntityId,
    pub kind: EntityKind,
    pub data: D,
}

/// A full remote snapshot. The context token (e.g. the active WvW match id)
/// drives context-reset detection: a change of token invalidates all
/// per-entity transition state without firing notifications.
#[derive(Debug, Clone)]
pub struct Snapshot<D> {
    pub context: Option<String>,
    pub entities: Vec<RemoteEntity<D>>,
}

impl<D> Snapshot<D> {
    pub fn new(entities: Vec<RemoteEntity<D>>) -> Self {
        Self {
            context: None,
            entities,
        }
    }

    pub fn with_context(context: impl Into<String>, entities: Vec<RemoteEntity<D>>) -> Self {
        Self {
            context: Some(context.into()),
            entities,
        }
    }
}

/// A capability that returns the current remote state on request.
///
/// `fetch` is synchronous-blocking per call and is only ever invoked from a
/// background worker. Any per-module filter (match id, watch list, event
/// ids) is captured by the implementation at construction time. The engine
/// performs no rate limiting; implementations must tolerate being called
/// repeatedly and rapidly.
pub trait SnapshotSource<D>: Send + Sync + 'static {
    fn fetch(&self) -> Result<Snapshot<D>, FetchError>;
}
