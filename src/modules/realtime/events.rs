//! Change notifications for the two relationship relations.
//!
//! The feed carries no row data, only "something in this relation
//! changed". Subscribers treat every event as a trigger to rederive their
//! views in full; delivery is at-least-once and unordered relative to
//! direct reads.

use tokio::sync::broadcast;

/// The persisted relation a change event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Requests,
    Blocks,
}

#[derive(Debug, Clone, Copy)]
pub struct RelationChanged {
    pub relation: Relation,
}

/// Broadcast fan-out of relation changes. Cheap to clone; every clone
/// publishes into the same channel.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<RelationChanged>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a change. A feed with no subscribers is not an error.
    pub fn notify(&self, relation: Relation) {
        let _ = self.tx.send(RelationChanged { relation });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelationChanged> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(64)
    }
}
