//! Subscription bridge: one task per active viewer that turns raw relation
//! change events into freshly derived view snapshots.
//!
//! The bridge is a refresh trigger, not a synchronization primitive. Events
//! carry no payload, recomputation is always full, and a redundant refresh
//! is harmless. Bursts of events are coalesced behind a debounce window so
//! rapid mutation does not turn into a profile-fetch storm.

use std::time::Duration;

use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::modules::{
    realtime::events::ChangeFeed,
    relationship::{model::RelationshipViews, repository::RelationRepo, service::RelationshipService},
    user::repository::UserRepository,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

pub struct SubscriptionBridge<R, U>
where
    R: RelationRepo + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
{
    service: RelationshipService<R, U>,
    feed: ChangeFeed,
    debounce: Duration,
}

impl<R, U> SubscriptionBridge<R, U>
where
    R: RelationRepo + Send + Sync + 'static,
    U: UserRepository + Send + Sync + 'static,
{
    pub fn new(service: RelationshipService<R, U>, feed: ChangeFeed, debounce: Duration) -> Self {
        Self { service, feed, debounce }
    }

    /// Start a per-viewer subscription. The returned handle owns the
    /// spawned task; dropping it tears the subscription down.
    pub fn subscribe(&self, user_id: Uuid) -> ViewSubscription {
        let (tx, rx) = mpsc::channel::<RelationshipViews>(8);
        // Register on the feed before the initial snapshot so nothing can
        // slip between the two.
        let mut changes = self.feed.subscribe();
        let service = self.service.clone();
        let debounce = self.debounce;

        let task = tokio::spawn(async move {
            match service.refresh_views(user_id, None).await {
                Ok(views) => {
                    if tx.send(views).await.is_err() {
                        return;
                    }
                }
                Err(e) => tracing::warn!("initial view refresh failed for {user_id}: {e}"),
            }

            loop {
                match changes.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }

                // Coalesce the burst: every further event restarts the
                // debounce window, then the views are recomputed once.
                loop {
                    tokio::select! {
                        more = changes.recv() => match more {
                            Ok(_) | Err(RecvError::Lagged(_)) => {}
                            Err(RecvError::Closed) => break,
                        },
                        _ = tokio::time::sleep(debounce) => break,
                    }
                }

                match service.refresh_views(user_id, None).await {
                    Ok(views) => {
                        if tx.send(views).await.is_err() {
                            break;
                        }
                    }
                    // Transient storage failure: keep the subscription
                    // alive, the next change or a manual refresh retries.
                    Err(e) => tracing::warn!("view refresh failed for {user_id}: {e}"),
                }
            }

            tracing::debug!("view subscription for {user_id} closed");
        });

        ViewSubscription { user_id, rx, task }
    }
}

/// Owned handle for one viewer's subscription, tied to the session's
/// lifecycle. Teardown is deterministic: drop it (or call `unsubscribe`)
/// and the underlying task stops.
pub struct ViewSubscription {
    user_id: Uuid,
    rx: mpsc::Receiver<RelationshipViews>,
    task: JoinHandle<()>,
}

impl ViewSubscription {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Next view snapshot, or `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<RelationshipViews> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for ViewSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::modules::realtime::events::Relation;
    use crate::modules::relationship::testing::{MemoryRelationRepository, MemoryUserRepository};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_millis(500);

    struct Fixture {
        service: RelationshipService<MemoryRelationRepository, MemoryUserRepository>,
        bridge: SubscriptionBridge<MemoryRelationRepository, MemoryUserRepository>,
        users: Arc<MemoryUserRepository>,
        feed: ChangeFeed,
    }

    fn fixture() -> Fixture {
        let relations = Arc::new(MemoryRelationRepository::new());
        let users = Arc::new(MemoryUserRepository::new());
        let feed = ChangeFeed::new(16);
        let service =
            RelationshipService::with_dependencies(relations, users.clone(), feed.clone());
        let bridge =
            SubscriptionBridge::new(service.clone(), feed.clone(), Duration::from_millis(10));
        Fixture { service, bridge, users, feed }
    }

    #[tokio::test]
    async fn subscription_delivers_initial_snapshot() {
        let fx = fixture();
        let alice = fx.users.add("alice");
        fx.users.add("bob");

        let mut sub = fx.bridge.subscribe(alice);
        let views = timeout(WAIT, sub.recv()).await.unwrap().unwrap();

        assert!(views.incoming.is_empty());
        assert_eq!(views.candidates.len(), 1);
        assert_eq!(views.candidates[0].username, "bob");
    }

    #[tokio::test]
    async fn mutation_triggers_recomputed_snapshot() {
        let fx = fixture();
        let alice = fx.users.add("alice");
        let bob = fx.users.add("bob");

        let mut sub = fx.bridge.subscribe(bob);
        let initial = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert!(initial.incoming.is_empty());

        fx.service.propose(alice, bob).await.unwrap();

        let views = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(views.incoming.len(), 1);
        assert_eq!(views.incoming[0].user.id, alice);
        assert!(views.candidates.iter().all(|c| c.id != alice));
    }

    #[tokio::test]
    async fn bursts_coalesce_into_one_consistent_snapshot() {
        let fx = fixture();
        let alice = fx.users.add("alice");
        let bob = fx.users.add("bob");

        let mut sub = fx.bridge.subscribe(alice);
        let _ = timeout(WAIT, sub.recv()).await.unwrap().unwrap();

        // Propose, block, unblock back to back; the debounce window should
        // fold these into a snapshot of the final state.
        let request = fx.service.propose(alice, bob).await.unwrap();
        fx.service.block(alice, bob).await.unwrap();
        fx.service.unblock(alice, bob).await.unwrap();

        let mut views = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        while let Ok(Some(next)) = timeout(Duration::from_millis(100), sub.recv()).await {
            views = next;
        }
        assert!(views.outgoing.iter().all(|r| r.id != request.id));
        assert!(views.blocked.is_empty());
        assert_eq!(views.candidates.len(), 1);
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_task() {
        let fx = fixture();
        let alice = fx.users.add("alice");

        let mut sub = fx.bridge.subscribe(alice);
        let _ = timeout(WAIT, sub.recv()).await.unwrap().unwrap();

        let task_probe = sub.task.abort_handle();
        sub.unsubscribe();

        // Publishing after teardown must not panic or leak work.
        fx.feed.notify(Relation::Requests);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(task_probe.is_finished());
    }
}
