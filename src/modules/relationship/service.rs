use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        realtime::events::{ChangeFeed, Relation},
        relationship::{
            model::{PendingRequest, ProfileSummary, RelationshipViews},
            repository::RelationRepo,
            schema::{RequestEntity, RequestStatus},
        },
        user::repository::UserRepository,
    },
};

pub struct RelationshipService<R, U>
where
    R: RelationRepo + Send + Sync,
    U: UserRepository + Send + Sync,
{
    relation_repo: Arc<R>,
    user_repo: Arc<U>,
    feed: ChangeFeed,
}

// Manual impl: the repositories sit behind Arc, so no Clone bound on them.
impl<R, U> Clone for RelationshipService<R, U>
where
    R: RelationRepo + Send + Sync,
    U: UserRepository + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            relation_repo: self.relation_repo.clone(),
            user_repo: self.user_repo.clone(),
            feed: self.feed.clone(),
        }
    }
}

impl<R, U> RelationshipService<R, U>
where
    R: RelationRepo + Send + Sync,
    U: UserRepository + Send + Sync,
{
    pub fn with_dependencies(relation_repo: Arc<R>, user_repo: Arc<U>, feed: ChangeFeed) -> Self {
        RelationshipService { relation_repo, user_repo, feed }
    }

    /// Create a pending edge from `sender_id` to `receiver_id`. The
    /// existence and block checks run inside the same transaction as the
    /// insert; see `RelationRepo::create_request_atomic`.
    pub async fn propose(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<RequestEntity, error::SystemError> {
        if receiver_id == sender_id {
            return Err(error::SystemError::bad_request("Cannot send friend request to yourself"));
        }

        if self.user_repo.find_by_id(&receiver_id).await?.is_none() {
            return Err(error::SystemError::not_found("Receiver user not found"));
        }

        let request = self.relation_repo.create_request_atomic(&sender_id, &receiver_id).await?;

        self.feed.notify(Relation::Requests);

        Ok(request)
    }

    /// Flip a pending edge to accepted. Only the receiver may do this.
    /// Returns the sender's profile for the caller to render.
    pub async fn accept(
        &self,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<ProfileSummary, error::SystemError> {
        let request = self.relation_repo.accept_request_atomic(&request_id, &user_id).await?;

        self.feed.notify(Relation::Requests);

        let sender = self
            .user_repo
            .find_by_id(&request.sender_id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("User not found"))?;

        Ok(ProfileSummary::from(sender))
    }

    /// Delete a pending edge as its receiver.
    pub async fn decline(
        &self,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<(), error::SystemError> {
        let request = self
            .relation_repo
            .find_request_by_id(&request_id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("Friend request not found"))?;

        if request.receiver_id != user_id {
            return Err(error::SystemError::forbidden(
                "You are not allowed to decline this friend request",
            ));
        }

        if request.status != RequestStatus::Pending {
            return Err(error::SystemError::invalid_state("Friend request already accepted"));
        }

        self.relation_repo.delete_request(&request_id).await?;

        self.feed.notify(Relation::Requests);

        Ok(())
    }

    /// Delete a pending edge as its sender.
    pub async fn cancel(
        &self,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<(), error::SystemError> {
        let request = self
            .relation_repo
            .find_request_by_id(&request_id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("Friend request not found"))?;

        if request.sender_id != user_id {
            return Err(error::SystemError::forbidden(
                "You are not allowed to cancel this friend request",
            ));
        }

        if request.status != RequestStatus::Pending {
            return Err(error::SystemError::invalid_state("Friend request already accepted"));
        }

        self.relation_repo.delete_request(&request_id).await?;

        self.feed.notify(Relation::Requests);

        Ok(())
    }

    /// Delete the accepted edge between the two users. Succeeds as a no-op
    /// when they are not friends.
    pub async fn remove_friend(
        &self,
        user_id: Uuid,
        friend_id: Uuid,
    ) -> Result<(), error::SystemError> {
        self.relation_repo.delete_accepted_between(&user_id, &friend_id).await?;

        self.feed.notify(Relation::Requests);

        Ok(())
    }

    /// Block `blocked_id`. Any request edge for the pair is deleted in the
    /// same transaction as the block insert. Idempotent per direction.
    pub async fn block(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
    ) -> Result<(), error::SystemError> {
        if blocker_id == blocked_id {
            return Err(error::SystemError::bad_request("Cannot block yourself"));
        }

        self.relation_repo.block_atomic(&blocker_id, &blocked_id).await?;

        self.feed.notify(Relation::Requests);
        self.feed.notify(Relation::Blocks);

        Ok(())
    }

    /// Remove exactly the `blocker_id` -> `blocked_id` block. The reverse
    /// direction, if present, is untouched. No-op when absent.
    pub async fn unblock(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
    ) -> Result<(), error::SystemError> {
        self.relation_repo.delete_block(&blocker_id, &blocked_id).await?;

        self.feed.notify(Relation::Blocks);

        Ok(())
    }

    /// Rederive the four views plus the candidate pool for one viewer.
    /// Safe to call redundantly; every call returns a complete snapshot.
    /// Profiles are fetched with one batched lookup per view.
    pub async fn refresh_views(
        &self,
        user_id: Uuid,
        candidate_query: Option<&str>,
    ) -> Result<RelationshipViews, error::SystemError> {
        let (incoming_rows, outgoing_rows, accepted_rows, block_rows) = tokio::try_join!(
            self.relation_repo.pending_to(&user_id),
            self.relation_repo.pending_from(&user_id),
            self.relation_repo.accepted_for(&user_id),
            self.relation_repo.blocks_of(&user_id),
        )?;

        let incoming_ids: Vec<Uuid> = incoming_rows.iter().map(|r| r.sender_id).collect();
        let outgoing_ids: Vec<Uuid> = outgoing_rows.iter().map(|r| r.receiver_id).collect();
        let friend_ids: Vec<Uuid> =
            accepted_rows.iter().map(|r| r.other_party(&user_id)).collect();
        let blocked_ids: Vec<Uuid> = block_rows.iter().map(|b| b.blocked_id).collect();

        let (senders, receivers, friends, blocked, everyone) = tokio::try_join!(
            self.user_repo.find_by_ids(&incoming_ids),
            self.user_repo.find_by_ids(&outgoing_ids),
            self.user_repo.find_by_ids(&friend_ids),
            self.user_repo.find_by_ids(&blocked_ids),
            self.user_repo.find_all_except(&user_id),
        )?;

        let excluded: HashSet<Uuid> = incoming_ids
            .iter()
            .chain(outgoing_ids.iter())
            .chain(friend_ids.iter())
            .chain(blocked_ids.iter())
            .copied()
            .collect();

        let needle = candidate_query.unwrap_or("").to_lowercase();
        let candidates = everyone
            .into_iter()
            .filter(|u| !excluded.contains(&u.id))
            .filter(|u| needle.is_empty() || u.username.to_lowercase().contains(&needle))
            .map(ProfileSummary::from)
            .collect();

        Ok(RelationshipViews {
            incoming: join_profiles(&incoming_rows, senders, |r| r.sender_id),
            outgoing: join_profiles(&outgoing_rows, receivers, |r| r.receiver_id),
            friends: friends.into_iter().map(ProfileSummary::from).collect(),
            blocked: blocked.into_iter().map(ProfileSummary::from).collect(),
            candidates,
        })
    }
}

fn join_profiles(
    rows: &[RequestEntity],
    profiles: Vec<crate::modules::user::schema::UserEntity>,
    counterpart: impl Fn(&RequestEntity) -> Uuid,
) -> Vec<PendingRequest> {
    let by_id: HashMap<Uuid, ProfileSummary> =
        profiles.into_iter().map(|u| (u.id, ProfileSummary::from(u))).collect();

    rows.iter()
        .filter_map(|r| {
            by_id.get(&counterpart(r)).map(|profile| PendingRequest {
                id: r.id,
                user: profile.clone(),
                created_at: r.created_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::modules::relationship::repository::RequestRepository;
    use crate::modules::relationship::testing::{
        MemoryRelationRepository, MemoryUserRepository,
    };

    type Svc = RelationshipService<MemoryRelationRepository, MemoryUserRepository>;

    fn service() -> (Svc, Arc<MemoryRelationRepository>, Arc<MemoryUserRepository>) {
        let relations = Arc::new(MemoryRelationRepository::new());
        let users = Arc::new(MemoryUserRepository::new());
        let svc = RelationshipService::with_dependencies(
            relations.clone(),
            users.clone(),
            ChangeFeed::new(16),
        );
        (svc, relations, users)
    }

    #[tokio::test]
    async fn propose_to_self_is_rejected() {
        let (svc, _, users) = service();
        let alice = users.add("alice");

        let err = svc.propose(alice, alice).await.unwrap_err();
        assert!(matches!(err, error::SystemError::BadRequest(_)));
    }

    #[tokio::test]
    async fn propose_to_unknown_user_is_not_found() {
        let (svc, _, users) = service();
        let alice = users.add("alice");

        let err = svc.propose(alice, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, error::SystemError::NotFound(_)));
    }

    #[tokio::test]
    async fn mutual_propose_leaves_exactly_one_edge() {
        let (svc, relations, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        svc.propose(alice, bob).await.unwrap();
        let err = svc.propose(bob, alice).await.unwrap_err();
        assert!(matches!(err, error::SystemError::AlreadyExists(_)));

        let (requests, _) = relations.snapshot();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].sender_id, alice);
    }

    #[tokio::test]
    async fn repeated_propose_returns_same_error_without_new_state() {
        let (svc, relations, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        svc.propose(alice, bob).await.unwrap();
        for _ in 0..3 {
            let err = svc.propose(alice, bob).await.unwrap_err();
            assert!(matches!(err, error::SystemError::AlreadyExists(_)));
        }

        let (requests, _) = relations.snapshot();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn block_then_propose_fails_blocked_in_both_directions() {
        let (svc, _, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        svc.block(alice, bob).await.unwrap();

        let err = svc.propose(bob, alice).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Blocked(_)));

        let err = svc.propose(alice, bob).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Blocked(_)));
    }

    #[tokio::test]
    async fn accept_requires_the_receiver() {
        let (svc, _, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        let request = svc.propose(alice, bob).await.unwrap();

        let err = svc.accept(alice, request.id).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Forbidden(_)));

        let sender = svc.accept(bob, request.id).await.unwrap();
        assert_eq!(sender.id, alice);
    }

    #[tokio::test]
    async fn accept_twice_is_invalid_state() {
        let (svc, _, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        let request = svc.propose(alice, bob).await.unwrap();
        svc.accept(bob, request.id).await.unwrap();

        let err = svc.accept(bob, request.id).await.unwrap_err();
        assert!(matches!(err, error::SystemError::InvalidState(_)));
    }

    #[tokio::test]
    async fn accept_unknown_request_is_not_found() {
        let (svc, _, users) = service();
        let bob = users.add("bob");

        let err = svc.accept(bob, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, error::SystemError::NotFound(_)));
    }

    #[tokio::test]
    async fn decline_deletes_the_edge_and_is_receiver_only() {
        let (svc, relations, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        let request = svc.propose(alice, bob).await.unwrap();

        let err = svc.decline(alice, request.id).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Forbidden(_)));

        svc.decline(bob, request.id).await.unwrap();
        let (requests, _) = relations.snapshot();
        assert!(requests.is_empty());

        // The pair is free to try again after a decline.
        svc.propose(alice, bob).await.unwrap();
    }

    #[tokio::test]
    async fn decline_after_accept_is_invalid_state() {
        let (svc, _, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        let request = svc.propose(alice, bob).await.unwrap();
        svc.accept(bob, request.id).await.unwrap();

        let err = svc.decline(bob, request.id).await.unwrap_err();
        assert!(matches!(err, error::SystemError::InvalidState(_)));
    }

    #[tokio::test]
    async fn cancel_deletes_the_edge_and_is_sender_only() {
        let (svc, relations, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        let request = svc.propose(alice, bob).await.unwrap();

        let err = svc.cancel(bob, request.id).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Forbidden(_)));

        svc.cancel(alice, request.id).await.unwrap();
        let (requests, _) = relations.snapshot();
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn remove_friend_is_idempotent() {
        let (svc, relations, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        // Not friends at all: still succeeds.
        svc.remove_friend(alice, bob).await.unwrap();

        let request = svc.propose(alice, bob).await.unwrap();
        svc.accept(bob, request.id).await.unwrap();

        svc.remove_friend(bob, alice).await.unwrap();
        svc.remove_friend(bob, alice).await.unwrap();

        let (requests, _) = relations.snapshot();
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn remove_friend_leaves_pending_edges_alone() {
        let (svc, relations, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        svc.propose(alice, bob).await.unwrap();
        svc.remove_friend(alice, bob).await.unwrap();

        let (requests, _) = relations.snapshot();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn block_is_idempotent_per_direction() {
        let (svc, relations, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        svc.block(alice, bob).await.unwrap();
        svc.block(alice, bob).await.unwrap();

        let (_, blocks) = relations.snapshot();
        assert_eq!(blocks.len(), 1);
    }

    #[tokio::test]
    async fn unblock_clears_only_its_own_direction() {
        let (svc, relations, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        svc.block(alice, bob).await.unwrap();
        svc.block(bob, alice).await.unwrap();

        svc.unblock(alice, bob).await.unwrap();

        let (_, blocks) = relations.snapshot();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].blocker_id, bob);

        // The surviving direction still refuses new requests.
        let err = svc.propose(alice, bob).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Blocked(_)));
    }

    #[tokio::test]
    async fn unblock_then_propose_succeeds() {
        let (svc, _, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        svc.block(alice, bob).await.unwrap();
        svc.unblock(alice, bob).await.unwrap();

        svc.propose(alice, bob).await.unwrap();
    }

    #[tokio::test]
    async fn unblock_when_not_blocked_is_a_no_op() {
        let (svc, _, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        svc.unblock(alice, bob).await.unwrap();
    }

    #[tokio::test]
    async fn accept_flow_moves_the_pair_through_both_views() {
        let (svc, _, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        let request = svc.propose(alice, bob).await.unwrap();

        let bob_views = svc.refresh_views(bob, None).await.unwrap();
        assert_eq!(bob_views.incoming.len(), 1);
        assert_eq!(bob_views.incoming[0].user.id, alice);
        let alice_views = svc.refresh_views(alice, None).await.unwrap();
        assert_eq!(alice_views.outgoing.len(), 1);
        assert_eq!(alice_views.outgoing[0].user.id, bob);

        svc.accept(bob, request.id).await.unwrap();

        let bob_views = svc.refresh_views(bob, None).await.unwrap();
        assert!(bob_views.incoming.is_empty());
        assert_eq!(bob_views.friends.len(), 1);
        assert_eq!(bob_views.friends[0].id, alice);

        let alice_views = svc.refresh_views(alice, None).await.unwrap();
        assert!(alice_views.outgoing.is_empty());
        assert_eq!(alice_views.friends.len(), 1);
        assert_eq!(alice_views.friends[0].id, bob);
    }

    #[tokio::test]
    async fn blocking_a_friend_severs_the_friendship() {
        let (svc, relations, users) = service();
        let alice = users.add("alice");
        let bob = users.add("bob");

        let request = svc.propose(alice, bob).await.unwrap();
        svc.accept(bob, request.id).await.unwrap();

        svc.block(alice, bob).await.unwrap();

        let (requests, _) = relations.snapshot();
        assert!(requests.is_empty());

        let alice_views = svc.refresh_views(alice, None).await.unwrap();
        assert!(alice_views.friends.is_empty());
        assert_eq!(alice_views.blocked.len(), 1);
        assert_eq!(alice_views.blocked[0].id, bob);

        let bob_views = svc.refresh_views(bob, None).await.unwrap();
        assert!(bob_views.friends.is_empty());
        assert!(bob_views.blocked.is_empty());
    }

    #[tokio::test]
    async fn candidate_pool_excludes_every_active_relationship() {
        let (svc, _, users) = service();
        let viewer = users.add("viewer");
        let friend = users.add("friend");
        let incoming_sender = users.add("sender");
        let outgoing_receiver = users.add("receiver");
        let blocked = users.add("troll");
        let stranger = users.add("stranger");

        let request = svc.propose(viewer, friend).await.unwrap();
        svc.accept(friend, request.id).await.unwrap();
        svc.propose(incoming_sender, viewer).await.unwrap();
        svc.propose(viewer, outgoing_receiver).await.unwrap();
        svc.block(viewer, blocked).await.unwrap();

        let views = svc.refresh_views(viewer, None).await.unwrap();
        let candidate_ids: Vec<Uuid> = views.candidates.iter().map(|c| c.id).collect();
        assert_eq!(candidate_ids, vec![stranger]);

        let views = svc.refresh_views(viewer, Some("STRAN")).await.unwrap();
        assert_eq!(views.candidates.len(), 1);

        let views = svc.refresh_views(viewer, Some("nobody")).await.unwrap();
        assert!(views.candidates.is_empty());
    }

    #[tokio::test]
    async fn views_are_disjoint_and_batched_per_view() {
        let (svc, _, users) = service();
        let viewer = users.add("viewer");
        let other = users.add("other");

        svc.propose(viewer, other).await.unwrap();

        let views = svc.refresh_views(viewer, None).await.unwrap();
        assert_eq!(views.outgoing.len(), 1);
        assert!(views.incoming.is_empty());
        assert!(views.friends.is_empty());
        assert!(views.blocked.is_empty());
        assert!(views.candidates.is_empty());
    }

    // Property: no operation sequence can produce a duplicate or mirrored
    // edge for an unordered pair, an edge alongside a block, or a
    // duplicate block.
    fn check_invariants(relations: &MemoryRelationRepository) {
        let (requests, blocks) = relations.snapshot();

        for r in &requests {
            assert_ne!(r.sender_id, r.receiver_id);
        }

        for (i, a) in requests.iter().enumerate() {
            for b in requests.iter().skip(i + 1) {
                let mirrored = (a.sender_id == b.sender_id && a.receiver_id == b.receiver_id)
                    || (a.sender_id == b.receiver_id && a.receiver_id == b.sender_id);
                assert!(!mirrored, "duplicate edge for pair {:?}/{:?}", a.id, b.id);
            }
        }

        for r in &requests {
            let blocked_pair = blocks.iter().any(|bl| {
                (bl.blocker_id == r.sender_id && bl.blocked_id == r.receiver_id)
                    || (bl.blocker_id == r.receiver_id && bl.blocked_id == r.sender_id)
            });
            assert!(!blocked_pair, "request edge coexists with a block");
        }

        for (i, a) in blocks.iter().enumerate() {
            for b in blocks.iter().skip(i + 1) {
                assert!(
                    !(a.blocker_id == b.blocker_id && a.blocked_id == b.blocked_id),
                    "duplicate block edge"
                );
            }
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Propose,
        Accept,
        Decline,
        Cancel,
        RemoveFriend,
        Block,
        Unblock,
    }

    fn op_strategy() -> impl Strategy<Value = (Op, usize, usize)> {
        (
            prop_oneof![
                Just(Op::Propose),
                Just(Op::Accept),
                Just(Op::Decline),
                Just(Op::Cancel),
                Just(Op::RemoveFriend),
                Just(Op::Block),
                Just(Op::Unblock),
            ],
            0..4usize,
            0..4usize,
        )
    }

    proptest! {
        #[test]
        fn random_operation_sequences_preserve_pair_invariants(
            ops in proptest::collection::vec(op_strategy(), 1..40)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();

            rt.block_on(async move {
                let (svc, relations, users) = service();
                let ids: Vec<Uuid> =
                    (0..4).map(|i| users.add(&format!("user{i}"))).collect();

                for (op, a, b) in ops {
                    let (ua, ub) = (ids[a], ids[b]);
                    let edge = relations.find_request_between(&ua, &ub).await.unwrap();

                    // Typed failures are expected outcomes here; the
                    // property is about the state left behind.
                    let _ = match op {
                        Op::Propose => svc.propose(ua, ub).await.map(|_| ()),
                        Op::Accept => match &edge {
                            Some(r) => svc.accept(ua, r.id).await.map(|_| ()),
                            None => Ok(()),
                        },
                        Op::Decline => match &edge {
                            Some(r) => svc.decline(ua, r.id).await,
                            None => Ok(()),
                        },
                        Op::Cancel => match &edge {
                            Some(r) => svc.cancel(ua, r.id).await,
                            None => Ok(()),
                        },
                        Op::RemoveFriend => svc.remove_friend(ua, ub).await,
                        Op::Block => svc.block(ua, ub).await,
                        Op::Unblock => svc.unblock(ua, ub).await,
                    };

                    check_invariants(&relations);
                }
            });
        }
    }
}
