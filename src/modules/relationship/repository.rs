use uuid::Uuid;

use crate::api::error;
use crate::modules::relationship::schema::{BlockEntity, RequestEntity};

#[async_trait::async_trait]
pub trait RequestRepository {
    async fn find_request_by_id(
        &self,
        request_id: &Uuid,
    ) -> Result<Option<RequestEntity>, error::SystemError>;

    /// The pair's edge in either direction, any status. Invariant: at most
    /// one such row exists.
    async fn find_request_between(
        &self,
        user_id_a: &Uuid,
        user_id_b: &Uuid,
    ) -> Result<Option<RequestEntity>, error::SystemError>;

    /// Pending edges addressed to the user, newest first.
    async fn pending_to(&self, user_id: &Uuid)
        -> Result<Vec<RequestEntity>, error::SystemError>;

    /// Pending edges sent by the user, newest first.
    async fn pending_from(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<RequestEntity>, error::SystemError>;

    /// Accepted edges touching the user on either side, newest first.
    async fn accepted_for(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<RequestEntity>, error::SystemError>;

    async fn delete_request(&self, request_id: &Uuid) -> Result<(), error::SystemError>;

    /// Delete the accepted edge for the pair, whichever side sent it.
    /// Succeeds as a no-op when there is none.
    async fn delete_accepted_between(
        &self,
        user_id_a: &Uuid,
        user_id_b: &Uuid,
    ) -> Result<(), error::SystemError>;
}

#[async_trait::async_trait]
pub trait BlockRepository {
    async fn blocks_of(&self, blocker_id: &Uuid)
        -> Result<Vec<BlockEntity>, error::SystemError>;

    /// Delete exactly this direction. No-op when absent.
    async fn delete_block(
        &self,
        blocker_id: &Uuid,
        blocked_id: &Uuid,
    ) -> Result<(), error::SystemError>;
}

/// The operations that must be atomic span both relations, so they live on
/// the combined trait and each backend supplies its own transaction.
#[async_trait::async_trait]
pub trait RelationRepo: RequestRepository + BlockRepository + Send + Sync {
    /// Insert a pending edge after re-checking, inside the same atomic
    /// unit, that the pair has no edge in either direction and no block in
    /// either direction. Fails with `AlreadyExists` or `Blocked`.
    async fn create_request_atomic(
        &self,
        sender_id: &Uuid,
        receiver_id: &Uuid,
    ) -> Result<RequestEntity, error::SystemError>;

    /// Flip a pending edge to accepted in place. Fails with `NotFound`,
    /// `Forbidden` when the acting user is not the receiver, or
    /// `InvalidState` when the edge is already accepted.
    async fn accept_request_atomic(
        &self,
        request_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<RequestEntity, error::SystemError>;

    /// Delete any edge for the pair and insert the block as one unit, so a
    /// racing propose cannot land between the two steps. Idempotent when
    /// the same direction is already blocked.
    async fn block_atomic(
        &self,
        blocker_id: &Uuid,
        blocked_id: &Uuid,
    ) -> Result<(), error::SystemError>;
}
