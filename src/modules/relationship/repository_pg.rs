use uuid::Uuid;

use crate::{
    api::error,
    modules::relationship::{
        repository::{BlockRepository, RelationRepo, RequestRepository},
        schema::{BlockEntity, RequestEntity, RequestStatus},
    },
};

#[derive(Clone)]
pub struct RelationRepositoryPg {
    pool: sqlx::PgPool,
}

impl RelationRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RequestRepository for RelationRepositoryPg {
    async fn find_request_by_id(
        &self,
        request_id: &Uuid,
    ) -> Result<Option<RequestEntity>, error::SystemError> {
        let request =
            sqlx::query_as::<_, RequestEntity>("SELECT * FROM friend_requests WHERE id = $1")
                .bind(request_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(request)
    }

    async fn find_request_between(
        &self,
        user_id_a: &Uuid,
        user_id_b: &Uuid,
    ) -> Result<Option<RequestEntity>, error::SystemError> {
        let request = sqlx::query_as::<_, RequestEntity>(
            r#"
            SELECT *
            FROM friend_requests
            WHERE
                (sender_id = $1 AND receiver_id = $2)
            OR (sender_id = $2 AND receiver_id = $1)
            "#,
        )
        .bind(user_id_a)
        .bind(user_id_b)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    async fn pending_to(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<RequestEntity>, error::SystemError> {
        let requests = sqlx::query_as::<_, RequestEntity>(
            r#"
            SELECT * FROM friend_requests
            WHERE receiver_id = $1 AND status = 'PENDING'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    async fn pending_from(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<RequestEntity>, error::SystemError> {
        let requests = sqlx::query_as::<_, RequestEntity>(
            r#"
            SELECT * FROM friend_requests
            WHERE sender_id = $1 AND status = 'PENDING'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    async fn accepted_for(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<RequestEntity>, error::SystemError> {
        let requests = sqlx::query_as::<_, RequestEntity>(
            r#"
            SELECT * FROM friend_requests
            WHERE status = 'ACCEPTED'
              AND (sender_id = $1 OR receiver_id = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    async fn delete_request(&self, request_id: &Uuid) -> Result<(), error::SystemError> {
        sqlx::query("DELETE FROM friend_requests WHERE id = $1")
            .bind(request_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_accepted_between(
        &self,
        user_id_a: &Uuid,
        user_id_b: &Uuid,
    ) -> Result<(), error::SystemError> {
        sqlx::query(
            r#"
            DELETE FROM friend_requests
            WHERE status = 'ACCEPTED'
              AND (
                (sender_id = $1 AND receiver_id = $2)
                OR (sender_id = $2 AND receiver_id = $1)
              )
            "#,
        )
        .bind(user_id_a)
        .bind(user_id_b)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl BlockRepository for RelationRepositoryPg {
    async fn blocks_of(
        &self,
        blocker_id: &Uuid,
    ) -> Result<Vec<BlockEntity>, error::SystemError> {
        let blocks = sqlx::query_as::<_, BlockEntity>(
            "SELECT * FROM blocked_users WHERE blocker_id = $1 ORDER BY created_at DESC",
        )
        .bind(blocker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(blocks)
    }

    async fn delete_block(
        &self,
        blocker_id: &Uuid,
        blocked_id: &Uuid,
    ) -> Result<(), error::SystemError> {
        sqlx::query("DELETE FROM blocked_users WHERE blocker_id = $1 AND blocked_id = $2")
            .bind(blocker_id)
            .bind(blocked_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl RelationRepo for RelationRepositoryPg {
    async fn create_request_atomic(
        &self,
        sender_id: &Uuid,
        receiver_id: &Uuid,
    ) -> Result<RequestEntity, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, RequestEntity>(
            r#"
            SELECT * FROM friend_requests
            WHERE
                (sender_id = $1 AND receiver_id = $2)
            OR (sender_id = $2 AND receiver_id = $1)
            FOR UPDATE
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            tx.rollback().await?;
            return Err(error::SystemError::already_exists());
        }

        let blocked = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM blocked_users
                WHERE
                    (blocker_id = $1 AND blocked_id = $2)
                OR (blocker_id = $2 AND blocked_id = $1)
            )
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .fetch_one(&mut *tx)
        .await?;

        if blocked {
            tx.rollback().await?;
            return Err(error::SystemError::blocked("Cannot send request to blocked user"));
        }

        // A simultaneous propose from the other side commits first here and
        // surfaces as 23505 on friend_requests_pair_key -> AlreadyExists.
        let request = sqlx::query_as::<_, RequestEntity>(
            r#"
            INSERT INTO friend_requests (sender_id, receiver_id)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(request)
    }

    async fn accept_request_atomic(
        &self,
        request_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<RequestEntity, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        let request = sqlx::query_as::<_, RequestEntity>(
            "SELECT * FROM friend_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| error::SystemError::not_found("Friend request not found"))?;

        if request.receiver_id != *user_id {
            tx.rollback().await?;
            return Err(error::SystemError::forbidden(
                "You are not allowed to accept this friend request",
            ));
        }

        if request.status != RequestStatus::Pending {
            tx.rollback().await?;
            return Err(error::SystemError::invalid_state("Friend request already accepted"));
        }

        let request = sqlx::query_as::<_, RequestEntity>(
            r#"
            UPDATE friend_requests
            SET status = 'ACCEPTED', updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(request)
    }

    async fn block_atomic(
        &self,
        blocker_id: &Uuid,
        blocked_id: &Uuid,
    ) -> Result<(), error::SystemError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM friend_requests
            WHERE
                (sender_id = $1 AND receiver_id = $2)
            OR (sender_id = $2 AND receiver_id = $1)
            "#,
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO blocked_users (blocker_id, blocked_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
