//! In-memory repositories for exercising the state machine, views, and
//! bridge without Postgres. Each trait call takes the store mutex once, so
//! the atomic operations really are atomic here too.

use std::sync::Mutex;

use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        relationship::{
            repository::{BlockRepository, RelationRepo, RequestRepository},
            schema::{BlockEntity, RequestEntity, RequestStatus},
        },
        user::{model::InsertUser, repository::UserRepository, schema::UserEntity},
    },
};

#[derive(Default)]
struct MemState {
    requests: Vec<RequestEntity>,
    blocks: Vec<BlockEntity>,
}

#[derive(Default)]
pub struct MemoryRelationRepository {
    state: Mutex<MemState>,
}

fn same_pair(r: &RequestEntity, a: &Uuid, b: &Uuid) -> bool {
    (r.sender_id == *a && r.receiver_id == *b) || (r.sender_id == *b && r.receiver_id == *a)
}

impl MemoryRelationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw copy of both relations, for invariant assertions.
    pub fn snapshot(&self) -> (Vec<RequestEntity>, Vec<BlockEntity>) {
        let state = self.state.lock().unwrap();
        (state.requests.clone(), state.blocks.clone())
    }
}

#[async_trait::async_trait]
impl RequestRepository for MemoryRelationRepository {
    async fn find_request_by_id(
        &self,
        request_id: &Uuid,
    ) -> Result<Option<RequestEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state.requests.iter().find(|r| r.id == *request_id).cloned())
    }

    async fn find_request_between(
        &self,
        user_id_a: &Uuid,
        user_id_b: &Uuid,
    ) -> Result<Option<RequestEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state.requests.iter().find(|r| same_pair(r, user_id_a, user_id_b)).cloned())
    }

    async fn pending_to(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<RequestEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<RequestEntity> = state
            .requests
            .iter()
            .filter(|r| r.receiver_id == *user_id && r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn pending_from(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<RequestEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<RequestEntity> = state
            .requests
            .iter()
            .filter(|r| r.sender_id == *user_id && r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn accepted_for(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<RequestEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<RequestEntity> = state
            .requests
            .iter()
            .filter(|r| {
                r.status == RequestStatus::Accepted
                    && (r.sender_id == *user_id || r.receiver_id == *user_id)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn delete_request(&self, request_id: &Uuid) -> Result<(), error::SystemError> {
        let mut state = self.state.lock().unwrap();
        state.requests.retain(|r| r.id != *request_id);
        Ok(())
    }

    async fn delete_accepted_between(
        &self,
        user_id_a: &Uuid,
        user_id_b: &Uuid,
    ) -> Result<(), error::SystemError> {
        let mut state = self.state.lock().unwrap();
        state
            .requests
            .retain(|r| !(r.status == RequestStatus::Accepted && same_pair(r, user_id_a, user_id_b)));
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlockRepository for MemoryRelationRepository {
    async fn blocks_of(
        &self,
        blocker_id: &Uuid,
    ) -> Result<Vec<BlockEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<BlockEntity> =
            state.blocks.iter().filter(|b| b.blocker_id == *blocker_id).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn delete_block(
        &self,
        blocker_id: &Uuid,
        blocked_id: &Uuid,
    ) -> Result<(), error::SystemError> {
        let mut state = self.state.lock().unwrap();
        state.blocks.retain(|b| !(b.blocker_id == *blocker_id && b.blocked_id == *blocked_id));
        Ok(())
    }
}

#[async_trait::async_trait]
impl RelationRepo for MemoryRelationRepository {
    async fn create_request_atomic(
        &self,
        sender_id: &Uuid,
        receiver_id: &Uuid,
    ) -> Result<RequestEntity, error::SystemError> {
        let mut state = self.state.lock().unwrap();

        if state.requests.iter().any(|r| same_pair(r, sender_id, receiver_id)) {
            return Err(error::SystemError::already_exists());
        }

        let blocked = state.blocks.iter().any(|b| {
            (b.blocker_id == *sender_id && b.blocked_id == *receiver_id)
                || (b.blocker_id == *receiver_id && b.blocked_id == *sender_id)
        });
        if blocked {
            return Err(error::SystemError::blocked("Cannot send request to blocked user"));
        }

        let now = chrono::Utc::now();
        let request = RequestEntity {
            id: Uuid::new_v4(),
            sender_id: *sender_id,
            receiver_id: *receiver_id,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.requests.push(request.clone());
        Ok(request)
    }

    async fn accept_request_atomic(
        &self,
        request_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<RequestEntity, error::SystemError> {
        let mut state = self.state.lock().unwrap();

        let request = state
            .requests
            .iter_mut()
            .find(|r| r.id == *request_id)
            .ok_or_else(|| error::SystemError::not_found("Friend request not found"))?;

        if request.receiver_id != *user_id {
            return Err(error::SystemError::forbidden(
                "You are not allowed to accept this friend request",
            ));
        }

        if request.status != RequestStatus::Pending {
            return Err(error::SystemError::invalid_state("Friend request already accepted"));
        }

        request.status = RequestStatus::Accepted;
        request.updated_at = chrono::Utc::now();
        Ok(request.clone())
    }

    async fn block_atomic(
        &self,
        blocker_id: &Uuid,
        blocked_id: &Uuid,
    ) -> Result<(), error::SystemError> {
        let mut state = self.state.lock().unwrap();

        state.requests.retain(|r| !same_pair(r, blocker_id, blocked_id));

        let exists = state
            .blocks
            .iter()
            .any(|b| b.blocker_id == *blocker_id && b.blocked_id == *blocked_id);
        if !exists {
            state.blocks.push(BlockEntity {
                blocker_id: *blocker_id,
                blocked_id: *blocked_id,
                created_at: chrono::Utc::now(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<Vec<UserEntity>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, username: &str) -> Uuid {
        let now = chrono::Utc::now();
        let user = UserEntity {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            hash_password: String::new(),
            display_name: username.to_string(),
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        let id = user.id;
        self.users.lock().unwrap().push(user);
        id
    }
}

#[async_trait::async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<UserEntity>, error::SystemError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == *id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<UserEntity>, error::SystemError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().filter(|u| ids.contains(&u.id)).cloned().collect())
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserEntity>, error::SystemError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.username.eq_ignore_ascii_case(username)).cloned())
    }

    async fn find_all_except(&self, id: &Uuid) -> Result<Vec<UserEntity>, error::SystemError> {
        let users = self.users.lock().unwrap();
        let mut rows: Vec<UserEntity> = users.iter().filter(|u| u.id != *id).cloned().collect();
        rows.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(rows)
    }

    async fn create(&self, user: &InsertUser) -> Result<Uuid, error::SystemError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username.eq_ignore_ascii_case(&user.username)) {
            return Err(error::SystemError::already_exists());
        }
        let now = chrono::Utc::now();
        let id = Uuid::new_v4();
        users.push(UserEntity {
            id,
            username: user.username.clone(),
            email: user.email.clone(),
            hash_password: user.hash_password.clone(),
            display_name: user.display_name.clone(),
            avatar_url: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn search_users(
        &self,
        query: &str,
        limit: i32,
    ) -> Result<Vec<UserEntity>, error::SystemError> {
        let needle = query.to_lowercase();
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .filter(|u| {
                u.username.to_lowercase().contains(&needle)
                    || u.display_name.to_lowercase().contains(&needle)
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
