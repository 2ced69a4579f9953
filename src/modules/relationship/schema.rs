use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Type, Serialize, Deserialize)]
#[sqlx(type_name = "request_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[sqlx(rename = "PENDING")]
    Pending,
    #[sqlx(rename = "ACCEPTED")]
    Accepted,
}

/// A directed request edge. Declined, cancelled, and removed edges are
/// deleted rather than kept in a terminal status; acceptance mutates the
/// row in place so a pair never has more than one edge.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RequestEntity {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: RequestStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl RequestEntity {
    /// The party that is not `user_id`. Callers scope edges to one viewer
    /// before asking.
    pub fn other_party(&self, user_id: &Uuid) -> Uuid {
        if self.sender_id == *user_id {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}

/// A directed block edge. Blocking A→B says nothing about B→A.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BlockEntity {
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
