use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::modules::user::schema::UserEntity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<UserEntity> for ProfileSummary {
    fn from(user: UserEntity) -> Self {
        ProfileSummary {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
        }
    }
}

/// A pending edge joined to the counterpart's profile: the sender for
/// incoming requests, the receiver for outgoing ones.
#[derive(Debug, Clone, Serialize)]
pub struct PendingRequest {
    pub id: Uuid,
    pub user: ProfileSummary,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One viewer's full read model, rederived as a unit on every refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipViews {
    pub incoming: Vec<PendingRequest>,
    pub outgoing: Vec<PendingRequest>,
    pub friends: Vec<ProfileSummary>,
    pub blocked: Vec<ProfileSummary>,
    pub candidates: Vec<ProfileSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProposeBody {
    pub receiver_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ViewsQuery {
    pub q: Option<String>,
}
