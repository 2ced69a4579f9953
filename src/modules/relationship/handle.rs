use actix_web::{delete, get, post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        relationship::{
            model::{ProfileSummary, ProposeBody, RelationshipViews, ViewsQuery},
            repository_pg::RelationRepositoryPg,
            schema::RequestEntity,
            service::RelationshipService,
        },
        user::repository_pg::UserRepositoryPg,
    },
    utils::ValidatedJson,
};

pub type RelationshipSvc = RelationshipService<RelationRepositoryPg, UserRepositoryPg>;

#[post("/requests")]
pub async fn send_request(
    relationship_service: web::Data<RelationshipSvc>,
    body: ValidatedJson<ProposeBody>,
    req: HttpRequest,
) -> Result<success::Success<RequestEntity>, error::Error> {
    let sender_id = get_claims(&req)?.sub;
    let request = relationship_service.propose(sender_id, body.0.receiver_id).await?;

    Ok(success::Success::created(Some(request)).message("Friend request sent successfully"))
}

#[post("/requests/{request_id}/accept")]
pub async fn accept_request(
    relationship_service: web::Data<RelationshipSvc>,
    request_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<ProfileSummary>, error::Error> {
    let receiver_id = get_claims(&req)?.sub;
    let sender = relationship_service.accept(receiver_id, *request_id).await?;

    Ok(success::Success::ok(Some(sender)).message("Friend request accepted successfully"))
}

#[post("/requests/{request_id}/decline")]
pub async fn decline_request(
    relationship_service: web::Data<RelationshipSvc>,
    request_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let receiver_id = get_claims(&req)?.sub;
    relationship_service.decline(receiver_id, *request_id).await?;
    Ok(success::Success::no_content())
}

#[post("/requests/{request_id}/cancel")]
pub async fn cancel_request(
    relationship_service: web::Data<RelationshipSvc>,
    request_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let sender_id = get_claims(&req)?.sub;
    relationship_service.cancel(sender_id, *request_id).await?;
    Ok(success::Success::no_content())
}

#[get("/views")]
pub async fn get_views(
    relationship_service: web::Data<RelationshipSvc>,
    query: web::Query<ViewsQuery>,
    req: HttpRequest,
) -> Result<success::Success<RelationshipViews>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let views = relationship_service.refresh_views(user_id, query.q.as_deref()).await?;

    Ok(success::Success::ok(Some(views)))
}

#[delete("/friends/{friend_id}")]
pub async fn remove_friend(
    relationship_service: web::Data<RelationshipSvc>,
    friend_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    relationship_service.remove_friend(user_id, *friend_id).await?;
    Ok(success::Success::no_content())
}

#[post("/blocks/{user_id}")]
pub async fn block_user(
    relationship_service: web::Data<RelationshipSvc>,
    user_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let blocker_id = get_claims(&req)?.sub;
    relationship_service.block(blocker_id, *user_id).await?;
    Ok(success::Success::no_content())
}

#[delete("/blocks/{user_id}")]
pub async fn unblock_user(
    relationship_service: web::Data<RelationshipSvc>,
    user_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let blocker_id = get_claims(&req)?.sub;
    relationship_service.unblock(blocker_id, *user_id).await?;
    Ok(success::Success::no_content())
}
