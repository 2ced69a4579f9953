use actix_web::{get, post, web, HttpRequest};

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::user::{
        model::{SearchQuery, SignInResponse, SignUpResponse, UserResponse},
        repository_pg::UserRepositoryPg,
        service::UserService,
    },
    utils::ValidatedJson,
};

pub type UserSvc = UserService<UserRepositoryPg>;

#[post("/signup")]
pub async fn sign_up(
    user_service: web::Data<UserSvc>,
    body: ValidatedJson<crate::modules::user::model::SignUpModel>,
) -> Result<success::Success<SignUpResponse>, error::Error> {
    let id = user_service.sign_up(body.0).await?;
    Ok(success::Success::created(Some(SignUpResponse { id }))
        .message("Account created successfully"))
}

#[post("/signin")]
pub async fn sign_in(
    user_service: web::Data<UserSvc>,
    body: ValidatedJson<crate::modules::user::model::SignInModel>,
) -> Result<success::Success<SignInResponse>, error::Error> {
    let access_token = user_service.sign_in(body.0).await?;
    Ok(success::Success::ok(Some(SignInResponse { access_token })))
}

#[get("/me")]
pub async fn get_profile(
    user_service: web::Data<UserSvc>,
    req: HttpRequest,
) -> Result<success::Success<UserResponse>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let user = user_service.get_by_id(user_id).await?;
    Ok(success::Success::ok(Some(user)))
}

#[get("/search")]
pub async fn search_users(
    user_service: web::Data<UserSvc>,
    query: web::Query<SearchQuery>,
) -> Result<success::Success<Vec<UserResponse>>, error::Error> {
    let users = user_service.search(&query.q).await?;
    Ok(success::Success::ok(Some(users)))
}
