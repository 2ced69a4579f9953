use actix_web::{
    self,
    middleware::{from_fn, Logger},
    web, App, HttpServer,
};
use std::sync::{Arc, LazyLock};

use crate::{
    configs::connect_database,
    middlewares::authentication,
    modules::{
        realtime::{
            bridge::{SubscriptionBridge, DEFAULT_DEBOUNCE},
            events::ChangeFeed,
            handler::websocket_handler,
        },
        relationship::{repository_pg::RelationRepositoryPg, service::RelationshipService},
        user::{repository_pg::UserRepositoryPg, service::UserService},
    },
};

mod api;
mod configs;
mod constants;
mod middlewares;
mod modules;
mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    // Captures both tracing events and `log` records.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    log::info!("Environment variables loaded from .env file");
    constants::Env::default()
});

#[actix_web::get("/")]
async fn health_check() -> &'static str {
    "Server is running"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let db_pool =
        connect_database().await.map_err(|_| std::io::Error::other("Database connection error"))?;

    let user_repo = Arc::new(UserRepositoryPg::new(db_pool.clone()));
    let relation_repo = Arc::new(RelationRepositoryPg::new(db_pool.clone()));
    let feed = ChangeFeed::default();

    let user_service = UserService::with_dependencies(user_repo.clone());
    let relationship_service =
        RelationshipService::with_dependencies(relation_repo, user_repo, feed.clone());
    let bridge = SubscriptionBridge::new(relationship_service.clone(), feed, DEFAULT_DEBOUNCE);

    println!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    let bridge = web::Data::new(bridge);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(user_service.clone()))
            .app_data(web::Data::new(relationship_service.clone()))
            .app_data(bridge.clone())
            .app_data(web::Data::new(db_pool.clone()))
            .service(health_check)
            .route("/ws", web::get().to(websocket_handler))
            .service(
                web::scope("/api").configure(modules::user::route::public_api_configure).service(
                    web::scope("")
                        .wrap(from_fn(authentication))
                        .configure(modules::user::route::configure)
                        .configure(modules::relationship::route::configure),
                ),
            )
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await
}
