//! WebSocket endpoint for live relationship views.
//!
//! One socket per viewer: the upgrade authenticates a bearer token, opens a
//! bridge subscription, and streams every recomputed snapshot to the client
//! as a JSON text frame. Closing the socket drops the subscription, which
//! tears the bridge task down.

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use serde::Deserialize;

use crate::{
    api::error,
    modules::{
        realtime::bridge::SubscriptionBridge,
        relationship::repository_pg::RelationRepositoryPg,
        user::repository_pg::UserRepositoryPg,
    },
    utils::Claims,
    ENV,
};

pub type Bridge = SubscriptionBridge<RelationRepositoryPg, UserRepositoryPg>;

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Endpoint: GET /ws?token=<access token>
pub async fn websocket_handler(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsQuery>,
    bridge: web::Data<Bridge>,
) -> Result<HttpResponse, actix_web::Error> {
    let claims = Claims::decode(&query.token, ENV.jwt_secret.as_ref())
        .map_err(|_| error::Error::unauthorized("Token Invalid or Expired"))?;
    let user_id = claims.sub;

    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    let mut subscription = bridge.subscribe(user_id);
    tracing::debug!("view stream opened for {user_id}");

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                // === OUTBOUND: recomputed view snapshots ===
                views = subscription.recv() => {
                    let Some(views) = views else { break };
                    match serde_json::to_string(&views) {
                        Ok(text) => {
                            if session.text(text).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!("failed to serialize views for {user_id}: {e}");
                        }
                    }
                }

                // === INBOUND: control frames only ===
                msg = msg_stream.recv() => {
                    match msg {
                        Some(Ok(Message::Ping(data))) => {
                            if session.pong(&data).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {
                            // Clients have nothing to say on this socket;
                            // mutations go through the HTTP API.
                        }
                        Some(Err(e)) => {
                            tracing::warn!("websocket protocol error for {user_id}: {e}");
                            break;
                        }
                    }
                }
            }
        }

        subscription.unsubscribe();
        let _ = session.close(None).await;
        tracing::debug!("view stream closed for {user_id}");
    });

    Ok(response)
}
