use crate::modules::relationship::handle::*;
use actix_web::web::{scope, ServiceConfig};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/relationships")
            .service(send_request)
            .service(accept_request)
            .service(decline_request)
            .service(cancel_request)
            .service(get_views)
            .service(remove_friend)
            .service(block_user)
            .service(unblock_user),
    );
}
