pub mod user {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod relationship {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod handle;
    pub mod service;
    pub mod route;
    #[cfg(test)]
    pub mod testing;
}

pub mod realtime {
    pub mod bridge;
    pub mod events;
    pub mod handler;
}
