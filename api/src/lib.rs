pub mod auth;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod follow;
pub mod groups;
pub mod pagination;
pub mod permissions;
pub mod posts;
pub mod serializers;
pub mod telemetry;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{config::Config, db::DbPool};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }
}

fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::exact(origin.parse::<HeaderValue>()?)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any()))
}

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.cors_origin)?;

    let v1 = Router::new()
        // Posts
        .route("/posts/", get(posts::list_posts).post(posts::create_post))
        .route(
            "/posts/{id}/",
            get(posts::get_post)
                .put(posts::update_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        // Comments
        .route(
            "/posts/{post_id}/comments/",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/posts/{post_id}/comments/{id}/",
            get(comments::get_comment)
                .put(comments::update_comment)
                .patch(comments::update_comment)
                .delete(comments::delete_comment),
        )
        // Groups
        .route("/groups/", get(groups::list_groups))
        .route("/groups/{id}/", get(groups::get_group))
        // Follow
        .route(
            "/follow/",
            get(follow::list_follows).post(follow::create_follow),
        )
        // Identity
        .route("/users/", post(auth::register))
        .route("/users/me/", get(auth::me))
        .route("/jwt/create/", post(auth::create_token))
        .route("/jwt/refresh/", post(auth::refresh_token))
        .route("/jwt/verify/", post(auth::verify_token));

    Ok(Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state))
}
