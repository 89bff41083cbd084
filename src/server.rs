//! HTTP server and routes.

mod extract;
mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth_register))
        .route("/login", post(handlers::auth_login))
        .route("/logout", post(handlers::auth_logout))
        .route("/refresh", post(handlers::auth_refresh))
        .route("/me", get(handlers::auth_me));

    let book_routes = Router::new()
        .route("/books", get(handlers::book_list))
        .route("/books/{id}", get(handlers::book_show))
        .route("/books/{id}/download", get(handlers::book_download))
        .route("/books/{id}/read", get(handlers::book_read))
        .route("/books/{id}/cover", get(handlers::book_cover))
        .route(
            "/books/{id}/rate",
            post(handlers::book_rate).delete(handlers::book_unrate),
        );

    let subscription_routes = Router::new()
        .route("/subscribe", post(handlers::subscription_subscribe))
        .route("/cancel", post(handlers::subscription_cancel))
        .route("/status", get(handlers::subscription_status));

    // Uploads carry a PDF and a cover in one body
    let admin_routes = Router::new()
        .route("/books", post(handlers::admin_create_book))
        .route(
            "/books/{id}",
            post(handlers::admin_update_book).delete(handlers::admin_delete_book),
        )
        .layer(DefaultBodyLimit::max(
            state.config.storage.upload_body_limit(),
        ));

    let api_routes = auth_routes
        .merge(book_routes)
        .nest("/subscription", subscription_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
