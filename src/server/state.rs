//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::config::Config;
use crate::db::Database;
use crate::library::{BookLinks, BookManager, Catalog, ContentGate, Ratings, UploadLimits};
use crate::storage::BlobStore;
use crate::subscription::Entitlements;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Subscription state and entitlement checks.
    pub entitlements: Entitlements,
    /// Catalog listing and lookup.
    pub catalog: Catalog,
    /// Rating aggregation.
    pub ratings: Ratings,
    /// Book content gate.
    pub gate: ContentGate,
    /// Admin book management.
    pub books: BookManager,
}

impl AppState {
    /// Wire up the services over one database and blob store.
    pub fn new(config: Config, db: Database, blobs: Arc<dyn BlobStore>) -> Self {
        let auth = AuthService::new(
            db.clone(),
            config.auth.session_days,
            config.auth.registration_enabled(),
        );
        let entitlements = Entitlements::new(db.clone());
        let links = BookLinks::new(config.server.public_url.clone());

        let catalog = Catalog::new(
            db.clone(),
            blobs.clone(),
            links,
            config.catalog.default_per_page,
            config.catalog.max_per_page,
        );
        let ratings = Ratings::new(db.clone());
        let gate = ContentGate::new(entitlements.clone(), blobs.clone());
        let books = BookManager::new(
            db.clone(),
            blobs.clone(),
            UploadLimits::from(&config.storage),
        );

        Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            entitlements,
            catalog,
            ratings,
            gate,
            books,
        }
    }
}
