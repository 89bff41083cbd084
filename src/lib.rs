//! bookvault: an online library API serving PDF books.
//!
//! Readers browse and search the catalog, rate books and read PDFs online.
//! Premium books are gated behind a monthly subscription whose expiry is
//! applied lazily whenever entitlement is checked.
//!
//! # Features
//!
//! - Catalog search with free/premium filtering and pagination
//! - Per-user ratings with a cached mean and count on each book
//! - Premium subscriptions with lazy expiry
//! - Gated PDF download and streaming
//! - Admin book upload with PDF page counting and cover detection
//! - Bearer-token sessions with Argon2 password hashing

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Catalog, ratings, content gate and book management.
pub mod library;
/// HTTP server.
pub mod server;
/// Blob storage for PDFs and covers.
pub mod storage;
/// Premium subscriptions and entitlement checks.
pub mod subscription;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
