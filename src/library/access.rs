use crate::db::{Book, User};
use crate::error::{AppError, Result};
use crate::storage::BlobStore;
use crate::subscription::Entitlements;
use std::path::PathBuf;
use std::sync::Arc;

/// A PDF the caller may read.
#[derive(Debug, Clone)]
pub struct BookContent {
    /// Local file to stream.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Suggested file name.
    pub filename: String,
}

/// Decides who may read a book's PDF.
#[derive(Clone)]
pub struct ContentGate {
    entitlements: Entitlements,
    blobs: Arc<dyn BlobStore>,
}

impl ContentGate {
    /// Create a content gate.
    pub fn new(entitlements: Entitlements, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            entitlements,
            blobs,
        }
    }

    /// Check whether `caller` may read `book` at `now`.
    ///
    /// Free books are open to everyone. Premium books need a signed-in caller
    /// who is an admin or holds an active subscription.
    pub fn authorize(&self, book: &Book, caller: Option<&mut User>, now: i64) -> Result<()> {
        if !book.is_premium {
            return Ok(());
        }

        let user = caller.ok_or_else(|| {
            AppError::Unauthenticated("Please log in to read premium books".to_string())
        })?;

        if user.is_admin() || self.entitlements.is_premium(user, now)? {
            return Ok(());
        }

        tracing::debug!(user_id = %user.id, book_id = %book.id, "Premium book refused");
        Err(AppError::PremiumRequired)
    }

    /// Authorize and locate the book's PDF.
    pub fn open(&self, book: &Book, caller: Option<&mut User>, now: i64) -> Result<BookContent> {
        self.authorize(book, caller, now)?;

        let blob = self
            .blobs
            .locate(&book.pdf_file)?
            .ok_or_else(|| AppError::ContentMissing(book.pdf_file.clone()))?;

        Ok(BookContent {
            path: blob.path,
            size: blob.size,
            filename: book.download_filename(),
        })
    }
}
