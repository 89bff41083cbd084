//! Admin book management: create, edit and delete books with their files.

use super::upload::{BookForm, FormMode, UploadLimits, ValidBook};
use crate::db::{Book, Database};
use crate::error::{AppError, Result};
use crate::storage::{BlobStore, delete_best_effort};
use std::sync::Arc;

const PDF_DIR: &str = "pdfs";
const COVER_DIR: &str = "covers";

/// Book management service.
#[derive(Clone)]
pub struct BookManager {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    limits: UploadLimits,
}

impl BookManager {
    /// Create a book manager.
    pub fn new(db: Database, blobs: Arc<dyn BlobStore>, limits: UploadLimits) -> Self {
        Self { db, blobs, limits }
    }

    /// Store new blobs, returning (pdf, cover) paths.
    fn store(&self, valid: &ValidBook) -> Result<(Option<String>, Option<String>)> {
        let pdf = match &valid.pdf {
            Some(pdf) => Some(self.blobs.put(PDF_DIR, "pdf", &pdf.data)?),
            None => None,
        };

        let cover = match &valid.cover {
            Some(cover) => match self.blobs.put(COVER_DIR, cover.extension, &cover.data) {
                Ok(path) => Some(path),
                Err(e) => {
                    if let Some(pdf) = &pdf {
                        delete_best_effort(self.blobs.as_ref(), pdf);
                    }
                    return Err(e);
                }
            },
            None => None,
        };

        Ok((pdf, cover))
    }

    fn discard(&self, paths: &[Option<String>]) {
        for path in paths.iter().flatten() {
            delete_best_effort(self.blobs.as_ref(), path);
        }
    }

    /// Create a book from an admin form.
    pub fn create(&self, form: BookForm, now: i64) -> Result<Book> {
        let valid = form.validate(FormMode::Create, &self.limits, now)?;

        let pages = valid
            .pages
            .or_else(|| valid.pdf.as_ref().and_then(|pdf| pdf.page_count()))
            .unwrap_or(0);

        let (pdf_file, cover_image) = self.store(&valid)?;
        let Some(pdf_file) = pdf_file else {
            self.discard(&[cover_image]);
            return Err(AppError::Internal("PDF upload missing after validation".to_string()));
        };

        let book = Book {
            id: uuid::Uuid::new_v4().to_string(),
            title: valid.title,
            author: valid.author,
            description: valid.description,
            pdf_file,
            cover_image,
            pages,
            isbn: valid.isbn,
            published_year: valid.published_year,
            is_premium: valid.is_premium.unwrap_or(false),
            rating: 0.0,
            rating_count: 0,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.db.insert_book(&book) {
            self.discard(&[Some(book.pdf_file.clone()), book.cover_image.clone()]);
            return Err(e);
        }

        tracing::info!(
            book_id = %book.id,
            title = %book.title,
            premium = book.is_premium,
            pages = book.pages,
            "Book created"
        );
        Ok(book)
    }

    /// Edit a book. Replaced files are removed once the record is saved.
    pub fn update(&self, book_id: &str, form: BookForm, now: i64) -> Result<Book> {
        let existing = self
            .db
            .get_book(book_id)?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

        let valid = form.validate(FormMode::Update, &self.limits, now)?;
        let (new_pdf, new_cover) = self.store(&valid)?;

        let book = Book {
            title: valid.title,
            author: valid.author,
            description: valid.description,
            pdf_file: new_pdf.clone().unwrap_or_else(|| existing.pdf_file.clone()),
            cover_image: new_cover.clone().or_else(|| existing.cover_image.clone()),
            pages: valid.pages.unwrap_or(existing.pages),
            isbn: valid.isbn,
            published_year: valid.published_year,
            is_premium: valid.is_premium.unwrap_or(existing.is_premium),
            updated_at: now,
            ..existing.clone()
        };

        match self.db.update_book(&book) {
            Ok(true) => {}
            Ok(false) => {
                self.discard(&[new_pdf, new_cover]);
                return Err(AppError::NotFound("Book not found".to_string()));
            }
            Err(e) => {
                self.discard(&[new_pdf, new_cover]);
                return Err(e);
            }
        }

        if new_pdf.is_some() {
            delete_best_effort(self.blobs.as_ref(), &existing.pdf_file);
        }
        if new_cover.is_some()
            && let Some(old) = &existing.cover_image
        {
            delete_best_effort(self.blobs.as_ref(), old);
        }

        tracing::info!(
            book_id = %book.id,
            replaced_pdf = new_pdf.is_some(),
            replaced_cover = new_cover.is_some(),
            "Book updated"
        );

        // Re-read so the returned record carries the current aggregate
        Ok(self.db.get_book(book_id)?.unwrap_or(book))
    }

    /// Delete a book, its ratings and its files.
    pub fn delete(&self, book_id: &str) -> Result<()> {
        let book = self
            .db
            .get_book(book_id)?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

        if !self.db.delete_book(book_id)? {
            return Err(AppError::NotFound("Book not found".to_string()));
        }

        delete_best_effort(self.blobs.as_ref(), &book.pdf_file);
        if let Some(cover) = &book.cover_image {
            delete_best_effort(self.blobs.as_ref(), cover);
        }

        tracing::info!(book_id = %book_id, title = %book.title, "Book deleted");
        Ok(())
    }
}
