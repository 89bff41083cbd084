//! Catalog listing, lookup and cover retrieval.

use super::book::{BookLinks, BookView};
use crate::db::{AuthoredRating, Book, BookFilter, BookQuery, Database, User};
use crate::error::{AppError, FieldErrors, Result};
use crate::storage::BlobStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ratings shown on a book's detail page.
const RECENT_RATINGS: i64 = 10;

/// Listing query string as sent by clients, numbers still unparsed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogParams {
    /// Free-text search.
    pub search: Option<String>,
    /// `all`, `free` or `premium`.
    pub filter: Option<String>,
    /// 1-based page number.
    pub page: Option<String>,
    /// Page size.
    pub per_page: Option<String>,
}

impl CatalogParams {
    /// Parse the numeric parameters, keying failures by parameter name.
    pub fn parse(self) -> Result<CatalogQuery> {
        let mut errors = FieldErrors::new();
        let page = integer_param(&mut errors, "page", self.page.as_deref());
        let per_page = integer_param(&mut errors, "per_page", self.per_page.as_deref());
        errors.into_result()?;

        Ok(CatalogQuery {
            search: self.search,
            filter: self.filter,
            page,
            per_page,
        })
    }
}

fn integer_param(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<i64> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match value.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            let label = field.replace('_', " ");
            errors.add(field, format!("The {} must be an integer.", label));
            None
        }
    }
}

/// Parsed listing query.
#[derive(Debug, Clone, Default)]
pub struct CatalogQuery {
    /// Free-text search.
    pub search: Option<String>,
    /// `all`, `free` or `premium`.
    pub filter: Option<String>,
    /// 1-based page number.
    pub page: Option<i64>,
    /// Page size.
    pub per_page: Option<i64>,
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Current page number.
    pub current_page: i64,
    /// Last page number, at least 1.
    pub last_page: i64,
    /// Page size.
    pub per_page: i64,
    /// Number of matching items.
    pub total: i64,
}

/// A book with its recent ratings.
#[derive(Debug, Clone, Serialize)]
pub struct BookDetails {
    /// The book.
    #[serde(flatten)]
    pub book: BookView,
    /// Most recent ratings.
    pub ratings: Vec<AuthoredRating>,
}

/// Catalog query service.
#[derive(Clone)]
pub struct Catalog {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    links: BookLinks,
    default_per_page: i64,
    max_per_page: i64,
}

impl Catalog {
    /// Create a catalog service.
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        links: BookLinks,
        default_per_page: u32,
        max_per_page: u32,
    ) -> Self {
        let max_per_page = i64::from(max_per_page.max(1));
        Self {
            db,
            blobs,
            links,
            default_per_page: i64::from(default_per_page).clamp(1, max_per_page),
            max_per_page,
        }
    }

    /// Link builder used for views.
    pub fn links(&self) -> &BookLinks {
        &self.links
    }

    /// Search the catalog, newest books first.
    pub fn search(&self, query: &CatalogQuery, caller: Option<&User>) -> Result<Page<BookView>> {
        let filter = match query.filter.as_deref() {
            None => BookFilter::All,
            Some(value) => BookFilter::parse(value.trim()).ok_or_else(|| {
                AppError::Validation(FieldErrors::single(
                    "filter",
                    "The selected filter is invalid.",
                ))
            })?,
        };

        let per_page = query
            .per_page
            .unwrap_or(self.default_per_page)
            .clamp(1, self.max_per_page);
        let current_page = query.page.unwrap_or(1).max(1);

        let (books, total) = self.db.search_books(&BookQuery {
            search: query.search.clone(),
            filter,
            limit: per_page,
            offset: (current_page - 1).saturating_mul(per_page),
        })?;

        let data = self.annotate(books, caller)?;
        let last_page = ((total + per_page - 1) / per_page).max(1);

        Ok(Page {
            data,
            current_page,
            last_page,
            per_page,
            total,
        })
    }

    fn annotate(&self, books: Vec<Book>, caller: Option<&User>) -> Result<Vec<BookView>> {
        let mut own = match caller {
            Some(user) => {
                let ids: Vec<String> = books.iter().map(|b| b.id.clone()).collect();
                self.db.get_user_ratings(&user.id, &ids)?
            }
            None => Default::default(),
        };

        Ok(books
            .into_iter()
            .map(|book| {
                let rating = own.remove(&book.id);
                self.links.view(book, rating)
            })
            .collect())
    }

    /// A single book with its recent ratings.
    pub fn get_one(&self, book_id: &str, caller: Option<&User>) -> Result<BookDetails> {
        let book = self
            .db
            .get_book(book_id)?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

        let user_rating = match caller {
            Some(user) => self.db.get_rating(&user.id, book_id)?,
            None => None,
        };
        let ratings = self.db.recent_ratings(book_id, RECENT_RATINGS)?;

        Ok(BookDetails {
            book: self.links.view(book, user_rating),
            ratings,
        })
    }

    /// Cover image bytes and MIME type.
    pub fn cover_image(&self, book_id: &str) -> Result<(Vec<u8>, &'static str)> {
        let book = self
            .db
            .get_book(book_id)?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;

        let path = book
            .cover_image
            .ok_or_else(|| AppError::NotFound("Cover not found".to_string()))?;

        let data = self
            .blobs
            .read(&path)?
            .ok_or_else(|| AppError::ContentMissing(path.clone()))?;

        Ok((data, cover_mime(&path)))
    }
}

fn cover_mime(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}
