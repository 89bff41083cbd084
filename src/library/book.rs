//! Book presentation model.

use crate::db::{Book, Rating};
use serde::Serialize;

/// A book as returned by the API: the record plus resolved links and,
/// for authenticated callers, their own rating.
#[derive(Debug, Clone, Serialize)]
pub struct BookView {
    /// Stored book fields.
    #[serde(flatten)]
    pub book: Book,

    /// Absolute or root-relative cover URL.
    pub cover_image_url: Option<String>,

    /// Absolute or root-relative URL of the gated online reader.
    pub pdf_file_url: String,

    /// Caller's rating of this book.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_rating: Option<Rating>,
}

/// Builds public URLs for book resources.
#[derive(Debug, Clone, Default)]
pub struct BookLinks {
    base_url: String,
}

impl BookLinks {
    /// Create a link builder. An empty base yields root-relative URLs.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Cover image URL, if the book has a cover.
    pub fn cover_url(&self, book: &Book) -> Option<String> {
        book.cover_image
            .as_ref()
            .map(|_| format!("{}/api/books/{}/cover", self.base_url, book.id))
    }

    /// Online reader URL.
    pub fn read_url(&self, book: &Book) -> String {
        format!("{}/api/books/{}/read", self.base_url, book.id)
    }

    /// Wrap a book with its links.
    pub fn view(&self, book: Book, user_rating: Option<Rating>) -> BookView {
        BookView {
            cover_image_url: self.cover_url(&book),
            pdf_file_url: self.read_url(&book),
            user_rating,
            book,
        }
    }
}

impl Book {
    /// File name offered when the PDF is downloaded.
    pub fn download_filename(&self) -> String {
        let stem: String = self
            .title
            .trim()
            .chars()
            .map(|c| match c {
                '/' | '\\' | '"' | ':' | '*' | '?' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();

        if stem.is_empty() {
            "book.pdf".to_string()
        } else {
            format!("{}.pdf", stem)
        }
    }

    /// `Content-Disposition` value for this book's PDF.
    pub fn content_disposition(&self, disposition: &str) -> String {
        let filename = self.download_filename();
        let ascii: String = filename
            .chars()
            .map(|c| if c.is_ascii() { c } else { '_' })
            .collect();

        format!(
            "{}; filename=\"{}\"; filename*=UTF-8''{}",
            disposition,
            ascii,
            urlencoding::encode(&filename)
        )
    }
}
