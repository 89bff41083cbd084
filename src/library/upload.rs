//! Validation of admin book forms and their file uploads.

use crate::config::StorageConfig;
use crate::db::timestamp_to_datetime;
use crate::error::{FieldErrors, Result};
use chrono::Datelike;
use image::ImageFormat;

const MAX_TEXT_LEN: usize = 255;
const MAX_ISBN_LEN: usize = 20;
const MIN_PUBLISHED_YEAR: i64 = 1000;

/// PDFs may carry junk before the header; readers accept it within 1 KiB.
const PDF_HEADER_WINDOW: usize = 1024;

/// A file part of a multipart form.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    /// Client-side file name.
    pub file_name: Option<String>,
    /// Declared content type.
    pub content_type: Option<String>,
    /// File contents.
    pub data: Vec<u8>,
}

impl UploadedFile {
    /// Browsers send an empty part when no file was chosen.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.file_name.as_deref().unwrap_or("").is_empty()
    }
}

/// Size limits for uploads.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    /// PDF size limit in bytes.
    pub max_pdf_bytes: usize,
    /// Cover size limit in bytes.
    pub max_cover_bytes: usize,
}

impl From<&StorageConfig> for UploadLimits {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_pdf_bytes: config.max_pdf_bytes(),
            max_cover_bytes: config.max_cover_bytes(),
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

/// Raw admin book form as submitted.
#[derive(Debug, Clone, Default)]
pub struct BookForm {
    /// Title.
    pub title: Option<String>,
    /// Author.
    pub author: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Page count.
    pub pages: Option<String>,
    /// ISBN.
    pub isbn: Option<String>,
    /// Year of publication.
    pub published_year: Option<String>,
    /// Premium flag.
    pub is_premium: Option<String>,
    /// PDF upload.
    pub pdf_file: Option<UploadedFile>,
    /// Cover image upload.
    pub cover_image: Option<UploadedFile>,
}

/// Whether the form creates a book or edits one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    /// PDF required.
    Create,
    /// PDF optional.
    Update,
}

/// Validated PDF upload.
#[derive(Debug, Clone)]
pub struct PdfUpload {
    /// File contents.
    pub data: Vec<u8>,
}

impl PdfUpload {
    /// Page count read from the document, if it parses.
    pub fn page_count(&self) -> Option<i64> {
        match lopdf::Document::load_mem(&self.data) {
            Ok(doc) => Some(doc.get_pages().len() as i64),
            Err(e) => {
                tracing::debug!(error = %e, "Could not read page count from PDF");
                None
            }
        }
    }
}

/// Validated cover upload.
#[derive(Debug, Clone)]
pub struct CoverUpload {
    /// File contents.
    pub data: Vec<u8>,
    /// Extension matching the detected format.
    pub extension: &'static str,
}

/// A form that passed validation.
#[derive(Debug, Clone)]
pub struct ValidBook {
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Description.
    pub description: String,
    /// Page count.
    pub pages: Option<i64>,
    /// ISBN.
    pub isbn: Option<String>,
    /// Year of publication.
    pub published_year: Option<i64>,
    /// Premium flag.
    pub is_premium: Option<bool>,
    /// New PDF.
    pub pdf: Option<PdfUpload>,
    /// New cover.
    pub cover: Option<CoverUpload>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    value: &Option<String>,
    max: Option<usize>,
) -> String {
    let label = field.replace('_', " ");
    match present(value) {
        None => {
            errors.add(field, format!("The {} field is required.", label));
            String::new()
        }
        Some(v) => {
            if let Some(max) = max
                && v.chars().count() > max
            {
                errors.add(
                    field,
                    format!("The {} may not be greater than {} characters.", label, max),
                );
            }
            v.to_string()
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// Whether the data carries a PDF header.
pub fn looks_like_pdf(data: &[u8]) -> bool {
    let window = &data[..data.len().min(PDF_HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

impl BookForm {
    /// Validate the form, collecting every field error.
    pub fn validate(self, mode: FormMode, limits: &UploadLimits, now: i64) -> Result<ValidBook> {
        let mut errors = FieldErrors::new();

        let title = required_text(&mut errors, "title", &self.title, Some(MAX_TEXT_LEN));
        let author = required_text(&mut errors, "author", &self.author, Some(MAX_TEXT_LEN));
        let description = required_text(&mut errors, "description", &self.description, None);

        let pages = present(&self.pages).and_then(|v| match v.parse::<i64>() {
            Ok(n) if n >= 1 => Some(n),
            Ok(_) => {
                errors.add("pages", "The pages must be at least 1.");
                None
            }
            Err(_) => {
                errors.add("pages", "The pages must be an integer.");
                None
            }
        });

        let isbn = present(&self.isbn).map(|v| {
            if v.chars().count() > MAX_ISBN_LEN {
                errors.add(
                    "isbn",
                    format!("The isbn may not be greater than {} characters.", MAX_ISBN_LEN),
                );
            }
            v.to_string()
        });

        let current_year = timestamp_to_datetime(now).year() as i64;
        let published_year = present(&self.published_year).and_then(|v| match v.parse::<i64>() {
            Ok(y) if (MIN_PUBLISHED_YEAR..=current_year).contains(&y) => Some(y),
            Ok(_) => {
                errors.add(
                    "published_year",
                    format!(
                        "The published year must be between {} and {}.",
                        MIN_PUBLISHED_YEAR, current_year
                    ),
                );
                None
            }
            Err(_) => {
                errors.add("published_year", "The published year must be an integer.");
                None
            }
        });

        let is_premium = present(&self.is_premium).and_then(|v| {
            let parsed = parse_bool(v);
            if parsed.is_none() {
                errors.add("is_premium", "The is premium field must be true or false.");
            }
            parsed
        });

        let pdf = match self.pdf_file.filter(|f| !f.is_empty()) {
            None => {
                if mode == FormMode::Create {
                    errors.add("pdf_file", "The pdf file field is required.");
                }
                None
            }
            Some(file) => {
                let mut ok = true;
                if file.data.len() > limits.max_pdf_bytes {
                    errors.add(
                        "pdf_file",
                        format!(
                            "The pdf file may not be greater than {} kilobytes.",
                            limits.max_pdf_bytes / 1024
                        ),
                    );
                    ok = false;
                }
                if !looks_like_pdf(&file.data) {
                    errors.add("pdf_file", "The pdf file must be a file of type: pdf.");
                    ok = false;
                }
                ok.then_some(PdfUpload { data: file.data })
            }
        };

        let cover = match self.cover_image.filter(|f| !f.is_empty()) {
            None => None,
            Some(file) => {
                let mut ok = true;
                if file.data.len() > limits.max_cover_bytes {
                    errors.add(
                        "cover_image",
                        format!(
                            "The cover image may not be greater than {} kilobytes.",
                            limits.max_cover_bytes / 1024
                        ),
                    );
                    ok = false;
                }
                let extension = match image::guess_format(&file.data) {
                    Ok(ImageFormat::Jpeg) => Some("jpg"),
                    Ok(ImageFormat::Png) => Some("png"),
                    _ => None,
                };
                if extension.is_none() {
                    errors.add(
                        "cover_image",
                        "The cover image must be a file of type: jpeg, png, jpg.",
                    );
                }
                match extension {
                    Some(extension) if ok => Some(CoverUpload {
                        data: file.data,
                        extension,
                    }),
                    _ => None,
                }
            }
        };

        errors.into_result()?;

        Ok(ValidBook {
            title,
            author,
            description,
            pages,
            isbn,
            published_year,
            is_premium,
            pdf,
            cover,
        })
    }
}
