/// Book content gate.
pub mod access;
/// Book views and URL resolution.
pub mod book;
/// Catalog listing and lookup.
pub mod catalog;
/// Admin book management.
pub mod manage;
/// Rating aggregation.
pub mod ratings;
/// Demo catalog.
pub mod seed;
/// Multipart upload validation.
pub mod upload;

pub use access::{BookContent, ContentGate};
pub use book::{BookLinks, BookView};
pub use catalog::{BookDetails, Catalog, CatalogParams, CatalogQuery, Page};
pub use manage::BookManager;
pub use ratings::{RatingSaved, Ratings};
pub use seed::seed_demo_catalog;
pub use upload::{BookForm, UploadLimits, UploadedFile};
