//! Demo catalog for fresh installs.

use super::manage::BookManager;
use super::upload::{BookForm, UploadedFile};
use crate::db::{BookFilter, BookQuery, Database};
use crate::error::{AppError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

struct DemoBook {
    title: &'static str,
    author: &'static str,
    description: &'static str,
    pages: u32,
    isbn: &'static str,
    published_year: u16,
}

const DEMO_BOOKS: &[DemoBook] = &[
    DemoBook {
        title: "Atomic Habits",
        author: "James Clear",
        description: "An easy and proven way to build good habits and break bad ones.",
        pages: 320,
        isbn: "9780735211292",
        published_year: 2018,
    },
    DemoBook {
        title: "Deep Work",
        author: "Cal Newport",
        description: "Rules for focused success in a distracted world.",
        pages: 296,
        isbn: "9781455586691",
        published_year: 2016,
    },
    DemoBook {
        title: "The Pragmatic Programmer",
        author: "Andrew Hunt, David Thomas",
        description: "Your journey to mastery in software craftsmanship.",
        pages: 352,
        isbn: "9780201616224",
        published_year: 1999,
    },
    DemoBook {
        title: "Clean Code",
        author: "Robert C. Martin",
        description: "A handbook of agile software craftsmanship.",
        pages: 464,
        isbn: "9780132350884",
        published_year: 2008,
    },
    DemoBook {
        title: "Thinking, Fast and Slow",
        author: "Daniel Kahneman",
        description: "A groundbreaking tour of the mind and how we think.",
        pages: 499,
        isbn: "9780374533557",
        published_year: 2011,
    },
];

/// Load the demo books into an empty catalog.
///
/// Returns the number of books created; a catalog that already has books is
/// left untouched.
pub fn seed_demo_catalog(db: &Database, books: &BookManager, now: i64) -> Result<usize> {
    let (_, existing) = db.search_books(&BookQuery {
        search: None,
        filter: BookFilter::All,
        limit: 1,
        offset: 0,
    })?;
    if existing > 0 {
        tracing::info!(books = existing, "Catalog not empty, skipping demo books");
        return Ok(0);
    }

    for demo in DEMO_BOOKS {
        let form = BookForm {
            title: Some(demo.title.to_string()),
            author: Some(demo.author.to_string()),
            description: Some(demo.description.to_string()),
            pages: Some(demo.pages.to_string()),
            isbn: Some(demo.isbn.to_string()),
            published_year: Some(demo.published_year.to_string()),
            pdf_file: Some(UploadedFile {
                file_name: Some(format!("{}.pdf", demo.title)),
                content_type: Some("application/pdf".to_string()),
                data: placeholder_pdf(demo.title, demo.author)?,
            }),
            ..Default::default()
        };
        let book = books.create(form, now)?;
        tracing::debug!(book_id = %book.id, title = %book.title, "Seeded demo book");
    }

    Ok(DEMO_BOOKS.len())
}

/// One-page PDF showing the title and author.
fn placeholder_pdf(title: &str, author: &str) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 760.into()]),
            Operation::new("Tj", vec![Object::string_literal(title)]),
            Operation::new("Tf", vec!["F1".into(), 14.into()]),
            Operation::new("Td", vec![0.into(), (-32).into()]),
            Operation::new("Tj", vec![Object::string_literal(author)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().map_err(pdf_error)?,
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).map_err(pdf_error)?;
    Ok(buf)
}

fn pdf_error(e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Failed to build PDF: {}", e))
}
