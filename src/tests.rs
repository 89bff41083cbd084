use crate::auth::{AuthService, Registration};
use crate::config::Config;
use crate::db::{Book, Database, Role, Session, SubscriptionType, User, now_timestamp};
use crate::error::AppError;
use crate::library::{
    BookForm, BookLinks, BookManager, Catalog, CatalogParams, CatalogQuery, ContentGate, Ratings,
    UploadLimits, UploadedFile, seed_demo_catalog,
};
use crate::storage::{BlobStore, FsBlobStore};
use crate::subscription::{Entitlements, period_end};
use lopdf::{Document, Object, dictionary};
use std::sync::Arc;
use tempfile::TempDir;

const NOW: i64 = 1_760_000_000;
const DAY: i64 = 24 * 60 * 60;

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

/// Blob store in a temporary directory that lives as long as the fixture.
struct Storage {
    _dir: TempDir,
    blobs: Arc<dyn BlobStore>,
}

fn test_storage() -> Storage {
    let dir = tempfile::tempdir().unwrap();
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(dir.path()).unwrap());
    Storage { _dir: dir, blobs }
}

fn user(id: &str, email: &str) -> User {
    User {
        id: id.to_string(),
        name: format!("Reader {}", id),
        email: email.to_string(),
        password_hash: "hash".to_string(),
        role: Role::Member,
        subscription_type: SubscriptionType::Free,
        subscription_expires_at: None,
        created_at: NOW,
        last_login: None,
    }
}

fn create_user(db: &Database, id: &str) -> User {
    let user = user(id, &format!("{}@example.com", id));
    db.create_user(&user).unwrap();
    user
}

fn create_admin(db: &Database, id: &str) -> User {
    let admin = User {
        role: Role::Admin,
        ..user(id, &format!("{}@example.com", id))
    };
    db.create_user(&admin).unwrap();
    admin
}

fn create_premium(db: &Database, id: &str, expires_at: Option<i64>) -> User {
    let premium = User {
        subscription_type: SubscriptionType::Premium,
        subscription_expires_at: expires_at,
        ..user(id, &format!("{}@example.com", id))
    };
    db.create_user(&premium).unwrap();
    premium
}

fn book(id: &str, title: &str, is_premium: bool, created_at: i64) -> Book {
    Book {
        id: id.to_string(),
        title: title.to_string(),
        author: "Unknown Author".to_string(),
        description: "No description".to_string(),
        pdf_file: format!("pdfs/{}.pdf", id),
        cover_image: None,
        pages: 0,
        isbn: None,
        published_year: None,
        is_premium,
        rating: 0.0,
        rating_count: 0,
        created_at,
        updated_at: created_at,
    }
}

fn create_book(db: &Database, id: &str, title: &str, is_premium: bool) -> Book {
    let book = book(id, title, is_premium, NOW);
    db.insert_book(&book).unwrap();
    book
}

/// A PDF with the given number of blank pages.
fn pdf_bytes(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

fn upload(data: &[u8]) -> Option<UploadedFile> {
    Some(UploadedFile {
        file_name: Some("upload".to_string()),
        content_type: None,
        data: data.to_vec(),
    })
}

fn book_form(title: &str) -> BookForm {
    BookForm {
        title: Some(title.to_string()),
        author: Some("Cal Newport".to_string()),
        description: Some("Rules for focused success.".to_string()),
        pdf_file: upload(&pdf_bytes(1)),
        ..Default::default()
    }
}

fn catalog(db: &Database, storage: &Storage) -> Catalog {
    Catalog::new(db.clone(), storage.blobs.clone(), BookLinks::new(""), 12, 100)
}

fn gate(db: &Database, storage: &Storage) -> ContentGate {
    ContentGate::new(Entitlements::new(db.clone()), storage.blobs.clone())
}

fn manager(db: &Database, storage: &Storage) -> BookManager {
    BookManager::new(db.clone(), storage.blobs.clone(), UploadLimits::default())
}

fn query(search: Option<&str>, filter: Option<&str>) -> CatalogQuery {
    CatalogQuery {
        search: search.map(str::to_string),
        filter: filter.map(str::to_string),
        ..Default::default()
    }
}

// ========== DATABASE ==========

#[test]
fn db_create_and_get_user() {
    let db = test_db();
    create_user(&db, "user-1");

    let found = db.get_user_by_email("user-1@example.com").unwrap().unwrap();
    assert_eq!(found.id, "user-1");
    assert_eq!(found.role, Role::Member);
    assert_eq!(found.subscription_type, SubscriptionType::Free);

    let found_by_id = db.get_user_by_id("user-1").unwrap().unwrap();
    assert_eq!(found_by_id.email, "user-1@example.com");
}

#[test]
fn db_duplicate_email_is_field_error() {
    let db = test_db();
    db.create_user(&user("user-1", "same@example.com")).unwrap();

    match db.create_user(&user("user-2", "same@example.com")) {
        Err(AppError::Validation(errors)) => assert!(errors.has("email")),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn db_create_and_delete_session() {
    let db = test_db();
    create_user(&db, "user-1");

    let session = Session {
        token: "token123".to_string(),
        user_id: "user-1".to_string(),
        expires_at: now_timestamp() + 3600,
    };
    db.create_session(&session).unwrap();

    let found = db.get_session("token123").unwrap().unwrap();
    assert_eq!(found.user_id, "user-1");

    db.delete_session("token123").unwrap();
    assert!(db.get_session("token123").unwrap().is_none());
}

#[test]
fn db_expired_sessions_cleanup() {
    let db = test_db();
    create_user(&db, "user-1");

    for (token, offset) in [("expired", -3600), ("valid", 3600)] {
        db.create_session(&Session {
            token: token.to_string(),
            user_id: "user-1".to_string(),
            expires_at: now_timestamp() + offset,
        })
        .unwrap();
    }

    assert_eq!(db.cleanup_expired_sessions().unwrap(), 1);
    assert!(db.get_session("expired").unwrap().is_none());
    assert!(db.get_session("valid").unwrap().is_some());
}

#[test]
fn db_update_book_keeps_aggregate() {
    let db = test_db();
    create_user(&db, "user-1");
    let mut stored = create_book(&db, "book-1", "Dune", false);
    db.upsert_rating("user-1", "book-1", 4, None, NOW).unwrap();

    // Stale aggregate on the struct must not be written back
    stored.title = "Dune Messiah".to_string();
    assert!(db.update_book(&stored).unwrap());

    let found = db.get_book("book-1").unwrap().unwrap();
    assert_eq!(found.title, "Dune Messiah");
    assert_eq!(found.rating, 4.0);
    assert_eq!(found.rating_count, 1);
}

// ========== RATINGS ==========

#[test]
fn rating_resubmission_replaces_previous() {
    let db = test_db();
    create_user(&db, "user-1");
    create_book(&db, "book-1", "Dune", false);
    let ratings = Ratings::new(db.clone());

    ratings
        .upsert_rating("user-1", "book-1", Some(5), None, NOW)
        .unwrap();
    let saved = ratings
        .upsert_rating("user-1", "book-1", Some(2), Some("Meh".to_string()), NOW + 10)
        .unwrap();

    assert_eq!(saved.rating.rating, 2);
    assert_eq!(saved.rating.review.as_deref(), Some("Meh"));
    assert_eq!(saved.rating.created_at, NOW);
    assert_eq!(saved.rating.updated_at, NOW + 10);
    assert_eq!(saved.book.rating, 2.0);
    assert_eq!(saved.book.rating_count, 1);
    assert_eq!(db.count_ratings("book-1").unwrap(), 1);
}

#[test]
fn rating_mean_over_all_raters() {
    let db = test_db();
    create_book(&db, "book-1", "Dune", false);
    let ratings = Ratings::new(db.clone());

    for (id, stars) in [("u1", 4), ("u2", 5), ("u3", 3)] {
        create_user(&db, id);
        ratings
            .upsert_rating(id, "book-1", Some(stars), None, NOW)
            .unwrap();
    }

    let book = db.get_book("book-1").unwrap().unwrap();
    assert_eq!(book.rating, 4.0);
    assert_eq!(book.rating_count, 3);
}

#[test]
fn rating_mean_is_not_rounded() {
    let db = test_db();
    create_book(&db, "book-1", "Dune", false);
    let ratings = Ratings::new(db.clone());

    for (id, stars) in [("u1", 5), ("u2", 4), ("u3", 4)] {
        create_user(&db, id);
        ratings
            .upsert_rating(id, "book-1", Some(stars), None, NOW)
            .unwrap();
    }

    let book = db.get_book("book-1").unwrap().unwrap();
    assert!((book.rating - 13.0 / 3.0).abs() < 1e-9);
}

#[test]
fn rating_removal_resets_aggregate() {
    let db = test_db();
    create_user(&db, "user-1");
    create_book(&db, "book-1", "Dune", false);
    let ratings = Ratings::new(db.clone());

    ratings
        .upsert_rating("user-1", "book-1", Some(5), None, NOW)
        .unwrap();
    let aggregate = ratings.remove_rating("user-1", "book-1").unwrap();

    assert_eq!(aggregate.rating, 0.0);
    assert_eq!(aggregate.rating_count, 0);

    let book = db.get_book("book-1").unwrap().unwrap();
    assert_eq!(book.rating, 0.0);
    assert_eq!(book.rating_count, 0);

    assert!(matches!(
        ratings.remove_rating("user-1", "book-1"),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn rating_validation_precedes_book_lookup() {
    let db = test_db();
    create_user(&db, "user-1");
    let ratings = Ratings::new(db.clone());

    for stars in [None, Some(0), Some(6)] {
        match ratings.upsert_rating("user-1", "missing", stars, None, NOW) {
            Err(AppError::Validation(errors)) => assert!(errors.has("rating")),
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    assert!(matches!(
        ratings.upsert_rating("user-1", "missing", Some(3), None, NOW),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn rating_review_length_is_limited() {
    let db = test_db();
    create_user(&db, "user-1");
    create_book(&db, "book-1", "Dune", false);
    let ratings = Ratings::new(db.clone());

    match ratings.upsert_rating("user-1", "book-1", Some(4), Some("x".repeat(1001)), NOW) {
        Err(AppError::Validation(errors)) => {
            assert!(errors.has("review"));
            assert!(!errors.has("rating"));
        }
        other => panic!("expected validation error, got {:?}", other.map(|_| ())),
    }

    let saved = ratings
        .upsert_rating("user-1", "book-1", Some(4), Some("x".repeat(1000)), NOW)
        .unwrap();
    assert_eq!(saved.rating.review.map(|r| r.len()), Some(1000));
}

#[test]
fn deleting_user_recomputes_rated_books() {
    let db = test_db();
    create_user(&db, "u1");
    create_user(&db, "u2");
    create_book(&db, "book-1", "Dune", false);
    let ratings = Ratings::new(db.clone());

    ratings.upsert_rating("u1", "book-1", Some(5), None, NOW).unwrap();
    ratings.upsert_rating("u2", "book-1", Some(1), None, NOW).unwrap();
    assert_eq!(db.get_book("book-1").unwrap().unwrap().rating, 3.0);

    assert!(db.delete_user("u2@example.com").unwrap());

    let book = db.get_book("book-1").unwrap().unwrap();
    assert_eq!(book.rating, 5.0);
    assert_eq!(book.rating_count, 1);
    assert!(db.get_rating("u2", "book-1").unwrap().is_none());
}

// ========== ENTITLEMENTS ==========

#[test]
fn lapsed_premium_is_written_back_as_free() {
    let db = test_db();
    let mut member = create_premium(&db, "user-1", Some(NOW - 10));
    let entitlements = Entitlements::new(db.clone());

    assert!(!entitlements.is_premium(&mut member, NOW).unwrap());
    assert_eq!(member.subscription_type, SubscriptionType::Free);

    let stored = db.get_user_by_id("user-1").unwrap().unwrap();
    assert_eq!(stored.subscription_type, SubscriptionType::Free);
    assert_eq!(stored.subscription_expires_at, Some(NOW - 10));
}

#[test]
fn premium_expiring_now_is_expired() {
    let db = test_db();
    let mut member = create_premium(&db, "user-1", Some(NOW));
    let entitlements = Entitlements::new(db.clone());

    assert!(!entitlements.is_premium(&mut member, NOW).unwrap());
}

#[test]
fn premium_without_expiry_is_not_entitled() {
    let db = test_db();
    let mut member = create_premium(&db, "user-1", None);
    let entitlements = Entitlements::new(db.clone());

    assert!(!entitlements.is_premium(&mut member, NOW).unwrap());
    let stored = db.get_user_by_id("user-1").unwrap().unwrap();
    assert_eq!(stored.subscription_type, SubscriptionType::Premium);
}

#[test]
fn reconcile_leaves_active_subscription_alone() {
    let db = test_db();
    let member = create_premium(&db, "user-1", Some(NOW + DAY));
    let entitlements = Entitlements::new(db.clone());

    let reconciled = entitlements.reconcile_expiry(&member, NOW).unwrap();
    assert_eq!(reconciled.subscription_type, SubscriptionType::Premium);

    let lapsed = entitlements.reconcile_expiry(&member, NOW + 2 * DAY).unwrap();
    assert_eq!(lapsed.subscription_type, SubscriptionType::Free);
}

#[test]
fn subscribe_grants_one_month() {
    let db = test_db();
    let mut member = create_user(&db, "user-1");
    let entitlements = Entitlements::new(db.clone());

    entitlements.subscribe(&mut member, NOW).unwrap();
    assert!(entitlements.is_premium(&mut member, NOW).unwrap());

    let stored = db.get_user_by_id("user-1").unwrap().unwrap();
    assert_eq!(stored.subscription_type, SubscriptionType::Premium);
    assert_eq!(stored.subscription_expires_at, Some(period_end(NOW)));
}

#[test]
fn subscribe_twice_is_rejected_without_extending() {
    let db = test_db();
    let mut member = create_user(&db, "user-1");
    let entitlements = Entitlements::new(db.clone());

    entitlements.subscribe(&mut member, NOW).unwrap();
    let result = entitlements.subscribe(&mut member, NOW + DAY);
    assert!(matches!(result, Err(AppError::AlreadyPremium)));

    let stored = db.get_user_by_id("user-1").unwrap().unwrap();
    assert_eq!(stored.subscription_expires_at, Some(period_end(NOW)));
}

#[test]
fn subscribe_after_lapse_starts_new_period() {
    let db = test_db();
    let mut member = create_premium(&db, "user-1", Some(NOW - DAY));
    let entitlements = Entitlements::new(db.clone());

    entitlements.subscribe(&mut member, NOW).unwrap();
    assert_eq!(member.subscription_expires_at, Some(period_end(NOW)));
}

#[test]
fn cancel_clears_subscription() {
    let db = test_db();
    let mut member = create_premium(&db, "user-1", Some(NOW + DAY));
    let entitlements = Entitlements::new(db.clone());

    entitlements.cancel(&mut member).unwrap();

    let status = entitlements.status(&mut member, NOW).unwrap();
    assert_eq!(status.subscription_type, SubscriptionType::Free);
    assert_eq!(status.expires_at, None);
    assert!(!status.is_premium);

    let stored = db.get_user_by_id("user-1").unwrap().unwrap();
    assert_eq!(stored.subscription_type, SubscriptionType::Free);
}

// ========== CATALOG ==========

#[test]
fn catalog_search_is_case_insensitive_substring() {
    let db = test_db();
    let storage = test_storage();
    create_book(&db, "b1", "L'ÉTRANGER", false);
    let mut deep = book("b2", "Deep Work", false, NOW);
    deep.author = "Cal Newport".to_string();
    db.insert_book(&deep).unwrap();
    let mut habits = book("b3", "Habits", false, NOW);
    habits.description = "Tiny changes, remarkable RESULTS".to_string();
    db.insert_book(&habits).unwrap();

    let catalog = catalog(&db, &storage);

    let page = catalog.search(&query(Some("étranger"), None), None).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].book.id, "b1");

    let page = catalog.search(&query(Some("NEWPORT"), None), None).unwrap();
    assert_eq!(page.data[0].book.id, "b2");

    let page = catalog.search(&query(Some("results"), None), None).unwrap();
    assert_eq!(page.data[0].book.id, "b3");

    let page = catalog.search(&query(Some("   "), None), None).unwrap();
    assert_eq!(page.total, 3);

    let page = catalog.search(&query(Some("nothing"), None), None).unwrap();
    assert_eq!(page.total, 0);
    assert_eq!(page.last_page, 1);
}

#[test]
fn catalog_filter_by_premium_flag() {
    let db = test_db();
    let storage = test_storage();
    create_book(&db, "free-1", "Free One", false);
    create_book(&db, "free-2", "Free Two", false);
    create_book(&db, "prem-1", "Premium One", true);
    let catalog = catalog(&db, &storage);

    let free = catalog.search(&query(None, Some("free")), None).unwrap();
    assert_eq!(free.total, 2);
    assert!(free.data.iter().all(|v| !v.book.is_premium));

    let premium = catalog.search(&query(None, Some("premium")), None).unwrap();
    assert_eq!(premium.total, 1);

    let all = catalog.search(&query(None, Some("all")), None).unwrap();
    assert_eq!(all.total, 3);

    let combined = catalog
        .search(&query(Some("one"), Some("premium")), None)
        .unwrap();
    assert_eq!(combined.total, 1);
    assert_eq!(combined.data[0].book.id, "prem-1");

    match catalog.search(&query(None, Some("cheap")), None) {
        Err(AppError::Validation(errors)) => assert!(errors.has("filter")),
        other => panic!("expected validation error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn catalog_params_parse_numbers() {
    let parsed = CatalogParams {
        search: Some("habits".to_string()),
        filter: None,
        page: Some(" 2 ".to_string()),
        per_page: Some(String::new()),
    }
    .parse()
    .unwrap();
    assert_eq!(parsed.search.as_deref(), Some("habits"));
    assert_eq!(parsed.page, Some(2));
    assert_eq!(parsed.per_page, None);

    let bad = CatalogParams {
        page: Some("two".to_string()),
        per_page: Some("1.5".to_string()),
        ..Default::default()
    };
    match bad.parse() {
        Err(AppError::Validation(errors)) => {
            assert!(errors.has("page"));
            assert_eq!(errors.get("per_page"), ["The per page must be an integer."]);
        }
        other => panic!("expected validation error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn catalog_orders_newest_first() {
    let db = test_db();
    let storage = test_storage();
    db.insert_book(&book("old", "Old", false, NOW - DAY)).unwrap();
    db.insert_book(&book("tie-a", "Tie A", false, NOW)).unwrap();
    db.insert_book(&book("tie-b", "Tie B", false, NOW)).unwrap();

    let page = catalog(&db, &storage)
        .search(&CatalogQuery::default(), None)
        .unwrap();
    let ids: Vec<&str> = page.data.iter().map(|v| v.book.id.as_str()).collect();
    assert_eq!(ids, vec!["tie-b", "tie-a", "old"]);
}

#[test]
fn catalog_pagination() {
    let db = test_db();
    let storage = test_storage();
    for i in 0..15 {
        db.insert_book(&book(&format!("b{:02}", i), "Title", false, NOW + i))
            .unwrap();
    }
    let catalog = catalog(&db, &storage);

    let first = catalog.search(&CatalogQuery::default(), None).unwrap();
    assert_eq!(first.per_page, 12);
    assert_eq!(first.data.len(), 12);
    assert_eq!(first.last_page, 2);
    assert_eq!(first.total, 15);

    let second = catalog
        .search(
            &CatalogQuery {
                page: Some(2),
                per_page: Some(10),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    assert_eq!(second.current_page, 2);
    assert_eq!(second.data.len(), 5);
    assert_eq!(second.data[0].book.id, "b04");

    let clamped = catalog
        .search(
            &CatalogQuery {
                page: Some(0),
                per_page: Some(1000),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    assert_eq!(clamped.current_page, 1);
    assert_eq!(clamped.per_page, 100);
    assert_eq!(clamped.last_page, 1);

    let tiny = catalog
        .search(
            &CatalogQuery {
                per_page: Some(0),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    assert_eq!(tiny.per_page, 1);
    assert_eq!(tiny.last_page, 15);

    let beyond = catalog
        .search(
            &CatalogQuery {
                page: Some(9),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    assert!(beyond.data.is_empty());
    assert_eq!(beyond.total, 15);
}

#[test]
fn catalog_annotates_callers_rating() {
    let db = test_db();
    let storage = test_storage();
    let reader = create_user(&db, "user-1");
    create_user(&db, "user-2");
    create_book(&db, "b1", "Rated", false);
    create_book(&db, "b2", "Unrated", false);
    db.upsert_rating("user-1", "b1", 4, None, NOW).unwrap();
    db.upsert_rating("user-2", "b2", 2, None, NOW).unwrap();
    let catalog = catalog(&db, &storage);

    let page = catalog.search(&CatalogQuery::default(), Some(&reader)).unwrap();
    let rated = page.data.iter().find(|v| v.book.id == "b1").unwrap();
    let other = page.data.iter().find(|v| v.book.id == "b2").unwrap();
    assert_eq!(rated.user_rating.as_ref().map(|r| r.rating), Some(4));
    assert!(other.user_rating.is_none());

    let anonymous = catalog.search(&CatalogQuery::default(), None).unwrap();
    assert!(anonymous.data.iter().all(|v| v.user_rating.is_none()));
}

#[test]
fn catalog_views_carry_reader_links() {
    let db = test_db();
    let storage = test_storage();
    create_book(&db, "b1", "Dune", false);

    let page = catalog(&db, &storage)
        .search(&CatalogQuery::default(), None)
        .unwrap();
    assert_eq!(page.data[0].pdf_file_url, "/api/books/b1/read");
    assert!(page.data[0].cover_image_url.is_none());
}

#[test]
fn catalog_get_one_with_recent_ratings() {
    let db = test_db();
    let storage = test_storage();
    create_book(&db, "b1", "Dune", false);
    for i in 0..12 {
        let id = format!("u{:02}", i);
        create_user(&db, &id);
        db.upsert_rating(&id, "b1", 1 + i % 5, None, NOW + i).unwrap();
    }
    let caller = db.get_user_by_id("u03").unwrap().unwrap();
    let catalog = catalog(&db, &storage);

    let details = catalog.get_one("b1", Some(&caller)).unwrap();
    assert_eq!(details.ratings.len(), 10);
    assert_eq!(details.ratings[0].rating.user_id, "u11");
    assert_eq!(details.ratings[0].user_name, "Reader u11");
    assert_eq!(details.book.book.rating_count, 12);
    assert_eq!(
        details.book.user_rating.as_ref().map(|r| r.user_id.as_str()),
        Some("u03")
    );

    assert!(matches!(
        catalog.get_one("missing", None),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn catalog_cover_image() {
    let db = test_db();
    let storage = test_storage();
    let catalog = catalog(&db, &storage);

    create_book(&db, "plain", "No Cover", false);
    assert!(matches!(
        catalog.cover_image("plain"),
        Err(AppError::NotFound(_))
    ));

    let cover = storage.blobs.put("covers", "png", PNG_BYTES).unwrap();
    let mut covered = book("covered", "Covered", false, NOW);
    covered.cover_image = Some(cover.clone());
    db.insert_book(&covered).unwrap();

    let (data, mime) = catalog.cover_image("covered").unwrap();
    assert_eq!(data, PNG_BYTES);
    assert_eq!(mime, "image/png");

    storage.blobs.delete(&cover).unwrap();
    assert!(matches!(
        catalog.cover_image("covered"),
        Err(AppError::ContentMissing(_))
    ));
}

// ========== CONTENT GATE ==========

fn stored_book(db: &Database, storage: &Storage, id: &str, is_premium: bool) -> Book {
    let mut stored = book(id, "Gated", is_premium, NOW);
    stored.pdf_file = storage.blobs.put("pdfs", "pdf", b"%PDF-1.4 test").unwrap();
    db.insert_book(&stored).unwrap();
    stored
}

#[test]
fn gate_free_book_is_open_to_everyone() {
    let db = test_db();
    let storage = test_storage();
    let free = stored_book(&db, &storage, "free", false);

    let content = gate(&db, &storage).open(&free, None, NOW).unwrap();
    assert_eq!(content.size, 13);
    assert_eq!(content.filename, "Gated.pdf");
    assert!(content.path.exists());
}

#[test]
fn gate_premium_book_scenario() {
    let db = test_db();
    let storage = test_storage();
    let premium = stored_book(&db, &storage, "prem", true);
    let gate = gate(&db, &storage);

    assert!(matches!(
        gate.authorize(&premium, None, NOW),
        Err(AppError::Unauthenticated(_))
    ));

    let mut member = create_user(&db, "user-1");
    assert!(matches!(
        gate.authorize(&premium, Some(&mut member), NOW),
        Err(AppError::PremiumRequired)
    ));

    Entitlements::new(db.clone())
        .subscribe(&mut member, NOW)
        .unwrap();
    assert!(gate.open(&premium, Some(&mut member), NOW + DAY).is_ok());

    let mut admin = create_admin(&db, "admin-1");
    assert!(gate.open(&premium, Some(&mut admin), NOW).is_ok());
}

#[test]
fn gate_lapsed_subscription_is_refused_and_reconciled() {
    let db = test_db();
    let storage = test_storage();
    let premium = stored_book(&db, &storage, "prem", true);
    let mut member = create_premium(&db, "user-1", Some(NOW - 1));

    assert!(matches!(
        gate(&db, &storage).authorize(&premium, Some(&mut member), NOW),
        Err(AppError::PremiumRequired)
    ));
    let stored = db.get_user_by_id("user-1").unwrap().unwrap();
    assert_eq!(stored.subscription_type, SubscriptionType::Free);
}

#[test]
fn gate_reports_missing_blob() {
    let db = test_db();
    let storage = test_storage();
    let free = create_book(&db, "ghost", "Ghost", false);

    assert!(matches!(
        gate(&db, &storage).open(&free, None, NOW),
        Err(AppError::ContentMissing(_))
    ));
}

// ========== BOOK MANAGEMENT ==========

#[test]
fn manage_create_stores_files_and_counts_pages() {
    let db = test_db();
    let storage = test_storage();
    let form = BookForm {
        pdf_file: upload(&pdf_bytes(2)),
        cover_image: upload(PNG_BYTES),
        ..book_form("Deep Work")
    };

    let created = manager(&db, &storage).create(form, NOW).unwrap();

    assert_eq!(created.pages, 2);
    assert!(!created.is_premium);
    assert_eq!(created.rating_count, 0);
    assert!(created.pdf_file.starts_with("pdfs/"));
    assert!(created.pdf_file.ends_with(".pdf"));
    let cover = created.cover_image.clone().unwrap();
    assert!(cover.starts_with("covers/") && cover.ends_with(".png"));

    assert!(storage.blobs.locate(&created.pdf_file).unwrap().is_some());
    assert!(storage.blobs.locate(&cover).unwrap().is_some());
    assert_eq!(db.get_book(&created.id).unwrap().unwrap().title, "Deep Work");
}

#[test]
fn manage_create_uses_submitted_pages() {
    let db = test_db();
    let storage = test_storage();
    let form = BookForm {
        pages: Some("296".to_string()),
        is_premium: Some("1".to_string()),
        ..book_form("Deep Work")
    };

    let created = manager(&db, &storage).create(form, NOW).unwrap();
    assert_eq!(created.pages, 296);
    assert!(created.is_premium);
}

#[test]
fn manage_create_unreadable_pdf_has_zero_pages() {
    let db = test_db();
    let storage = test_storage();
    let form = BookForm {
        pdf_file: upload(b"%PDF-1.4 truncated"),
        ..book_form("Broken")
    };

    let created = manager(&db, &storage).create(form, NOW).unwrap();
    assert_eq!(created.pages, 0);
}

#[test]
fn manage_invalid_form_stores_nothing() {
    let db = test_db();
    let storage = test_storage();
    let form = BookForm {
        title: None,
        ..book_form("")
    };

    match manager(&db, &storage).create(form, NOW) {
        Err(AppError::Validation(errors)) => assert!(errors.has("title")),
        other => panic!("expected validation error, got {:?}", other.map(|_| ())),
    }

    let (_, total) = db
        .search_books(&crate::db::BookQuery {
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(total, 0);
    assert!(!storage._dir.path().join("pdfs").exists());
}

#[test]
fn manage_update_replaces_pdf_and_keeps_aggregate() {
    let db = test_db();
    let storage = test_storage();
    let manager = manager(&db, &storage);
    create_user(&db, "user-1");

    let created = manager
        .create(
            BookForm {
                pages: Some("120".to_string()),
                is_premium: Some("true".to_string()),
                isbn: Some("9781455586691".to_string()),
                ..book_form("Deep Work")
            },
            NOW,
        )
        .unwrap();
    db.upsert_rating("user-1", &created.id, 5, None, NOW).unwrap();

    let updated = manager
        .update(
            &created.id,
            BookForm {
                pdf_file: upload(&pdf_bytes(3)),
                ..book_form("Deep Work, 2nd ed.")
            },
            NOW + DAY,
        )
        .unwrap();

    assert_eq!(updated.title, "Deep Work, 2nd ed.");
    assert_ne!(updated.pdf_file, created.pdf_file);
    assert!(storage.blobs.locate(&created.pdf_file).unwrap().is_none());
    assert!(storage.blobs.locate(&updated.pdf_file).unwrap().is_some());

    // Absent fields: pages and premium kept, isbn cleared
    assert_eq!(updated.pages, 120);
    assert!(updated.is_premium);
    assert_eq!(updated.isbn, None);

    assert_eq!(updated.rating, 5.0);
    assert_eq!(updated.rating_count, 1);
    assert_eq!(updated.created_at, NOW);
    assert_eq!(updated.updated_at, NOW + DAY);
}

#[test]
fn manage_update_without_files_keeps_blobs() {
    let db = test_db();
    let storage = test_storage();
    let manager = manager(&db, &storage);

    let created = manager
        .create(
            BookForm {
                cover_image: upload(PNG_BYTES),
                ..book_form("Deep Work")
            },
            NOW,
        )
        .unwrap();

    let updated = manager
        .update(
            &created.id,
            BookForm {
                pdf_file: None,
                is_premium: Some("off".to_string()),
                ..book_form("Deep Work")
            },
            NOW,
        )
        .unwrap();

    assert_eq!(updated.pdf_file, created.pdf_file);
    assert_eq!(updated.cover_image, created.cover_image);
    assert!(storage.blobs.locate(&updated.pdf_file).unwrap().is_some());
    assert!(!updated.is_premium);

    assert!(matches!(
        manager.update("missing", book_form("X"), NOW),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn manage_delete_removes_files_and_ratings() {
    let db = test_db();
    let storage = test_storage();
    let manager = manager(&db, &storage);
    create_user(&db, "user-1");

    let created = manager
        .create(
            BookForm {
                cover_image: upload(PNG_BYTES),
                ..book_form("Deep Work")
            },
            NOW,
        )
        .unwrap();
    db.upsert_rating("user-1", &created.id, 3, None, NOW).unwrap();

    manager.delete(&created.id).unwrap();

    assert!(db.get_book(&created.id).unwrap().is_none());
    assert_eq!(db.count_ratings(&created.id).unwrap(), 0);
    assert!(storage.blobs.locate(&created.pdf_file).unwrap().is_none());
    let cover = created.cover_image.unwrap();
    assert!(storage.blobs.locate(&cover).unwrap().is_none());

    assert!(matches!(
        manager.delete(&created.id),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn manage_delete_tolerates_missing_blobs() {
    let db = test_db();
    let storage = test_storage();
    create_book(&db, "ghost", "Ghost", false);

    manager(&db, &storage).delete("ghost").unwrap();
    assert!(db.get_book("ghost").unwrap().is_none());
}

#[test]
fn seed_fills_empty_catalog_once() {
    let db = test_db();
    let storage = test_storage();
    let manager = manager(&db, &storage);

    assert_eq!(seed_demo_catalog(&db, &manager, NOW).unwrap(), 5);

    let page = catalog(&db, &storage)
        .search(&CatalogQuery::default(), None)
        .unwrap();
    assert_eq!(page.total, 5);
    let habits = page
        .data
        .iter()
        .find(|v| v.book.title == "Atomic Habits")
        .unwrap();
    assert_eq!(habits.book.pages, 320);
    assert_eq!(habits.book.published_year, Some(2018));
    assert!(!habits.book.is_premium);

    let pdf = storage.blobs.read(&habits.book.pdf_file).unwrap().unwrap();
    assert!(pdf.starts_with(b"%PDF-"));
    assert_eq!(lopdf::Document::load_mem(&pdf).unwrap().get_pages().len(), 1);

    assert_eq!(seed_demo_catalog(&db, &manager, NOW).unwrap(), 0);
}

// ========== AUTH ==========

fn registration<'a>(email: &'a str, password: &'a str, confirmation: &'a str) -> Registration<'a> {
    Registration {
        name: "Alice",
        email,
        password,
        password_confirmation: confirmation,
    }
}

#[test]
fn auth_create_user_and_login() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    let user = auth
        .create_user("Test User", "Test@Example.com", "password123", "member")
        .unwrap();
    assert_eq!(user.email, "test@example.com");
    assert_eq!(user.role, Role::Member);
    assert_eq!(user.subscription_type, SubscriptionType::Free);

    let (logged_in, token) = auth.login("test@example.com", "password123").unwrap();
    assert_eq!(logged_in.id, user.id);
    assert!(!token.is_empty());
}

#[test]
fn auth_register_member() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    let user = auth
        .register(&registration("alice@example.com", "secret1", "secret1"))
        .unwrap();
    assert_eq!(user.name, "Alice");
    assert_eq!(user.role, Role::Member);

    match auth.register(&registration("alice@example.com", "secret1", "secret1")) {
        Err(AppError::Validation(errors)) => assert!(errors.has("email")),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn auth_register_validates_fields() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    match auth.register(&Registration {
        name: " ",
        email: "not-an-email",
        password: "abc",
        password_confirmation: "abd",
    }) {
        Err(AppError::Validation(errors)) => {
            assert!(errors.has("name"));
            assert!(errors.has("email"));
            assert_eq!(errors.get("password").len(), 2);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn auth_registration_disabled() {
    let db = test_db();
    let auth = AuthService::new(db, 30, false);

    let result = auth.register(&registration("bob@example.com", "password", "password"));
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[test]
fn auth_validate_token() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("Alice", "alice@example.com", "pass1234", "admin")
        .unwrap();
    let (_, token) = auth.login("alice@example.com", "pass1234").unwrap();

    let user = auth.validate_token(&token).unwrap().unwrap();
    assert!(user.is_admin());
    assert!(user.last_login.is_some());

    assert!(auth.validate_token("invalid_token").unwrap().is_none());
}

#[test]
fn auth_expired_token_is_removed() {
    let db = test_db();
    let auth = AuthService::new(db.clone(), 30, true);
    create_user(&db, "user-1");

    db.create_session(&Session {
        token: "stale".to_string(),
        user_id: "user-1".to_string(),
        expires_at: now_timestamp() - 1,
    })
    .unwrap();

    assert!(auth.validate_token("stale").unwrap().is_none());
    assert!(db.get_session("stale").unwrap().is_none());
}

#[test]
fn auth_refresh_rotates_token() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("Bob", "bob@example.com", "password", "member")
        .unwrap();
    let (_, old) = auth.login("bob@example.com", "password").unwrap();

    let (user, new) = auth.refresh(&old).unwrap();
    assert_eq!(user.email, "bob@example.com");
    assert_ne!(old, new);
    assert!(auth.validate_token(&old).unwrap().is_none());
    assert!(auth.validate_token(&new).unwrap().is_some());

    assert!(matches!(
        auth.refresh(&old),
        Err(AppError::Unauthenticated(_))
    ));
}

#[test]
fn auth_logout() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("Bob", "bob@example.com", "password", "member")
        .unwrap();
    let (_, token) = auth.login("bob@example.com", "password").unwrap();

    auth.logout(&token).unwrap();
    assert!(auth.validate_token(&token).unwrap().is_none());
}

#[test]
fn auth_invalid_credentials() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("User", "user@example.com", "correct", "member")
        .unwrap();
    assert!(matches!(
        auth.login("user@example.com", "wrong"),
        Err(AppError::Unauthenticated(_))
    ));
    assert!(matches!(
        auth.login("nobody@example.com", "correct"),
        Err(AppError::Unauthenticated(_))
    ));
}

#[test]
fn auth_change_password() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("User", "user@example.com", "oldpass", "member")
        .unwrap();
    assert!(auth.change_password("user@example.com", "newpass").unwrap());

    assert!(auth.login("user@example.com", "oldpass").is_err());
    assert!(auth.login("user@example.com", "newpass").is_ok());

    assert!(auth.change_password("user@example.com", "abc").is_err());
    assert!(!auth.change_password("ghost@example.com", "newpass").unwrap());
}

#[test]
fn auth_set_role() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("User", "user@example.com", "password", "member")
        .unwrap();
    assert!(auth.set_role("user@example.com", "admin").unwrap());
    assert!(auth.list_users().unwrap()[0].is_admin());

    assert!(auth.set_role("user@example.com", "owner").is_err());
    assert!(auth.create_user("X", "x@example.com", "password", "owner").is_err());
}

#[test]
fn auth_delete_user() {
    let db = test_db();
    let auth = AuthService::new(db, 30, true);

    auth.create_user("User", "user@example.com", "password", "member")
        .unwrap();
    assert!(auth.delete_user("user@example.com").unwrap());
    assert!(!auth.delete_user("user@example.com").unwrap());
    assert!(auth.list_users().unwrap().is_empty());
}

// ========== CONFIG ==========

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "127.0.0.1:9090"
title = "Test Library"
public_url = "https://books.example.com"

[database]
path = "/tmp/test.db"

[auth]
registration = "disabled"
session_days = 7

[storage]
root = "/tmp/storage"
max_pdf_mb = 10

[catalog]
default_per_page = 20
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.bind.port(), 9090);
    assert_eq!(config.server.title, "Test Library");
    assert_eq!(config.server.public_url, "https://books.example.com");
    assert!(!config.auth.registration_enabled());
    assert_eq!(config.auth.session_days, 7);
    assert_eq!(config.storage.max_pdf_bytes(), 10 * 1024 * 1024);
    assert_eq!(config.storage.max_cover_mb, 5);
    assert_eq!(config.catalog.default_per_page, 20);
    assert_eq!(config.catalog.max_per_page, 100);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 8080);
    assert!(config.server.public_url.is_empty());
    assert!(config.auth.registration_enabled());
    assert_eq!(config.auth.session_days, 30);
    assert_eq!(config.storage.max_pdf_mb, 50);
    assert_eq!(config.storage.max_cover_mb, 5);
    assert_eq!(config.catalog.default_per_page, 12);
    assert_eq!(
        config.storage.upload_body_limit(),
        (50 + 5 + 1) * 1024 * 1024
    );
}

#[test]
fn config_huge_size_limits_saturate() {
    let mut config = Config::default();
    config.storage.max_pdf_mb = u64::MAX;
    config.storage.max_cover_mb = u64::MAX / 2;

    assert_eq!(config.storage.max_pdf_bytes(), usize::MAX);
    assert_eq!(config.storage.upload_body_limit(), usize::MAX);
}

#[test]
fn config_generated_default_parses() {
    let config: Config = toml::from_str(&Config::generate_default()).unwrap();
    assert_eq!(config.server.bind.port(), 8080);
    assert_eq!(config.catalog.max_per_page, 100);
}

// ========== HTTP API ==========

mod http {
    use super::*;
    use crate::server::{AppState, create_router};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct Api {
        storage: Storage,
        db: Database,
        router: Router,
    }

    struct Reply {
        status: StatusCode,
        headers: axum::http::HeaderMap,
        bytes: Vec<u8>,
    }

    impl Reply {
        fn json(&self) -> Value {
            serde_json::from_slice(&self.bytes).unwrap_or(Value::Null)
        }
    }

    fn api() -> Api {
        let storage = test_storage();
        let db = test_db();
        let state = AppState::new(Config::default(), db.clone(), storage.blobs.clone());
        Api {
            router: create_router(state),
            db,
            storage,
        }
    }

    impl Api {
        async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> Reply {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap()
                .to_vec();
            Reply {
                status,
                headers,
                bytes,
            }
        }

        async fn get(&self, uri: &str, token: Option<&str>) -> Reply {
            self.send(Method::GET, uri, token, None).await
        }

        /// Create an account and return a bearer token for it.
        fn sign_in(&self, email: &str, role: &str) -> String {
            let auth = AuthService::new(self.db.clone(), 30, true);
            auth.create_user("Reader", email, "password123", role).unwrap();
            auth.login(email, "password123").unwrap().1
        }
    }

    #[tokio::test]
    async fn http_premium_download_scenario() {
        let api = api();
        let premium = stored_book(&api.db, &api.storage, "prem", true);
        let download = format!("/api/books/{}/download", premium.id);
        let member = api.sign_in("member@example.com", "member");
        let admin = api.sign_in("admin@example.com", "admin");

        let reply = api.get(&download, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.json()["success"], false);

        let reply = api.get(&download, Some(&member)).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(reply.json()["success"], false);
        assert_eq!(reply.json()["is_premium_required"], true);

        let subscribe = "/api/subscription/subscribe";
        let reply = api.send(Method::POST, subscribe, Some(&member), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.json()["success"], true);

        let reply = api.send(Method::POST, subscribe, Some(&member), None).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);

        let reply = api.get(&download, Some(&member)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.headers[header::CONTENT_TYPE], "application/pdf");
        assert!(
            reply.headers[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .starts_with("attachment")
        );
        assert_eq!(reply.bytes, b"%PDF-1.4 test");

        let reply = api.get(&download, Some(&admin)).await;
        assert_eq!(reply.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn http_free_book_reads_anonymously_but_downloads_need_login() {
        let api = api();
        let free = stored_book(&api.db, &api.storage, "free", false);

        let reply = api.get(&format!("/api/books/{}/read", free.id), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(
            reply.headers[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .starts_with("inline")
        );

        let download = format!("/api/books/{}/download", free.id);
        let reply = api.get(&download, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

        let member = api.sign_in("member@example.com", "member");
        let reply = api.get(&download, Some(&member)).await;
        assert_eq!(reply.status, StatusCode::OK);

        let reply = api.get(&download, Some("not-a-token")).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

        let reply = api
            .get(&format!("/api/books/{}/read", free.id), Some("not-a-token"))
            .await;
        assert_eq!(reply.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn http_admin_routes_refuse_members() {
        let api = api();
        let free = stored_book(&api.db, &api.storage, "free", false);
        let uri = format!("/api/admin/books/{}", free.id);

        let reply = api.send(Method::DELETE, &uri, None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

        let member = api.sign_in("member@example.com", "member");
        let reply = api.send(Method::DELETE, &uri, Some(&member), None).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(reply.json()["success"], false);
        assert!(reply.json().get("is_premium_required").is_none());
        assert!(api.db.get_book(&free.id).unwrap().is_some());

        let admin = api.sign_in("admin@example.com", "admin");
        let reply = api.send(Method::DELETE, &uri, Some(&admin), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(api.db.get_book(&free.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn http_bad_input_is_field_keyed() {
        let api = api();
        let free = stored_book(&api.db, &api.storage, "free", false);
        let member = api.sign_in("member@example.com", "member");
        let rate = format!("/api/books/{}/rate", free.id);

        let reply = api
            .send(
                Method::POST,
                &rate,
                Some(&member),
                Some(json!({"rating": 3, "review": 123})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(reply.json()["errors"]["review"].is_array());

        let reply = api
            .send(Method::POST, &rate, Some(&member), Some(json!({"rating": 9})))
            .await;
        assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(reply.json()["errors"]["rating"].is_array());

        let reply = api
            .send(
                Method::POST,
                "/api/login",
                None,
                Some(json!({"email": 5, "password": "x"})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);

        let reply = api.get("/api/books?per_page=abc&page=x", None).await;
        assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(reply.json()["errors"]["per_page"].is_array());
        assert!(reply.json()["errors"]["page"].is_array());

        let reply = api
            .send(
                Method::POST,
                &rate,
                Some(&member),
                Some(json!({"rating": 4, "review": "Solid"})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.json()["data"]["book"]["rating_count"], 1);
    }

    #[tokio::test]
    async fn http_catalog_lists_books() {
        let api = api();
        stored_book(&api.db, &api.storage, "free", false);

        let reply = api.get("/api/books?per_page=5", None).await;
        assert_eq!(reply.status, StatusCode::OK);
        let body = reply.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["per_page"], 5);
        assert_eq!(
            body["data"]["data"][0]["pdf_file_url"],
            "/api/books/free/read"
        );
    }
}
