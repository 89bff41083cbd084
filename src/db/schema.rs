use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, subscription_type, \
     subscription_expires_at, created_at, last_login";

const BOOK_COLUMNS: &str = "id, title, author, description, pdf_file, cover_image, pages, isbn, \
     published_year, is_premium, rating, rating_count, created_at, updated_at";

const RATING_COLUMNS: &str = "id, user_id, book_id, rating, review, created_at, updated_at";

/// Catalog visibility filter on the premium flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BookFilter {
    /// No restriction.
    #[default]
    All,
    /// Only books readable without a subscription.
    Free,
    /// Only premium books.
    Premium,
}

impl BookFilter {
    /// Parse a filter name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "" | "all" => Some(BookFilter::All),
            "free" => Some(BookFilter::Free),
            "premium" => Some(BookFilter::Premium),
            _ => None,
        }
    }
}

/// Book listing query.
#[derive(Debug, Clone, Default)]
pub struct BookQuery {
    /// Case-insensitive substring of title, author or description.
    pub search: Option<String>,
    /// Premium flag filter.
    pub filter: BookFilter,
    /// Page size.
    pub limit: i64,
    /// Rows to skip.
    pub offset: i64,
}

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn internal(context: &'static str) -> impl FnOnce(rusqlite::Error) -> AppError {
    move |e| AppError::Internal(format!("{}: {}", context, e))
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        Self::with_connection(conn)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // SQLite's lower() only folds ASCII
        conn.create_scalar_function(
            "unicode_lower",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: Option<String> = ctx.get(0)?;
                Ok(text.map(|t| t.to_lowercase()))
            },
        )
        .map_err(|e| AppError::Internal(format!("Failed to register functions: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'member',
                subscription_type TEXT NOT NULL DEFAULT 'free',
                subscription_expires_at INTEGER,
                created_at INTEGER NOT NULL,
                last_login INTEGER
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Books table
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                description TEXT NOT NULL,
                pdf_file TEXT NOT NULL,
                cover_image TEXT,
                pages INTEGER NOT NULL DEFAULT 0,
                isbn TEXT,
                published_year INTEGER,
                is_premium INTEGER NOT NULL DEFAULT 0,
                rating REAL NOT NULL DEFAULT 0,
                rating_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Ratings table, one row per (user, book)
            CREATE TABLE IF NOT EXISTS ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                review TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (user_id, book_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_created ON books(created_at);
            CREATE INDEX IF NOT EXISTS idx_ratings_book ON ratings(book_id, updated_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: row.get(4)?,
            subscription_type: row.get(5)?,
            subscription_expires_at: row.get(6)?,
            created_at: row.get(7)?,
            last_login: row.get(8)?,
        })
    }

    /// Create a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                USER_COLUMNS
            ),
            params![
                user.id,
                user.name,
                user.email,
                user.password_hash,
                user.role,
                user.subscription_type,
                user.subscription_expires_at,
                user.created_at,
                user.last_login,
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Validation(crate::error::FieldErrors::single(
                    "email",
                    "The email has already been taken.",
                ))
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;
        Ok(())
    }

    /// Get user by email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            params![email],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM users ORDER BY email", USER_COLUMNS))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Update user password.
    pub fn update_user_password(&self, email: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE email = ?2",
                params![password_hash, email],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user role.
    pub fn update_user_role(&self, email: &str, role: Role) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET role = ?1 WHERE email = ?2",
                params![role, email],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update role: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user last login.
    pub fn update_user_last_login(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_timestamp(), user_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update last login: {}", e)))?;
        Ok(())
    }

    /// Persist a user's subscription state.
    pub fn update_subscription(
        &self,
        user_id: &str,
        subscription_type: SubscriptionType,
        expires_at: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET subscription_type = ?1, subscription_expires_at = ?2 WHERE id = ?3",
                params![subscription_type, expires_at, user_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update subscription: {}", e)))?;

        if rows == 0 {
            return Err(AppError::NotFound(format!("User not found: {}", user_id)));
        }
        Ok(())
    }

    /// Delete user, their sessions and ratings, refreshing the aggregates of
    /// every book they had rated.
    pub fn delete_user(&self, email: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(internal("Failed to begin transaction"))?;

        let user_id: Option<String> = tx
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()
            .map_err(internal("Failed to get user"))?;

        let Some(user_id) = user_id else {
            return Ok(false);
        };

        let rated_books = {
            let mut stmt = tx
                .prepare("SELECT DISTINCT book_id FROM ratings WHERE user_id = ?1")
                .map_err(internal("Failed to prepare query"))?;
            stmt.query_map(params![user_id], |row| row.get::<_, String>(0))
                .map_err(internal("Failed to get rated books"))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(internal("Failed to collect rated books"))?
        };

        tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])
            .map_err(internal("Failed to delete user"))?;

        for book_id in &rated_books {
            recompute_aggregate(&tx, book_id).map_err(internal("Failed to recompute rating"))?;
        }

        tx.commit().map_err(internal("Failed to commit"))?;

        tracing::debug!(user_id = %user_id, books = rated_books.len(), "Deleted user");
        Ok(true)
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to cleanup sessions: {}", e)))?;
        Ok(rows)
    }

    // ========== BOOK OPERATIONS ==========

    /// Insert a new book. The rating columns start at zero.
    pub fn insert_book(&self, book: &Book) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO books
             (id, title, author, description, pdf_file, cover_image, pages, isbn,
              published_year, is_premium, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                book.id,
                book.title,
                book.author,
                book.description,
                book.pdf_file,
                book.cover_image,
                book.pages,
                book.isbn,
                book.published_year,
                book.is_premium,
                book.created_at,
                book.updated_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save book: {}", e)))?;
        Ok(())
    }

    /// Update the editable columns of a book. Rating columns are left alone.
    pub fn update_book(&self, book: &Book) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE books SET
                    title = ?2,
                    author = ?3,
                    description = ?4,
                    pdf_file = ?5,
                    cover_image = ?6,
                    pages = ?7,
                    isbn = ?8,
                    published_year = ?9,
                    is_premium = ?10,
                    updated_at = ?11
                 WHERE id = ?1",
                params![
                    book.id,
                    book.title,
                    book.author,
                    book.description,
                    book.pdf_file,
                    book.cover_image,
                    book.pages,
                    book.isbn,
                    book.published_year,
                    book.is_premium,
                    book.updated_at,
                ],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update book: {}", e)))?;
        Ok(rows > 0)
    }

    /// Get book by ID.
    pub fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS),
            params![id],
            Self::row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// Search books, newest first. Returns the page and the total match count.
    pub fn search_books(&self, query: &BookQuery) -> Result<(Vec<Book>, i64)> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if let Some(text) = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            clauses.push(
                "(instr(unicode_lower(title), ?) > 0
                  OR instr(unicode_lower(author), ?) > 0
                  OR instr(unicode_lower(description), ?) > 0)",
            );
            let needle = text.to_lowercase();
            for _ in 0..3 {
                args.push(Value::Text(needle.clone()));
            }
        }

        match query.filter {
            BookFilter::All => {}
            BookFilter::Free => clauses.push("is_premium = 0"),
            BookFilter::Premium => clauses.push("is_premium = 1"),
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let conn = self.conn.lock();

        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM books {}", where_sql),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )
            .map_err(|e| AppError::Internal(format!("Failed to count books: {}", e)))?;

        let mut page_args = args;
        page_args.push(Value::Integer(query.limit));
        page_args.push(Value::Integer(query.offset));

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM books {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                BOOK_COLUMNS, where_sql
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map(params_from_iter(page_args.iter()), Self::row_to_book)
            .map_err(|e| AppError::Internal(format!("Failed to search books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok((books, total))
    }

    /// Helper to convert a row to Book.
    fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            description: row.get(3)?,
            pdf_file: row.get(4)?,
            cover_image: row.get(5)?,
            pages: row.get(6)?,
            isbn: row.get(7)?,
            published_year: row.get(8)?,
            is_premium: row.get(9)?,
            rating: row.get(10)?,
            rating_count: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    /// Delete a single book by ID. Its ratings go with it.
    pub fn delete_book(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM books WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete book: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== RATING OPERATIONS ==========

    fn row_to_rating(row: &rusqlite::Row<'_>) -> rusqlite::Result<Rating> {
        Ok(Rating {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            rating: row.get(3)?,
            review: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    /// Create or replace the user's rating of a book and refresh the book's
    /// aggregate in the same transaction.
    pub fn upsert_rating(
        &self,
        user_id: &str,
        book_id: &str,
        rating: i64,
        review: Option<&str>,
        now: i64,
    ) -> Result<(Rating, BookAggregate)> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(internal("Failed to begin transaction"))?;

        let exists = tx
            .query_row("SELECT 1 FROM books WHERE id = ?1", params![book_id], |_| {
                Ok(())
            })
            .optional()
            .map_err(internal("Failed to get book"))?
            .is_some();
        if !exists {
            return Err(AppError::NotFound("Book not found".to_string()));
        }

        tx.execute(
            "INSERT INTO ratings (user_id, book_id, rating, review, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (user_id, book_id) DO UPDATE SET
                rating = excluded.rating,
                review = excluded.review,
                updated_at = excluded.updated_at",
            params![user_id, book_id, rating, review, now],
        )
        .map_err(internal("Failed to save rating"))?;

        let saved = tx
            .query_row(
                &format!(
                    "SELECT {} FROM ratings WHERE user_id = ?1 AND book_id = ?2",
                    RATING_COLUMNS
                ),
                params![user_id, book_id],
                Self::row_to_rating,
            )
            .map_err(internal("Failed to get rating"))?;

        let aggregate =
            recompute_aggregate(&tx, book_id).map_err(internal("Failed to recompute rating"))?;

        tx.commit().map_err(internal("Failed to commit"))?;
        Ok((saved, aggregate))
    }

    /// Delete the user's rating of a book and refresh the book's aggregate.
    /// Returns `None` when there was no such rating.
    pub fn delete_rating(&self, user_id: &str, book_id: &str) -> Result<Option<BookAggregate>> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(internal("Failed to begin transaction"))?;

        let rows = tx
            .execute(
                "DELETE FROM ratings WHERE user_id = ?1 AND book_id = ?2",
                params![user_id, book_id],
            )
            .map_err(internal("Failed to delete rating"))?;
        if rows == 0 {
            return Ok(None);
        }

        let aggregate =
            recompute_aggregate(&tx, book_id).map_err(internal("Failed to recompute rating"))?;

        tx.commit().map_err(internal("Failed to commit"))?;
        Ok(Some(aggregate))
    }

    /// Get a user's rating of a book.
    pub fn get_rating(&self, user_id: &str, book_id: &str) -> Result<Option<Rating>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM ratings WHERE user_id = ?1 AND book_id = ?2",
                RATING_COLUMNS
            ),
            params![user_id, book_id],
            Self::row_to_rating,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get rating: {}", e)))
    }

    /// Number of rating rows for a book.
    pub fn count_ratings(&self, book_id: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM ratings WHERE book_id = ?1",
            params![book_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to count ratings: {}", e)))
    }

    /// A user's ratings for the given books, keyed by book ID.
    pub fn get_user_ratings(
        &self,
        user_id: &str,
        book_ids: &[String],
    ) -> Result<HashMap<String, Rating>> {
        if book_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = self.conn.lock();
        let placeholders: Vec<String> = book_ids.iter().map(|_| "?".to_string()).collect();
        let sql = format!(
            "SELECT {} FROM ratings WHERE user_id = ? AND book_id IN ({})",
            RATING_COLUMNS,
            placeholders.join(",")
        );

        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&user_id];
        for id in book_ids {
            params.push(id);
        }

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let ratings = stmt
            .query_map(params_from_iter(params), Self::row_to_rating)
            .map_err(|e| AppError::Internal(format!("Failed to get ratings: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect ratings: {}", e)))?;

        Ok(ratings
            .into_iter()
            .map(|r| (r.book_id.clone(), r))
            .collect())
    }

    /// Most recently updated ratings of a book with their authors' names.
    pub fn recent_ratings(&self, book_id: &str, limit: i64) -> Result<Vec<AuthoredRating>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT r.id, r.user_id, r.book_id, r.rating, r.review, r.created_at, r.updated_at,
                        u.name
                 FROM ratings r
                 JOIN users u ON u.id = r.user_id
                 WHERE r.book_id = ?1
                 ORDER BY r.updated_at DESC, r.id DESC
                 LIMIT ?2",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let ratings = stmt
            .query_map(params![book_id, limit], |row| {
                Ok(AuthoredRating {
                    rating: Self::row_to_rating(row)?,
                    user_name: row.get(7)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to get ratings: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect ratings: {}", e)))?;

        Ok(ratings)
    }
}

/// Mean and count of a book's ratings, written back onto the book row.
fn recompute_aggregate(conn: &Connection, book_id: &str) -> rusqlite::Result<BookAggregate> {
    let aggregate = conn.query_row(
        "SELECT COALESCE(AVG(rating), 0.0), COUNT(*) FROM ratings WHERE book_id = ?1",
        params![book_id],
        |row| {
            Ok(BookAggregate {
                rating: row.get(0)?,
                rating_count: row.get(1)?,
            })
        },
    )?;

    conn.execute(
        "UPDATE books SET rating = ?1, rating_count = ?2 WHERE id = ?3",
        params![aggregate.rating, aggregate.rating_count, book_id],
    )?;

    Ok(aggregate)
}
