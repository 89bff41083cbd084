mod schema;

pub use schema::{BookFilter, BookQuery, Database};

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular reader.
    Member,
    /// Can manage the catalog and read everything.
    Admin,
}

impl Role {
    /// Stored/serialized name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }

    /// Parse a role name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "member" | "user" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Subscription label as stored on the user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    /// No subscription.
    Free,
    /// Premium, valid while the expiry timestamp is in the future.
    Premium,
}

impl SubscriptionType {
    /// Stored/serialized name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Free => "free",
            SubscriptionType::Premium => "premium",
        }
    }

    /// Parse a subscription name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(SubscriptionType::Free),
            "premium" => Some(SubscriptionType::Premium),
            _ => None,
        }
    }
}

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                <$ty>::parse(text).ok_or_else(|| FromSqlError::Other(text.to_string().into()))
            }
        }
    };
}

text_enum_sql!(Role);
text_enum_sql!(SubscriptionType);

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Account role.
    pub role: Role,
    /// Stored subscription label (see `subscription` for the effective state).
    pub subscription_type: SubscriptionType,
    /// Subscription expiry timestamp.
    pub subscription_expires_at: Option<i64>,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
}

impl User {
    /// Whether the user is an administrator.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// User ID.
    pub user_id: String,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// Book record.
///
/// `rating` and `rating_count` mirror the book's ratings and are only written
/// by the rating operations of [`Database`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Book ID.
    pub id: String,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Description.
    pub description: String,
    /// Blob path of the PDF.
    pub pdf_file: String,
    /// Blob path of the cover image.
    pub cover_image: Option<String>,
    /// Page count (0 when unknown).
    pub pages: i64,
    /// ISBN.
    pub isbn: Option<String>,
    /// Year of publication.
    pub published_year: Option<i64>,
    /// Whether reading requires a premium subscription.
    pub is_premium: bool,
    /// Mean rating, 0 when unrated.
    pub rating: f64,
    /// Number of ratings.
    pub rating_count: i64,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Cached rating aggregate of a book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookAggregate {
    /// Mean rating, 0 when unrated.
    pub rating: f64,
    /// Number of ratings.
    pub rating_count: i64,
}

/// A user's rating of a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    /// Rating ID.
    pub id: i64,
    /// User ID.
    pub user_id: String,
    /// Book ID.
    pub book_id: String,
    /// Stars, 1 to 5.
    pub rating: i64,
    /// Optional review text.
    pub review: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// A rating together with its author's display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthoredRating {
    /// The rating.
    #[serde(flatten)]
    pub rating: Rating,
    /// Display name of the rater.
    pub user_name: String,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
