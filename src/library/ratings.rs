use crate::db::{BookAggregate, Database, Rating};
use crate::error::{AppError, FieldErrors, Result};
use serde::Serialize;

const MIN_RATING: i64 = 1;
const MAX_RATING: i64 = 5;
const MAX_REVIEW_LEN: usize = 1000;

/// Outcome of saving a rating.
#[derive(Debug, Clone, Serialize)]
pub struct RatingSaved {
    /// The stored rating.
    pub rating: Rating,
    /// The book's refreshed aggregate.
    pub book: BookAggregate,
}

/// Rating aggregator.
#[derive(Clone)]
pub struct Ratings {
    db: Database,
}

impl Ratings {
    /// Create a rating service.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or replace the user's rating of a book.
    ///
    /// Input is validated before the book is looked up, so a bad rating for an
    /// unknown book reports the validation error.
    pub fn upsert_rating(
        &self,
        user_id: &str,
        book_id: &str,
        rating: Option<i64>,
        review: Option<String>,
        now: i64,
    ) -> Result<RatingSaved> {
        let mut errors = FieldErrors::new();

        match rating {
            None => errors.add("rating", "The rating field is required."),
            Some(r) if !(MIN_RATING..=MAX_RATING).contains(&r) => errors.add(
                "rating",
                format!("The rating must be between {} and {}.", MIN_RATING, MAX_RATING),
            ),
            Some(_) => {}
        }

        let review = review.filter(|r| !r.trim().is_empty());
        if review
            .as_ref()
            .is_some_and(|r| r.chars().count() > MAX_REVIEW_LEN)
        {
            errors.add(
                "review",
                format!("The review may not be greater than {} characters.", MAX_REVIEW_LEN),
            );
        }

        errors.into_result()?;
        let stars = rating.unwrap_or(MIN_RATING);

        let (rating, book) =
            self.db
                .upsert_rating(user_id, book_id, stars, review.as_deref(), now)?;

        tracing::info!(
            user_id = %user_id,
            book_id = %book_id,
            rating = stars,
            average = book.rating,
            count = book.rating_count,
            "Rating saved"
        );

        Ok(RatingSaved { rating, book })
    }

    /// Remove the user's rating of a book.
    pub fn remove_rating(&self, user_id: &str, book_id: &str) -> Result<BookAggregate> {
        let aggregate = self
            .db
            .delete_rating(user_id, book_id)?
            .ok_or_else(|| AppError::NotFound("Rating not found".to_string()))?;

        tracing::info!(user_id = %user_id, book_id = %book_id, "Rating removed");
        Ok(aggregate)
    }
}
