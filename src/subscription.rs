//! Premium subscription state and entitlement checks.
//!
//! The stored `subscription_type` may lag behind reality: a premium user whose
//! expiry has passed is still labelled `premium` until the next entitlement
//! check observes it and writes `free` back.

use crate::db::{Database, SubscriptionType, User, timestamp_to_datetime};
use crate::error::{AppError, Result};
use chrono::Months;
use serde::Serialize;

/// Length of a subscription period.
const PERIOD: Months = Months::new(1);

/// Whether the user holds an unexpired premium subscription at `now`.
pub fn is_active(user: &User, now: i64) -> bool {
    user.subscription_type == SubscriptionType::Premium
        && user.subscription_expires_at.is_some_and(|at| at > now)
}

/// Whether the stored label says premium although the expiry has passed.
pub fn is_lapsed(user: &User, now: i64) -> bool {
    user.subscription_type == SubscriptionType::Premium
        && user.subscription_expires_at.is_some_and(|at| at <= now)
}

/// Expiry of a subscription started at `now`.
pub fn period_end(now: i64) -> i64 {
    let start = timestamp_to_datetime(now);
    start
        .checked_add_months(PERIOD)
        .map(|end| end.timestamp())
        .unwrap_or(now + 30 * 24 * 60 * 60)
}

/// Effective subscription state reported to clients.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    /// Stored label after reconciliation.
    pub subscription_type: SubscriptionType,
    /// Expiry timestamp.
    pub expires_at: Option<i64>,
    /// Whether premium content is currently unlocked.
    pub is_premium: bool,
}

/// Subscription service.
#[derive(Clone)]
pub struct Entitlements {
    db: Database,
}

impl Entitlements {
    /// Create a new subscription service.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist `free` for a lapsed premium user and return the corrected
    /// record. Users that are not lapsed are returned unchanged.
    pub fn reconcile_expiry(&self, user: &User, now: i64) -> Result<User> {
        if !is_lapsed(user, now) {
            return Ok(user.clone());
        }

        self.db.update_subscription(
            &user.id,
            SubscriptionType::Free,
            user.subscription_expires_at,
        )?;

        tracing::info!(
            user_id = %user.id,
            expired_at = ?user.subscription_expires_at,
            "Premium subscription expired"
        );

        Ok(User {
            subscription_type: SubscriptionType::Free,
            ..user.clone()
        })
    }

    /// Whether the user may read premium content at `now`. A lapsed
    /// subscription is written back as `free` on the way.
    pub fn is_premium(&self, user: &mut User, now: i64) -> Result<bool> {
        if user.subscription_type != SubscriptionType::Premium {
            return Ok(false);
        }
        if user.subscription_expires_at.is_none() {
            return Ok(false);
        }
        if is_active(user, now) {
            return Ok(true);
        }

        *user = self.reconcile_expiry(user, now)?;
        Ok(false)
    }

    /// Start a one-month premium period.
    pub fn subscribe(&self, user: &mut User, now: i64) -> Result<User> {
        if self.is_premium(user, now)? {
            return Err(AppError::AlreadyPremium);
        }

        let expires_at = period_end(now);
        self.db
            .update_subscription(&user.id, SubscriptionType::Premium, Some(expires_at))?;

        tracing::info!(user_id = %user.id, expires_at, "Premium subscription activated");

        user.subscription_type = SubscriptionType::Premium;
        user.subscription_expires_at = Some(expires_at);
        Ok(user.clone())
    }

    /// End the subscription immediately.
    pub fn cancel(&self, user: &mut User) -> Result<User> {
        self.db
            .update_subscription(&user.id, SubscriptionType::Free, None)?;

        tracing::info!(user_id = %user.id, "Subscription cancelled");

        user.subscription_type = SubscriptionType::Free;
        user.subscription_expires_at = None;
        Ok(user.clone())
    }

    /// Reconciled subscription state.
    pub fn status(&self, user: &mut User, now: i64) -> Result<SubscriptionStatus> {
        let is_premium = self.is_premium(user, now)?;
        Ok(SubscriptionStatus {
            subscription_type: user.subscription_type,
            expires_at: user.subscription_expires_at,
            is_premium,
        })
    }
}
