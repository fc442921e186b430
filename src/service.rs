//! Submission and read-side operations over the notification store.

use crate::db::{self, Pool};
use crate::model::NotificationDetails;
use crate::validate::{self, ValidationErrors, SUBMIT_RULES};
use anyhow::Result;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid data")]
    Validation(ValidationErrors),
    #[error("country {0} does not exist")]
    CountryNotFound(i64),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Validate and enqueue a notification. Returns the fresh notification id.
/// Nothing is written on any failure path.
#[instrument(skip_all)]
pub async fn submit(pool: &Pool, title: &str, message: &str, country_id: i64) -> Result<i64, SubmitError> {
    let errors = validate::check(SUBMIT_RULES, &[("title", title), ("message", message)]);
    if !errors.is_empty() {
        return Err(SubmitError::Validation(errors));
    }
    if !db::country_exists(pool, country_id).await? {
        return Err(SubmitError::CountryNotFound(country_id));
    }
    Ok(db::create_notification(pool, title, message, country_id).await?)
}

/// Point-in-time snapshot of one notification, or `None` for an unknown id.
/// Pure read; calling it never changes store state.
#[instrument(skip_all)]
pub async fn details(pool: &Pool, notification_id: i64) -> Result<Option<NotificationDetails>> {
    db::find_details(pool, notification_id).await
}
