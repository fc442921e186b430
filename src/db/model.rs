//! Row types returned by the repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

/// Notification slice the dispatcher pages through. Counter columns are not
/// loaded: all counter updates are relative, applied in SQL.
#[derive(Debug, Clone)]
pub struct UnfinishedNotification {
    pub id: i64,
    pub country_id: Option<i64>,
    pub title: String,
    pub message: String,
}

/// Active device row, joined to its owning user's current country.
#[derive(Debug, Clone)]
pub struct CandidateDevice {
    pub token: String,
    pub user_id: i64,
    pub country_id: i64,
}
