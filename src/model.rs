use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    InQueue,
    Started,
    Finished,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::InQueue => "IN_QUEUE",
            NotificationStatus::Started => "STARTED",
            NotificationStatus::Finished => "FINISHED",
        }
    }

    pub fn parse_state(s: &str) -> Option<Self> {
        match s {
            "IN_QUEUE" => Some(NotificationStatus::InQueue),
            "STARTED" => Some(NotificationStatus::Started),
            "FINISHED" => Some(NotificationStatus::Finished),
            _ => None,
        }
    }
}

/// Per-notification outcome of one cycle. `sent` and `failed` are this
/// cycle's deltas, not the stored totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub notification_id: i64,
    pub title: String,
    pub message: String,
    pub sent: i64,
    pub failed: i64,
}

/// Read-only snapshot returned by the details lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationDetails {
    pub id: i64,
    pub title: String,
    pub message: String,
    pub sent: i64,
    pub failed: i64,
    pub in_progress: i64,
    pub in_queue: i64,
}
