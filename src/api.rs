//! Transport-agnostic action surface: an action request in, a
//! `{success, result}` envelope out. Callers (binaries, tests, an eventual
//! HTTP layer) decide how requests arrive and where envelopes go.

use crate::db::Pool;
use crate::dispatch::BatchDispatcher;
use crate::push::PushSender;
use crate::service::{self, SubmitError};
use crate::validate::ValidationErrors;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    Send {
        title: String,
        message: String,
        country_id: i64,
    },
    Details {
        notification_id: i64,
    },
    Cron,
}

/// The shape every action responds with.
pub fn envelope(success: bool, result: Value) -> Value {
    json!({ "success": success, "result": result })
}

fn validation_failure(errors: &ValidationErrors) -> Value {
    json!({ "success": false, "message": "Invalid data", "errors": errors })
}

/// Enqueue a notification and render the response envelope.
pub async fn send(pool: &Pool, title: &str, message: &str, country_id: i64) -> Value {
    match service::submit(pool, title, message, country_id).await {
        Ok(id) => envelope(true, json!({ "notification_id": id })),
        Err(SubmitError::Validation(errors)) => validation_failure(&errors),
        Err(SubmitError::CountryNotFound(_)) => envelope(false, Value::Null),
        Err(SubmitError::Store(err)) => {
            warn!(?err, "submit failed");
            envelope(false, Value::Null)
        }
    }
}

/// Look up a notification snapshot and render the response envelope.
pub async fn details(pool: &Pool, notification_id: i64) -> Value {
    match service::details(pool, notification_id).await {
        Ok(Some(details)) => envelope(true, serde_json::to_value(details).unwrap_or(Value::Null)),
        Ok(None) => envelope(false, Value::Null),
        Err(err) => {
            warn!(?err, "details lookup failed");
            envelope(false, Value::Null)
        }
    }
}

/// Run one dispatch cycle and render its summaries.
pub async fn cron(pool: &Pool, dispatcher: &BatchDispatcher, sender: &dyn PushSender) -> Value {
    match dispatcher.run_cycle(pool, sender).await {
        Ok(summaries) => envelope(true, serde_json::to_value(summaries).unwrap_or(Value::Null)),
        Err(err) => {
            warn!(?err, "cycle failed");
            envelope(false, Value::Null)
        }
    }
}

/// Execute one parsed action against the store.
pub async fn handle(
    pool: &Pool,
    dispatcher: &BatchDispatcher,
    sender: &dyn PushSender,
    request: ActionRequest,
) -> Value {
    match request {
        ActionRequest::Send {
            title,
            message,
            country_id,
        } => send(pool, &title, &message, country_id).await,
        ActionRequest::Details { notification_id } => details(pool, notification_id).await,
        ActionRequest::Cron => cron(pool, dispatcher, sender).await,
    }
}
