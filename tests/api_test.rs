use async_trait::async_trait;
use push_courier::db;
use push_courier::dispatch::{BatchDispatcher, DispatchConfig};
use push_courier::model::NotificationStatus;
use push_courier::push::PushSender;
use push_courier::service::{self, SubmitError};
use push_courier::api::{self, ActionRequest};
use serde_json::json;

async fn setup_pool() -> db::Pool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

struct AcceptAll;

#[async_trait]
impl PushSender for AcceptAll {
    async fn send(&self, _title: &str, _message: &str, _token: &str) -> bool {
        true
    }
}

async fn notification_count(pool: &db::Pool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn submit_creates_in_queue_notification() {
    let pool = setup_pool().await;
    let country = db::create_country(&pool, "Germany").await.unwrap();

    let id = service::submit(&pool, "Hello", "World", country).await.unwrap();
    let details = service::details(&pool, id).await.unwrap().unwrap();
    assert_eq!(details.title, "Hello");
    assert_eq!(details.message, "World");
    assert_eq!(
        (details.sent, details.failed, details.in_progress, details.in_queue),
        (0, 0, 0, 0)
    );

    let status: String = sqlx::query_scalar("SELECT status FROM notifications WHERE id = ?")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(NotificationStatus::parse_state(&status), Some(NotificationStatus::InQueue));

    // Ids are fresh per submission.
    let other = service::submit(&pool, "Next", "One", country).await.unwrap();
    assert_ne!(id, other);
}

#[tokio::test]
async fn submit_rejects_overlong_fields_without_writing() {
    let pool = setup_pool().await;
    let country = db::create_country(&pool, "Germany").await.unwrap();

    let long = "x".repeat(256);
    let err = service::submit(&pool, &long, "World", country).await.unwrap_err();
    match err {
        SubmitError::Validation(errors) => {
            assert_eq!(errors.keys().copied().collect::<Vec<_>>(), vec!["title"]);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(notification_count(&pool).await, 0);

    // 255 characters exactly is accepted.
    let max = "x".repeat(255);
    service::submit(&pool, &max, "World", country).await.unwrap();
    assert_eq!(notification_count(&pool).await, 1);
}

#[tokio::test]
async fn submit_rejects_unknown_country_without_writing() {
    let pool = setup_pool().await;
    db::create_country(&pool, "Germany").await.unwrap();

    let err = service::submit(&pool, "Hello", "World", 999).await.unwrap_err();
    assert!(matches!(err, SubmitError::CountryNotFound(999)));
    assert_eq!(notification_count(&pool).await, 0);
}

#[tokio::test]
async fn details_is_stable_without_an_intervening_cycle() {
    let pool = setup_pool().await;
    let country = db::create_country(&pool, "Germany").await.unwrap();
    let id = service::submit(&pool, "Hello", "World", country).await.unwrap();

    let first = service::details(&pool, id).await.unwrap().unwrap();
    let second = service::details(&pool, id).await.unwrap().unwrap();
    assert_eq!(first, second);

    assert!(service::details(&pool, id + 1).await.unwrap().is_none());
}

#[tokio::test]
async fn envelopes_match_the_wire_shape() {
    let pool = setup_pool().await;
    let country = db::create_country(&pool, "Germany").await.unwrap();

    let response = api::send(&pool, "Hello", "World", country).await;
    assert_eq!(response["success"], json!(true));
    let id = response["result"]["notification_id"].as_i64().unwrap();

    let response = api::details(&pool, id).await;
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["result"]["title"], json!("Hello"));
    assert_eq!(response["result"]["in_queue"], json!(0));

    let response = api::details(&pool, 9999).await;
    assert_eq!(response, json!({ "success": false, "result": null }));

    let response = api::send(&pool, "Hello", "World", 9999).await;
    assert_eq!(response, json!({ "success": false, "result": null }));

    let long = "x".repeat(300);
    let response = api::send(&pool, &long, "World", country).await;
    assert_eq!(response["success"], json!(false));
    assert_eq!(response["message"], json!("Invalid data"));
    assert!(response["errors"]["title"][0]
        .as_str()
        .unwrap()
        .contains("255"));
}

#[tokio::test]
async fn cron_action_runs_a_cycle() {
    let pool = setup_pool().await;
    let dispatcher = BatchDispatcher::new(DispatchConfig {
        batch_per_cycle: 100,
        send_concurrency: 1,
    });

    // Empty queue: success with an empty summary list.
    let response = api::handle(&pool, &dispatcher, &AcceptAll, ActionRequest::Cron).await;
    assert_eq!(response, json!({ "success": true, "result": [] }));

    let country = db::create_country(&pool, "Germany").await.unwrap();
    let user = db::create_user(&pool, country).await.unwrap();
    db::register_device(&pool, user, "tok-1").await.unwrap();

    let request: ActionRequest = serde_json::from_value(json!({
        "action": "send", "title": "Hello", "message": "World", "country_id": country
    }))
    .unwrap();
    let response = api::handle(&pool, &dispatcher, &AcceptAll, request).await;
    let id = response["result"]["notification_id"].as_i64().unwrap();

    let response = api::handle(&pool, &dispatcher, &AcceptAll, ActionRequest::Cron).await;
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["result"][0]["notification_id"], json!(id));
    assert_eq!(response["result"][0]["sent"], json!(1));
    assert_eq!(response["result"][0]["failed"], json!(0));
}
