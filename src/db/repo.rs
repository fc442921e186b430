use super::model::{CandidateDevice, UnfinishedNotification};
use crate::model::{NotificationDetails, NotificationStatus};
use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, make sure the parent directory exists so the
/// first connection can create the database file. In-memory URLs and other
/// schemes pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }
    let path = url["sqlite:".len()..].trim_start_matches("//");
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    url.to_string()
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// --- audience directory ----------------------------------------------------

#[instrument(skip_all)]
pub async fn create_country(pool: &Pool, name: &str) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO countries (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn country_exists(pool: &Pool, country_id: i64) -> Result<bool> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM countries WHERE id = ?")
        .bind(country_id)
        .fetch_optional(pool)
        .await?;
    Ok(id.is_some())
}

#[instrument(skip_all)]
pub async fn create_user(pool: &Pool, country_id: i64) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO users (country_id) VALUES (?) RETURNING id")
        .bind(country_id)
        .fetch_one(pool)
        .await?;
    Ok(rec.get("id"))
}

/// Reassign a user to another country. Takes effect on the next cycle: the
/// dispatcher always resolves devices through the current assignment.
#[instrument(skip_all)]
pub async fn move_user(pool: &Pool, user_id: i64, country_id: i64) -> Result<()> {
    sqlx::query("UPDATE users SET country_id = ? WHERE id = ?")
        .bind(country_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn register_device(pool: &Pool, user_id: i64, token: &str) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO devices (user_id, token) VALUES (?, ?) RETURNING id")
        .bind(user_id)
        .bind(token)
        .fetch_one(pool)
        .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn expire_device(pool: &Pool, device_id: i64) -> Result<()> {
    sqlx::query("UPDATE devices SET expired = 1 WHERE id = ?")
        .bind(device_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Active devices for the given countries, resolved through each owning
/// user's current country. Ordered by device id so batch paging walks the
/// audience in a stable order.
#[instrument(skip_all)]
pub async fn active_devices_by_countries(
    pool: &Pool,
    country_ids: &[i64],
) -> Result<Vec<CandidateDevice>> {
    if country_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; country_ids.len()].join(", ");
    let sql = format!(
        "SELECT d.token, d.user_id, u.country_id FROM devices d \
         INNER JOIN users u ON u.id = d.user_id \
         WHERE d.expired = 0 AND u.country_id IN ({placeholders}) \
         ORDER BY d.id"
    );
    let mut query = sqlx::query(&sql);
    for country_id in country_ids {
        query = query.bind(country_id);
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| CandidateDevice {
            token: row.get("token"),
            user_id: row.get("user_id"),
            country_id: row.get("country_id"),
        })
        .collect())
}

// --- notifications ---------------------------------------------------------

#[instrument(skip_all)]
pub async fn create_notification(
    pool: &Pool,
    title: &str,
    message: &str,
    country_id: i64,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO notifications (country_id, status, title, message) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(country_id)
    .bind(NotificationStatus::InQueue.as_str())
    .bind(title)
    .bind(message)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn find_details(pool: &Pool, notification_id: i64) -> Result<Option<NotificationDetails>> {
    let row = sqlx::query(
        "SELECT id, title, message, sent, failed, in_progress, in_queue \
         FROM notifications WHERE id = ?",
    )
    .bind(notification_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| NotificationDetails {
        id: row.get("id"),
        title: row.get("title"),
        message: row.get("message"),
        sent: row.get("sent"),
        failed: row.get("failed"),
        in_progress: row.get("in_progress"),
        in_queue: row.get("in_queue"),
    }))
}

/// Notifications that still have an audience to page through, in ascending
/// id order so cycles are reproducible.
#[instrument(skip_all)]
pub async fn unfinished_notifications(pool: &Pool) -> Result<Vec<UnfinishedNotification>> {
    let rows = sqlx::query(
        "SELECT id, country_id, title, message FROM notifications WHERE status != ? ORDER BY id",
    )
    .bind(NotificationStatus::Finished.as_str())
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| UnfinishedNotification {
            id: row.get("id"),
            country_id: row.get("country_id"),
            title: row.get("title"),
            message: row.get("message"),
        })
        .collect())
}

/// Fold one cycle's delivery outcome into the stored totals.
#[instrument(skip_all)]
pub async fn record_delivery(pool: &Pool, notification_id: i64, sent: i64, failed: i64) -> Result<()> {
    sqlx::query("UPDATE notifications SET sent = sent + ?, failed = failed + ? WHERE id = ?")
        .bind(sent)
        .bind(failed)
        .bind(notification_id)
        .execute(pool)
        .await?;
    Ok(())
}

// --- resume log ------------------------------------------------------------

/// Full resume mapping: notification id -> user ids claimed by earlier
/// cycles. A notification without an entry has no prior progress.
#[instrument(skip_all)]
pub async fn load_resume_log(pool: &Pool) -> Result<HashMap<i64, HashSet<i64>>> {
    let rows = sqlx::query("SELECT notification_id, user_id FROM resume_log")
        .fetch_all(pool)
        .await?;
    let mut log: HashMap<i64, HashSet<i64>> = HashMap::new();
    for row in rows {
        log.entry(row.get("notification_id"))
            .or_default()
            .insert(row.get("user_id"));
    }
    Ok(log)
}

/// Replace the whole persisted resume state in one transaction. A reader
/// sees either the previous mapping or the new one, never a partial write.
#[instrument(skip_all)]
pub async fn save_resume_log(pool: &Pool, log: &HashMap<i64, HashSet<i64>>) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM resume_log").execute(&mut *tx).await?;
    for (notification_id, user_ids) in log {
        for user_id in user_ids {
            sqlx::query("INSERT INTO resume_log (notification_id, user_id) VALUES (?, ?)")
                .bind(notification_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
    }
    tx.commit().await?;
    Ok(())
}

/// Pre-send checkpoint for one notification: record the users claimed this
/// cycle (or drop the entry set once the audience is drained) and move the
/// progress counters, in a single transaction. The dispatcher commits this
/// before attempting any send, so a claimed device is never redelivered
/// after a restart.
#[instrument(skip_all)]
pub async fn checkpoint_claims(
    pool: &Pool,
    notification_id: i64,
    claimed_user_ids: &[i64],
    in_progress_delta: i64,
    in_queue: i64,
    status: NotificationStatus,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    if in_queue > 0 {
        for user_id in claimed_user_ids {
            sqlx::query("INSERT OR IGNORE INTO resume_log (notification_id, user_id) VALUES (?, ?)")
                .bind(notification_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
    } else {
        sqlx::query("DELETE FROM resume_log WHERE notification_id = ?")
            .bind(notification_id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query(
        "UPDATE notifications SET in_progress = in_progress + ?, in_queue = ?, status = ? WHERE id = ?",
    )
    .bind(in_progress_delta)
    .bind(in_queue)
    .bind(status.as_str())
    .bind(notification_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn device_query_follows_current_user_country() {
        let pool = setup_pool().await;
        let de = create_country(&pool, "Germany").await.unwrap();
        let fr = create_country(&pool, "France").await.unwrap();
        let user = create_user(&pool, de).await.unwrap();
        register_device(&pool, user, "tok-1").await.unwrap();

        let devices = active_devices_by_countries(&pool, &[de]).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].country_id, de);

        move_user(&pool, user, fr).await.unwrap();
        let devices = active_devices_by_countries(&pool, &[de]).await.unwrap();
        assert!(devices.is_empty());
        let devices = active_devices_by_countries(&pool, &[fr]).await.unwrap();
        assert_eq!(devices.len(), 1);
    }

    #[tokio::test]
    async fn expired_devices_are_filtered() {
        let pool = setup_pool().await;
        let country = create_country(&pool, "Japan").await.unwrap();
        let user = create_user(&pool, country).await.unwrap();
        let device = register_device(&pool, user, "tok-1").await.unwrap();
        register_device(&pool, user, "tok-2").await.unwrap();

        expire_device(&pool, device).await.unwrap();
        let devices = active_devices_by_countries(&pool, &[country]).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].token, "tok-2");
    }

    #[tokio::test]
    async fn resume_log_save_of_load_is_a_noop() {
        let pool = setup_pool().await;
        let country = create_country(&pool, "Italy").await.unwrap();
        let n1 = create_notification(&pool, "a", "b", country).await.unwrap();
        let n2 = create_notification(&pool, "c", "d", country).await.unwrap();

        checkpoint_claims(&pool, n1, &[10, 11], 2, 5, NotificationStatus::Started)
            .await
            .unwrap();
        checkpoint_claims(&pool, n2, &[10], 1, 3, NotificationStatus::Started)
            .await
            .unwrap();

        let log = load_resume_log(&pool).await.unwrap();
        save_resume_log(&pool, &log).await.unwrap();
        assert_eq!(load_resume_log(&pool).await.unwrap(), log);
        assert_eq!(log[&n1], HashSet::from([10, 11]));
        assert_eq!(log[&n2], HashSet::from([10]));
    }

    #[tokio::test]
    async fn drained_checkpoint_drops_the_entry_set() {
        let pool = setup_pool().await;
        let country = create_country(&pool, "Spain").await.unwrap();
        let id = create_notification(&pool, "a", "b", country).await.unwrap();

        checkpoint_claims(&pool, id, &[1, 2], 2, 1, NotificationStatus::Started)
            .await
            .unwrap();
        assert!(load_resume_log(&pool).await.unwrap().contains_key(&id));

        checkpoint_claims(&pool, id, &[3], 1, 0, NotificationStatus::Finished)
            .await
            .unwrap();
        assert!(!load_resume_log(&pool).await.unwrap().contains_key(&id));

        let status: String = sqlx::query_scalar("SELECT status FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(NotificationStatus::parse_state(&status), Some(NotificationStatus::Finished));

        let in_progress: i64 =
            sqlx::query_scalar("SELECT in_progress FROM notifications WHERE id = ?")
                .bind(id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(in_progress, 3);
    }
}
