//! The cycle engine: pages each notification's country audience through the
//! push gateway in bounded batches, checkpointing progress before every send
//! so the next cycle resumes where this one stopped.

use crate::db::{self, CandidateDevice, Pool, UnfinishedNotification};
use crate::model::{CycleSummary, NotificationStatus};
use crate::push::PushSender;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument, warn};

/// Dispatcher tunables, injected at construction.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Maximum devices sent per notification per cycle.
    pub batch_per_cycle: usize,
    /// In-flight sends within one batch; 1 keeps delivery sequential.
    pub send_concurrency: usize,
}

pub struct BatchDispatcher {
    cfg: DispatchConfig,
}

impl BatchDispatcher {
    pub fn new(cfg: DispatchConfig) -> Self {
        Self { cfg }
    }

    /// Run one dispatch cycle. Returns one summary per unfinished
    /// notification, in ascending notification id order; the summary carries
    /// this cycle's delivery deltas.
    ///
    /// Cycles must not overlap: there is no mutual exclusion here, and two
    /// concurrent cycles can claim the same devices twice.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self, pool: &Pool, sender: &dyn PushSender) -> Result<Vec<CycleSummary>> {
        let notifications = db::unfinished_notifications(pool).await?;
        if notifications.is_empty() {
            return Ok(Vec::new());
        }

        let mut country_ids: Vec<i64> = notifications.iter().filter_map(|n| n.country_id).collect();
        country_ids.sort_unstable();
        country_ids.dedup();

        let mut by_country: HashMap<i64, Vec<CandidateDevice>> = HashMap::new();
        for device in db::active_devices_by_countries(pool, &country_ids).await? {
            by_country.entry(device.country_id).or_default().push(device);
        }

        let resume = db::load_resume_log(pool).await?;

        let mut summaries = Vec::with_capacity(notifications.len());
        for notification in &notifications {
            match self
                .dispatch_one(pool, sender, &by_country, &resume, notification)
                .await
            {
                Ok(summary) => summaries.push(summary),
                // One notification failing to persist must not starve the
                // rest of the cycle.
                Err(err) => {
                    warn!(
                        ?err,
                        notification_id = notification.id,
                        "dispatch failed; continuing cycle"
                    );
                }
            }
        }
        Ok(summaries)
    }

    async fn dispatch_one(
        &self,
        pool: &Pool,
        sender: &dyn PushSender,
        by_country: &HashMap<i64, Vec<CandidateDevice>>,
        resume: &HashMap<i64, HashSet<i64>>,
        notification: &UnfinishedNotification,
    ) -> Result<CycleSummary> {
        let candidates: &[CandidateDevice] = notification
            .country_id
            .and_then(|country_id| by_country.get(&country_id))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let claimed = resume.get(&notification.id);

        let pending: Vec<&CandidateDevice> = candidates
            .iter()
            .filter(|device| claimed.map_or(true, |ids| !ids.contains(&device.user_id)))
            .collect();

        let split = pending.len().min(self.cfg.batch_per_cycle);
        let (this_run, next_run) = pending.split_at(split);
        let in_queue = next_run.len() as i64;
        let status = if next_run.is_empty() {
            NotificationStatus::Finished
        } else {
            NotificationStatus::Started
        };

        // Claim before send: once this commits, a restart can under-report
        // sent/failed for this batch but never redeliver to its devices.
        let claimed_now: Vec<i64> = this_run.iter().map(|device| device.user_id).collect();
        db::checkpoint_claims(
            pool,
            notification.id,
            &claimed_now,
            this_run.len() as i64,
            in_queue,
            status,
        )
        .await?;

        let (sent, failed) = self.send_batch(sender, notification, this_run).await;
        db::record_delivery(pool, notification.id, sent, failed).await?;

        info!(
            notification_id = notification.id,
            sent, failed, in_queue, "dispatched batch"
        );

        Ok(CycleSummary {
            notification_id: notification.id,
            title: notification.title.clone(),
            message: notification.message.clone(),
            sent,
            failed,
        })
    }

    /// Deliver one batch, bounded by `send_concurrency`. No retry: a refused
    /// delivery only moves the failed counter.
    async fn send_batch(
        &self,
        sender: &dyn PushSender,
        notification: &UnfinishedNotification,
        batch: &[&CandidateDevice],
    ) -> (i64, i64) {
        let results: Vec<bool> = stream::iter(batch)
            .map(|device| sender.send(&notification.title, &notification.message, &device.token))
            .buffer_unordered(self.cfg.send_concurrency.max(1))
            .collect()
            .await;
        let sent = results.iter().filter(|delivered| **delivered).count() as i64;
        let failed = results.len() as i64 - sent;
        (sent, failed)
    }
}
