//! §4.8 Scheduler Interface: cron-expression driven periodic triggering of
//! the Sync Runner.
//!
//! The abstract contract is implementation-agnostic ("any cron-capable
//! workflow engine"); this ships a self-contained in-process implementation
//! built on the `cron` crate rather than depending on an external workflow
//! engine, since none is named as a fixed collaborator in scope here.

use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[async_trait]
pub trait TriggerSink: Send + Sync {
    /// Runs (or queues) one Sync Job for `sync_id`, returning its id.
    /// Implementations are responsible for the "a running job blocks a
    /// concurrent overlapping fire" rule; the scheduler only guarantees it
    /// calls this at most once per due fire time.
    async fn trigger(&self, sync_id: Uuid) -> CoreResult<Uuid>;
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn create_or_update_schedule(&self, sync_id: Uuid, cron_expr: &str) -> CoreResult<()>;
    async fn delete_all_schedules_for_sync(&self, sync_id: Uuid) -> CoreResult<()>;
    async fn trigger(&self, sync_id: Uuid) -> CoreResult<Uuid>;
}

struct ScheduleEntry {
    schedule: Schedule,
    /// Guards against a slow-running job's next fire overlapping with it;
    /// held for the duration of a triggered run.
    run_lock: Arc<Mutex<()>>,
    last_checked: Option<DateTime<Utc>>,
}

/// Polls its registered schedules once per tick and fires any that are due
/// since the last poll, serializing overlapping fires for the same
/// `sync_id` via a per-entry lock.
pub struct CronScheduler {
    entries: RwLock<HashMap<Uuid, ScheduleEntry>>,
    sink: Arc<dyn TriggerSink>,
    poll_interval: std::time::Duration,
}

impl CronScheduler {
    pub fn new(sink: Arc<dyn TriggerSink>, poll_interval: std::time::Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            sink,
            poll_interval,
        }
    }

    /// Spawns the background polling loop. Dropping the returned handle
    /// does not stop the loop; call `.abort()` explicitly to stop it.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.poll_interval);
            loop {
                ticker.tick().await;
                this.poll_once().await;
            }
        })
    }

    async fn poll_once(&self) {
        let now = Utc::now();
        let due: Vec<(Uuid, Arc<Mutex<()>>)> = {
            let mut entries = self.entries.write().await;
            let mut due = Vec::new();
            for (sync_id, entry) in entries.iter_mut() {
                let since = entry.last_checked.unwrap_or(now);
                let is_due = entry
                    .schedule
                    .after(&since)
                    .next()
                    .map(|next_fire| next_fire <= now)
                    .unwrap_or(false);
                entry.last_checked = Some(now);
                if is_due {
                    due.push((*sync_id, Arc::clone(&entry.run_lock)));
                }
            }
            due
        };

        for (sync_id, run_lock) in due {
            let sink = Arc::clone(&self.sink);
            tokio::spawn(async move {
                let Ok(_guard) = run_lock.try_lock() else {
                    // Previous fire for this sync_id is still running; skip
                    // this fire rather than overlap it.
                    return;
                };
                if let Err(err) = sink.trigger(sync_id).await {
                    tracing::warn!(%sync_id, error = %err, "scheduled trigger failed");
                }
            });
        }
    }
}

#[async_trait]
impl Scheduler for CronScheduler {
    async fn create_or_update_schedule(&self, sync_id: Uuid, cron_expr: &str) -> CoreResult<()> {
        let schedule = Schedule::from_str(cron_expr)
            .map_err(|e| CoreError::Validation(format!("invalid cron expression: {e}")))?;
        let mut entries = self.entries.write().await;
        entries.insert(
            sync_id,
            ScheduleEntry {
                schedule,
                run_lock: Arc::new(Mutex::new(())),
                last_checked: None,
            },
        );
        Ok(())
    }

    async fn delete_all_schedules_for_sync(&self, sync_id: Uuid) -> CoreResult<()> {
        self.entries.write().await.remove(&sync_id);
        Ok(())
    }

    async fn trigger(&self, sync_id: Uuid) -> CoreResult<Uuid> {
        let run_lock = {
            let entries = self.entries.read().await;
            entries
                .get(&sync_id)
                .map(|e| Arc::clone(&e.run_lock))
                .ok_or_else(|| CoreError::NotFound(format!("no schedule for sync {sync_id}")))?
        };
        let _guard = run_lock.lock().await;
        self.sink.trigger(sync_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TriggerSink for CountingSink {
        async fn trigger(&self, _sync_id: Uuid) -> CoreResult<Uuid> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Uuid::new_v4())
        }
    }

    #[tokio::test]
    async fn rejects_invalid_cron_expression() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });
        let scheduler = CronScheduler::new(sink, std::time::Duration::from_secs(60));
        let result = scheduler
            .create_or_update_schedule(Uuid::new_v4(), "not a cron expression")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn trigger_without_schedule_is_not_found() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });
        let scheduler = CronScheduler::new(sink, std::time::Duration::from_secs(60));
        let err = scheduler.trigger(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn manual_trigger_invokes_sink() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });
        let scheduler = CronScheduler::new(Arc::clone(&sink) as Arc<dyn TriggerSink>, std::time::Duration::from_secs(60));
        let sync_id = Uuid::new_v4();
        scheduler
            .create_or_update_schedule(sync_id, "0 0 * * * *")
            .await
            .unwrap();
        scheduler.trigger(sync_id).await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }
}
