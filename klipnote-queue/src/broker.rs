//! Broker Queues (spec §4.2): two independent durable FIFO queues keyed by
//! model, with lease-based visibility timeout redelivery.
//!
//! Grounded on the teacher's `MemoryBackend`
//! (`dog-queue::backend::memory::storage`) and `LeaseReaper`
//! (`dog-queue::backend::memory::reaper`), collapsed to this spec's
//! single-tenant, two-named-queue shape: no priority ordering, no
//! idempotency-key dedup (that lives in the Upload Pipeline's job
//! admission, not the broker), and the reaper's redelivery/exhaustion
//! decision is broker-local rather than delegated to a `JobMessage`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use klipnote_core::{JobId, Model};
use parking_lot::RwLock;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

/// One pending unit of work (spec §3: `QueueEntry`).
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub model: Model,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct LeaseRecord {
    model: Model,
    lease_until: DateTime<Utc>,
    /// Number of times this job has been delivered to a worker, including
    /// the current delivery. Compared against `max_deliveries`.
    delivery_count: u32,
}

/// A dequeued job, owned by exactly one worker until it's acked or its
/// lease expires.
#[derive(Debug, Clone)]
pub struct LeasedEntry {
    pub job_id: JobId,
    pub model: Model,
    pub delivery_count: u32,
}

#[derive(Debug, Clone)]
pub enum QueueEvent {
    Enqueued { job_id: JobId, model: Model },
    Leased { job_id: JobId, model: Model, delivery_count: u32 },
    Acked { job_id: JobId },
    /// Lease expired (crash or an unacked transient failure) and the entry
    /// was pushed back onto its queue for another delivery.
    Redelivered { job_id: JobId, model: Model, delivery_count: u32 },
    /// Lease expired at `max_deliveries`; the entry is dropped from the
    /// broker entirely. The caller (dispatcher) is responsible for marking
    /// the job `failed(transient_exhausted)` in the Job Store.
    Exhausted { job_id: JobId },
}

/// Two independent FIFO queues (`belle2`, `whisperx`), a lease table, and a
/// background-reapable visibility timeout. Cloning is cheap (shares the
/// underlying `Arc` state).
#[derive(Clone)]
pub struct Broker {
    queues: Arc<RwLock<HashMap<Model, VecDeque<QueueEntry>>>>,
    leases: Arc<RwLock<HashMap<JobId, LeaseRecord>>>,
    notify: Arc<Notify>,
    events: broadcast::Sender<QueueEvent>,
    visibility_timeout: chrono::Duration,
    max_deliveries: u32,
}

impl Broker {
    pub fn new(visibility_timeout: StdDuration, max_deliveries: u32) -> Self {
        let mut queues = HashMap::new();
        queues.insert(Model::Belle2, VecDeque::new());
        queues.insert(Model::WhisperX, VecDeque::new());
        let (events, _) = broadcast::channel(1024);
        Self {
            queues: Arc::new(RwLock::new(queues)),
            leases: Arc::new(RwLock::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
            events,
            visibility_timeout: chrono::Duration::from_std(visibility_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(30)),
            max_deliveries,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// `Enqueue(queue, entry)`.
    pub fn enqueue(&self, job_id: JobId, model: Model) {
        let entry = QueueEntry {
            job_id: job_id.clone(),
            model,
            enqueued_at: Utc::now(),
        };
        self.queues
            .write()
            .entry(model)
            .or_default()
            .push_back(entry);
        let _ = self.events.send(QueueEvent::Enqueued { job_id, model });
        self.notify.notify_waiters();
    }

    /// `Depth(queue) -> integer`.
    pub fn depth(&self, model: Model) -> usize {
        self.queues
            .read()
            .get(&model)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    fn try_pop(&self, model: Model) -> Option<QueueEntry> {
        self.queues.write().get_mut(&model).and_then(|q| q.pop_front())
    }

    /// `Dequeue(queue, timeout) -> entry | None`. Blocks up to `timeout`
    /// waiting for an entry to become available.
    pub async fn dequeue(&self, model: Model, timeout: StdDuration) -> Option<LeasedEntry> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(entry) = self.try_pop(model) {
                return Some(self.lease(entry));
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let notified = self.notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => return None,
            }
        }
    }

    fn lease(&self, entry: QueueEntry) -> LeasedEntry {
        let now = Utc::now();
        let mut leases = self.leases.write();
        let delivery_count = leases
            .get(&entry.job_id)
            .map(|r| r.delivery_count + 1)
            .unwrap_or(1);
        leases.insert(
            entry.job_id.clone(),
            LeaseRecord {
                model: entry.model,
                lease_until: now + self.visibility_timeout,
                delivery_count,
            },
        );
        let _ = self.events.send(QueueEvent::Leased {
            job_id: entry.job_id.clone(),
            model: entry.model,
            delivery_count,
        });
        LeasedEntry {
            job_id: entry.job_id,
            model: entry.model,
            delivery_count,
        }
    }

    /// Worker finished a job (success, permanent failure, or cancellation):
    /// remove the lease so it's never redelivered. A duplicate ack for a
    /// job with no active lease is a no-op (spec §8 idempotence property).
    pub fn ack(&self, job_id: &JobId) {
        if self.leases.write().remove(job_id).is_some() {
            let _ = self.events.send(QueueEvent::Acked {
                job_id: job_id.clone(),
            });
        }
    }

    /// Transient failure: the worker does nothing beyond releasing its GPU
    /// lease (spec §4.5) — it leaves the broker lease to expire naturally so
    /// crash-recovery and explicit-transient-failure share one code path.
    /// This method exists only as the named no-op that documents that
    /// intent at call sites.
    pub fn leave_unacked(&self, _job_id: &JobId) {}

    /// Test/ops helper: force a lease to expire immediately instead of
    /// waiting out the full visibility timeout.
    pub fn force_lease_expiry(&self, job_id: &JobId) {
        if let Some(record) = self.leases.write().get_mut(job_id) {
            record.lease_until = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    /// One reaper sweep: redeliver or exhaust every lease past its
    /// visibility timeout. Returns the number of leases reaped.
    pub fn reap_expired_leases(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<(JobId, LeaseRecord)> = {
            let leases = self.leases.read();
            leases
                .iter()
                .filter(|(_, r)| r.lease_until < now)
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect()
        };

        for (job_id, record) in &expired {
            self.leases.write().remove(job_id);
            if record.delivery_count >= self.max_deliveries {
                warn!(job_id = %job_id, deliveries = record.delivery_count, "exhausted redelivery budget");
                let _ = self.events.send(QueueEvent::Exhausted {
                    job_id: job_id.clone(),
                });
            } else {
                debug!(job_id = %job_id, "redelivering expired lease");
                self.queues
                    .write()
                    .entry(record.model)
                    .or_default()
                    .push_back(QueueEntry {
                        job_id: job_id.clone(),
                        model: record.model,
                        enqueued_at: now,
                    });
                let _ = self.events.send(QueueEvent::Redelivered {
                    job_id: job_id.clone(),
                    model: record.model,
                    delivery_count: record.delivery_count,
                });
                self.notify.notify_waiters();
            }
        }
        expired.len()
    }

    /// Run [`Broker::reap_expired_leases`] on a fixed interval until the
    /// process shuts down. Mirrors the teacher's `LeaseReaper::start`.
    pub async fn run_reaper(self, interval: StdDuration) {
        let mut ticker = tokio::time::interval(interval);
        info!(?interval, "starting broker lease reaper");
        loop {
            ticker.tick().await;
            let reclaimed = self.reap_expired_leases();
            if reclaimed > 0 {
                info!(reclaimed, "reaper reclaimed expired leases");
            }
        }
    }
}
