//! Daily delivery scheduler.
//!
//! - Each configured delivery time (`HH:MM`) becomes a daily job evaluated in
//!   the user timezone
//! - One tokio task per job
//! - A job that fires while another cycle is still running is skipped

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::{sync::Mutex, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{config::SchedulerConfig, Error, Result};

const RESOLVE_RETRY: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ScheduledJob {
    pub id: String,
    pub time: String,
    at: DailyTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobStatus {
    pub id: String,
    pub time: String,
    pub next_run: Option<DateTime<Tz>>,
}

pub struct NewsScheduler {
    tz: Tz,
    jobs: Vec<ScheduledJob>,
    execution_lock: Arc<Mutex<()>>,
    cancel: CancellationToken,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl NewsScheduler {
    /// Jobs for the first `frequency` delivery times.
    pub fn from_config(cfg: &SchedulerConfig, tz: Tz) -> Result<Self> {
        let mut jobs = Vec::new();
        for time in cfg.active_times() {
            let (hour, minute) = parse_delivery_time(time)?;
            jobs.push(ScheduledJob {
                id: format!("news_{hour:02}{minute:02}"),
                time: format!("{hour:02}:{minute:02}"),
                at: DailyTime { hour, minute },
            });
        }

        Ok(Self {
            tz,
            jobs,
            execution_lock: Arc::new(Mutex::new(())),
            cancel: CancellationToken::new(),
            handles: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    /// Spawn one task per job. Returns how many jobs were started.
    pub fn start<F, Fut>(&self, task: F) -> usize
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut handles = match self.handles.lock() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        for job in &self.jobs {
            let job = job.clone();
            let tz = self.tz;
            let lock = self.execution_lock.clone();
            let cancel = self.cancel.clone();
            let task = task.clone();
            handles.push(tokio::spawn(async move {
                job_loop(job, tz, lock, cancel, task).await;
            }));
        }

        if self.jobs.is_empty() {
            warn!("no delivery times configured");
        } else {
            info!(jobs = self.jobs.len(), tz = %self.tz, "scheduler started");
        }
        self.jobs.len()
    }

    /// Cancel every job and wait for the tasks to finish. A cycle already in
    /// progress is allowed to complete.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = match self.handles.lock() {
            Ok(mut h) => h.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!("scheduler stopped");
    }

    /// Start, wait for `shutdown`, stop.
    pub async fn run_until<F, Fut, S>(&self, task: F, shutdown: S)
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        S: Future<Output = ()>,
    {
        self.start(task);
        shutdown.await;
        info!("shutting down");
        self.stop().await;
    }

    pub fn status(&self) -> Vec<JobStatus> {
        let now = Utc::now().with_timezone(&self.tz);
        self.jobs
            .iter()
            .map(|job| JobStatus {
                id: job.id.clone(),
                time: job.time.clone(),
                next_run: job.at.next_after(&now),
            })
            .collect()
    }
}

async fn job_loop<F, Fut>(
    job: ScheduledJob,
    tz: Tz,
    lock: Arc<Mutex<()>>,
    cancel: CancellationToken,
    task: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(job = %job.id, time = %job.time, "added daily job");
    loop {
        let now = Utc::now().with_timezone(&tz);
        let Some(next) = job.at.next_after(&now) else {
            warn!(job = %job.id, "cannot resolve next run, retrying");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(RESOLVE_RETRY) => {}
            }
            continue;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(wait) => {}
        }

        fire(&lock, &job.id, &task).await;
    }
}

/// Run `task` unless another cycle holds the execution lock.
async fn fire<F, Fut>(lock: &Mutex<()>, job_id: &str, task: &F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let Ok(_guard) = lock.try_lock() else {
        warn!(job = job_id, "previous cycle still running, skipping");
        return false;
    };
    info!(job = job_id, "running scheduled cycle");
    task().await;
    true
}

/// Wait for SIGINT or SIGTERM.
pub async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { tokio::signal::ctrl_c().await.map_err(Error::from) };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?
            .recv()
            .await;
        Ok::<_, Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        res = ctrl_c => res?,
        res = terminate => res?,
    }
    Ok(())
}

/// `HH:MM` (24h) to `(hour, minute)`.
pub fn parse_delivery_time(raw: &str) -> Result<(u32, u32)> {
    let invalid = || Error::Config(format!("invalid delivery time: {raw:?} (expected HH:MM)"));
    let (h, m) = raw.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = h.trim().parse().map_err(|_| invalid())?;
    let minute: u32 = m.trim().parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// A local wall-clock time that recurs every day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DailyTime {
    hour: u32,
    minute: u32,
}

impl DailyTime {
    /// First occurrence strictly after `now`, in `now`'s timezone.
    ///
    /// A time repeated by a DST fall-back fires on its first occurrence; a time
    /// skipped by a spring-forward fires one hour later on the new clock.
    fn next_after<T: TimeZone>(&self, now: &DateTime<T>) -> Option<DateTime<T>> {
        let tz = now.timezone();
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0)?;
        let mut date = now.date_naive();
        for _ in 0..3 {
            if let Some(at) = resolve_local(&tz, date.and_time(time)) {
                if at > *now {
                    return Some(at);
                }
            }
            date = date.succ_opt()?;
        }
        None
    }
}

fn resolve_local<T: TimeZone>(tz: &T, local: NaiveDateTime) -> Option<DateTime<T>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(at) => Some(at),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz
            .from_local_datetime(&(local + chrono::Duration::hours(1)))
            .earliest(),
    }
}
