//! Timer plumbing for the polling views.
//!
//! `ScheduledTask` owns one repeating background job and aborts it on
//! restart or drop, so a dependency change (sort key, wallet, pinned
//! exchange) never leaves the previous timer running. `Debouncer` forwards a
//! value only once its input has been quiet for the configured delay.

use std::{future::Future, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tracing::{debug, warn};

use crate::error::Error;

/// Delay between runs: `base` while the job succeeds, doubling per
/// consecutive failure up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn fixed(base: Duration) -> Self {
        Self::new(base, base)
    }

    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.min(16));
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn idle(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    /// Runs `job` immediately and then after every delay of `backoff`.
    pub fn start<F, Fut>(name: &'static str, backoff: Backoff, job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let mut task = Self::idle(name);
        task.restart(backoff, job);
        task
    }

    /// Cancels the running job, if any, and starts `job` in its place.
    pub fn restart<F, Fut>(&mut self, backoff: Backoff, job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.cancel();
        debug!("Starting scheduled task {}", self.name);
        self.handle = Some(tokio::spawn(run_job(self.name, backoff, job)));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Cancelling scheduled task {}", self.name);
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_job<F, Fut>(name: &'static str, backoff: Backoff, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), Error>>,
{
    let mut failures: u32 = 0;

    loop {
        match job().await {
            Ok(()) => failures = 0,
            Err(error) => {
                failures = failures.saturating_add(1);
                warn!(
                    "Task {} failed ({} in a row): {}",
                    name, failures, error
                );
            },
        }

        sleep(backoff.delay(failures)).await;
    }
}

#[derive(Debug)]
pub struct Debouncer<T> {
    input: watch::Sender<T>,
    handle: JoinHandle<()>,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Returns the debouncer and the receiver of settled values. The
    /// receiver starts at `initial` and changes at most once per burst.
    pub fn new(initial: T, delay: Duration) -> (Self, watch::Receiver<T>) {
        let (input, mut input_rx) = watch::channel(initial.clone());
        let (output, output_rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            while input_rx.changed().await.is_ok() {
                loop {
                    tokio::select! {
                        _ = sleep(delay) => break,
                        changed = input_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        },
                    }
                }

                let value = input_rx.borrow_and_update().clone();
                if output.send(value).is_err() {
                    return;
                }
            }
        });

        (Self { input, handle }, output_rx)
    }

    pub fn push(&self, value: T) {
        self.input.send_replace(value);
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    fn counting_job(
        counter: Arc<AtomicUsize>,
        fail: bool,
    ) -> impl FnMut() -> futures::future::Ready<Result<(), Error>> {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            if fail {
                futures::future::ready(Err(Error::NoQuote))
            } else {
                futures::future::ready(Ok(()))
            }
        }
    }

    #[test]
    fn test_backoff_delay() {
        let backoff =
            Backoff::new(Duration::from_secs(5), Duration::from_secs(60));

        assert_eq!(backoff.delay(0), Duration::from_secs(5));
        assert_eq!(backoff.delay(1), Duration::from_secs(10));
        assert_eq!(backoff.delay(3), Duration::from_secs(40));
        assert_eq!(backoff.delay(4), Duration::from_secs(60));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(60));
        assert_eq!(
            Backoff::fixed(Duration::from_secs(1)).delay(5),
            Duration::from_secs(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_task_runs_immediately_then_periodically() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = ScheduledTask::start(
            "count",
            Backoff::fixed(Duration::from_secs(5)),
            counting_job(counter.clone(), false),
        );

        sleep(Duration::from_secs(12)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(task.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_task_backs_off_on_failure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let _task = ScheduledTask::start(
            "failing",
            Backoff::new(Duration::from_secs(5), Duration::from_secs(60)),
            counting_job(counter.clone(), true),
        );

        // runs at 0s, 10s, 30s
        sleep(Duration::from_secs(25)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_job() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let backoff = Backoff::fixed(Duration::from_secs(5));

        let mut task = ScheduledTask::start(
            "sorted",
            backoff,
            counting_job(first.clone(), false),
        );
        sleep(Duration::from_secs(6)).await;
        assert_eq!(first.load(Ordering::SeqCst), 2);

        task.restart(backoff, counting_job(second.clone(), false));
        sleep(Duration::from_secs(6)).await;

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 2);

        task.cancel();
        assert!(!task.is_running());
        sleep(Duration::from_secs(20)).await;
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_settles_once_per_burst() {
        let (debouncer, mut settled) =
            Debouncer::new(None::<u32>, Duration::from_millis(150));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let collector = {
            let seen = seen.clone();
            tokio::spawn(async move {
                while settled.changed().await.is_ok() {
                    let value = *settled.borrow_and_update();
                    seen.lock().unwrap().push(value);
                }
            })
        };

        debouncer.push(Some(1));
        sleep(Duration::from_millis(50)).await;
        debouncer.push(Some(12));
        sleep(Duration::from_millis(50)).await;
        debouncer.push(Some(125));
        sleep(Duration::from_millis(400)).await;

        assert_eq!(*seen.lock().unwrap(), vec![Some(125)]);

        debouncer.push(None);
        sleep(Duration::from_millis(400)).await;
        assert_eq!(*seen.lock().unwrap(), vec![Some(125), None]);

        collector.abort();
    }
}
