use std::future::Future;
use std::sync::Arc;

use rocket::tokio::{
    self,
    sync::Notify,
    task::JoinHandle,
    time::{Duration, MissedTickBehavior},
};

/// A job that runs now and then every `period`, until stopped.
/// It can also be triggered early.
pub struct Ticker {
    handle: JoinHandle<()>,
    signal: Arc<Notify>,
}

impl Ticker {
    /// Spawn the ticking task. Each run finishes before the next one starts;
    /// ticks missed while a run was in progress are skipped, not queued.
    pub fn start<F, Fut>(period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let signal = Arc::new(Notify::new());
        let task_signal = signal.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = task_signal.notified() => {}
                }
                job().await;
            }
        });
        Self { handle, signal }
    }

    /// Run the job as soon as the current run (if any) finishes.
    pub fn trigger_now(&self) {
        self.signal.notify_one();
    }

    /// Stop ticking. A run in progress is abandoned at its next await point.
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_ticker(period: Duration) -> (Ticker, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let job_runs = runs.clone();
        let ticker = Ticker::start(period, move || {
            let runs = job_runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });
        (ticker, runs)
    }

    #[rocket::async_test]
    async fn runs_immediately_then_periodically() {
        let (ticker, runs) = counting_ticker(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(110)).await;
        ticker.stop();
        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 3, "only {seen} runs");
    }

    #[rocket::async_test]
    async fn trigger_runs_early() {
        let (ticker, runs) = counting_ticker(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        ticker.trigger_now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        ticker.stop();
    }

    #[rocket::async_test]
    async fn stop_ends_the_task() {
        let (ticker, runs) = counting_ticker(Duration::from_millis(10));
        ticker.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ticker.is_stopped());
        assert!(runs.load(Ordering::SeqCst) <= 1);
    }
}
