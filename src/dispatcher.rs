use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::config::DispatcherConfig;
use crate::error::{CallError, InitError, ShutdownError, TransportError};
use crate::job::{Job, JobOutcome, JobTicket};
use crate::queue::{JobQueue, PushError};
use crate::quota::{Admission, QuotaSnapshot, QuotaTracker};
use crate::transport::Transport;
use crate::types::ApiRequest;

/// Floor for a quota sleep, so a deadline equal to "now" does not spin.
const MIN_QUOTA_WAIT: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    /// Stop observed; queued jobs are being failed.
    Draining,
    Stopped,
}

struct Lifecycle {
    state: DispatcherState,
    stop_requested: bool,
}

/// State shared between the owning handle and the worker thread.
struct Shared {
    queue: JobQueue<Job>,
    quota: QuotaTracker,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
    poll_interval: Duration,
    lifecycle: Mutex<Lifecycle>,
    // Signalled on stop requests and on every state transition.
    changed: Condvar,
}

/// Single-worker request dispatcher.
///
/// Jobs are executed one at a time in submission order on a dedicated thread.
/// Before each call the worker blocks until the quota tracker admits it; a
/// spent daily quota fails the job instead of waiting. The worker starts on
/// construction and is stopped by [`Dispatcher::shutdown`] or on drop.
pub struct Dispatcher {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    shutdown_timeout: Duration,
    // Taken by the first shutdown.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, transport: Arc<dyn Transport>) -> Result<Self, InitError> {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: DispatcherConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, InitError> {
        config.validate()?;

        let limits = config.quota;
        let shared = Arc::new(Shared {
            queue: JobQueue::new(config.max_queue_depth),
            quota: QuotaTracker::with_clock(limits, Arc::clone(&clock)),
            transport,
            clock,
            request_timeout: config.request_timeout,
            poll_interval: config.poll_interval,
            lifecycle: Mutex::new(Lifecycle {
                state: DispatcherState::Running,
                stop_requested: false,
            }),
            changed: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("steamgate-dispatcher".to_string())
            .spawn(move || worker_shared.run())?;

        tracing::debug!(
            "Dispatcher initialized: rate_limit={}, burst_limit={}, burst_window={}s",
            limits.daily_limit,
            limits.burst_limit,
            limits.burst_window.as_secs_f64()
        );

        Ok(Self {
            shared,
            next_id: AtomicU64::new(1),
            shutdown_timeout: config.shutdown_timeout,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queue a request without waiting for it.
    pub fn submit(&self, request: ApiRequest) -> Result<JobTicket, CallError> {
        if self.shared.stop_requested() {
            return Err(CallError::Stopped);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (job, ticket) = Job::new(id, request);
        tracing::debug!("Enqueuing request: job={id} {:?}", job.request());

        match self.shared.queue.push(job) {
            Ok(()) => Ok(ticket),
            Err(PushError::Full(job)) => {
                let depth = self.shared.queue.len();
                tracing::warn!("Request queue full ({depth} jobs), rejecting job {id}");
                job.complete(Err(CallError::QueueFull { depth }));
                Err(CallError::QueueFull { depth })
            }
            Err(PushError::Closed(job)) => {
                job.complete(Err(CallError::Stopped));
                Err(CallError::Stopped)
            }
        }
    }

    /// Queue a request and block until it has been executed.
    pub fn execute(&self, request: ApiRequest) -> JobOutcome {
        self.submit(request)?.wait()
    }

    /// Ask the worker to stop. Returns immediately.
    pub fn stop(&self) {
        let mut lifecycle = self.shared.lock_lifecycle();
        if !lifecycle.stop_requested {
            tracing::info!("Shutting down dispatcher...");
            lifecycle.stop_requested = true;
        }
        drop(lifecycle);
        self.shared.changed.notify_all();
    }

    /// Stop and wait (bounded) for the worker to exit. Safe to call repeatedly.
    ///
    /// An outbound call already in flight is allowed to finish. If the worker
    /// is still busy when the timeout expires, the anomaly is reported and the
    /// handle is kept, so a later call waits again and can still join it.
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        self.stop();

        let mut worker = self.lock_worker();
        let Some(handle) = worker.take() else {
            return Ok(());
        };

        if !self.shared.wait_stopped(self.shutdown_timeout) {
            tracing::warn!(
                "Dispatcher worker thread did not terminate within {:?}",
                self.shutdown_timeout
            );
            *worker = Some(handle);
            return Err(ShutdownError::WorkerTimeout {
                timeout: self.shutdown_timeout,
            });
        }
        drop(worker);

        if handle.join().is_err() {
            tracing::error!("Dispatcher worker thread panicked");
        }
        Ok(())
    }

    pub fn state(&self) -> DispatcherState {
        self.shared.lock_lifecycle().state
    }

    /// Jobs waiting to be dispatched (excludes the one in flight).
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn quota(&self) -> QuotaSnapshot {
        self.shared.quota.snapshot()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Anomalies are already logged by shutdown.
        let _ = self.shutdown();
    }
}

// ------------------------------------------------------------------
// Worker thread
// ------------------------------------------------------------------

/// Drains the queue when the worker exits, even by unwinding.
struct ExitGuard<'a>(&'a Shared);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.drain();
    }
}

impl Shared {
    fn run(&self) {
        let _exit = ExitGuard(self);
        tracing::info!("Dispatcher worker thread started.");

        while !self.stop_requested() {
            let Some(job) = self.queue.pop_timeout(self.poll_interval) else {
                continue;
            };
            self.execute(job);
        }
    }

    fn drain(&self) {
        self.set_state(DispatcherState::Draining);

        let pending = self.queue.close();
        if !pending.is_empty() {
            tracing::warn!(
                "Failing {} queued jobs: dispatcher stopped",
                pending.len()
            );
        }
        for job in pending {
            job.complete(Err(CallError::Stopped));
        }

        self.set_state(DispatcherState::Stopped);
        tracing::info!("Dispatcher worker thread stopped.");
    }

    /// Run one job to completion. The job is completed exactly once on every path.
    fn execute(&self, job: Job) {
        let id = job.id();
        tracing::debug!(
            "Dispatching job {id} after {:.3}s in queue",
            job.queued_for().as_secs_f64()
        );

        let outcome = self.acquire_slot().and_then(|()| self.call(job.request()));
        if let Err(e) = &outcome {
            tracing::warn!("Job {id} failed: {e}");
        }
        job.complete(outcome);
    }

    /// Block until the quota admits one call, the daily quota is spent, or stop is requested.
    fn acquire_slot(&self) -> Result<(), CallError> {
        loop {
            if self.stop_requested() {
                return Err(CallError::Stopped);
            }
            match self.quota.admit() {
                Admission::Allowed => return Ok(()),
                Admission::DailyLimitExceeded { used, limit } => {
                    return Err(CallError::DailyQuotaExceeded { used, limit });
                }
                Admission::MustWaitUntil(until) => {
                    let wait = until
                        .saturating_duration_since(self.clock.now())
                        .max(MIN_QUOTA_WAIT);
                    tracing::debug!("Waiting {:.2}s for a burst slot", wait.as_secs_f64());
                    // Other slots may have been taken meanwhile; admit re-checks.
                    if self.wait_for_stop(wait) {
                        return Err(CallError::Stopped);
                    }
                }
            }
        }
    }

    fn call(&self, request: &ApiRequest) -> JobOutcome {
        let start = Instant::now();
        tracing::debug!("Performing HTTP call: {} {}", request.method, request.url);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.transport.perform(request, self.request_timeout)
        }));
        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(e.into()),
            Err(payload) => {
                return Err(TransportError::Panicked(panic_message(payload.as_ref())).into());
            }
        };

        tracing::debug!(
            "HTTP call completed in {:.2}s: status={} url={}",
            start.elapsed().as_secs_f64(),
            response.status,
            request.url
        );

        if !response.is_success() {
            return Err(TransportError::Status {
                status: response.status,
            }
            .into());
        }
        match response.body {
            Value::Object(map) => Ok(map),
            _ => Err(TransportError::NotAnObject.into()),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn stop_requested(&self) -> bool {
        self.lock_lifecycle().stop_requested
    }

    /// Sleep up to `timeout`, waking early on stop. Returns whether stop was requested.
    fn wait_for_stop(&self, timeout: Duration) -> bool {
        let lifecycle = self.lock_lifecycle();
        let (lifecycle, _) = self
            .changed
            .wait_timeout_while(lifecycle, timeout, |l| !l.stop_requested)
            .unwrap_or_else(PoisonError::into_inner);
        lifecycle.stop_requested
    }

    fn wait_stopped(&self, timeout: Duration) -> bool {
        let lifecycle = self.lock_lifecycle();
        let (lifecycle, _) = self
            .changed
            .wait_timeout_while(lifecycle, timeout, |l| {
                l.state != DispatcherState::Stopped
            })
            .unwrap_or_else(PoisonError::into_inner);
        lifecycle.state == DispatcherState::Stopped
    }

    fn set_state(&self, state: DispatcherState) {
        self.lock_lifecycle().state = state;
        self.changed.notify_all();
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuotaConfig;
    use crate::transport::TransportResponse;
    use crate::types::HttpMethod;
    use serde_json::json;

    struct Echo;

    impl Transport for Echo {
        fn perform(
            &self,
            request: &ApiRequest,
            _timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse::new(200, json!({ "url": request.url })))
        }
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            poll_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(2),
            ..DispatcherConfig::new(QuotaConfig::default())
        }
    }

    fn request(path: &str) -> ApiRequest {
        ApiRequest::new(format!("http://localhost/{path}"), HttpMethod::Get, vec![])
    }

    #[test]
    fn rejects_invalid_config() {
        let mut bad = config();
        bad.quota.burst_limit = 0;
        assert!(matches!(
            Dispatcher::new(bad, Arc::new(Echo)),
            Err(InitError::Config(_))
        ));
    }

    #[test]
    fn executes_and_stops() {
        let dispatcher = Dispatcher::new(config(), Arc::new(Echo)).unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Running);

        let payload = dispatcher.execute(request("a")).unwrap();
        assert_eq!(payload["url"], "http://localhost/a");

        dispatcher.shutdown().unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert_eq!(dispatcher.submit(request("b")).err(), Some(CallError::Stopped));
    }

    #[test]
    fn panic_message_extracts_strings() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
