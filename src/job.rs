use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::CallError;
use crate::types::{ApiRequest, JsonObject};

pub type JobOutcome = Result<JsonObject, CallError>;

/// One-shot completion signal shared by a job and its ticket.
struct Completion {
    state: Mutex<Slot>,
    done: Condvar,
}

#[derive(Default)]
struct Slot {
    fired: bool,
    outcome: Option<JobOutcome>,
}

impl Completion {
    fn new() -> Self {
        Self {
            state: Mutex::new(Slot::default()),
            done: Condvar::new(),
        }
    }

    /// Fire once; later calls are ignored. Returns whether this call fired it.
    fn fire(&self, outcome: Option<JobOutcome>) -> bool {
        let mut slot = self.lock();
        if slot.fired {
            return false;
        }
        slot.fired = true;
        slot.outcome = outcome;
        drop(slot);

        self.done.notify_all();
        true
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A pending outbound call, owned by the dispatcher until completed.
///
/// Dropping a job without completing it fires the signal with an empty slot,
/// so the waiting caller always wakes up.
pub struct Job {
    id: u64,
    request: ApiRequest,
    enqueued_at: Instant,
    completion: Arc<Completion>,
}

impl Job {
    pub fn new(id: u64, request: ApiRequest) -> (Self, JobTicket) {
        let completion = Arc::new(Completion::new());
        let job = Self {
            id,
            request,
            enqueued_at: Instant::now(),
            completion: Arc::clone(&completion),
        };
        (job, JobTicket { id, completion })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// Time spent between creation and now.
    pub fn queued_for(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    pub fn complete(self, outcome: JobOutcome) {
        self.completion.fire(Some(outcome));
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if self.completion.fire(None) {
            tracing::error!("Job {} dropped without being completed", self.id);
        }
    }
}

/// Caller's handle on a submitted job.
pub struct JobTicket {
    id: u64,
    completion: Arc<Completion>,
}

impl JobTicket {
    pub fn is_done(&self) -> bool {
        self.completion.lock().fired
    }

    /// Block until the dispatcher has completed the job.
    pub fn wait(self) -> JobOutcome {
        let slot = self.completion.lock();
        let mut slot = self
            .completion
            .done
            .wait_while(slot, |s| !s.fired)
            .unwrap_or_else(PoisonError::into_inner);
        Self::take(self.id, &mut slot)
    }

    /// Like [`JobTicket::wait`], giving up after `timeout`.
    ///
    /// Giving up does not cancel the job: it still runs and counts against quota.
    pub fn wait_timeout(self, timeout: Duration) -> JobOutcome {
        let slot = self.completion.lock();
        let (mut slot, _) = self
            .completion
            .done
            .wait_timeout_while(slot, timeout, |s| !s.fired)
            .unwrap_or_else(PoisonError::into_inner);
        if !slot.fired {
            return Err(CallError::Timeout(timeout));
        }
        Self::take(self.id, &mut slot)
    }

    fn take(id: u64, slot: &mut Slot) -> JobOutcome {
        match slot.outcome.take() {
            Some(outcome) => outcome,
            None => {
                tracing::error!("Request finished without response: job {id}");
                Err(CallError::JobIncomplete { id })
            }
        }
    }
}
