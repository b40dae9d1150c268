//! Device queues backed by worker threads.
//!
//! Each [`DeviceQueue`] executes its submissions strictly in order on its own
//! thread. Submissions may wait on [`CompletionToken`]s signaled by the
//! other queue before running and signal tokens when done, which is the
//! only ordering there is between queues.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, Sender};
use log::{error, info};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::errors::{Result, VrsError};
use crate::scheduler::CompletionToken;

type Work = Box<dyn FnOnce() -> Result<()> + Send>;

/// One unit of queue work.
pub struct Submission {
    label: &'static str,
    waits: SmallVec<[CompletionToken; 2]>,
    signals: SmallVec<[CompletionToken; 2]>,
    work: Work,
}

impl Submission {
    pub fn new(label: &'static str, work: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            label,
            waits: SmallVec::new(),
            signals: SmallVec::new(),
            work: Box::new(work),
        }
    }

    /// Device-side wait: the queue stalls until `token` is signaled.
    #[must_use]
    pub fn wait_on(mut self, token: CompletionToken) -> Self {
        self.waits.push(token);
        self
    }

    /// Signaled once the work has run (or failed).
    #[must_use]
    pub fn signal(mut self, token: CompletionToken) -> Self {
        self.signals.push(token);
        self
    }
}

pub struct DeviceQueue {
    name: &'static str,
    sender: Option<Sender<Submission>>,
    worker: Option<JoinHandle<()>>,
    fault: Arc<Mutex<Option<String>>>,
}

impl DeviceQueue {
    /// Starts the worker. `device_wait` bounds every device-side wait.
    pub fn spawn(name: &'static str, device_wait: Duration) -> Result<Self> {
        let (sender, receiver) = flume::unbounded();
        let fault = Arc::new(Mutex::new(None));
        let worker_fault = Arc::clone(&fault);
        let worker = thread::Builder::new()
            .name(format!("vrs-{name}-queue"))
            .spawn(move || run_queue(name, &receiver, &worker_fault, device_wait))
            .map_err(|e| VrsError::AllocationFailed {
                resource: "queue worker",
                reason: e.to_string(),
            })?;
        info!("{name} queue started");
        Ok(Self {
            name,
            sender: Some(sender),
            worker: Some(worker),
            fault,
        })
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn submit(&self, submission: Submission) -> Result<()> {
        if let Some(fault) = self.fault() {
            return Err(VrsError::DeviceLost(fault));
        }
        let sender = self.sender.as_ref().ok_or(VrsError::QueueSubmit {
            queue: self.name,
            reason: "queue shut down".into(),
        })?;
        sender.send(submission).map_err(|_| VrsError::QueueSubmit {
            queue: self.name,
            reason: "worker thread exited".into(),
        })
    }

    /// Blocks until every submission queued so far has executed.
    pub fn wait_idle(&self, timeout: Duration) -> Result<()> {
        let idle = CompletionToken::new();
        self.submit(Submission::new("idle", || Ok(())).signal(idle.clone()))?;
        idle.wait(timeout)
            .map_err(|_| VrsError::DeviceLost(format!("{} queue did not drain", self.name)))?;
        match self.fault() {
            Some(fault) => Err(VrsError::DeviceLost(fault)),
            None => Ok(()),
        }
    }

    /// First failure reported by the worker, if any.
    #[must_use]
    pub fn fault(&self) -> Option<String> {
        self.fault.lock().clone()
    }
}

impl Drop for DeviceQueue {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("{} queue worker panicked", self.name);
            }
        }
    }
}

fn run_queue(
    name: &'static str,
    receiver: &Receiver<Submission>,
    fault: &Mutex<Option<String>>,
    device_wait: Duration,
) {
    while let Ok(submission) = receiver.recv() {
        let Submission {
            label,
            waits,
            signals,
            work,
        } = submission;

        let mut outcome = waits.iter().try_for_each(|token| token.wait(device_wait));
        // A faulted queue keeps draining so waiters are released, but runs
        // no more work.
        if outcome.is_ok() && fault.lock().is_none() {
            outcome = work();
        }
        if let Err(err) = outcome {
            error!("{name} queue: `{label}` failed: {err}");
            fault.lock().get_or_insert_with(|| format!("{label}: {err}"));
        }
        for token in signals {
            token.signal();
        }
    }
}
