//! Single-flight job controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use super::{JobError, JobEvent, JobKind, JobRunner, JobState, Stage};

/// Forwards job events to the listener and mirrors them into the shared state.
pub struct Reporter {
    tx: mpsc::Sender<JobEvent>,
    state: Arc<Mutex<JobState>>,
}

impl Reporter {
    pub fn send(&self, event: JobEvent) {
        let next = match &event {
            JobEvent::Progress(p) => JobState::Running {
                stage: p.stage,
                current: p.current,
                total: p.total,
            },
            JobEvent::Complete(_) => JobState::Complete,
            JobEvent::Error { error } => JobState::Failed(error.clone()),
        };
        set_state(&self.state, next);

        // The listener may have disconnected; the job keeps going regardless.
        if self.tx.send(event).is_err() {
            tracing::trace!("Job event listener gone");
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::Receiver<JobEvent>, Arc<Mutex<JobState>>) {
        let (tx, rx) = mpsc::channel();
        let state = Arc::new(Mutex::new(JobState::Idle));
        (
            Self {
                tx,
                state: state.clone(),
            },
            rx,
            state,
        )
    }
}

fn set_state(state: &Mutex<JobState>, next: JobState) {
    match state.lock() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
}

/// Clears the running flag when the job thread ends, including by panic.
struct RunningGuard {
    running: Arc<AtomicBool>,
    state: Arc<Mutex<JobState>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            set_state(&self.state, JobState::Failed("job panicked".to_string()));
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Starts batch jobs, at most one at a time per process.
pub struct JobController {
    runner: Arc<JobRunner>,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<JobState>>,
}

impl JobController {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self {
            runner,
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(JobState::Idle)),
        }
    }

    pub fn state(&self) -> JobState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start `kind` on a new thread, reporting to `tx`. Fails with
    /// [`JobError::AlreadyRunning`] while another job is in flight.
    pub fn start(&self, kind: JobKind, tx: mpsc::Sender<JobEvent>) -> Result<thread::JoinHandle<()>, JobError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(job = kind.command(), "Rejected job, another is running");
            return Err(JobError::AlreadyRunning);
        }

        let guard = RunningGuard {
            running: self.running.clone(),
            state: self.state.clone(),
        };
        let stage = match kind {
            JobKind::Rescan | JobKind::DescribePhotos => Stage::Photos,
            JobKind::DescribeAllAlbums | JobKind::RetryAlbumFailures => Stage::Albums,
        };
        set_state(
            &self.state,
            JobState::Running {
                stage,
                current: 0,
                total: 0,
            },
        );

        let reporter = Reporter {
            tx,
            state: self.state.clone(),
        };
        let runner = self.runner.clone();

        let spawned = thread::Builder::new()
            .name(format!("job-{}", kind.command()))
            .spawn(move || {
                let _guard = guard;
                match runner.run(kind, &reporter) {
                    Ok(report) => reporter.send(JobEvent::Complete(report)),
                    Err(e) => {
                        tracing::error!(job = kind.command(), error = %e, "Job failed");
                        reporter.send(JobEvent::error(e.to_string()));
                    }
                }
            });

        spawned.map_err(|e| {
            set_state(&self.state, JobState::Failed(e.to_string()));
            JobError::Spawn(e)
        })
    }
}
