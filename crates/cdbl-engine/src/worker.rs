//! Background fix jobs.
//!
//! A job runs on its own thread and reports through a bounded channel:
//! one `Started`, up to one `Progress` per asset pair, then exactly one
//! `Finished`. Progress is dropped while the channel is full, so a slow
//! or absent reader never stalls the cache writes; `Finished` is always
//! delivered. Cancellation is cooperative and only takes effect between
//! pairs, never in the middle of a file copy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};

use cdbl_config::{log_engine_debug, log_engine_info, log_engine_warn};

use crate::{Engine, EngineError, FixKind, FixResult, Result};

/// Channel capacity (bounded ring buffer)
const CHANNEL_CAP: usize = 256;

#[derive(Debug, Clone)]
pub enum JobEvent {
    Started {
        fix: FixKind,
    },
    Progress {
        index: usize,
        total: usize,
        hash: String,
        success: bool,
        message: String,
    },
    Finished(FixResult),
}

/// Handle to a running job
///
/// Progress events are lossy; `Started` and `Finished` are not.
pub struct JobHandle {
    fix: FixKind,
    events: Receiver<JobEvent>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl JobHandle {
    pub fn fix(&self) -> FixKind {
        self.fix
    }

    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    /// Ask the job to stop before its next asset pair.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Block until the job finishes, discarding progress events.
    ///
    /// Returns `None` only if the worker died without reporting.
    pub fn wait(mut self) -> Option<FixResult> {
        let mut finished = None;
        for event in self.events.iter() {
            if let JobEvent::Finished(result) = event {
                finished = Some(result);
                break;
            }
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log_engine_warn!("Job thread panicked", fix = %self.fix);
            }
        }
        finished
    }
}

/// Clears the engine's busy flag when the worker exits, panics included.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Engine {
    /// Apply `fix` on a worker thread.
    ///
    /// Only one job runs at a time; a second call while one is in flight
    /// returns [`EngineError::Busy`].
    pub fn spawn_fix(&self, fix: FixKind) -> Result<JobHandle> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::Busy);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let (tx, rx): (Sender<JobEvent>, Receiver<JobEvent>) = bounded(CHANNEL_CAP);
        let cancel = Arc::new(AtomicBool::new(false));

        let engine = self.clone();
        let worker_cancel = Arc::clone(&cancel);
        let thread = std::thread::Builder::new()
            .name(format!("cdbl-fix-{fix}"))
            .spawn(move || {
                let _guard = guard;
                log_engine_info!("Job started", fix = %fix);
                // A dropped receiver just means nobody is listening.
                let _ = tx.send(JobEvent::Started { fix });

                let result = engine.apply_fix_with(fix, Some(&worker_cancel), |index, total, item| {
                    let _ = tx.try_send(JobEvent::Progress {
                        index,
                        total,
                        hash: item.hash.clone(),
                        success: item.success,
                        message: item.message.clone(),
                    });
                });

                log_engine_debug!("Job finished", fix = %fix, success = result.success);
                let _ = tx.send(JobEvent::Finished(result));
            })?;

        Ok(JobHandle {
            fix,
            events: rx,
            cancel,
            thread: Some(thread),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}
