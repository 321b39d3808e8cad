use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::{
    laplacian::SparseOperator,
    mesh::GridMesh,
    probe::ProbeAnchor,
    weights::{WeightField, WeightOptions},
};

/// Everything needed to compute a weight field away from the mesh owner.
#[derive(Debug, Clone)]
pub struct WeightJob {
    /// Generation of the probe set the job was created for.
    pub generation: u64,
    /// The rest mesh.
    pub mesh: Arc<GridMesh>,
    /// Graph Laplacian of the mesh.
    pub laplacian: Arc<SparseOperator>,
    /// Initial position and radius of each probe.
    pub anchors: Vec<ProbeAnchor>,
    /// Weighting parameters.
    pub options: WeightOptions,
}

impl WeightJob {
    /// Compute the weight field.
    pub fn run(&self) -> WeightField {
        WeightField::compute(
            &self.mesh,
            &self.laplacian,
            &self.anchors,
            &self.options,
            self.generation,
        )
    }
}

#[derive(Debug, Default)]
struct WorkerState {
    pending: Option<WeightJob>,
    latest: Option<u64>,
    completed: Option<Arc<WeightField>>,
    busy: bool,
    discarded: usize,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<WorkerState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Background thread recomputing weight fields.
///
/// The newest request wins: a request replaces any queued one, and a job that finishes
/// after a newer request was made is discarded. Only complete fields are handed out.
pub struct WeightWorker {
    shared: Arc<Shared>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl WeightWorker {
    /// Start the worker thread.
    pub fn spawn() -> Self {
        let shared = Arc::new(Shared::default());

        let handle = std::thread::spawn({
            let shared = shared.clone();
            move || Self::run(&shared)
        });

        Self {
            shared,
            handle: Some(handle),
        }
    }

    fn run(shared: &Shared) {
        loop {
            let job = {
                let mut state = shared.lock();
                loop {
                    if state.shutdown {
                        return;
                    }
                    if let Some(job) = state.pending.take() {
                        state.busy = true;
                        break job;
                    }
                    state = shared
                        .changed
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            };

            log::debug!("computing weights for generation {}", job.generation);
            let field = job.run();

            let mut state = shared.lock();
            state.busy = false;
            if state.latest == Some(job.generation) {
                state.completed = Some(Arc::new(field));
            } else {
                log::debug!(
                    "discarding weights of superseded generation {}",
                    job.generation
                );
                state.discarded += 1;
            }
            shared.changed.notify_all();
        }
    }

    /// Queue a job, replacing any job that has not started yet.
    pub fn request(&self, job: WeightJob) {
        let mut state = self.shared.lock();
        if state
            .completed
            .as_ref()
            .is_some_and(|field| field.generation() != job.generation)
        {
            state.completed = None;
            state.discarded += 1;
        }
        if let Some(previous) = state.pending.replace(job) {
            log::debug!(
                "dropping queued weight job of generation {}",
                previous.generation
            );
            state.discarded += 1;
        }
        state.latest = state.pending.as_ref().map(|job| job.generation);
        self.shared.changed.notify_all();
    }

    /// Take the completed field of the latest request, if it is ready.
    pub fn try_take(&self) -> Option<Arc<WeightField>> {
        self.shared.lock().completed.take()
    }

    /// Wait up to `timeout` for the field of the latest request.
    pub fn wait(&self, timeout: Duration) -> Option<Arc<WeightField>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let Some(field) = state.completed.take() {
                return Some(field);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Whether no job is queued or running.
    pub fn is_idle(&self) -> bool {
        let state = self.shared.lock();
        !state.busy && state.pending.is_none()
    }

    /// Number of jobs or results dropped because a newer request arrived.
    pub fn discarded(&self) -> usize {
        self.shared.lock().discarded
    }

    /// Stop the worker thread after the running job, if any.
    pub fn shutdown(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.changed.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("weight worker thread panicked");
            }
        }
    }
}

impl Drop for WeightWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
